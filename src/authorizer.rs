use crate::authenticator::{Authenticator, TokenType};
use crate::error::{Error, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Safety margin subtracted from the server-reported expiry so that a token
/// judged "valid" at the start of a request does not expire mid-flight.
const EXPIRATION_MARGIN: Duration = Duration::from_secs(10);

/// Which OAuth2 grant an authorizer uses to mint its first access token.
/// Once a refresh token has been obtained, every variant refreshes with the
/// `refresh_token` grant instead, regardless of its original grant.
pub enum Grant {
    /// `client_credentials` (trusted) or Reddit's `installed_client` grant
    /// with a generated `device_id` (untrusted) — no user context.
    ReadOnly { device_id: Option<String> },

    /// `password` grant with an optional one-time 2FA callback appended to
    /// the password as `password:code`.
    Script {
        username: String,
        password: String,
        two_factor_callback: Option<Box<dyn Fn() -> Option<String> + Send + Sync>>,
    },

    /// Reddit's `installed_client` grant with a caller-supplied `device_id`.
    DeviceId { device_id: String },

    /// Token supplied externally from a browser redirect. Cannot refresh or
    /// revoke via the token endpoint's refresh_token grant.
    Implicit,

    /// `authorization_code` grant, consumed once; refreshes thereafter via
    /// `refresh_token` if the server issued one.
    AuthorizationCode { code: Mutex<Option<String>> },
}

impl std::fmt::Debug for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Grant::ReadOnly { device_id } => f.debug_struct("ReadOnly").field("device_id", device_id).finish(),
            Grant::Script { username, .. } => f.debug_struct("Script").field("username", username).finish(),
            Grant::DeviceId { device_id } => f.debug_struct("DeviceId").field("device_id", device_id).finish(),
            Grant::Implicit => write!(f, "Implicit"),
            Grant::AuthorizationCode { .. } => write!(f, "AuthorizationCode"),
        }
    }
}

#[derive(Debug, Default, Clone)]
struct AuthorizerState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    scopes: Vec<String>,
    expiration: Option<Instant>,
}

impl AuthorizerState {
    fn is_valid(&self) -> bool {
        match (&self.access_token, self.expiration) {
            (Some(_), Some(exp)) => exp > Instant::now(),
            _ => false,
        }
    }
}

/// Owns the current access token for one set of credentials and refreshes it
/// on demand. Shared (via `Arc`) across every `Session` built from it so that
/// concurrent callers observe at most one in-flight refresh.
pub struct Authorizer {
    authenticator: Arc<Authenticator>,
    http: Client,
    reddit_url: String,
    grant: Grant,
    state: Mutex<AuthorizerState>,
    pre_refresh_callback: Option<Box<dyn Fn() + Send + Sync>>,
    post_refresh_callback: Option<Box<dyn Fn() + Send + Sync>>,
}

impl Authorizer {
    pub fn new(authenticator: Arc<Authenticator>, http: Client, reddit_url: impl Into<String>, grant: Grant) -> Self {
        Self {
            authenticator,
            http,
            reddit_url: reddit_url.into(),
            grant,
            state: Mutex::new(AuthorizerState::default()),
            pre_refresh_callback: None,
            post_refresh_callback: None,
        }
    }

    pub fn with_pre_refresh_callback(mut self, cb: impl Fn() + Send + Sync + 'static) -> Self {
        self.pre_refresh_callback = Some(Box::new(cb));
        self
    }

    pub fn with_post_refresh_callback(mut self, cb: impl Fn() + Send + Sync + 'static) -> Self {
        self.post_refresh_callback = Some(Box::new(cb));
        self
    }

    /// Injects a token obtained externally (the implicit browser flow).
    pub async fn set_implicit_token(&self, access_token: String, expires_in: Duration, scopes: Vec<String>) {
        let mut state = self.state.lock().await;
        state.access_token = Some(access_token);
        state.refresh_token = None;
        state.scopes = scopes;
        state.expiration = Some(Instant::now() + expires_in.saturating_sub(EXPIRATION_MARGIN));
    }

    pub async fn is_valid(&self) -> bool {
        self.state.lock().await.is_valid()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.state.lock().await.access_token.clone()
    }

    pub async fn scopes(&self) -> Vec<String> {
        self.state.lock().await.scopes.clone()
    }

    /// Forces the authorizer into an invalid state so the next `ensure_valid`
    /// triggers a fresh refresh (used after a 401 during a request).
    pub(crate) async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.access_token = None;
        state.expiration = None;
    }

    pub async fn ensure_valid(&self) -> Result<()> {
        if self.is_valid().await {
            return Ok(());
        }
        self.refresh().await
    }

    /// Unconditionally requests a new access token. Re-checks validity after
    /// acquiring the lock so that a caller who raced in behind another
    /// in-flight refresh does not perform a redundant one.
    pub async fn refresh(&self) -> Result<()> {
        if matches!(self.grant, Grant::Implicit) {
            return Err(Error::InvalidInvocation(
                "an implicit authorizer cannot refresh its token".to_string(),
            ));
        }

        if let Some(cb) = &self.pre_refresh_callback {
            cb();
        }

        let mut state = self.state.lock().await;
        if state.is_valid() {
            return Ok(());
        }

        let existing_refresh_token = state.refresh_token.clone();
        let body = if let Some(refresh_token) = &existing_refresh_token {
            debug!("refreshing access token via refresh_token grant");
            self.authenticator
                .post_token_request(
                    &self.http,
                    &self.reddit_url,
                    &[("grant_type", "refresh_token"), ("refresh_token", refresh_token)],
                )
                .await?
        } else {
            self.initial_grant_request().await?
        };

        let access_token = body["access_token"]
            .as_str()
            .ok_or_else(|| Error::InvalidInvocation("token response missing access_token".to_string()))?
            .to_string();
        let expires_in = body["expires_in"].as_u64().unwrap_or(3600);
        let scope = body["scope"].as_str().unwrap_or_default();

        state.access_token = Some(access_token);
        if let Some(new_refresh) = body.get("refresh_token").and_then(|v| v.as_str()) {
            state.refresh_token = Some(new_refresh.to_string());
        }
        state.scopes = scope.split_whitespace().map(str::to_string).collect();
        state.expiration = Some(Instant::now() + Duration::from_secs(expires_in).saturating_sub(EXPIRATION_MARGIN));

        drop(state);
        info!("authorizer refreshed, expires in {}s", expires_in);

        if let Some(cb) = &self.post_refresh_callback {
            cb();
        }

        Ok(())
    }

    async fn initial_grant_request(&self) -> Result<serde_json::Value> {
        match &self.grant {
            Grant::ReadOnly { device_id: Some(device_id) } => {
                self.authenticator
                    .post_token_request(
                        &self.http,
                        &self.reddit_url,
                        &[
                            ("grant_type", "https://oauth.reddit.com/grants/installed_client"),
                            ("device_id", device_id),
                        ],
                    )
                    .await
            }
            Grant::ReadOnly { device_id: None } => {
                self.authenticator
                    .post_token_request(&self.http, &self.reddit_url, &[("grant_type", "client_credentials")])
                    .await
            }
            Grant::DeviceId { device_id } => {
                self.authenticator
                    .post_token_request(
                        &self.http,
                        &self.reddit_url,
                        &[
                            ("grant_type", "https://oauth.reddit.com/grants/installed_client"),
                            ("device_id", device_id),
                        ],
                    )
                    .await
            }
            Grant::Script { username, password, two_factor_callback } => {
                let password = match two_factor_callback.as_ref().and_then(|cb| cb()) {
                    Some(code) => format!("{password}:{code}"),
                    None => password.clone(),
                };
                self.authenticator
                    .post_token_request(
                        &self.http,
                        &self.reddit_url,
                        &[
                            ("grant_type", "password"),
                            ("username", username),
                            ("password", &password),
                        ],
                    )
                    .await
            }
            Grant::AuthorizationCode { code } => {
                let mut code_slot = code.lock().await;
                let code = code_slot
                    .take()
                    .ok_or_else(|| Error::InvalidInvocation("authorization code already consumed".to_string()))?;
                self.authenticator
                    .post_token_request(
                        &self.http,
                        &self.reddit_url,
                        &[("grant_type", "authorization_code"), ("code", &code)],
                    )
                    .await
            }
            Grant::Implicit => unreachable!("checked above"),
        }
    }

    /// Revokes the held token and transitions to unauthorized. Revoking the
    /// refresh token (when held) invalidates every access token derived from
    /// it; otherwise only the access token is revoked. Raises
    /// `InvalidInvocation` if already unauthorized.
    pub async fn revoke(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        let (token, token_type) = if let Some(refresh_token) = state.refresh_token.clone() {
            (refresh_token, TokenType::RefreshToken)
        } else if let Some(access_token) = state.access_token.clone() {
            (access_token, TokenType::AccessToken)
        } else {
            return Err(Error::InvalidInvocation("authorizer is already unauthorized".to_string()));
        };

        self.authenticator
            .revoke_token(&self.http, &self.reddit_url, &token, Some(token_type))
            .await?;

        *state = AuthorizerState::default();
        Ok(())
    }
}
