use crate::error::{Error, OAuthError, Result};
use reqwest::Client;
use url::Url;

const REDDIT_AUTHORIZE_PATH: &str = "api/v1/authorize";
const REDDIT_TOKEN_PATH: &str = "api/v1/access_token";
const REDDIT_REVOKE_PATH: &str = "api/v1/revoke_token";

/// Whether a granted access token should be renewable via a refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenDuration {
    Temporary,
    Permanent,
}

impl TokenDuration {
    fn as_str(self) -> &'static str {
        match self {
            TokenDuration::Temporary => "temporary",
            TokenDuration::Permanent => "permanent",
        }
    }
}

/// Hint passed to the revoke endpoint so the server can skip a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    AccessToken,
    RefreshToken,
}

impl TokenType {
    fn as_str(self) -> &'static str {
        match self {
            TokenType::AccessToken => "access_token",
            TokenType::RefreshToken => "refresh_token",
        }
    }
}

/// App-level OAuth2 credentials. `Trusted` authenticates with a client secret
/// (script/web apps); `Untrusted` has no secret (installed apps) and instead
/// authenticates with an empty password alongside its `client_id`.
#[derive(Debug, Clone)]
pub enum Authenticator {
    Trusted {
        client_id: String,
        client_secret: String,
    },
    Untrusted {
        client_id: String,
        redirect_uri: String,
    },
}

impl Authenticator {
    pub fn trusted(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Authenticator::Trusted {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn untrusted(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Authenticator::Untrusted {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    fn client_id(&self) -> &str {
        match self {
            Authenticator::Trusted { client_id, .. } => client_id,
            Authenticator::Untrusted { client_id, .. } => client_id,
        }
    }

    fn basic_auth_password(&self) -> Option<&str> {
        match self {
            Authenticator::Trusted { client_secret, .. } => Some(client_secret.as_str()),
            Authenticator::Untrusted { .. } => None,
        }
    }

    /// Builds the browser-facing authorization URL. Only valid for
    /// `Untrusted` authenticators; never performs network I/O.
    pub fn authorization_url(
        &self,
        reddit_url: &str,
        scopes: &[&str],
        state: &str,
        duration: TokenDuration,
        implicit: bool,
    ) -> Result<Url> {
        let redirect_uri = match self {
            Authenticator::Untrusted { redirect_uri, .. } => redirect_uri,
            Authenticator::Trusted { .. } => {
                return Err(Error::InvalidInvocation(
                    "authorization_url requires an untrusted authenticator".to_string(),
                ))
            }
        };

        if implicit && duration == TokenDuration::Permanent {
            return Err(Error::InvalidInvocation(
                "an implicit grant cannot request a permanent duration".to_string(),
            ));
        }

        let mut url = Url::parse(reddit_url)?.join(REDDIT_AUTHORIZE_PATH)?;
        url.query_pairs_mut()
            .append_pair("client_id", self.client_id())
            .append_pair("response_type", if implicit { "token" } else { "code" })
            .append_pair("state", state)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("duration", duration.as_str())
            .append_pair("scope", &scopes.join(" "));

        Ok(url)
    }

    /// Revokes a single token. Expects HTTP 200 (historically 204).
    pub async fn revoke_token(
        &self,
        http: &Client,
        reddit_url: &str,
        token: &str,
        token_type: Option<TokenType>,
    ) -> Result<()> {
        let url = format!("{}/{}", reddit_url.trim_end_matches('/'), REDDIT_REVOKE_PATH);
        let mut form = vec![("token", token.to_string())];
        if let Some(t) = token_type {
            form.push(("token_type_hint", t.as_str().to_string()));
        }

        let response = http
            .post(&url)
            .basic_auth(self.client_id(), self.basic_auth_password())
            .header("Connection", "close")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 200 || status.as_u16() == 204 {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Response(crate::error::ResponseError::Unexpected {
                status: status.as_u16(),
                body,
            }))
        }
    }

    /// Issues a Basic-auth, form-encoded POST to the token endpoint and
    /// returns the parsed JSON body. Reddit sometimes returns HTTP 200 with
    /// a body that is only `{"error": "..."}` — that case is classified into
    /// `Error::OAuth` here rather than left for the caller to discover.
    pub(crate) async fn post_token_request(
        &self,
        http: &Client,
        reddit_url: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value> {
        let url = format!("{}/{}", reddit_url.trim_end_matches('/'), REDDIT_TOKEN_PATH);
        let response = http
            .post(&url)
            .basic_auth(self.client_id(), self.basic_auth_password())
            .header("Connection", "close")
            .form(params)
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;

        if let Some(error) = body.get("error").and_then(|v| v.as_str()) {
            let description = body
                .get("error_description")
                .and_then(|v| v.as_str())
                .filter(|d| *d != "None")
                .map(str::to_string);
            return Err(Error::OAuth(OAuthError {
                error: error.to_string(),
                description,
            }));
        }

        if status.as_u16() == 401 {
            return Err(Error::InvalidToken);
        }

        if !status.is_success() {
            return Err(Error::Response(crate::error::ResponseError::Unexpected {
                status: status.as_u16(),
                body: body.to_string(),
            }));
        }

        Ok(body)
    }
}
