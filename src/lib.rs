//! Authenticated HTTP session core for the Reddit API: OAuth2 credential
//! lifecycle across five grant types, adaptive rate limiting driven by
//! `x-ratelimit-*` response headers, a structured status-code error
//! taxonomy, and retry of transient transport failures.
//!
//! The pieces compose as `Authenticator` (app credentials) → `Authorizer`
//! (owns the current token, refreshes it) → `Session` (per-call pipeline:
//! authorize, pace, send, classify, retry). Enable the `blocking` feature
//! for a synchronous persona that drives the same state machine on a
//! dedicated runtime.

pub mod authenticator;
pub mod authorizer;
pub mod error;
pub mod rate_limiter;
pub mod session;

#[cfg(feature = "blocking")]
pub mod blocking;

pub use authenticator::{Authenticator, TokenDuration, TokenType};
pub use authorizer::{Authorizer, Grant};
pub use error::{Error, ErrorExt, OAuthError, ResponseError, Result};
pub use rate_limiter::RateLimiter;
pub use session::{RequestOptions, Session};

use reqwest::Client;
use std::time::Duration;

const DEFAULT_OAUTH_URL: &str = "https://oauth.reddit.com";
const DEFAULT_REDDIT_URL: &str = "https://www.reddit.com";
const DEFAULT_TIMEOUT_SECS: u64 = 16;

/// Construction-time configuration shared by every `Authenticator`,
/// `Authorizer`, and `Session` built for one application.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub oauth_url: String,
    pub reddit_url: String,
}

impl ClientConfig {
    /// `timeout` defaults to 16 seconds, overridable via the
    /// `REDDIT_CLIENT_TIMEOUT` environment variable read once here.
    pub fn new(user_agent: impl Into<String>) -> Result<Self> {
        let user_agent = user_agent.into();
        if user_agent.trim().is_empty() {
            return Err(Error::InvalidInvocation("user_agent must not be empty".to_string()));
        }

        let timeout = std::env::var("REDDIT_CLIENT_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        Ok(Self {
            user_agent,
            timeout,
            oauth_url: DEFAULT_OAUTH_URL.to_string(),
            reddit_url: DEFAULT_REDDIT_URL.to_string(),
        })
    }

    /// Overrides the API base URL, for pointing the pipeline at a local
    /// mock server in tests.
    pub fn with_oauth_url(mut self, url: impl Into<String>) -> Self {
        self.oauth_url = url.into();
        self
    }

    /// Overrides the authorize/token/revoke base URL, for pointing the
    /// pipeline at a local mock server in tests.
    pub fn with_reddit_url(mut self, url: impl Into<String>) -> Self {
        self.reddit_url = url.into();
        self
    }

    pub fn build_http_client(&self) -> reqwest::Result<Client> {
        Client::builder().user_agent(&self.user_agent).timeout(self.timeout).build()
    }
}
