//! Synchronous persona: drives the async [`Session`] to completion on a
//! dedicated current-thread runtime, the same technique `reqwest` itself
//! uses to derive its blocking client from its async one. The state machine
//! (`Authorizer`/`RateLimiter`) is not duplicated — this is a thin wrapper.

use crate::authorizer::Authorizer;
use crate::error::Result;
use crate::session::{RequestOptions, Session};
use reqwest::Method;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

pub struct BlockingSession {
    session: Session,
    runtime: Runtime,
}

impl BlockingSession {
    pub fn new(
        http: reqwest::Client,
        authorizer: Arc<Authorizer>,
        user_agent: impl Into<String>,
        oauth_url: impl Into<String>,
        reddit_url: impl Into<String>,
    ) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            session: Session::new(http, authorizer, user_agent, oauth_url, reddit_url),
            runtime,
        })
    }

    pub fn request(&self, method: Method, path: &str, options: RequestOptions) -> Result<Option<serde_json::Value>> {
        self.runtime.block_on(self.session.request(method, path, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::Authenticator;
    use crate::authorizer::Grant;

    #[test]
    fn blocking_session_constructs_without_a_surrounding_runtime() {
        let authenticator = Arc::new(Authenticator::trusted("id", "secret"));
        let authorizer = Arc::new(Authorizer::new(
            authenticator,
            reqwest::Client::new(),
            "https://www.reddit.com",
            Grant::ReadOnly { device_id: None },
        ));
        let session = BlockingSession::new(
            reqwest::Client::new(),
            authorizer,
            "test-agent/0.1",
            "https://oauth.reddit.com",
            "https://www.reddit.com",
        );
        assert!(session.is_ok());
    }
}
