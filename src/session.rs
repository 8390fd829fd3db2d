use crate::authorizer::Authorizer;
use crate::error::{Error, ResponseError, Result};
use crate::rate_limiter::RateLimiter;
use reqwest::{Client, Method, Response};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-call retry budget for transport failures and retryable server errors.
const RETRY_BUDGET: u32 = 3;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(16);

/// Exponential backoff with up to 250ms of jitter, so that concurrent
/// sessions retrying the same outage don't all wake up in lockstep.
fn backoff_for(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt)) + Duration::from_millis(fastrand::u64(0..250))
}

#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Form-encoded body. Entries are sent in key-sorted order (the default,
    /// non-`preserve_order` `serde_json::Map` is already a `BTreeMap`), which
    /// keeps body framing stable for test recorders and mock servers.
    pub data: Option<serde_json::Value>,
    /// JSON body. `"api_type": "json"` is injected into a copy before
    /// sending; the caller's value is never mutated.
    pub json: Option<serde_json::Value>,
    pub params: Vec<(String, String)>,
    pub timeout: Duration,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self {
            data: None,
            json: None,
            params: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Default for RequestOptions {
    /// Matches `new()` — in particular `timeout` defaults to 16s, not
    /// `Duration::ZERO`, since `RequestBuilder::timeout(Duration::ZERO)`
    /// would fail every request immediately.
    fn default() -> Self {
        Self::new()
    }
}

/// The per-call request pipeline: ensures a valid token, paces via the rate
/// limiter, sends the request, classifies the response, and retries
/// transient failures up to `RETRY_BUDGET` times.
pub struct Session {
    http: Client,
    authorizer: Arc<Authorizer>,
    rate_limiter: RateLimiter,
    user_agent: String,
    oauth_url: String,
    reddit_url: String,
}

/// Relative paths that live on `reddit_url` (`www.reddit.com`) rather than
/// `oauth_url` (`oauth.reddit.com`) — the token, authorize, and revoke
/// endpoints. `Session::request` is mostly called against `oauth_url`, but
/// routes these few paths correctly if a caller ever drives them through it.
const REDDIT_URL_PATHS: &[&str] = &["api/v1/access_token", "api/v1/authorize", "api/v1/revoke_token"];

impl Session {
    pub fn new(
        http: Client,
        authorizer: Arc<Authorizer>,
        user_agent: impl Into<String>,
        oauth_url: impl Into<String>,
        reddit_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            authorizer,
            rate_limiter: RateLimiter::new(),
            user_agent: user_agent.into(),
            oauth_url: oauth_url.into(),
            reddit_url: reddit_url.into(),
        }
    }

    fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            return path.to_string();
        }

        let trimmed = path.trim_start_matches('/');
        let base = if REDDIT_URL_PATHS.iter().any(|p| *p == trimmed) {
            &self.reddit_url
        } else {
            &self.oauth_url
        };
        format!("{}/{}", base.trim_end_matches('/'), trimmed)
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Option<serde_json::Value>> {
        let json_body = options.json.as_ref().map(inject_api_type);
        let data_body = options.data.as_ref().map(sorted_form_body);

        let mut params: Vec<(String, String)> = options.params.clone();
        params.push(("raw_json".to_string(), "1".to_string()));

        let url = self.build_url(path);
        let mut budget = RETRY_BUDGET;
        let mut reauthorized = false;

        loop {
            self.authorizer.ensure_valid().await?;
            let access_token = self.authorizer.access_token().await.ok_or(Error::InvalidToken)?;

            self.rate_limiter.delay().await;

            let mut request = self
                .http
                .request(method.clone(), &url)
                .header("Authorization", format!("bearer {access_token}"))
                .header("User-Agent", &self.user_agent)
                .query(&params)
                .timeout(options.timeout);

            if let Some(json) = &json_body {
                request = request.json(json);
            } else if let Some(data) = &data_body {
                request = request.form(data);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(error) => {
                    let transient = error.is_timeout() || error.is_connect() || error.is_body();
                    if transient && budget > 1 {
                        let backoff = backoff_for(RETRY_BUDGET - budget);
                        budget -= 1;
                        warn!("transport error, retrying in {:?}: {}", backoff, error);
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(Error::Request(error));
                }
            };

            self.rate_limiter.update(response.headers()).await;

            match classify(response).await? {
                Outcome::Success(body) => return Ok(body),
                Outcome::RetryTransient(status) => {
                    if budget > 1 {
                        let backoff = backoff_for(RETRY_BUDGET - budget);
                        budget -= 1;
                        debug!("retryable response ({}), retrying in {:?}", status, backoff);
                        tokio::time::sleep(backoff).await;
                    } else {
                        return Err(Error::Response(ResponseError::ServerError { status }));
                    }
                }
                Outcome::Reauthorize => {
                    if reauthorized {
                        return Err(Error::InvalidToken);
                    }
                    reauthorized = true;
                    self.authorizer.invalidate().await;
                }
                Outcome::Fail(err) => return Err(err),
            }
        }
    }
}

enum Outcome {
    Success(Option<serde_json::Value>),
    RetryTransient(u16),
    Reauthorize,
    Fail(Error),
}

/// The status-code dispatch table. A missing status code raises a generic
/// `ResponseError::Unexpected`.
async fn classify(response: Response) -> Result<Outcome> {
    let status = response.status().as_u16();

    match status {
        200 | 201 | 202 => {
            let bytes = response.bytes().await.map_err(Error::Request)?;
            if bytes.is_empty() {
                Ok(Outcome::Success(None))
            } else {
                let value: serde_json::Value = serde_json::from_slice(&bytes)?;
                Ok(Outcome::Success(Some(value)))
            }
        }
        204 => Ok(Outcome::Success(None)),
        301 | 302 => {
            let location = response
                .headers()
                .get("location")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Ok(Outcome::Fail(Error::Response(ResponseError::Redirect { location })))
        }
        400 => {
            let body = response.text().await.unwrap_or_default();
            Ok(Outcome::Fail(Error::Response(ResponseError::BadRequest { body })))
        }
        401 => Ok(Outcome::Reauthorize),
        403 => {
            let www_authenticate = response
                .headers()
                .get("www-authenticate")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            if www_authenticate.contains("insufficient_scope") {
                Ok(Outcome::Fail(Error::Response(ResponseError::InsufficientScope)))
            } else if www_authenticate.contains("invalid_token") {
                Ok(Outcome::Fail(Error::InvalidToken))
            } else {
                Ok(Outcome::Fail(Error::Response(ResponseError::Forbidden)))
            }
        }
        404 => Ok(Outcome::Fail(Error::Response(ResponseError::NotFound))),
        409 => Ok(Outcome::Fail(Error::Response(ResponseError::Conflict))),
        413 => Ok(Outcome::Fail(Error::Response(ResponseError::RequestEntityTooLarge))),
        414 => Ok(Outcome::Fail(Error::Response(ResponseError::UriTooLarge))),
        415 => {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let reason = body
                .get("explanation")
                .or_else(|| body.get("reason"))
                .or_else(|| body.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unsupported media type")
                .to_string();
            Ok(Outcome::Fail(Error::Response(ResponseError::SpecialError { reason })))
        }
        429 => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            Ok(Outcome::Fail(Error::Response(ResponseError::TooManyRequests { retry_after })))
        }
        451 => Ok(Outcome::Fail(Error::Response(ResponseError::UnavailableForLegalReasons))),
        500 | 502 | 503 | 504 | 520 | 522 => Ok(Outcome::RetryTransient(status)),
        other => {
            let body = response.text().await.unwrap_or_default();
            Ok(Outcome::Fail(Error::Response(ResponseError::Unexpected { status: other, body })))
        }
    }
}

fn inject_api_type(json: &serde_json::Value) -> serde_json::Value {
    let mut copy = json.clone();
    if let Some(object) = copy.as_object_mut() {
        object.insert("api_type".to_string(), serde_json::Value::String("json".to_string()));
    }
    copy
}

fn sorted_form_body(data: &serde_json::Value) -> BTreeMap<String, String> {
    match data.as_object() {
        Some(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), value_to_form_string(v)))
            .collect(),
        None => BTreeMap::new(),
    }
}

fn value_to_form_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_api_type_does_not_mutate_caller_value() {
        let original = serde_json::json!({"thing_id": "t3_abc"});
        let injected = inject_api_type(&original);
        assert!(!original.as_object().unwrap().contains_key("api_type"));
        assert_eq!(injected["api_type"], "json");
        assert_eq!(injected["thing_id"], "t3_abc");
    }

    #[test]
    fn sorted_form_body_sorts_keys() {
        let data = serde_json::json!({"zeta": "1", "alpha": "2"});
        let form = sorted_form_body(&data);
        let keys: Vec<&String> = form.keys().collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
    }

    #[test]
    fn default_request_options_use_sixteen_second_timeout() {
        assert_eq!(RequestOptions::default().timeout, DEFAULT_TIMEOUT);
        assert_eq!(RequestOptions::new().timeout, DEFAULT_TIMEOUT);
    }

    fn test_session() -> Session {
        use crate::authenticator::Authenticator;
        use crate::authorizer::{Authorizer, Grant};

        let authenticator = Arc::new(Authenticator::trusted("id", "secret"));
        let authorizer = Arc::new(Authorizer::new(
            authenticator,
            Client::new(),
            "https://www.reddit.com",
            Grant::ReadOnly { device_id: None },
        ));
        Session::new(
            Client::new(),
            authorizer,
            "test-agent/0.1",
            "https://oauth.reddit.com",
            "https://www.reddit.com",
        )
    }

    #[test]
    fn build_url_routes_api_calls_to_oauth_url() {
        let session = test_session();
        assert_eq!(
            session.build_url("/api/v1/me"),
            "https://oauth.reddit.com/api/v1/me"
        );
    }

    #[test]
    fn build_url_routes_token_and_revoke_endpoints_to_reddit_url() {
        let session = test_session();
        assert_eq!(
            session.build_url("api/v1/access_token"),
            "https://www.reddit.com/api/v1/access_token"
        );
        assert_eq!(
            session.build_url("/api/v1/revoke_token"),
            "https://www.reddit.com/api/v1/revoke_token"
        );
    }

    #[test]
    fn build_url_passes_through_absolute_urls_unchanged() {
        let session = test_session();
        assert_eq!(
            session.build_url("https://example.com/custom"),
            "https://example.com/custom"
        );
    }
}
