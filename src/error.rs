use std::time::Duration;
use tracing::{error, warn};

/// Sub-classification of a non-2xx response once the status code is known.
#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("redirect to {location}")]
    Redirect { location: String },

    #[error("bad request: {body}")]
    BadRequest { body: String },

    #[error("forbidden")]
    Forbidden,

    #[error("insufficient scope")]
    InsufficientScope,

    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("request entity too large")]
    RequestEntityTooLarge,

    #[error("request uri too large")]
    UriTooLarge,

    #[error("special error: {reason}")]
    SpecialError { reason: String },

    #[error("too many requests")]
    TooManyRequests { retry_after: Option<Duration> },

    #[error("unavailable for legal reasons")]
    UnavailableForLegalReasons,

    #[error("server error ({status})")]
    ServerError { status: u16 },

    #[error("unexpected status {status}: {body}")]
    Unexpected { status: u16, body: String },
}

/// An error body returned (with HTTP 200 or a 4xx) by Reddit's OAuth token endpoint.
#[derive(Debug)]
pub struct OAuthError {
    pub error: String,
    pub description: Option<String>,
}

impl std::fmt::Display for OAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.description {
            Some(description) => write!(f, "oauth error: {} ({description})", self.error),
            None => write!(f, "oauth error: {}", self.error),
        }
    }
}

impl std::error::Error for OAuthError {}

/// Top-level error type for the session core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Low-level transport failure (connection, TLS, timeout, chunked-encoding).
    /// Retried internally up to the session's retry budget before surfacing.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// A non-2xx response, classified per the status-code dispatch table.
    #[error("response error: {0}")]
    Response(#[from] ResponseError),

    /// The token endpoint returned a JSON body with an `error` field.
    #[error("{0}")]
    OAuth(#[from] OAuthError),

    /// The server repudiated our bearer token (401 with no viable refresh,
    /// or a second consecutive 401 immediately after a refresh).
    #[error("invalid token")]
    InvalidToken,

    /// Caller misuse: an operation invoked on an authorizer/authenticator
    /// that cannot perform it (e.g. `refresh()` on an implicit authorizer,
    /// `revoke()` called twice).
    #[error("invalid invocation: {0}")]
    InvalidInvocation(String),

    /// A response body that was expected to be JSON could not be parsed.
    #[error("malformed response: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    /// A configured URL failed to parse.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Mirrors the corpus's error-ergonomics pattern: retryability, suggested
/// backoff, and structured classification, independent of `Display`.
pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn error_code(&self) -> &'static str;
}

impl ErrorExt for Error {
    fn log_error(&self) -> &Self {
        error!("session error: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("session warning: {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            Error::Request(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            Error::Response(ResponseError::ServerError { .. }) => true,
            Error::Response(ResponseError::TooManyRequests { .. }) => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Response(ResponseError::TooManyRequests { retry_after }) => *retry_after,
            _ if self.is_retryable() => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Error::Request(_) => "REQUEST_FAILED",
            Error::Response(ResponseError::Redirect { .. }) => "REDIRECT",
            Error::Response(ResponseError::BadRequest { .. }) => "BAD_REQUEST",
            Error::Response(ResponseError::Forbidden) => "FORBIDDEN",
            Error::Response(ResponseError::InsufficientScope) => "INSUFFICIENT_SCOPE",
            Error::Response(ResponseError::NotFound) => "NOT_FOUND",
            Error::Response(ResponseError::Conflict) => "CONFLICT",
            Error::Response(ResponseError::RequestEntityTooLarge) => "REQUEST_TOO_LARGE",
            Error::Response(ResponseError::UriTooLarge) => "URI_TOO_LARGE",
            Error::Response(ResponseError::SpecialError { .. }) => "SPECIAL_ERROR",
            Error::Response(ResponseError::TooManyRequests { .. }) => "TOO_MANY_REQUESTS",
            Error::Response(ResponseError::UnavailableForLegalReasons) => "UNAVAILABLE_LEGAL",
            Error::Response(ResponseError::ServerError { .. }) => "SERVER_ERROR",
            Error::Response(ResponseError::Unexpected { .. }) => "UNEXPECTED_STATUS",
            Error::OAuth(_) => "OAUTH_ERROR",
            Error::InvalidToken => "INVALID_TOKEN",
            Error::InvalidInvocation(_) => "INVALID_INVOCATION",
            Error::MalformedResponse(_) => "MALFORMED_RESPONSE",
            Error::InvalidUrl(_) => "INVALID_URL",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_is_retryable() {
        let err = Error::Response(ResponseError::ServerError { status: 503 });
        assert!(err.is_retryable());
        assert_eq!(err.error_code(), "SERVER_ERROR");
    }

    #[test]
    fn invalid_token_is_not_retryable() {
        let err = Error::InvalidToken;
        assert!(!err.is_retryable());
        assert!(err.retry_after().is_none());
    }

    #[test]
    fn oauth_error_description_display() {
        let err = OAuthError {
            error: "invalid_grant".to_string(),
            description: None,
        };
        assert_eq!(err.to_string(), "oauth error: invalid_grant");
    }

    #[test]
    fn too_many_requests_surfaces_retry_after() {
        let err = Error::Response(ResponseError::TooManyRequests {
            retry_after: Some(Duration::from_secs(30)),
        });
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
    }
}
