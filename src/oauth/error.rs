//! Error types for the authorization code flow.
//!
//! Each component reports its own error type so callers can tell which step
//! of an authorization attempt failed:
//!
//! 1. [`FlowError`] - Returned by the flow controller; wraps the others
//! 2. [`ExchangeError`] - Token endpoint failures
//! 3. [`StoreError`] - Credential persistence failures
//! 4. [`RequestError`] - Authenticated resource request failures
//! 5. [`RunError`] - Background pipeline failure (flow or request)
//! 6. [`ConfigError`] - Invalid client configuration
//!
//! Nothing in this crate retries on its own. Every failure ends the current
//! attempt and is handed back to the caller, which can consult
//! [`FlowError::is_retryable`] (and friends) to decide whether restarting the
//! authorization makes sense.
//!
//! # Example
//!
//! ```rust
//! use oauth2client::oauth::error::{ExchangeError, FlowError};
//!
//! let err = FlowError::from(ExchangeError::http(400, r#"{"error":"invalid_grant"}"#));
//! assert!(err.to_string().contains("400"));
//! assert!(!err.is_retryable());
//! ```

use thiserror::Error;

/// Maximum number of characters of a response body kept in an error.
const BODY_EXCERPT_LEN: usize = 512;

/// Errors returned by the authorization flow controller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FlowError {
    /// The URI is not a redirect for this client; the caller should do nothing.
    #[error("URI is not an authorization callback")]
    Ignored,

    /// The authorization server redirected back with an `error` parameter.
    #[error("Authorization was denied: {reason}")]
    AuthorizationDenied {
        /// The `error` value, with `error_description` appended when present.
        reason: String,
    },

    /// The callback state is absent, unknown, expired, or already used.
    #[error("Received invalid state - not authorized")]
    InvalidState,

    /// The code could not be exchanged for tokens.
    #[error("Could not get tokens: {0}")]
    ExchangeFailed(#[from] ExchangeError),

    /// The credential could not be persisted.
    #[error("Could not store token response: {0}")]
    StoreFailed(#[from] StoreError),
}

impl FlowError {
    /// Create an authorization denied error.
    #[must_use]
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::AuthorizationDenied {
            reason: reason.into(),
        }
    }

    /// Check whether restarting the attempt could plausibly succeed.
    ///
    /// Only transient transport failures qualify. A rejected state or a
    /// denied authorization needs the user to start over deliberately.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ExchangeFailed(err) => err.is_retryable(),
            Self::StoreFailed(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Check whether this error is a security rejection of the callback.
    #[must_use]
    pub fn is_security_rejection(&self) -> bool {
        matches!(self, Self::InvalidState)
    }
}

/// Errors from the token endpoint exchange.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExchangeError {
    /// The token endpoint answered with a non-2xx status.
    #[error("token endpoint returned HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Excerpt of the response body.
        body: String,
    },

    /// The token endpoint answered 2xx but the body is not a token response.
    #[error("malformed token response (HTTP {status}): {reason}")]
    MalformedResponse {
        /// HTTP status code.
        status: u16,
        /// Why the body was rejected, with a body excerpt.
        reason: String,
    },

    /// The request did not complete within the configured timeout.
    #[error("token request timed out")]
    Timeout,

    /// Connection or transport failure.
    #[error("token request failed: {0}")]
    Network(#[source] reqwest::Error),
}

impl ExchangeError {
    /// Create an HTTP status error, truncating the body.
    #[must_use]
    pub fn http(status: u16, body: impl AsRef<str>) -> Self {
        Self::Http {
            status,
            body: excerpt(body.as_ref()),
        }
    }

    /// Create a malformed response error.
    #[must_use]
    pub fn malformed(status: u16, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            status,
            reason: reason.into(),
        }
    }

    /// HTTP status associated with this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::MalformedResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Timeouts, connection failures and 5xx responses are transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500,
            Self::MalformedResponse { .. } => false,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err)
        }
    }
}

/// Errors from the credential store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Reading or writing the backing medium failed.
    #[error("credential store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record exists but cannot be decoded.
    #[error("stored credential for '{user_id}' is corrupt: {reason}")]
    Corrupt {
        /// Key of the unreadable record.
        user_id: String,
        /// Decoder message.
        reason: String,
    },

    /// The user identifier cannot be used as a key.
    #[error("invalid user id: {0}")]
    InvalidKey(String),

    /// The system keyring rejected the operation.
    #[error("keyring error: {0}")]
    Keyring(String),
}

impl StoreError {
    /// Create a corrupt record error.
    #[must_use]
    pub fn corrupt(user_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::Corrupt {
            user_id: user_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Interrupted and timed out I/O may succeed on a second attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

#[cfg(feature = "keyring")]
impl From<keyring::Error> for StoreError {
    fn from(e: keyring::Error) -> Self {
        Self::Keyring(e.to_string())
    }
}

/// Errors from an authenticated resource request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RequestError {
    /// The resource answered with a status outside `[200, 300)`.
    #[error("Got error HTTP status getting resource: {0}")]
    Http(u16),

    /// The resource did not answer with `application/json`.
    #[error("Got invalid content type: {}", .0.as_deref().unwrap_or("<none>"))]
    UnexpectedContentType(Option<String>),

    /// The request did not complete within the configured timeout.
    #[error("resource request timed out")]
    Timeout,

    /// Connection failure or failure reading the body.
    #[error("Could not read resource response: {0}")]
    Io(#[source] reqwest::Error),
}

impl RequestError {
    /// Timeouts, connection failures and 5xx responses are transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Io(_) => true,
            Self::Http(status) => *status >= 500,
            Self::UnexpectedContentType(_) => false,
        }
    }

    /// A 401 means the access token is no longer accepted.
    #[must_use]
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::Http(401))
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Io(err)
        }
    }
}

/// Failure of a background pipeline run: either the authorization step or
/// the resource request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    /// Authorization did not complete.
    #[error(transparent)]
    Flow(#[from] FlowError),

    /// Authorization completed but the resource request failed.
    #[error(transparent)]
    Request(#[from] RequestError),
}

impl RunError {
    /// Delegates to the wrapped error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Flow(err) => err.is_retryable(),
            Self::Request(err) => err.is_retryable(),
        }
    }
}

/// Invalid client configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required field was not provided.
    #[error("missing required field: {0}")]
    Missing(&'static str),

    /// A URL field does not parse.
    #[error("invalid URL for {field}: {reason}")]
    InvalidUrl {
        /// Name of the offending field.
        field: &'static str,
        /// Parser message.
        reason: String,
    },

    /// A field parses but is not usable.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Create an invalid URL error.
    #[must_use]
    pub fn invalid_url(field: &'static str, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            field,
            reason: reason.to_string(),
        }
    }

    /// Create an invalid value error.
    #[must_use]
    pub fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Truncate a response body to [`BODY_EXCERPT_LEN`] characters.
pub(crate) fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_error_display() {
        assert_eq!(
            FlowError::InvalidState.to_string(),
            "Received invalid state - not authorized"
        );

        let err = FlowError::denied("access_denied: user cancelled");
        assert!(err.to_string().contains("access_denied"));

        let err = FlowError::from(ExchangeError::http(400, "bad request"));
        assert!(err.to_string().starts_with("Could not get tokens"));
        assert!(err.to_string().contains("HTTP 400"));
    }

    #[test]
    fn test_flow_error_retryable() {
        assert!(!FlowError::Ignored.is_retryable());
        assert!(!FlowError::InvalidState.is_retryable());
        assert!(!FlowError::denied("access_denied").is_retryable());

        assert!(FlowError::from(ExchangeError::Timeout).is_retryable());
        assert!(FlowError::from(ExchangeError::http(503, "")).is_retryable());
        assert!(!FlowError::from(ExchangeError::http(400, "")).is_retryable());

        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk");
        assert!(FlowError::from(StoreError::from(io)).is_retryable());
    }

    #[test]
    fn test_security_rejection() {
        assert!(FlowError::InvalidState.is_security_rejection());
        assert!(!FlowError::Ignored.is_security_rejection());
    }

    #[test]
    fn test_exchange_error_status() {
        assert_eq!(ExchangeError::http(400, "").status(), Some(400));
        assert_eq!(ExchangeError::malformed(200, "not json").status(), Some(200));
        assert_eq!(ExchangeError::Timeout.status(), None);
    }

    #[test]
    fn test_exchange_error_truncates_body() {
        let body = "x".repeat(2000);
        match ExchangeError::http(500, &body) {
            ExchangeError::Http { body, .. } => {
                assert_eq!(body.len(), BODY_EXCERPT_LEN + 3);
                assert!(body.ends_with("..."));
            }
            e => panic!("Expected Http, got: {:?}", e),
        }
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let body = "é".repeat(600);
        let cut = excerpt(&body);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), BODY_EXCERPT_LEN + 3);
    }

    #[test]
    fn test_request_error_display() {
        let err = RequestError::UnexpectedContentType(Some("text/html".into()));
        assert!(err.to_string().contains("text/html"));

        let err = RequestError::UnexpectedContentType(None);
        assert!(err.to_string().contains("<none>"));

        assert!(RequestError::Http(404).to_string().contains("404"));
    }

    #[test]
    fn test_request_error_classification() {
        assert!(RequestError::Http(401).requires_reauth());
        assert!(!RequestError::Http(403).requires_reauth());
        assert!(RequestError::Http(502).is_retryable());
        assert!(!RequestError::Http(404).is_retryable());
        assert!(RequestError::Timeout.is_retryable());
        assert!(!RequestError::UnexpectedContentType(None).is_retryable());
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::corrupt("alice", "expected value at line 1");
        assert!(err.to_string().contains("alice"));
        assert!(!err.is_retryable());

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StoreError = io.into();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_run_error_delegates() {
        let err = RunError::from(RequestError::Timeout);
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "resource request timed out");

        let err = RunError::from(FlowError::InvalidState);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Missing("client_id");
        assert_eq!(err.to_string(), "missing required field: client_id");

        let err = ConfigError::invalid_url("token_endpoint", "relative URL without a base");
        assert!(err.to_string().contains("token_endpoint"));
    }
}
