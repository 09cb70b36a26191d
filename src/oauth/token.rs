//! Credential record persisted after a successful authorization.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token type assumed when the token endpoint does not name one.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Token material stored for one user.
///
/// A credential is replaced wholesale by the store; it is never edited in
/// place. `expires_at` is informational and never drives a refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Store key.
    pub user_id: String,

    /// Bearer token for resource requests.
    pub access_token: String,

    /// Refresh token, when the server issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type reported by the server.
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Unix timestamp when the access token expires, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

impl Credential {
    /// Create a bearer credential with no refresh token or expiry.
    #[must_use]
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_at: None,
        }
    }

    /// Attach a refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Set the expiry from a lifetime in seconds, counted from now.
    #[must_use]
    pub fn expiring_in(mut self, expires_in: i64) -> Self {
        self.expires_at = Some(Utc::now().timestamp().saturating_add(expires_in));
        self
    }

    /// Check if the access token is past its reported expiry.
    ///
    /// A credential without an expiry is never considered expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| Utc::now().timestamp() >= at)
    }

    /// Get expiration as DateTime.
    #[must_use]
    pub fn expires_at_datetime(&self) -> Option<DateTime<Utc>> {
        self.expires_at.and_then(|at| DateTime::from_timestamp(at, 0))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_tokens() {
        let cred = Credential::new("alice", "secret-access").with_refresh_token("secret-refresh");
        let debug = format!("{cred:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_token_type_defaults_to_bearer() {
        let cred: Credential =
            serde_json::from_str(r#"{"user_id":"bob","access_token":"at"}"#).unwrap();
        assert_eq!(cred.token_type, "Bearer");
        assert!(cred.refresh_token.is_none());
        assert!(cred.expires_at.is_none());
    }

    #[test]
    fn test_optional_fields_omitted_when_absent() {
        let json = serde_json::to_string(&Credential::new("bob", "at")).unwrap();
        assert!(!json.contains("refresh_token"));
        assert!(!json.contains("expires_at"));
    }

    #[test]
    fn test_expiry() {
        let cred = Credential::new("u", "at");
        assert!(!cred.is_expired());
        assert!(cred.expires_at_datetime().is_none());

        let cred = Credential::new("u", "at").expiring_in(3600);
        assert!(!cred.is_expired());
        assert!(cred.expires_at_datetime().is_some());

        let cred = Credential::new("u", "at").expiring_in(-10);
        assert!(cred.is_expired());
    }
}
