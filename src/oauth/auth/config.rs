//! Client registration settings for the authorization code flow.
//!
//! # Example
//!
//! ```rust
//! use oauth2client::oauth::auth::ClientConfig;
//!
//! let config = ClientConfig::builder()
//!     .client_id("my-client-id")
//!     .client_secret("my-secret")
//!     .authorization_endpoint("https://auth.example/authorize")
//!     .token_endpoint("https://auth.example/token")
//!     .redirect_uri("https://app.example/callback")
//!     .scopes(["openid", "profile"])
//!     .build()
//!     .unwrap();
//! assert_eq!(config.scopes.len(), 2);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::oauth::error::ConfigError;

/// Where the client credentials go in the token request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// `client_id` and `client_secret` as form fields.
    #[default]
    RequestBody,
    /// HTTP Basic authentication header.
    Basic,
}

/// OAuth 2.0 client configuration.
///
/// Loaded once at startup and never mutated.
#[derive(Clone)]
pub struct ClientConfig {
    /// Public client identifier.
    pub client_id: String,

    /// Client secret. Public clients may have none.
    pub client_secret: Option<String>,

    /// Where the user is sent to grant authorization.
    pub authorization_endpoint: Url,

    /// Where authorization codes are exchanged for tokens.
    pub token_endpoint: Url,

    /// Registered redirect target.
    pub redirect_uri: Url,

    /// Requested scopes, in order.
    pub scopes: Vec<String>,

    /// Client authentication placement for the token request.
    pub auth_method: ClientAuthMethod,
}

impl ClientConfig {
    /// Create a new config builder.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("authorization_endpoint", &self.authorization_endpoint.as_str())
            .field("token_endpoint", &self.token_endpoint.as_str())
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("scopes", &self.scopes)
            .field("auth_method", &self.auth_method)
            .finish()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    client_id: Option<String>,
    client_secret: Option<String>,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    redirect_uri: Option<String>,
    scopes: Vec<String>,
    auth_method: ClientAuthMethod,
}

impl ClientConfigBuilder {
    /// Set the client ID.
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the client secret.
    #[must_use]
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Set the authorization endpoint.
    #[must_use]
    pub fn authorization_endpoint(mut self, url: impl Into<String>) -> Self {
        self.authorization_endpoint = Some(url.into());
        self
    }

    /// Set the token endpoint.
    #[must_use]
    pub fn token_endpoint(mut self, url: impl Into<String>) -> Self {
        self.token_endpoint = Some(url.into());
        self
    }

    /// Set the redirect URI.
    #[must_use]
    pub fn redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Set the OAuth scopes.
    #[must_use]
    pub fn scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the client authentication method.
    #[must_use]
    pub fn auth_method(mut self, method: ClientAuthMethod) -> Self {
        self.auth_method = method;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required field is missing or empty, if a
    /// URL does not parse, or if a URL carries a fragment.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let client_id = self
            .client_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(ConfigError::Missing("client_id"))?;

        let authorization_endpoint =
            parse_url("authorization_endpoint", self.authorization_endpoint)?;
        let token_endpoint = parse_url("token_endpoint", self.token_endpoint)?;
        let redirect_uri = parse_url("redirect_uri", self.redirect_uri)?;

        if self.scopes.iter().any(|s| s.trim().is_empty() || s.contains(' ')) {
            return Err(ConfigError::invalid_value(
                "scopes",
                "scopes must be non-empty and contain no spaces",
            ));
        }

        Ok(ClientConfig {
            client_id,
            client_secret: self.client_secret.filter(|s| !s.is_empty()),
            authorization_endpoint,
            token_endpoint,
            redirect_uri,
            scopes: self.scopes,
            auth_method: self.auth_method,
        })
    }
}

fn parse_url(field: &'static str, value: Option<String>) -> Result<Url, ConfigError> {
    let raw = value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(field))?;
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::invalid_url(field, e))?;
    if url.fragment().is_some() {
        return Err(ConfigError::invalid_url(field, "URL must not contain a fragment"));
    }
    Ok(url)
}
