//! Authorization code to token exchange.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument, warn};

use super::auth::{ClientAuthMethod, ClientConfig};
use super::error::{excerpt, ExchangeError};
use super::token::{Credential, DEFAULT_TOKEN_TYPE};
use super::transport::HttpTransport;

/// Successful token endpoint response.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,

    /// Refresh token, if issued.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Access token lifetime in seconds.
    #[serde(default, deserialize_with = "deserialize_seconds")]
    pub expires_in: Option<i64>,

    /// Token type, `Bearer` when the server omits it.
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

/// `application/x-www-form-urlencoded` encoding of a Basic auth credential
/// part (RFC 6749 section 2.3.1).
fn form_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Accept `expires_in` as a number or a numeric string.
fn deserialize_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Int(i64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<Seconds>::deserialize(deserializer)? {
        Some(Seconds::Int(n)) => Some(n),
        Some(Seconds::Float(f)) => Some(f as i64),
        Some(Seconds::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

impl TokenResponse {
    /// Convert into the credential stored for `user_id`.
    ///
    /// `expires_in` is turned into an absolute timestamp at this point.
    #[must_use]
    pub fn into_credential(self, user_id: impl Into<String>) -> Credential {
        let mut credential = Credential::new(user_id, self.access_token);
        credential.token_type = self.token_type;
        credential.refresh_token = self.refresh_token;
        match self.expires_in {
            Some(secs) => credential.expiring_in(secs),
            None => credential,
        }
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Standard OAuth error body.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Exchanges an authorization code for tokens.
///
/// The flow controller depends on this trait so tests can substitute the
/// transport.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Perform exactly one exchange request. No retries.
    async fn exchange(&self, code: &str, redirect_uri: &str)
        -> Result<TokenResponse, ExchangeError>;
}

#[async_trait]
impl<T: TokenExchange + ?Sized> TokenExchange for Arc<T> {
    async fn exchange(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, ExchangeError> {
        (**self).exchange(code, redirect_uri).await
    }
}

/// Token endpoint client over HTTP.
#[derive(Debug, Clone)]
pub struct TokenExchangeClient {
    config: Arc<ClientConfig>,
    transport: HttpTransport,
}

impl TokenExchangeClient {
    /// Create a client posting to `config.token_endpoint`.
    pub fn new(config: Arc<ClientConfig>, transport: HttpTransport) -> Self {
        Self { config, transport }
    }
}

#[async_trait]
impl TokenExchange for TokenExchangeClient {
    #[instrument(skip(self, code), fields(endpoint = %self.config.token_endpoint))]
    async fn exchange(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, ExchangeError> {
        debug!("Exchanging authorization code for tokens");

        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let mut request = self
            .transport
            .client()
            .post(self.config.token_endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json");

        match self.config.auth_method {
            ClientAuthMethod::RequestBody => {
                form.push(("client_id", self.config.client_id.as_str()));
                if let Some(secret) = self.config.client_secret.as_deref() {
                    form.push(("client_secret", secret));
                }
            }
            ClientAuthMethod::Basic => {
                request = request.basic_auth(
                    form_encode(&self.config.client_id),
                    self.config.client_secret.as_deref().map(form_encode),
                );
            }
        }

        let response = request.form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => body,
            };
            warn!(status = status.as_u16(), "Token exchange rejected");
            return Err(ExchangeError::http(status.as_u16(), message));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ExchangeError::malformed(status.as_u16(), format!("{e}; body: {}", excerpt(&body)))
        })?;

        if token.access_token.is_empty() {
            return Err(ExchangeError::malformed(status.as_u16(), "empty access_token"));
        }

        debug!(
            token_type = %token.token_type,
            has_refresh = token.refresh_token.is_some(),
            expires_in = ?token.expires_in,
            "Token exchange succeeded"
        );
        Ok(token)
    }
}
