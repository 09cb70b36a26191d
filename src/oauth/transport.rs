//! Shared HTTP transport.
//!
//! One [`HttpTransport`] is built at startup and cloned into every component
//! that talks to the network. Cloning shares the underlying connection pool.

use std::time::Duration;

use tracing::debug;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = concat!("oauth2client/", env!("CARGO_PKG_VERSION"));

/// HTTP client with a bounded timeout on every request.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Build a transport with the given timeout and user agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        debug!(timeout_secs = timeout.as_secs_f64(), "Built HTTP transport");
        Ok(Self { client, timeout })
    }

    /// Build a transport with [`DEFAULT_TIMEOUT`] and [`DEFAULT_USER_AGENT`].
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn with_defaults() -> Result<Self, reqwest::Error> {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_USER_AGENT)
    }

    /// Underlying client.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Configured per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
