//! Authorization URL construction.

use super::config::ClientConfig;

/// One authorization attempt: the client settings plus a fresh state.
///
/// Built per attempt and discarded once the URL string exists.
#[derive(Debug)]
pub struct AuthorizationRequest<'a> {
    config: &'a ClientConfig,
    state: &'a str,
}

impl<'a> AuthorizationRequest<'a> {
    /// Pair `config` with the state issued for this attempt.
    #[must_use]
    pub fn new(config: &'a ClientConfig, state: &'a str) -> Self {
        Self { config, state }
    }

    /// Render the authorization URL.
    ///
    /// Parameters are appended in a fixed order, each value percent-encoded
    /// with only RFC 3986 unreserved characters left as is. An endpoint that
    /// already has a query string is extended with `&`.
    #[must_use]
    pub fn url(&self) -> String {
        let endpoint = self.config.authorization_endpoint.as_str();
        let separator = if self.config.authorization_endpoint.query().is_some() {
            '&'
        } else {
            '?'
        };
        let scopes = self.config.scopes.join(" ");

        format!(
            "{}{}response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            endpoint,
            separator,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(self.config.redirect_uri.as_str()),
            urlencoding::encode(&scopes),
            urlencoding::encode(self.state),
        )
    }
}
