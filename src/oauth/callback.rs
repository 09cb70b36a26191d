//! Redirect callback interpretation.
//!
//! Turns the URI the browser was redirected to into a [`CallbackResult`]. The
//! interpreter only parses; state verification belongs to the flow
//! controller.

use url::Url;

/// Outcome of interpreting a URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResult {
    /// The redirect carried an authorization code.
    Success {
        /// The `state` parameter, if the server echoed one.
        state: Option<String>,
        /// The authorization code.
        code: String,
    },
    /// The redirect reported a failure.
    Error {
        /// The `error` value plus `error_description` when given.
        reason: String,
    },
    /// The URI is not addressed to this client's redirect target.
    NotACallback,
}

/// Reason reported when a matching redirect has neither `code` nor `error`.
pub const MISSING_CODE_REASON: &str = "missing authorization code";

/// Matches URIs against the configured redirect target.
#[derive(Debug, Clone)]
pub struct CallbackInterpreter {
    redirect: Url,
}

impl CallbackInterpreter {
    /// Create an interpreter for `redirect_uri`.
    #[must_use]
    pub fn new(redirect_uri: Url) -> Self {
        Self {
            redirect: redirect_uri,
        }
    }

    /// Redirect target this interpreter accepts.
    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect
    }

    /// Check whether `uri` targets the redirect: same scheme, host, port
    /// (after scheme defaults) and path.
    #[must_use]
    pub fn matches(&self, uri: &Url) -> bool {
        uri.scheme() == self.redirect.scheme()
            && uri.host() == self.redirect.host()
            && uri.port_or_known_default() == self.redirect.port_or_known_default()
            && uri.path() == self.redirect.path()
    }

    /// Interpret `uri`. Never panics, whatever the input.
    #[must_use]
    pub fn interpret(&self, uri: &str) -> CallbackResult {
        let Ok(parsed) = Url::parse(uri.trim()) else {
            return CallbackResult::NotACallback;
        };
        if !self.matches(&parsed) {
            return CallbackResult::NotACallback;
        }

        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut error_description = None;

        for (key, value) in parsed.query_pairs() {
            let slot = match key.as_ref() {
                "code" => &mut code,
                "state" => &mut state,
                "error" => &mut error,
                "error_description" => &mut error_description,
                _ => continue,
            };
            if slot.is_none() && !value.is_empty() {
                *slot = Some(value.into_owned());
            }
        }

        if let Some(error) = error {
            let reason = match error_description {
                Some(description) => format!("{error}: {description}"),
                None => error,
            };
            return CallbackResult::Error { reason };
        }

        match code {
            Some(code) => CallbackResult::Success { state, code },
            None => CallbackResult::Error {
                reason: MISSING_CODE_REASON.to_string(),
            },
        }
    }
}
