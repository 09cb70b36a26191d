//! Authenticated resource requests.
//!
//! [`AuthenticatedClient`] signs requests with a stored credential's access
//! token using the bearer scheme. It never refreshes: a 401 comes back as
//! [`RequestError::Http`] and the caller decides whether to authorize again.

use tracing::{debug, instrument, warn};

use super::error::RequestError;
use super::token::Credential;
use super::transport::HttpTransport;

const JSON_CONTENT_TYPE: &str = "application/json";

/// HTTP client that attaches `Authorization: Bearer <access_token>`.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    transport: HttpTransport,
}

impl AuthenticatedClient {
    /// Create a client over the shared transport.
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }

    /// Start a request to `url` with the bearer header already set.
    pub fn request(
        &self,
        method: reqwest::Method,
        credential: &Credential,
        url: &str,
    ) -> reqwest::RequestBuilder {
        self.transport
            .client()
            .request(method, url)
            .bearer_auth(&credential.access_token)
    }

    /// GET `url` and return the JSON body text unmodified.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Http`] for a status outside `[200, 300)`
    /// - [`RequestError::UnexpectedContentType`] unless the response is
    ///   `application/json` (compared case-insensitively, parameters allowed)
    /// - [`RequestError::Timeout`] or [`RequestError::Io`] for transport failures
    #[instrument(skip(self, credential), fields(user_id = %credential.user_id))]
    pub async fn get_json(&self, credential: &Credential, url: &str) -> Result<String, RequestError> {
        let response = self
            .request(reqwest::Method::GET, credential, url)
            .header(reqwest::header::ACCEPT, JSON_CONTENT_TYPE)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Resource request failed");
            return Err(RequestError::Http(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        if !is_json(content_type.as_deref()) {
            warn!(content_type = ?content_type, "Resource returned non-JSON content");
            return Err(RequestError::UnexpectedContentType(content_type));
        }

        let body = response.text().await?;
        debug!(bytes = body.len(), "Resource loaded");
        Ok(body)
    }
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        ct.trim_start()
            .get(..JSON_CONTENT_TYPE.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(JSON_CONTENT_TYPE))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(timeout: Duration) -> AuthenticatedClient {
        AuthenticatedClient::new(HttpTransport::new(timeout, "test").unwrap())
    }

    fn credential() -> Credential {
        Credential::new("alice", "at-123")
    }

    #[tokio::test]
    async fn test_get_json_sends_bearer_and_returns_body() {
        let server = MockServer::start().await;
        let body = r#"{"name":"Alice","id":7}"#;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", "Bearer at-123"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body, "application/json; charset=utf-8"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = client(Duration::from_secs(5))
            .get_json(&credential(), &format!("{}/me", server.uri()))
            .await
            .unwrap();
        assert_eq!(result, body);
    }

    #[rstest]
    #[case(401)]
    #[case(404)]
    #[case(500)]
    #[tokio::test]
    async fn test_get_json_http_status(#[case] status: u16) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(status).set_body_raw("{}", "application/json"),
            )
            .mount(&server)
            .await;

        let err = client(Duration::from_secs(5))
            .get_json(&credential(), &server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Http(s) if s == status));
    }

    #[tokio::test]
    async fn test_get_json_rejects_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"),
            )
            .mount(&server)
            .await;

        let err = client(Duration::from_secs(5))
            .get_json(&credential(), &server.uri())
            .await
            .unwrap_err();
        match err {
            RequestError::UnexpectedContentType(ct) => assert_eq!(ct.as_deref(), Some("text/html")),
            e => panic!("Expected UnexpectedContentType, got: {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_get_json_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("{}", "application/json")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = client(Duration::from_millis(200))
            .get_json(&credential(), &server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Timeout));
    }

    #[rstest]
    #[case(Some("application/json"), true)]
    #[case(Some("Application/JSON; charset=UTF-8"), true)]
    #[case(Some("application/jsonp"), true)]
    #[case(Some("text/html"), false)]
    #[case(Some("application/xml"), false)]
    #[case(Some("json"), false)]
    #[case(None, false)]
    fn test_is_json(#[case] content_type: Option<&str>, #[case] expected: bool) {
        assert_eq!(is_json(content_type), expected);
    }
}
