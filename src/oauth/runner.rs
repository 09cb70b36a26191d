//! Background execution of the authorization pipeline.
//!
//! [`FlowRunner`] runs `handle_callback -> get_json` on a spawned tokio task
//! and reports progress over an unbounded `mpsc` channel, so a front end can
//! stay responsive while the network calls run. Events for one run are sent
//! in pipeline order and each run ends with exactly one terminal event.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};

use super::auth::AuthorizationFlow;
use super::client::AuthenticatedClient;
use super::error::{FlowError, RunError};
use super::exchange::TokenExchange;
use super::storage::CredentialStore;
use super::token::Credential;

/// Progress reported by a run.
#[derive(Debug)]
pub enum FlowEvent {
    /// The URI was not a redirect for this client. Terminal.
    Ignored,
    /// The credential was exchanged and stored.
    Authorized(Credential),
    /// The protected resource answered; carries the body verbatim. Terminal.
    ResourceLoaded(String),
    /// A step failed. Terminal.
    Failed(RunError),
}

impl FlowEvent {
    /// Check whether no further event follows this one in its run.
    ///
    /// `Authorized` is terminal only when the runner has no resource URL.
    #[must_use]
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Authorized(_))
    }
}

/// Runs authorization steps off the caller's task.
pub struct FlowRunner<E: TokenExchange, S: CredentialStore> {
    flow: Arc<AuthorizationFlow<E, S>>,
    client: AuthenticatedClient,
    resource_url: Option<String>,
    event_tx: mpsc::UnboundedSender<FlowEvent>,
}

impl<E, S> FlowRunner<E, S>
where
    E: TokenExchange + 'static,
    S: CredentialStore + 'static,
{
    /// Create a runner reporting to `event_tx`.
    ///
    /// When `resource_url` is `None` a run stops after `Authorized`.
    pub fn new(
        flow: Arc<AuthorizationFlow<E, S>>,
        client: AuthenticatedClient,
        resource_url: Option<String>,
        event_tx: mpsc::UnboundedSender<FlowEvent>,
    ) -> Self {
        Self {
            flow,
            client,
            resource_url,
            event_tx,
        }
    }

    /// Shared flow controller.
    pub fn flow(&self) -> &Arc<AuthorizationFlow<E, S>> {
        &self.flow
    }

    /// Handle a redirected URI, then fetch the resource with the new credential.
    pub fn spawn_callback(&self, uri: String) -> JoinHandle<()> {
        let flow = Arc::clone(&self.flow);
        let client = self.client.clone();
        let resource_url = self.resource_url.clone();
        let tx = self.event_tx.clone();

        tokio::spawn(
            async move {
                let credential = match flow.handle_callback(&uri).await {
                    Ok(credential) => credential,
                    Err(FlowError::Ignored) => {
                        send(&tx, FlowEvent::Ignored);
                        return;
                    }
                    Err(err) => {
                        send(&tx, FlowEvent::Failed(err.into()));
                        return;
                    }
                };

                send(&tx, FlowEvent::Authorized(credential.clone()));

                if let Some(url) = resource_url {
                    send(&tx, fetch(&client, &credential, &url).await);
                }
            }
            .in_current_span(),
        )
    }

    /// Fetch the resource with an existing credential.
    ///
    /// Uses `url`, or the runner's resource URL when `url` is `None`. Sends
    /// nothing if neither is set.
    pub fn spawn_fetch(&self, credential: Credential, url: Option<String>) -> JoinHandle<()> {
        let client = self.client.clone();
        let url = url.or_else(|| self.resource_url.clone());
        let tx = self.event_tx.clone();

        tokio::spawn(
            async move {
                match url {
                    Some(url) => send(&tx, fetch(&client, &credential, &url).await),
                    None => debug!("No resource URL configured; nothing to fetch"),
                }
            }
            .in_current_span(),
        )
    }
}

async fn fetch(client: &AuthenticatedClient, credential: &Credential, url: &str) -> FlowEvent {
    match client.get_json(credential, url).await {
        Ok(body) => FlowEvent::ResourceLoaded(body),
        Err(err) => FlowEvent::Failed(err.into()),
    }
}

fn send(tx: &mpsc::UnboundedSender<FlowEvent>, event: FlowEvent) {
    if tx.send(event).is_err() {
        debug!("Event receiver dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::auth::ClientConfig;
    use crate::oauth::error::{ExchangeError, RequestError};
    use crate::oauth::exchange::TokenResponse;
    use crate::oauth::storage::MemoryCredentialStore;
    use crate::oauth::transport::HttpTransport;
    use async_trait::async_trait;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticExchange;

    #[async_trait]
    impl TokenExchange for StaticExchange {
        async fn exchange(&self, _: &str, _: &str) -> Result<TokenResponse, ExchangeError> {
            Ok(serde_json::from_value(serde_json::json!({ "access_token": "at-9" })).unwrap())
        }
    }

    fn runner(
        resource_url: Option<String>,
    ) -> (
        FlowRunner<StaticExchange, MemoryCredentialStore>,
        mpsc::UnboundedReceiver<FlowEvent>,
    ) {
        let config = ClientConfig::builder()
            .client_id("client")
            .authorization_endpoint("https://auth.example/authorize")
            .token_endpoint("https://auth.example/token")
            .redirect_uri("https://app.example/callback")
            .build()
            .unwrap();
        let flow = Arc::new(AuthorizationFlow::new(
            Arc::new(config),
            StaticExchange,
            MemoryCredentialStore::new(),
            "alice",
        ));
        let client =
            AuthenticatedClient::new(HttpTransport::new(Duration::from_secs(5), "test").unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        (FlowRunner::new(flow, client, resource_url, tx), rx)
    }

    fn state_of(url: &str) -> String {
        url::Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn test_events_in_pipeline_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", "Bearer at-9"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"ok":true}"#, "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let (runner, mut rx) = runner(Some(format!("{}/me", server.uri())));
        let state = state_of(&runner.flow().begin_authorization());

        runner
            .spawn_callback(format!("https://app.example/callback?state={state}&code=X"))
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            FlowEvent::Authorized(cred) => assert_eq!(cred.access_token, "at-9"),
            e => panic!("Expected Authorized, got: {:?}", e),
        }
        match rx.recv().await.unwrap() {
            FlowEvent::ResourceLoaded(body) => assert_eq!(body, r#"{"ok":true}"#),
            e => panic!("Expected ResourceLoaded, got: {:?}", e),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_authorized_only_without_resource() {
        let (runner, mut rx) = runner(None);
        let state = state_of(&runner.flow().begin_authorization());

        runner
            .spawn_callback(format!("https://app.example/callback?state={state}&code=X"))
            .await
            .unwrap();

        assert!(matches!(rx.recv().await.unwrap(), FlowEvent::Authorized(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ignored() {
        let (runner, mut rx) = runner(None);
        runner
            .spawn_callback("https://unrelated.example/".into())
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, FlowEvent::Ignored));
        assert!(event.is_final());
    }

    #[tokio::test]
    async fn test_invalid_state_fails() {
        let (runner, mut rx) = runner(None);
        runner.flow().begin_authorization();
        runner
            .spawn_callback("https://app.example/callback?state=bad&code=X".into())
            .await
            .unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            FlowEvent::Failed(RunError::Flow(FlowError::InvalidState))
        ));
    }

    #[tokio::test]
    async fn test_spawn_fetch_reports_request_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<p/>", "text/html"))
            .mount(&server)
            .await;

        let (runner, mut rx) = runner(None);
        runner
            .spawn_fetch(Credential::new("alice", "at"), Some(server.uri()))
            .await
            .unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            FlowEvent::Failed(RunError::Request(RequestError::UnexpectedContentType(_)))
        ));
    }

    #[tokio::test]
    async fn test_spawn_fetch_without_url_sends_nothing() {
        let (runner, mut rx) = runner(None);
        runner
            .spawn_fetch(Credential::new("alice", "at"), None)
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }
}
