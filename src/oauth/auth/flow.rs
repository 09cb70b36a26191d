//! Authorization flow controller.
//!
//! [`AuthorizationFlow`] sequences one authorization attempt:
//!
//! - Building the authorization URL with a fresh anti-forgery state
//! - Verifying and consuming the state carried by the redirect
//! - Exchanging the code for tokens
//! - Persisting the resulting credential
//!
//! # Example
//!
//! ```rust,ignore
//! use oauth2client::oauth::auth::AuthorizationFlow;
//! use oauth2client::oauth::storage::MemoryCredentialStore;
//!
//! let flow = AuthorizationFlow::new(config, exchange, MemoryCredentialStore::new(), "default");
//!
//! let url = flow.begin_authorization();
//! println!("Open: {}", url);
//!
//! // After the browser is redirected back
//! let credential = flow.handle_callback(&redirected_uri).await?;
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::config::ClientConfig;
use super::request::AuthorizationRequest;
use super::state::{generate_state, PendingAuthorizations};
use crate::oauth::callback::{CallbackInterpreter, CallbackResult};
use crate::oauth::error::{FlowError, StoreError};
use crate::oauth::exchange::TokenExchange;
use crate::oauth::storage::CredentialStore;
use crate::oauth::token::Credential;

/// Authorization code flow orchestrator.
///
/// Generic over the token exchange and the credential store so either can be
/// substituted. `Send + Sync` whenever both are, so it can be shared through
/// an `Arc` with the task that receives the redirect.
pub struct AuthorizationFlow<E: TokenExchange, S: CredentialStore> {
    config: Arc<ClientConfig>,
    interpreter: CallbackInterpreter,
    exchange: E,
    store: S,
    user_id: String,
    pending: Mutex<PendingAuthorizations>,
}

impl<E: TokenExchange, S: CredentialStore> AuthorizationFlow<E, S> {
    /// Create a flow that stores credentials under `user_id`.
    pub fn new(config: Arc<ClientConfig>, exchange: E, store: S, user_id: impl Into<String>) -> Self {
        let interpreter = CallbackInterpreter::new(config.redirect_uri.clone());
        Self {
            config,
            interpreter,
            exchange,
            store,
            user_id: user_id.into(),
            pending: Mutex::new(PendingAuthorizations::default()),
        }
    }

    /// Set how long an issued state stays acceptable.
    #[must_use]
    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.pending = Mutex::new(PendingAuthorizations::new(ttl));
        self
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Credential store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Key under which credentials are stored.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Callback interpreter bound to the configured redirect URI.
    pub fn interpreter(&self) -> &CallbackInterpreter {
        &self.interpreter
    }

    fn pending(&self) -> MutexGuard<'_, PendingAuthorizations> {
        // The guarded map holds no invariant a panicking holder could break.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start an authorization attempt and return the URL to open.
    ///
    /// Issues a fresh state and records it as the only pending expectation,
    /// replacing any earlier attempt. No network call is made.
    #[instrument(skip(self))]
    pub fn begin_authorization(&self) -> String {
        let state = generate_state();
        let url = AuthorizationRequest::new(&self.config, &state).url();

        self.pending().begin(state);

        info!(
            endpoint = %self.config.authorization_endpoint,
            "Started authorization attempt"
        );
        url
    }

    /// Complete an attempt from the redirected URI.
    ///
    /// # Errors
    ///
    /// - [`FlowError::Ignored`] if `uri` is not addressed to the redirect target
    /// - [`FlowError::AuthorizationDenied`] if the server reported an error
    /// - [`FlowError::InvalidState`] if the state is absent, unknown, expired
    ///   or already used; no network call is made
    /// - [`FlowError::ExchangeFailed`] if the token endpoint call fails;
    ///   nothing is stored
    /// - [`FlowError::StoreFailed`] if the credential cannot be persisted
    #[instrument(skip(self, uri))]
    pub async fn handle_callback(&self, uri: &str) -> Result<Credential, FlowError> {
        let (state, code) = match self.interpreter.interpret(uri) {
            CallbackResult::NotACallback => {
                debug!("URI is not addressed to the redirect target");
                return Err(FlowError::Ignored);
            }
            CallbackResult::Error { reason } => {
                warn!(reason = %reason, "Authorization server reported an error");
                return Err(FlowError::AuthorizationDenied { reason });
            }
            CallbackResult::Success { state, code } => (state, code),
        };

        let accepted = match state.as_deref() {
            Some(state) => self.pending().consume(state),
            None => false,
        };
        if !accepted {
            warn!(state_present = state.is_some(), "Rejected callback state");
            return Err(FlowError::InvalidState);
        }
        debug!("Callback state verified");

        let token = self
            .exchange
            .exchange(&code, self.config.redirect_uri.as_str())
            .await?;

        let credential = token.into_credential(self.user_id.as_str());
        self.store.put(&self.user_id, &credential).await?;

        info!(
            user_id = %self.user_id,
            backend = self.store.name(),
            "Authorization completed"
        );
        Ok(credential)
    }

    /// Credential already stored for this user, if any.
    pub async fn stored_credential(&self) -> Result<Option<Credential>, StoreError> {
        self.store.get(&self.user_id).await
    }

    /// Forget the stored credential locally. The server is not contacted.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), StoreError> {
        self.store.remove(&self.user_id).await?;
        self.pending().purge_expired();
        info!(user_id = %self.user_id, "Signed out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::error::ExchangeError;
    use crate::oauth::exchange::TokenResponse;
    use crate::oauth::storage::MemoryCredentialStore;
    use async_trait::async_trait;

    /// Exchange double that records every code it is asked to redeem.
    #[derive(Default)]
    struct RecordingExchange {
        calls: Mutex<Vec<(String, String)>>,
        fail_with: Option<u16>,
    }

    impl RecordingExchange {
        fn failing(status: u16) -> Self {
            Self {
                fail_with: Some(status),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TokenExchange for RecordingExchange {
        async fn exchange(
            &self,
            code: &str,
            redirect_uri: &str,
        ) -> Result<TokenResponse, ExchangeError> {
            self.calls
                .lock()
                .unwrap()
                .push((code.to_string(), redirect_uri.to_string()));
            if let Some(status) = self.fail_with {
                return Err(ExchangeError::http(status, "denied"));
            }
            Ok(serde_json::from_value(serde_json::json!({
                "access_token": format!("token-for-{code}"),
                "refresh_token": "rt",
                "expires_in": 3600
            }))
            .unwrap())
        }
    }

    /// Store whose writes always fail.
    struct ReadOnlyStore;

    #[async_trait]
    impl CredentialStore for ReadOnlyStore {
        async fn put(&self, _: &str, _: &Credential) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }

        async fn get(&self, _: &str) -> Result<Option<Credential>, StoreError> {
            Ok(None)
        }

        async fn remove(&self, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn config() -> Arc<ClientConfig> {
        Arc::new(
            ClientConfig::builder()
                .client_id("client")
                .client_secret("secret")
                .authorization_endpoint("https://auth.example/authorize")
                .token_endpoint("https://auth.example/token")
                .redirect_uri("https://app.example/callback")
                .scopes(["profile"])
                .build()
                .unwrap(),
        )
    }

    fn flow() -> AuthorizationFlow<Arc<RecordingExchange>, MemoryCredentialStore> {
        AuthorizationFlow::new(
            config(),
            Arc::new(RecordingExchange::default()),
            MemoryCredentialStore::new(),
            "alice",
        )
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
    async fn test_happy_path() {
        let exchange = Arc::new(RecordingExchange::default());
        let store = MemoryCredentialStore::new();
        let flow = AuthorizationFlow::new(config(), exchange.clone(), store.clone(), "alice");

        let url = flow.begin_authorization();
        let state = state_of(&url);

        let cred = flow
            .handle_callback(&format!("https://app.example/callback?state={state}&code=ABC123"))
            .await
            .unwrap();

        assert_eq!(cred.user_id, "alice");
        assert_eq!(cred.access_token, "token-for-ABC123");
        assert_eq!(
            exchange.calls(),
            vec![("ABC123".to_string(), "https://app.example/callback".to_string())]
        );
        assert_eq!(store.get("alice").await.unwrap(), Some(cred));
    }

    #[tokio::test]
    async fn test_state_mismatch_never_exchanges() {
        let exchange = Arc::new(RecordingExchange::default());
        let store = MemoryCredentialStore::new();
        let flow = AuthorizationFlow::new(config(), exchange.clone(), store.clone(), "alice");
        flow.begin_authorization();

        let err = flow
            .handle_callback("https://app.example/callback?state=forged&code=ABC123")
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::InvalidState));
        assert!(exchange.calls().is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_state_rejected() {
        let flow = flow();
        flow.begin_authorization();

        let err = flow
            .handle_callback("https://app.example/callback?code=ABC123")
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidState));
    }

    #[tokio::test]
    async fn test_callback_without_begin_rejected() {
        let err = flow()
            .handle_callback("https://app.example/callback?state=abc&code=ABC123")
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidState));
    }

    #[tokio::test]
    async fn test_replay_rejected() {
        let flow = flow();
        let state = state_of(&flow.begin_authorization());
        let uri = format!("https://app.example/callback?state={state}&code=ABC123");

        flow.handle_callback(&uri).await.unwrap();
        let err = flow.handle_callback(&uri).await.unwrap_err();
        assert!(matches!(err, FlowError::InvalidState));
    }

    #[tokio::test]
    async fn test_expired_state_rejected() {
        let flow = flow().with_state_ttl(Duration::ZERO);
        let state = state_of(&flow.begin_authorization());

        let err = flow
            .handle_callback(&format!("https://app.example/callback?state={state}&code=A"))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidState));
    }

    #[tokio::test]
    async fn test_new_attempt_supersedes_old_state() {
        let flow = flow();
        let old = state_of(&flow.begin_authorization());
        let new = state_of(&flow.begin_authorization());
        assert_ne!(old, new);

        let err = flow
            .handle_callback(&format!("https://app.example/callback?state={old}&code=A"))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidState));

        flow.handle_callback(&format!("https://app.example/callback?state={new}&code=A"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_foreign_uri_ignored() {
        let flow = flow();
        flow.begin_authorization();
        let err = flow
            .handle_callback("https://elsewhere.example/callback?code=A")
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Ignored));
    }

    #[tokio::test]
    async fn test_denied() {
        let flow = flow();
        flow.begin_authorization();
        let err = flow
            .handle_callback(
                "https://app.example/callback?error=access_denied&error_description=nope",
            )
            .await
            .unwrap_err();
        match err {
            FlowError::AuthorizationDenied { reason } => {
                assert_eq!(reason, "access_denied: nope")
            }
            e => panic!("Expected AuthorizationDenied, got: {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_exchange_failure_stores_nothing() {
        let store = MemoryCredentialStore::new();
        let flow = AuthorizationFlow::new(
            config(),
            RecordingExchange::failing(400),
            store.clone(),
            "alice",
        );
        let state = state_of(&flow.begin_authorization());

        let err = flow
            .handle_callback(&format!("https://app.example/callback?state={state}&code=A"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FlowError::ExchangeFailed(ExchangeError::Http { status: 400, .. })
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let flow = AuthorizationFlow::new(
            config(),
            RecordingExchange::default(),
            ReadOnlyStore,
            "alice",
        );
        let state = state_of(&flow.begin_authorization());

        let err = flow
            .handle_callback(&format!("https://app.example/callback?state={state}&code=A"))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::StoreFailed(StoreError::Io(_))));
    }

    #[tokio::test]
    async fn test_stored_credential_and_sign_out() {
        let store = MemoryCredentialStore::with_credential(Credential::new("alice", "existing"));
        let flow = AuthorizationFlow::new(
            config(),
            RecordingExchange::default(),
            store.clone(),
            "alice",
        );

        let existing = flow.stored_credential().await.unwrap().unwrap();
        assert_eq!(existing.access_token, "existing");

        flow.sign_out().await.unwrap();
        assert!(flow.stored_credential().await.unwrap().is_none());
        // Signing out twice is fine
        flow.sign_out().await.unwrap();
    }
}
