//! # OAuth 2.0 Authorization Code Flow
//!
//! Native client side of the authorization code grant.
//!
//! ## Core Types
//!
//! - [`Credential`] - Token material stored per user
//! - [`FlowError`] and friends - Error taxonomy, one enum per component
//!
//! ## Components
//!
//! - [`auth::AuthorizationFlow`] - Builds the authorization URL and handles the redirect
//! - [`callback::CallbackInterpreter`] - Parses redirect URIs
//! - [`exchange::TokenExchangeClient`] - Redeems authorization codes
//! - [`storage::CredentialStore`] - Persists credentials (file, memory, keyring)
//! - [`client::AuthenticatedClient`] - Bearer-signed resource requests
//! - [`runner::FlowRunner`] - Runs the pipeline on a task and reports events
//! - [`callback_server::CallbackServer`] - Loopback listener for `http://127.0.0.1` redirects
//!
//! ## Security
//!
//! - The callback state must match an issued, unexpired, unused token
//! - Secrets are redacted from `Debug` output and never logged
//! - File storage uses 0600 permissions on Unix
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use oauth2client::oauth::{
//!     auth::{AuthorizationFlow, ClientConfig},
//!     exchange::TokenExchangeClient,
//!     storage::FileCredentialStore,
//!     transport::HttpTransport,
//! };
//!
//! let config = Arc::new(ClientConfig::builder() /* ... */ .build()?);
//! let transport = HttpTransport::with_defaults()?;
//! let exchange = TokenExchangeClient::new(config.clone(), transport.clone());
//! let flow = AuthorizationFlow::new(config, exchange, FileCredentialStore::app_data()?, "default");
//!
//! let url = flow.begin_authorization();
//! // ... user consents, browser is redirected ...
//! let credential = flow.handle_callback(&redirected_uri).await?;
//! ```

pub mod auth;
pub mod callback;
pub mod callback_server;
pub mod client;
pub mod error;
pub mod exchange;
pub mod runner;
pub mod storage;
pub mod token;
pub mod transport;

pub use auth::{AuthorizationFlow, ClientAuthMethod, ClientConfig};
pub use callback::{CallbackInterpreter, CallbackResult};
pub use client::AuthenticatedClient;
pub use error::{ConfigError, ExchangeError, FlowError, RequestError, RunError, StoreError};
pub use exchange::{TokenExchange, TokenExchangeClient, TokenResponse};
pub use runner::{FlowEvent, FlowRunner};
pub use storage::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use token::Credential;
pub use transport::HttpTransport;

#[cfg(feature = "keyring")]
pub use storage::KeyringCredentialStore;
