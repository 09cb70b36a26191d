//! Authorization code flow with state validation.
//!
//! # Architecture
//!
//! ```text
//! +-------------------+     +---------------+     +-----------------+
//! | AuthorizationFlow | --> | TokenExchange | --> | CredentialStore |
//! +-------------------+     +---------------+     +-----------------+
//!        |        |
//!        v        v
//! +-------------+ +-----------------------+
//! | ClientConfig| | PendingAuthorizations |
//! +-------------+ +-----------------------+
//! ```

pub mod config;
pub mod flow;
pub mod request;
pub mod state;

pub use config::{ClientAuthMethod, ClientConfig, ClientConfigBuilder};
pub use flow::AuthorizationFlow;
pub use request::AuthorizationRequest;
pub use state::{generate_state, PendingAuthorizations, DEFAULT_STATE_TTL};
