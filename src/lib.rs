/// oauth2client - Native OAuth2 Authorization Code Flow Client
///
/// Builds the authorization URL, verifies the redirect, exchanges the code
/// for tokens, persists the credential, and makes bearer-authenticated
/// requests with it.

pub mod config;
pub mod core;
pub mod oauth;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
