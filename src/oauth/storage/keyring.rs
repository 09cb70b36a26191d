//! System keyring credential storage (feature-gated).
//!
//! Uses the platform credential store:
//! - macOS: Keychain
//! - Linux: Secret Service (GNOME Keyring, KWallet)
//! - Windows: Credential Manager
//!
//! Enable with the `keyring` feature.

use std::sync::OnceLock;

use async_trait::async_trait;
use keyring::Entry;
use tracing::instrument;

use super::{validate_user_id, CredentialStore};
use crate::oauth::error::StoreError;
use crate::oauth::token::Credential;

/// Default keyring service name.
const SERVICE_NAME: &str = "oauth2client";

static KEYRING_AVAILABLE: OnceLock<bool> = OnceLock::new();

/// Keyring-based credential storage.
///
/// Each user is one keyring entry: the service is fixed and the account is
/// the user identifier. The credential is stored as JSON in the password.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringCredentialStore {
    /// Create a store under the default service name.
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Create a store under a custom service name.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Check once whether a keyring backend answers at all.
    pub fn is_available() -> bool {
        *KEYRING_AVAILABLE.get_or_init(|| {
            match Entry::new("oauth2client-probe", "availability-check") {
                Ok(entry) => !matches!(
                    entry.get_password(),
                    Err(keyring::Error::NoStorageAccess(_)) | Err(keyring::Error::PlatformFailure(_))
                ),
                Err(_) => false,
            }
        })
    }

    /// Service name used for entries.
    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, user_id: &str) -> Result<Entry, StoreError> {
        validate_user_id(user_id)?;
        Ok(Entry::new(&self.service, user_id)?)
    }
}

/// Run a blocking keyring call off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Keyring(format!("keyring task failed: {e}")))
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    #[instrument(skip(self, credential), fields(backend = "keyring"))]
    async fn put(&self, user_id: &str, credential: &Credential) -> Result<(), StoreError> {
        let entry = self.entry(user_id)?;
        let json =
            serde_json::to_string(credential).map_err(|e| StoreError::corrupt(user_id, e))?;

        blocking(move || entry.set_password(&json)).await??;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "keyring"))]
    async fn get(&self, user_id: &str) -> Result<Option<Credential>, StoreError> {
        let entry = self.entry(user_id)?;

        match blocking(move || entry.get_password()).await? {
            Ok(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StoreError::corrupt(user_id, e)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(backend = "keyring"))]
    async fn remove(&self, user_id: &str) -> Result<(), StoreError> {
        let entry = self.entry(user_id)?;

        match blocking(move || entry.delete_password()).await? {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        "keyring"
    }
}
