//! Credential persistence backends.
//!
//! - [`FileCredentialStore`] - One JSON file per user with owner-only permissions
//! - [`MemoryCredentialStore`] - In-memory storage for tests and ephemeral sessions
//! - [`KeyringCredentialStore`] - System keyring storage (requires `keyring` feature)
//!
//! Every operation is keyed by the user identifier, never by token value.
//! Records for different users are independent; writes for the same user are
//! last-write-wins.
//!
//! # Security
//!
//! - Token values are never logged (`#[instrument(skip(credential))]`)
//! - All implementations are thread-safe (`Send + Sync`)

mod file;
mod memory;

#[cfg(feature = "keyring")]
mod keyring;

use async_trait::async_trait;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;

#[cfg(feature = "keyring")]
pub use keyring::KeyringCredentialStore;

use super::error::StoreError;
use super::token::Credential;

/// Trait for credential storage backends.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Store a credential, replacing any existing record for `user_id`.
    ///
    /// Idempotent: storing the same credential twice leaves one record.
    async fn put(&self, user_id: &str, credential: &Credential) -> Result<(), StoreError>;

    /// Load the credential for `user_id`.
    ///
    /// Returns `Ok(None)` when nothing was stored; never fabricates a default.
    async fn get(&self, user_id: &str) -> Result<Option<Credential>, StoreError>;

    /// Remove the credential for `user_id`.
    ///
    /// Returns `Ok(())` even if nothing was stored.
    async fn remove(&self, user_id: &str) -> Result<(), StoreError>;

    /// Check if a credential exists for `user_id`.
    async fn exists(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.get(user_id).await?.is_some())
    }

    /// Name of this backend, for logging.
    fn name(&self) -> &str {
        "unknown"
    }
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for std::sync::Arc<T> {
    async fn put(&self, user_id: &str, credential: &Credential) -> Result<(), StoreError> {
        (**self).put(user_id, credential).await
    }

    async fn get(&self, user_id: &str) -> Result<Option<Credential>, StoreError> {
        (**self).get(user_id).await
    }

    async fn remove(&self, user_id: &str) -> Result<(), StoreError> {
        (**self).remove(user_id).await
    }

    async fn exists(&self, user_id: &str) -> Result<bool, StoreError> {
        (**self).exists(user_id).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for Box<T> {
    async fn put(&self, user_id: &str, credential: &Credential) -> Result<(), StoreError> {
        (**self).put(user_id, credential).await
    }

    async fn get(&self, user_id: &str) -> Result<Option<Credential>, StoreError> {
        (**self).get(user_id).await
    }

    async fn remove(&self, user_id: &str) -> Result<(), StoreError> {
        (**self).remove(user_id).await
    }

    async fn exists(&self, user_id: &str) -> Result<bool, StoreError> {
        (**self).exists(user_id).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Reject identifiers that cannot serve as a store key.
pub(crate) fn validate_user_id(user_id: &str) -> Result<(), StoreError> {
    if user_id.trim().is_empty() {
        return Err(StoreError::InvalidKey("user id must not be empty".into()));
    }
    Ok(())
}
