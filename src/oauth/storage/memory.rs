//! In-memory credential storage for tests and ephemeral sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::instrument;

use super::{validate_user_id, CredentialStore};
use crate::oauth::error::StoreError;
use crate::oauth::token::Credential;

/// In-memory credential storage.
///
/// Clones share the same map, so a store handed to the flow controller can be
/// inspected from a test.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    inner: Arc<RwLock<HashMap<String, Credential>>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with one credential, keyed by its `user_id`.
    pub fn with_credential(credential: Credential) -> Self {
        let mut map = HashMap::new();
        map.insert(credential.user_id.clone(), credential);
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    /// Number of stored credentials.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store holds no credentials.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Remove every credential.
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    #[instrument(skip(self, credential))]
    async fn put(&self, user_id: &str, credential: &Credential) -> Result<(), StoreError> {
        validate_user_id(user_id)?;
        self.inner
            .write()
            .await
            .insert(user_id.to_string(), credential.clone());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, user_id: &str) -> Result<Option<Credential>, StoreError> {
        validate_user_id(user_id)?;
        Ok(self.inner.read().await.get(user_id).cloned())
    }

    #[instrument(skip(self))]
    async fn remove(&self, user_id: &str) -> Result<(), StoreError> {
        validate_user_id(user_id)?;
        self.inner.write().await.remove(user_id);
        Ok(())
    }

    async fn exists(&self, user_id: &str) -> Result<bool, StoreError> {
        validate_user_id(user_id)?;
        Ok(self.inner.read().await.contains_key(user_id))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = MemoryCredentialStore::new();
        assert!(store.get("nobody").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryCredentialStore::new();
        store.put("alice", &Credential::new("alice", "first")).await.unwrap();
        store.put("alice", &Credential::new("alice", "second")).await.unwrap();

        assert_eq!(store.len().await, 1);
        let loaded = store.get("alice").await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "second");
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let store = MemoryCredentialStore::new();
        store.put("alice", &Credential::new("alice", "a")).await.unwrap();
        store.put("bob", &Credential::new("bob", "b")).await.unwrap();

        store.remove("alice").await.unwrap();
        assert!(!store.exists("alice").await.unwrap());
        assert_eq!(store.get("bob").await.unwrap().unwrap().access_token, "b");
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryCredentialStore::with_credential(Credential::new("alice", "a"));
        let other = store.clone();
        other.clear().await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let store = MemoryCredentialStore::new();
        let err = store.put("", &Credential::new("", "a")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }
}
