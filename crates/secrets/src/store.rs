//! The credential store boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use model::Secret;

/// Failure reported by a [`CredentialStore`] implementation.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// A stored SSH key row.
#[derive(Clone, Debug)]
pub struct StoredSshKey {
    /// Private key, encrypted unless `is_encrypted` is false.
    pub private_key_data: Secret,
    /// Key passphrase, encrypted under the same rule.
    pub passphrase: Option<Secret>,
    /// Whether the fields above are cipher payloads.
    pub is_encrypted: bool,
}

/// Read access to stored SSH keys.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetches the key with `id`, or `None` when no such key exists.
    async fn ssh_key(&self, id: &str) -> Result<Option<StoredSshKey>, StoreError>;
}

/// A fixed in-memory store, for embedding callers and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryCredentialStore {
    keys: HashMap<String, StoredSshKey>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the key stored under `id`.
    #[must_use]
    pub fn with_key(mut self, id: impl Into<String>, key: StoredSshKey) -> Self {
        self.keys.insert(id.into(), key);
        self
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn ssh_key(&self, id: &str) -> Result<Option<StoredSshKey>, StoreError> {
        Ok(self.keys.get(id).cloned())
    }
}
