//! Credential storage.
//!
//! Persistence goes through the [`KeyValueStore`] capability so the platform backing (a file, a
//! browser store, memory in tests) is injected once at startup.

mod file;
pub use file::FileStore;

mod memory;
pub use memory::InMemoryStore;

mod credential;
pub use credential::{CredentialEvent, CredentialStore};

use crate::error::StorageError;
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

/// Type alias for `Result<T, StorageError>`
pub type Result<T> = core::result::Result<T, StorageError>;

/// A string key-value store.
#[async_trait]
pub trait KeyValueStore: Debug + Send + Sync {
    /// Reads the value under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Lists all keys starting with `prefix`.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key).await
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).keys(prefix).await
    }
}
