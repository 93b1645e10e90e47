/// Errors returned by [`crate::storage::KeyValueStore`] backings and the credential store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A (de)serialization error occurred.
    #[error("a deserialization error occurred")]
    SerdeError(#[from] serde_json::Error),
    /// The backing file could not be accessed.
    #[error("storage io error")]
    Io(#[from] std::io::Error),
    /// No credential is stored under this id.
    #[error("credential {0} not found")]
    CredentialNotFound(String),
    /// A stored value is structurally invalid.
    #[error("corrupt storage entry {key}: {reason}")]
    Corrupt {
        /// The key of the entry.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
    /// An internal error occurred.
    #[error("an internal error occurred")]
    InternalError(#[from] eyre::Error),
}
