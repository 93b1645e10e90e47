use std::time::Duration;
use thiserror::Error;

/// Errors related to the biometric credential and the WebAuthn ceremonies.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The user dismissed the biometric prompt.
    #[error("authentication was cancelled")]
    Cancelled,
    /// The ceremony did not complete in time.
    #[error("authentication timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    /// The platform has no usable authenticator.
    #[error("webauthn not supported: {0}")]
    NotSupported(String),
    /// A credential is already registered.
    ///
    /// Creating a second one would orphan the wallet derived from the first.
    #[error("a credential is already registered: {0}")]
    AlreadyExists(String),
    /// The authenticator refused to create a credential.
    #[error("credential creation failed: {0}")]
    CreationFailed(String),
    /// No credential is registered.
    #[error("no credential registered")]
    NotFound,
    /// The assertion does not sign what was asked.
    #[error("invalid assertion: {0}")]
    InvalidAssertion(String),
    /// The assertion belongs to another credential.
    #[error("assertion returned for credential {got}, expected {expected}")]
    CredentialMismatch {
        /// The credential that was asked for.
        expected: String,
        /// The credential that answered.
        got: String,
    },
}

impl CredentialError {
    /// Whether the user may retry the ceremony.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout(_))
    }
}
