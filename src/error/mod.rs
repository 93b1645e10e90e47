//! Wallet error types.
use alloy::transports::TransportErrorKind;
use thiserror::Error;

mod allowlist;
pub use allowlist::AllowlistError;

mod build;
pub use build::BuildError;

mod bundler;
pub use bundler::{BundlerError, PaymasterError};

mod credential;
pub use credential::CredentialError;

mod signature;
pub use signature::{AddressMismatchError, KeyError, SignatureFormatError};

mod storage;
pub use storage::StorageError;

/// The overarching error type returned by the wallet pipeline.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Errors related to the biometric credential.
    #[error(transparent)]
    Credential(#[from] CredentialError),
    /// A DER signature could not be parsed.
    #[error(transparent)]
    SignatureFormat(#[from] SignatureFormatError),
    /// A public key could not be extracted.
    #[error(transparent)]
    Key(#[from] KeyError),
    /// The locally computed account address diverged from the factory.
    #[error(transparent)]
    AddressMismatch(#[from] AddressMismatchError),
    /// The user operation could not be built.
    #[error(transparent)]
    Build(#[from] BuildError),
    /// The bundler failed or rejected the operation.
    #[error(transparent)]
    Bundler(#[from] BundlerError),
    /// The paymaster failed.
    ///
    /// The pipeline never surfaces this, it only appears when sponsorship is requested directly.
    #[error(transparent)]
    Paymaster(#[from] PaymasterError),
    /// The target contract is not trusted.
    #[error(transparent)]
    Allowlist(#[from] AllowlistError),
    /// Errors related to credential storage.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// An error occurred during ABI encoding/decoding.
    #[error(transparent)]
    AbiError(#[from] alloy::sol_types::Error),
    /// An error occurred talking to the chain RPC.
    #[error(transparent)]
    RpcError(#[from] alloy::transports::RpcError<TransportErrorKind>),
    /// An internal error occurred.
    #[error(transparent)]
    InternalError(#[from] eyre::Error),
}

impl WalletError {
    /// Whether restarting the whole pipeline may succeed.
    ///
    /// Encoding and consistency errors are structural and never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Credential(err) => err.is_retryable(),
            Self::Bundler(err) => err.is_retryable(),
            Self::RpcError(_) => true,
            Self::SignatureFormat(_)
            | Self::Key(_)
            | Self::AddressMismatch(_)
            | Self::Build(_)
            | Self::Paymaster(_)
            | Self::Allowlist(_)
            | Self::Storage(_)
            | Self::AbiError(_)
            | Self::InternalError(_) => false,
        }
    }

    /// A message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Credential(CredentialError::Cancelled) => {
                "Authentication was cancelled. Try again when you are ready.".to_string()
            }
            Self::Credential(CredentialError::Timeout(_)) => {
                "Authentication timed out. Please try again.".to_string()
            }
            Self::Allowlist(err) => format!("Blocked: {err}"),
            Self::SignatureFormat(_) | Self::Key(_) | Self::AddressMismatch(_) => {
                "The signature could not be produced safely. This action has been stopped."
                    .to_string()
            }
            err if err.is_retryable() => format!("{err}. Please try again."),
            err => err.to_string(),
        }
    }
}
