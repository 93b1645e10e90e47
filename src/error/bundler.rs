use crate::bundler::PaymasterDialect;
use alloy::{
    primitives::B256,
    transports::{RpcError, TransportErrorKind},
};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the bundler.
#[derive(Debug, Error)]
pub enum BundlerError {
    /// The bundler could not be reached or answered garbage.
    #[error(transparent)]
    Rpc(#[from] RpcError<TransportErrorKind>),
    /// The bundler rejected the request.
    #[error("bundler rejected {method}: {message} (code {code})")]
    Rejected {
        /// The JSON-RPC method.
        method: &'static str,
        /// The JSON-RPC error code.
        code: i64,
        /// The error message.
        message: String,
    },
    /// No receipt was found in time.
    #[error("no receipt for user operation {hash} after {}s", .timeout.as_secs())]
    Timeout {
        /// The user operation hash.
        hash: B256,
        /// How long we waited.
        timeout: Duration,
    },
    /// The operation was included but reverted.
    #[error("user operation {hash} reverted: {reason}")]
    Reverted {
        /// The user operation hash.
        hash: B256,
        /// The revert reason reported by the bundler, if any.
        reason: String,
    },
}

impl BundlerError {
    /// Whether the error comes from transport rather than from the operation itself.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc(err) => err.is_transport_error(),
            Self::Timeout { .. } => true,
            Self::Rejected { .. } | Self::Reverted { .. } => false,
        }
    }

    /// Whether this is the bundler's way of saying the receipt is not there yet.
    pub fn is_receipt_not_found(&self) -> bool {
        match self {
            Self::Rpc(RpcError::ErrorResp(payload)) => is_not_found_message(&payload.message),
            Self::Rejected { message, .. } => is_not_found_message(message),
            _ => false,
        }
    }
}

fn is_not_found_message(message: &str) -> bool {
    message.to_ascii_lowercase().contains("not found")
}

/// Errors returned by the paymaster.
///
/// These never abort the pipeline: the operation proceeds unsponsored.
#[derive(Debug, Error)]
pub enum PaymasterError {
    /// The paymaster could not be reached.
    #[error("paymaster unavailable: {0}")]
    Unavailable(#[from] RpcError<TransportErrorKind>),
    /// The paymaster refused to sponsor.
    #[error("paymaster rejected sponsorship: {message} (code {code})")]
    Rejected {
        /// The JSON-RPC error code.
        code: i64,
        /// The error message.
        message: String,
    },
    /// The dialect has no sponsorship method.
    #[error("sponsorship not supported by dialect {0}")]
    Unsupported(PaymasterDialect),
    /// The paymaster returned empty `paymasterAndData`.
    #[error("paymaster returned no data")]
    Empty,
    /// Gas could not be estimated with the paymaster stub in place.
    #[error("estimation with paymaster stub failed: {0}")]
    Estimation(#[source] BundlerError),
}
