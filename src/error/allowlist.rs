use alloy::primitives::{Address, ChainId};
use thiserror::Error;

/// Errors returned by the trusted contract allowlist.
///
/// Always fatal and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllowlistError {
    /// The address is absent from the allowlist of the chain.
    #[error("contract {address} is not in the trusted whitelist for chain {chain_id}")]
    Untrusted {
        /// The chain the call targets.
        chain_id: ChainId,
        /// The target contract.
        address: Address,
    },
    /// An allowlist entry is invalid.
    #[error("invalid allowlist entry {name} on chain {chain_id}: {reason}")]
    InvalidEntry {
        /// The chain of the entry.
        chain_id: ChainId,
        /// The entry name.
        name: String,
        /// Why it is invalid.
        reason: &'static str,
    },
}
