use alloy::primitives::{Address, FixedBytes};
use thiserror::Error;

/// Errors raised locally while assembling a user operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The sender is not deployed and no initCode was produced.
    #[error("sender {0} is not deployed and initCode is empty")]
    MissingInitCode(Address),
    /// The initCode does not start with the configured factory.
    #[error("initCode targets {found}, expected factory {expected}")]
    InitCodeFactoryMismatch {
        /// The configured factory.
        expected: Address,
        /// The address at the head of the initCode.
        found: Address,
    },
    /// The initCode is shorter than an address.
    #[error("initCode too short: {0} bytes")]
    InitCodeTooShort(usize),
    /// The encoded calldata does not start with the expected account selector.
    #[error("calldata selector mismatch: expected {expected}, found {found}")]
    SelectorMismatch {
        /// The expected selector.
        expected: FixedBytes<4>,
        /// The selector found.
        found: FixedBytes<4>,
    },
    /// No calls were given.
    #[error("no calls to execute")]
    NoCalls,
}
