//! Wallet constants.

use alloy::primitives::{Address, FixedBytes, U256, address, fixed_bytes, uint};
use std::time::Duration;

/// The ERC-4337 v0.6 EntryPoint singleton.
///
/// Deployed at the same address on every supported chain.
pub const ENTRYPOINT_V06: Address = address!("0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

/// Selector of `execute(address,uint256,bytes)` on the smart account.
///
/// Bundlers reject operations whose calldata does not start with a known account entry function,
/// so every encoded call is checked against this before leaving the process.
pub const EXECUTE_SELECTOR: FixedBytes<4> = fixed_bytes!("0xb61d27f6");

/// Selector of `executeBatch(address[],uint256[],bytes[])` on the smart account.
pub const EXECUTE_BATCH_SELECTOR: FixedBytes<4> = fixed_bytes!("0x47e1da2a");

/// Owner index used in the signature wrapper.
///
/// A freshly initialized account has exactly one owner, the passkey it was created with.
pub const FIRST_OWNER_INDEX: U256 = uint!(0_U256);

/// Fallback `callGasLimit` used when the bundler cannot estimate.
pub const DEFAULT_CALL_GAS_LIMIT: u64 = 200_000;

/// Fallback `verificationGasLimit` used when the bundler cannot estimate.
///
/// P-256 verification is expensive without the RIP-7212 precompile, and the first operation also
/// pays for the account deployment.
pub const DEFAULT_VERIFICATION_GAS_LIMIT: u64 = 800_000;

/// Fallback `preVerificationGas` used when the bundler cannot estimate.
pub const DEFAULT_PRE_VERIFICATION_GAS: u64 = 100_000;

/// Safety margin applied to the fallback `callGasLimit`, in percent.
pub const CALL_GAS_MARGIN_PERCENT: u64 = 20;

/// Safety margin applied to the fallback `verificationGasLimit`, in percent.
pub const VERIFICATION_GAS_MARGIN_PERCENT: u64 = 30;

/// Safety margin applied to the fallback `preVerificationGas`, in percent.
pub const PRE_VERIFICATION_GAS_MARGIN_PERCENT: u64 = 15;

/// Interval between two `eth_getUserOperationReceipt` polls.
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default time to wait for a user operation receipt.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Upper bound for a single WebAuthn ceremony.
pub const WEBAUTHN_TIMEOUT: Duration = Duration::from_secs(60);

/// COSE algorithm identifier for ES256 (ECDSA w/ SHA-256 on P-256).
pub const COSE_ALG_ES256: i64 = -7;

/// COSE algorithm identifier for RS256, requested as a fallback only.
pub const COSE_ALG_RS256: i64 = -257;

/// Storage key of the legacy credential id entry.
pub const LEGACY_CREDENTIAL_ID_KEY: &str = "passkey_credential_id";

/// Storage key of the legacy public key entry, a JSON object `{x, y}`.
pub const LEGACY_PUBLIC_KEY_KEY: &str = "passkey_public_key";

/// Capacity of the credential event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The Base Mainnet chain ID.
pub const BASE_MAINNET_CHAIN_ID: u64 = 8453;

/// The public Base Mainnet RPC URL.
///
/// This endpoint is rate-limited.
/// See also <https://docs.base.org/chain/network-information>
pub const BASE_MAINNET_PUBLIC_RPC_URL: &str = "https://mainnet.base.org";
