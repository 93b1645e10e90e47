//! Bundler and paymaster adapter.
//!
//! [`Bundler`] is the one interface the pipeline talks to. [`RpcBundler`] implements it over
//! JSON-RPC, with sponsorship requests shaped by a [`PaymasterDialect`].

use crate::{
    constants::RECEIPT_POLL_INTERVAL,
    error::{BundlerError, PaymasterError},
    types::UserOperation,
};
use alloy::primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, time::Duration};
use tracing::{debug, trace};

mod dialect;
pub use dialect::PaymasterDialect;

mod rpc;
pub use rpc::RpcBundler;

/// Gas limits returned by `eth_estimateUserOperationGas`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationGasEstimate {
    /// `preVerificationGas`.
    pub pre_verification_gas: U256,
    /// `verificationGasLimit`.
    pub verification_gas_limit: U256,
    /// `callGasLimit`.
    pub call_gas_limit: U256,
}

impl UserOperationGasEstimate {
    /// Writes the limits into `op`.
    pub fn apply(&self, op: &mut UserOperation) {
        op.pre_verification_gas = self.pre_verification_gas;
        op.verification_gas_limit = self.verification_gas_limit;
        op.call_gas_limit = self.call_gas_limit;
    }
}

/// A paymaster's answer to a sponsorship request.
///
/// Some paymasters re-estimate gas and fees with their own validation in place; those values
/// replace the operation's when present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sponsorship {
    /// Paymaster address followed by its data.
    pub paymaster_and_data: Bytes,
    /// Replacement `preVerificationGas`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_verification_gas: Option<U256>,
    /// Replacement `verificationGasLimit`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_gas_limit: Option<U256>,
    /// Replacement `callGasLimit`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_gas_limit: Option<U256>,
    /// Replacement `maxFeePerGas`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    /// Replacement `maxPriorityFeePerGas`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
}

impl Sponsorship {
    /// Writes the paymaster data and any replacement values into `op`.
    pub fn apply(&self, op: &mut UserOperation) {
        op.paymaster_and_data = self.paymaster_and_data.clone();
        if let Some(gas) = self.pre_verification_gas {
            op.pre_verification_gas = gas;
        }
        if let Some(gas) = self.verification_gas_limit {
            op.verification_gas_limit = gas;
        }
        if let Some(gas) = self.call_gas_limit {
            op.call_gas_limit = gas;
        }
        if let Some(fee) = self.max_fee_per_gas {
            op.max_fee_per_gas = fee;
        }
        if let Some(fee) = self.max_priority_fee_per_gas {
            op.max_priority_fee_per_gas = fee;
        }
    }

    /// The paymaster address, if the data is long enough to carry one.
    pub fn paymaster(&self) -> Option<Address> {
        (self.paymaster_and_data.len() >= 20)
            .then(|| Address::from_slice(&self.paymaster_and_data[..20]))
    }
}

/// The transaction that included a user operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludedTransaction {
    /// The bundle transaction hash.
    pub transaction_hash: B256,
    /// The block hash.
    pub block_hash: B256,
    /// The block number.
    #[serde(with = "alloy::serde::quantity")]
    pub block_number: u64,
}

/// The result of `eth_getUserOperationReceipt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    /// The user operation hash.
    pub user_op_hash: B256,
    /// The EntryPoint that executed it.
    pub entry_point: Address,
    /// The smart account.
    pub sender: Address,
    /// The nonce used.
    pub nonce: U256,
    /// The paymaster, if sponsored.
    #[serde(default)]
    pub paymaster: Option<Address>,
    /// The gas cost paid by the sender or paymaster.
    pub actual_gas_cost: U256,
    /// The gas used.
    pub actual_gas_used: U256,
    /// Whether the account call succeeded.
    pub success: bool,
    /// Revert reason when unsuccessful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The bundle transaction.
    pub receipt: IncludedTransaction,
}

/// A bundler, optionally with a paymaster behind it.
#[async_trait::async_trait]
pub trait Bundler: Debug + Send + Sync {
    /// The EntryPoint this bundler submits to.
    fn entry_point(&self) -> Address;

    /// Submits a signed user operation and returns its hash.
    async fn send_user_operation(&self, op: &UserOperation) -> Result<B256, BundlerError>;

    /// Estimates the gas limits of `op`.
    async fn estimate_user_operation_gas(
        &self,
        op: &UserOperation,
    ) -> Result<UserOperationGasEstimate, BundlerError>;

    /// Asks the paymaster to sponsor `op`.
    ///
    /// Must happen before signing: `paymasterAndData` is part of the signed hash.
    async fn sponsor_user_operation(
        &self,
        op: &UserOperation,
    ) -> Result<Sponsorship, PaymasterError>;

    /// Returns the receipt of a user operation, `None` while pending.
    async fn get_user_operation_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<UserOperationReceipt>, BundlerError>;

    /// Polls for the receipt of `hash` until `timeout`.
    async fn wait_for(
        &self,
        hash: B256,
        timeout: Duration,
    ) -> Result<UserOperationReceipt, BundlerError> {
        poll_receipt(self, hash, timeout, RECEIPT_POLL_INTERVAL).await
    }
}

/// Polls `bundler` every `interval` until a receipt shows up or `timeout` elapses.
///
/// "Receipt not found" answers keep polling, every other error is returned immediately. A
/// receipt of a reverted operation is returned as [`BundlerError::Reverted`].
pub async fn poll_receipt<B: Bundler + ?Sized>(
    bundler: &B,
    hash: B256,
    timeout: Duration,
    interval: Duration,
) -> Result<UserOperationReceipt, BundlerError> {
    let poll = async {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match bundler.get_user_operation_receipt(hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => trace!(%hash, "Receipt pending"),
                Err(err) if err.is_receipt_not_found() => trace!(%hash, "Receipt not found yet"),
                Err(err) => return Err(err),
            }
        }
    };

    let receipt = tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| BundlerError::Timeout { hash, timeout })??;

    if !receipt.success {
        return Err(BundlerError::Reverted {
            hash,
            reason: receipt.reason.clone().unwrap_or_else(|| "unknown".to_string()),
        });
    }
    debug!(%hash, tx = %receipt.receipt.transaction_hash, "User operation included");
    Ok(receipt)
}
