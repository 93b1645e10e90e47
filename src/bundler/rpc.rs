use super::{
    Bundler, PaymasterDialect, Sponsorship, UserOperationGasEstimate, UserOperationReceipt,
    dialect::SponsorRequest, poll_receipt,
};
use crate::{
    constants::RECEIPT_POLL_INTERVAL,
    error::{BundlerError, PaymasterError},
    provider::http_client,
    types::UserOperation,
};
use alloy::{
    primitives::{Address, B256},
    rpc::client::RpcClient,
    transports::{RpcError, TransportErrorKind},
};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// A [`Bundler`] reached over JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcBundler {
    client: RpcClient,
    entry_point: Address,
    chain_id: u64,
    dialect: PaymasterDialect,
    policy_id: Option<String>,
    poll_interval: Duration,
}

impl RpcBundler {
    /// Creates a bundler client for `url` with retries.
    pub fn new(url: Url, entry_point: Address, chain_id: u64) -> Self {
        Self::with_client(http_client(url), entry_point, chain_id)
    }

    /// Creates a bundler over an existing client.
    pub fn with_client(client: RpcClient, entry_point: Address, chain_id: u64) -> Self {
        Self {
            client,
            entry_point,
            chain_id,
            dialect: PaymasterDialect::None,
            policy_id: None,
            poll_interval: RECEIPT_POLL_INTERVAL,
        }
    }

    /// Sets the paymaster dialect.
    pub fn with_dialect(mut self, dialect: PaymasterDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Sets the sponsorship policy id sent to the paymaster.
    pub fn with_policy_id(mut self, policy_id: Option<String>) -> Self {
        self.policy_id = policy_id;
        self
    }

    /// Sets the receipt polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The paymaster dialect.
    pub const fn dialect(&self) -> PaymasterDialect {
        self.dialect
    }

    /// The sponsorship policy id.
    pub fn policy_id(&self) -> Option<&str> {
        self.policy_id.as_deref()
    }

    /// The chain the bundler serves.
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

fn bundler_error(method: &'static str, err: RpcError<TransportErrorKind>) -> BundlerError {
    match err {
        RpcError::ErrorResp(payload) => BundlerError::Rejected {
            method,
            code: payload.code,
            message: payload.message.to_string(),
        },
        err => BundlerError::Rpc(err),
    }
}

impl RpcBundler {
    async fn sponsor_request(
        &self,
        request: SponsorRequest,
    ) -> Result<Sponsorship, PaymasterError> {
        let sponsorship: Sponsorship = self
            .client
            .request(request.method, request.params)
            .await
            .map_err(paymaster_error)?;
        if sponsorship.paymaster_and_data.is_empty() {
            return Err(PaymasterError::Empty);
        }
        Ok(sponsorship)
    }
}

fn paymaster_error(err: RpcError<TransportErrorKind>) -> PaymasterError {
    match err {
        RpcError::ErrorResp(payload) => {
            PaymasterError::Rejected { code: payload.code, message: payload.message.to_string() }
        }
        err => PaymasterError::Unavailable(err),
    }
}

#[async_trait::async_trait]
impl Bundler for RpcBundler {
    fn entry_point(&self) -> Address {
        self.entry_point
    }

    async fn send_user_operation(&self, op: &UserOperation) -> Result<B256, BundlerError> {
        const METHOD: &str = "eth_sendUserOperation";
        let hash: B256 = self
            .client
            .request(METHOD, (op.clone(), self.entry_point))
            .await
            .map_err(|err| bundler_error(METHOD, err))?;
        debug!(%hash, sender = %op.sender, "Submitted user operation");
        Ok(hash)
    }

    async fn estimate_user_operation_gas(
        &self,
        op: &UserOperation,
    ) -> Result<UserOperationGasEstimate, BundlerError> {
        const METHOD: &str = "eth_estimateUserOperationGas";
        self.client
            .request(METHOD, (op.clone(), self.entry_point))
            .await
            .map_err(|err| bundler_error(METHOD, err))
    }

    async fn sponsor_user_operation(
        &self,
        op: &UserOperation,
    ) -> Result<Sponsorship, PaymasterError> {
        let policy_id = self.policy_id.as_deref();
        let request = self
            .dialect
            .request(op, self.entry_point, self.chain_id, policy_id)
            .ok_or(PaymasterError::Unsupported(self.dialect))?;
        let first = self.sponsor_request(request).await?;
        if !self.dialect.has_follow_up() {
            return Ok(first);
        }

        // v0.6 charges paymaster validation to verificationGasLimit
        let mut stubbed = op.clone();
        first.apply(&mut stubbed);
        if first.verification_gas_limit.is_none() {
            self.estimate_user_operation_gas(&stubbed)
                .await
                .map_err(PaymasterError::Estimation)?
                .apply(&mut stubbed);
            debug!(
                verification_gas_limit = %stubbed.verification_gas_limit,
                "Re-estimated with paymaster stub"
            );
        }

        let request = self
            .dialect
            .follow_up(&stubbed, self.entry_point, self.chain_id, policy_id)
            .ok_or(PaymasterError::Unsupported(self.dialect))?;
        let data = self.sponsor_request(request).await?;
        Ok(Sponsorship {
            paymaster_and_data: data.paymaster_and_data,
            pre_verification_gas: data
                .pre_verification_gas
                .or(Some(stubbed.pre_verification_gas)),
            verification_gas_limit: data
                .verification_gas_limit
                .or(Some(stubbed.verification_gas_limit)),
            call_gas_limit: data.call_gas_limit.or(Some(stubbed.call_gas_limit)),
            max_fee_per_gas: data.max_fee_per_gas.or(first.max_fee_per_gas),
            max_priority_fee_per_gas: data
                .max_priority_fee_per_gas
                .or(first.max_priority_fee_per_gas),
        })
    }

    async fn get_user_operation_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<UserOperationReceipt>, BundlerError> {
        const METHOD: &str = "eth_getUserOperationReceipt";
        self.client.request(METHOD, (hash,)).await.map_err(|err| bundler_error(METHOD, err))
    }

    #[instrument(skip(self), fields(entry_point = %self.entry_point))]
    async fn wait_for(
        &self,
        hash: B256,
        timeout: Duration,
    ) -> Result<UserOperationReceipt, BundlerError> {
        let result = poll_receipt(self, hash, timeout, self.poll_interval).await;
        if let Err(err) = &result {
            warn!(%hash, %err, "Waiting for user operation failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ENTRYPOINT_V06;
    use alloy::{
        primitives::{Bytes, U256, bytes},
        rpc::json_rpc::ErrorPayload,
        transports::mock::Asserter,
    };
    use serde_json::json;

    fn bundler(asserter: &Asserter, dialect: PaymasterDialect) -> RpcBundler {
        RpcBundler::with_client(RpcClient::mocked(asserter.clone()), ENTRYPOINT_V06, 8453)
            .with_dialect(dialect)
    }

    #[tokio::test]
    async fn send_returns_hash() {
        let asserter = Asserter::new();
        asserter.push_success(&B256::repeat_byte(7));
        let bundler = bundler(&asserter, PaymasterDialect::None);
        let hash = bundler.send_user_operation(&Default::default()).await;
        assert_eq!(hash.unwrap(), B256::repeat_byte(7));
    }

    #[tokio::test]
    async fn rejection_keeps_code_and_message() {
        let asserter = Asserter::new();
        asserter.push_failure(ErrorPayload {
            code: -32500,
            message: "AA21 didn't pay prefund".into(),
            data: None,
        });
        let err = bundler(&asserter, PaymasterDialect::None)
            .send_user_operation(&Default::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BundlerError::Rejected { method: "eth_sendUserOperation", code: -32500, ref message }
                if message.contains("AA21")
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn estimate_parses_quantities() {
        let asserter = Asserter::new();
        asserter.push_success(&json!({
            "preVerificationGas": "0xc350",
            "verificationGasLimit": "0x61a80",
            "callGasLimit": "0x2710"
        }));
        let estimate = bundler(&asserter, PaymasterDialect::None)
            .estimate_user_operation_gas(&Default::default())
            .await
            .unwrap();
        assert_eq!(estimate.pre_verification_gas, U256::from(50_000));
        assert_eq!(estimate.verification_gas_limit, U256::from(400_000));
        assert_eq!(estimate.call_gas_limit, U256::from(10_000));
    }

    #[tokio::test]
    async fn no_dialect_is_unsupported() {
        let asserter = Asserter::new();
        let err = bundler(&asserter, PaymasterDialect::None)
            .sponsor_user_operation(&Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymasterError::Unsupported(PaymasterDialect::None)));
    }

    #[tokio::test]
    async fn erc7677_data_request_carries_stub() {
        let asserter = Asserter::new();
        // stub, re-estimate with the stub applied, data
        asserter.push_success(&json!({ "paymasterAndData": "0x1111" }));
        asserter.push_success(&json!({
            "preVerificationGas": "0xc350",
            "verificationGasLimit": "0x7a120",
            "callGasLimit": "0x2710"
        }));
        asserter.push_success(&json!({ "paymasterAndData": "0x2222" }));

        let sponsorship = bundler(&asserter, PaymasterDialect::Erc7677)
            .sponsor_user_operation(&Default::default())
            .await
            .unwrap();
        assert_eq!(sponsorship.paymaster_and_data, bytes!("0x2222"));
        assert_eq!(sponsorship.verification_gas_limit, Some(U256::from(500_000)));
        assert_eq!(sponsorship.call_gas_limit, Some(U256::from(10_000)));
    }

    #[tokio::test]
    async fn erc7677_stub_gas_skips_estimation() {
        let asserter = Asserter::new();
        asserter.push_success(&json!({
            "paymasterAndData": "0x1111",
            "verificationGasLimit": "0x10"
        }));
        asserter.push_success(&json!({ "paymasterAndData": "0x2222" }));

        let sponsorship = bundler(&asserter, PaymasterDialect::Erc7677)
            .sponsor_user_operation(&Default::default())
            .await
            .unwrap();
        assert_eq!(sponsorship.paymaster_and_data, bytes!("0x2222"));
        assert_eq!(sponsorship.verification_gas_limit, Some(U256::from(16)));
    }

    #[tokio::test]
    async fn erc7677_failed_estimation_is_a_paymaster_error() {
        let asserter = Asserter::new();
        asserter.push_success(&json!({ "paymasterAndData": "0x1111" }));
        asserter.push_failure_msg("AA33 reverted");

        let err = bundler(&asserter, PaymasterDialect::Erc7677)
            .sponsor_user_operation(&Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymasterError::Estimation(_)));
    }

    #[tokio::test]
    async fn empty_or_rejected_sponsorship() {
        let asserter = Asserter::new();
        asserter.push_success(&json!({ "paymasterAndData": "0x" }));
        let err = bundler(&asserter, PaymasterDialect::Pimlico)
            .sponsor_user_operation(&Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymasterError::Empty));

        asserter.push_failure_msg("policy exhausted");
        let err = bundler(&asserter, PaymasterDialect::Pimlico)
            .sponsor_user_operation(&Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymasterError::Rejected { .. }));
    }

    #[tokio::test]
    async fn pending_receipt_is_none() {
        let asserter = Asserter::new();
        asserter.push_success(&Option::<Bytes>::None);
        let receipt = bundler(&asserter, PaymasterDialect::None)
            .get_user_operation_receipt(B256::ZERO)
            .await
            .unwrap();
        assert!(receipt.is_none());
    }
}
