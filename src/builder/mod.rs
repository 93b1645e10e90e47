//! UserOperation builder.
//!
//! Assembles an unsigned v0.6 user operation for a passkey-owned account: sender, deployment,
//! nonce, calldata, fees and gas, in that order.

use crate::{
    account::{AccountFactory, SmartAccount, encode_calls, split_init_code},
    bundler::Bundler,
    error::{BuildError, WalletError},
    provider::ProviderExt,
    signers::dummy_signature,
    types::{Call, OwnerBytes, UserOperation},
};
use alloy::{
    primitives::{Address, U256},
    providers::Provider,
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

mod gas;
pub use gas::{GasPolicy, with_margin};

/// Builds unsigned user operations.
///
/// The built operation carries a dummy signature so it can be estimated and sponsored as is.
#[derive(Debug, Clone)]
pub struct UserOperationBuilder<P> {
    factory: AccountFactory<P>,
    provider: P,
    bundler: Arc<dyn Bundler>,
    gas: GasPolicy,
}

impl<P: Provider + Clone> UserOperationBuilder<P> {
    /// Creates a builder.
    pub fn new(factory: AccountFactory<P>, provider: P, bundler: Arc<dyn Bundler>) -> Self {
        Self { factory, provider, bundler, gas: GasPolicy::default() }
    }

    /// Sets the gas fallback policy.
    pub fn with_gas_policy(mut self, gas: GasPolicy) -> Self {
        self.gas = gas;
        self
    }

    /// The account factory.
    pub const fn factory(&self) -> &AccountFactory<P> {
        &self.factory
    }

    /// The bundler used for estimation.
    pub fn bundler(&self) -> &Arc<dyn Bundler> {
        &self.bundler
    }

    /// Builds the operation executing `calls` from the account of `owner` at `salt`.
    #[instrument(skip_all, fields(salt = %salt, calls = calls.len()))]
    pub async fn build(
        &self,
        owner: &OwnerBytes,
        salt: U256,
        calls: &[Call],
    ) -> Result<UserOperation, WalletError> {
        let sender = self.factory.get_address(owner, salt);
        let account = SmartAccount::new(sender, self.provider.clone());

        let deployed = account.is_deployed().await?;
        let init_code =
            if deployed { Default::default() } else { self.factory.init_code(owner, salt) };
        validate_init_code(self.factory.address(), sender, deployed, &init_code)?;
        debug!(%sender, deployed, "Resolved sender");

        let nonce = if deployed { account.deployed_nonce().await? } else { U256::ZERO };
        let call_data = encode_calls(calls)?;
        let fees = self.provider.fee_data().await?;

        let mut op = UserOperation {
            sender,
            nonce,
            init_code,
            call_data,
            max_fee_per_gas: U256::from(fees.max_fee_per_gas),
            max_priority_fee_per_gas: U256::from(fees.max_priority_fee_per_gas),
            signature: dummy_signature(),
            ..Default::default()
        };

        let estimate = match self.bundler.estimate_user_operation_gas(&op).await {
            Ok(estimate) => estimate,
            Err(err) => {
                warn!(%sender, %err, "Gas estimation failed, using fallback limits");
                self.gas.fallback()
            }
        };
        estimate.apply(&mut op);

        debug!(
            %sender,
            %nonce,
            call_gas_limit = %op.call_gas_limit,
            verification_gas_limit = %op.verification_gas_limit,
            "Built user operation"
        );
        Ok(op)
    }
}

/// Checks the initCode of an operation from `sender`.
///
/// An undeployed sender needs initCode that starts with `factory`. A deployed sender passes as is.
pub fn validate_init_code(
    factory: Address,
    sender: Address,
    deployed: bool,
    init_code: &[u8],
) -> Result<(), BuildError> {
    if deployed {
        return Ok(());
    }
    if init_code.is_empty() {
        return Err(BuildError::MissingInitCode(sender));
    }
    let (head, _) =
        split_init_code(init_code).ok_or(BuildError::InitCodeTooShort(init_code.len()))?;
    if head != factory {
        return Err(BuildError::InitCodeFactoryMismatch { expected: factory, found: head });
    }
    Ok(())
}
