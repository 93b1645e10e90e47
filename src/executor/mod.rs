//! Executor: Build, Sponsor, Sign, Submit, Wait.
//!
//! From the caller's view an execution either yields a receipt or fails without side effects up
//! to submission. In particular nothing is sent to the bundler when the user declines the
//! biometric prompt.

use crate::{
    allowlist::Allowlist,
    builder::UserOperationBuilder,
    bundler::UserOperationReceipt,
    constants::DEFAULT_RECEIPT_TIMEOUT,
    error::WalletError,
    signers::PayloadSigner,
    types::{Call, OwnerBytes, UserOperation},
};
use alloy::{
    primitives::{Address, B256, ChainId, U256},
    providers::Provider,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, instrument, warn};

mod middleware;
pub use middleware::{ExecutionContext, Middleware, Stage, TracingMiddleware};

/// When to ask the paymaster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorshipPolicy {
    /// Request sponsorship at all.
    pub enabled: bool,
    /// Request sponsorship for operations that deploy the account.
    ///
    /// Some paymasters cannot sponsor a combined deploy and execute operation.
    pub sponsor_deployments: bool,
}

impl SponsorshipPolicy {
    /// Whether `op` should be sent to the paymaster.
    pub fn applies_to(&self, op: &UserOperation) -> bool {
        self.enabled && (self.sponsor_deployments || !op.is_deployment())
    }
}

/// A completed execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// The hash returned by the bundler.
    pub user_op_hash: B256,
    /// The operation as submitted.
    pub user_operation: UserOperation,
    /// The inclusion receipt.
    pub receipt: UserOperationReceipt,
}

/// Runs calls through the user operation pipeline for one passkey-owned account.
#[derive(Debug, Clone)]
pub struct Executor<P> {
    builder: UserOperationBuilder<P>,
    signer: Arc<dyn PayloadSigner>,
    allowlist: Arc<Allowlist>,
    owner: OwnerBytes,
    salt: U256,
    chain_id: ChainId,
    sponsorship: SponsorshipPolicy,
    receipt_timeout: Duration,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl<P: Provider + Clone> Executor<P> {
    /// Creates an executor for the account of `owner` at `salt`.
    pub fn new(
        builder: UserOperationBuilder<P>,
        signer: Arc<dyn PayloadSigner>,
        allowlist: Arc<Allowlist>,
        owner: OwnerBytes,
        chain_id: ChainId,
    ) -> Self {
        Self {
            builder,
            signer,
            allowlist,
            owner,
            salt: U256::ZERO,
            chain_id,
            sponsorship: SponsorshipPolicy::default(),
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            middleware: Vec::new(),
        }
    }

    /// Sets the account salt.
    pub fn with_salt(mut self, salt: U256) -> Self {
        self.salt = salt;
        self
    }

    /// Sets the sponsorship policy.
    pub fn with_sponsorship(mut self, sponsorship: SponsorshipPolicy) -> Self {
        self.sponsorship = sponsorship;
        self
    }

    /// Sets how long to wait for inclusion.
    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    /// Adds a middleware. Middleware run in insertion order.
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// The smart account address.
    pub fn sender(&self) -> Address {
        self.builder.factory().get_address(&self.owner, self.salt)
    }

    /// Executes `calls` and waits for inclusion.
    #[instrument(skip_all, fields(chain_id = self.chain_id, calls = calls.len()))]
    pub async fn execute(&self, calls: &[Call]) -> Result<Execution, WalletError> {
        let ctx = ExecutionContext { chain_id: self.chain_id, sender: self.sender(), calls };

        for middleware in &self.middleware {
            if let Err(err) = middleware.before(&ctx).await {
                warn!(?middleware, %err, "Middleware before hook failed");
            }
        }

        let result = self.run(&ctx).await;

        let outcome = result.as_ref().map(|execution| &execution.receipt);
        for middleware in &self.middleware {
            if let Err(err) = middleware.after(&ctx, outcome).await {
                warn!(?middleware, %err, "Middleware after hook failed");
            }
        }

        result
    }

    async fn run(&self, ctx: &ExecutionContext<'_>) -> Result<Execution, WalletError> {
        for call in ctx.calls {
            self.allowlist.assert_trusted(self.chain_id, call.target, None)?;
        }

        let mut op = self.builder.build(&self.owner, self.salt, ctx.calls).await?;
        self.stage(ctx, Stage::Built, &op).await;

        if self.sponsorship.applies_to(&op) {
            match self.builder.bundler().sponsor_user_operation(&op).await {
                Ok(sponsorship) => {
                    sponsorship.apply(&mut op);
                    debug!(paymaster = ?sponsorship.paymaster(), "Operation sponsored");
                    self.stage(ctx, Stage::Sponsored, &op).await;
                }
                Err(err) => warn!(%err, "Sponsorship unavailable, sender pays gas"),
            }
        } else if self.sponsorship.enabled {
            debug!("Skipping sponsorship for deployment");
        }

        let entry_point = self.builder.bundler().entry_point();
        let hash = op.hash(entry_point, self.chain_id);
        op.signature = self.signer.sign_payload_hash(hash).await?;
        self.stage(ctx, Stage::Signed, &op).await;

        let user_op_hash = self.builder.bundler().send_user_operation(&op).await?;
        if user_op_hash != hash {
            warn!(%user_op_hash, local = %hash, "Bundler returned a different operation hash");
        }
        info!(%user_op_hash, sender = %op.sender, nonce = %op.nonce, "User operation submitted");
        self.stage(ctx, Stage::Submitted(user_op_hash), &op).await;

        let receipt = self.builder.bundler().wait_for(user_op_hash, self.receipt_timeout).await?;
        info!(
            %user_op_hash,
            tx = %receipt.receipt.transaction_hash,
            block = receipt.receipt.block_number,
            "User operation included"
        );

        Ok(Execution { user_op_hash, user_operation: op, receipt })
    }

    async fn stage(&self, ctx: &ExecutionContext<'_>, stage: Stage, op: &UserOperation) {
        for middleware in &self.middleware {
            if let Err(err) = middleware.on_stage(ctx, stage, op).await {
                warn!(?middleware, ?stage, %err, "Middleware stage hook failed");
            }
        }
    }
}
