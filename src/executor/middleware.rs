use crate::{
    bundler::UserOperationReceipt,
    error::WalletError,
    types::{Call, UserOperation},
};
use alloy::primitives::{Address, B256, ChainId};
use std::fmt::Debug;
use tracing::{debug, info, warn};

/// A pipeline stage reported to [`Middleware::on_stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The unsigned operation was assembled.
    Built,
    /// A paymaster agreed to sponsor the operation.
    Sponsored,
    /// The passkey signed the operation.
    Signed,
    /// The bundler accepted the operation under this hash.
    Submitted(B256),
}

/// What a middleware sees of an execution.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    /// The chain the operation runs on.
    pub chain_id: ChainId,
    /// The smart account.
    pub sender: Address,
    /// The requested calls.
    pub calls: &'a [Call],
}

/// Observes executions.
///
/// Hooks cannot change the pipeline. A hook error is logged and the execution carries on.
#[async_trait::async_trait]
pub trait Middleware: Debug + Send + Sync {
    /// Called before anything else happens.
    async fn before(&self, _ctx: &ExecutionContext<'_>) -> eyre::Result<()> {
        Ok(())
    }

    /// Called after each completed stage.
    async fn on_stage(
        &self,
        _ctx: &ExecutionContext<'_>,
        _stage: Stage,
        _op: &UserOperation,
    ) -> eyre::Result<()> {
        Ok(())
    }

    /// Called with the outcome of the execution.
    async fn after(
        &self,
        _ctx: &ExecutionContext<'_>,
        _outcome: Result<&UserOperationReceipt, &WalletError>,
    ) -> eyre::Result<()> {
        Ok(())
    }
}

/// Logs every hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMiddleware;

#[async_trait::async_trait]
impl Middleware for TracingMiddleware {
    async fn before(&self, ctx: &ExecutionContext<'_>) -> eyre::Result<()> {
        debug!(chain_id = ctx.chain_id, sender = %ctx.sender, calls = ctx.calls.len(), "Executing");
        Ok(())
    }

    async fn on_stage(
        &self,
        ctx: &ExecutionContext<'_>,
        stage: Stage,
        op: &UserOperation,
    ) -> eyre::Result<()> {
        debug!(
            sender = %ctx.sender,
            ?stage,
            nonce = %op.nonce,
            sponsored = op.is_sponsored(),
            deployment = op.is_deployment(),
            "Stage completed"
        );
        Ok(())
    }

    async fn after(
        &self,
        ctx: &ExecutionContext<'_>,
        outcome: Result<&UserOperationReceipt, &WalletError>,
    ) -> eyre::Result<()> {
        match outcome {
            Ok(receipt) => info!(
                sender = %ctx.sender,
                user_op_hash = %receipt.user_op_hash,
                tx = %receipt.receipt.transaction_hash,
                gas_cost = %receipt.actual_gas_cost,
                "Execution succeeded"
            ),
            Err(err) => warn!(
                sender = %ctx.sender,
                %err,
                retryable = err.is_retryable(),
                "Execution failed"
            ),
        }
        Ok(())
    }
}
