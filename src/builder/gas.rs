use crate::{
    bundler::UserOperationGasEstimate,
    constants::{
        CALL_GAS_MARGIN_PERCENT, DEFAULT_CALL_GAS_LIMIT, DEFAULT_PRE_VERIFICATION_GAS,
        DEFAULT_VERIFICATION_GAS_LIMIT, PRE_VERIFICATION_GAS_MARGIN_PERCENT,
        VERIFICATION_GAS_MARGIN_PERCENT,
    },
};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Static gas limits used when the bundler cannot estimate, with their safety margins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasPolicy {
    /// Fallback `callGasLimit`.
    pub call_gas_limit: u64,
    /// Fallback `verificationGasLimit`.
    pub verification_gas_limit: u64,
    /// Fallback `preVerificationGas`.
    pub pre_verification_gas: u64,
    /// Margin added to `callGasLimit`, in percent.
    pub call_gas_margin_percent: u64,
    /// Margin added to `verificationGasLimit`, in percent.
    pub verification_gas_margin_percent: u64,
    /// Margin added to `preVerificationGas`, in percent.
    pub pre_verification_gas_margin_percent: u64,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            call_gas_limit: DEFAULT_CALL_GAS_LIMIT,
            verification_gas_limit: DEFAULT_VERIFICATION_GAS_LIMIT,
            pre_verification_gas: DEFAULT_PRE_VERIFICATION_GAS,
            call_gas_margin_percent: CALL_GAS_MARGIN_PERCENT,
            verification_gas_margin_percent: VERIFICATION_GAS_MARGIN_PERCENT,
            pre_verification_gas_margin_percent: PRE_VERIFICATION_GAS_MARGIN_PERCENT,
        }
    }
}

impl GasPolicy {
    /// Returns the static limits inflated by their margins.
    pub fn fallback(&self) -> UserOperationGasEstimate {
        UserOperationGasEstimate {
            call_gas_limit: U256::from(with_margin(
                self.call_gas_limit,
                self.call_gas_margin_percent,
            )),
            verification_gas_limit: U256::from(with_margin(
                self.verification_gas_limit,
                self.verification_gas_margin_percent,
            )),
            pre_verification_gas: U256::from(with_margin(
                self.pre_verification_gas,
                self.pre_verification_gas_margin_percent,
            )),
        }
    }
}

/// Returns `value` increased by `percent`, rounding down.
pub const fn with_margin(value: u64, percent: u64) -> u64 {
    value.saturating_mul(100 + percent) / 100
}
