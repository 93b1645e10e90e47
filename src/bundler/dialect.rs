use crate::types::UserOperation;
use alloy::primitives::{Address, U64};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

/// The sponsorship API spoken by the paymaster behind a bundler URL.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PaymasterDialect {
    /// No paymaster, operations are always paid by the sender.
    #[default]
    None,
    /// Pimlico `pm_sponsorUserOperation`.
    Pimlico,
    /// Alchemy `alchemy_requestGasAndPaymasterAndData`.
    Alchemy,
    /// ERC-7677 `pm_getPaymasterStubData` followed by `pm_getPaymasterData`.
    Erc7677,
}

impl fmt::Display for PaymasterDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Pimlico => "pimlico",
            Self::Alchemy => "alchemy",
            Self::Erc7677 => "erc7677",
        })
    }
}

/// A single JSON-RPC call of a sponsorship exchange.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SponsorRequest {
    pub(crate) method: &'static str,
    pub(crate) params: Value,
}

impl PaymasterDialect {
    /// Whether the dialect can sponsor at all.
    pub const fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether the first response is a stub that a second request replaces.
    pub(crate) const fn has_follow_up(&self) -> bool {
        matches!(self, Self::Erc7677)
    }

    /// Builds the first sponsorship request for `op`.
    ///
    /// The operation is expected to carry a dummy signature of realistic size.
    pub(crate) fn request(
        &self,
        op: &UserOperation,
        entry_point: Address,
        chain_id: u64,
        policy_id: Option<&str>,
    ) -> Option<SponsorRequest> {
        match self {
            Self::None => None,
            Self::Pimlico => {
                let mut params = vec![json!(op), json!(entry_point)];
                if let Some(policy_id) = policy_id {
                    params.push(json!({ "sponsorshipPolicyId": policy_id }));
                }
                Some(SponsorRequest {
                    method: "pm_sponsorUserOperation",
                    params: Value::Array(params),
                })
            }
            Self::Alchemy => Some(SponsorRequest {
                method: "alchemy_requestGasAndPaymasterAndData",
                params: json!([{
                    "policyId": policy_id,
                    "entryPoint": entry_point,
                    "dummySignature": op.signature,
                    "userOperation": {
                        "sender": op.sender,
                        "nonce": op.nonce,
                        "initCode": op.init_code,
                        "callData": op.call_data,
                    },
                }]),
            }),
            Self::Erc7677 => Some(SponsorRequest {
                method: "pm_getPaymasterStubData",
                params: erc7677_params(op, entry_point, chain_id, policy_id),
            }),
        }
    }

    /// Builds the request that follows the first one, if the dialect has one.
    ///
    /// `op` must already carry the first response's paymaster data and final gas limits.
    pub(crate) fn follow_up(
        &self,
        op: &UserOperation,
        entry_point: Address,
        chain_id: u64,
        policy_id: Option<&str>,
    ) -> Option<SponsorRequest> {
        match self {
            Self::Erc7677 => Some(SponsorRequest {
                method: "pm_getPaymasterData",
                params: erc7677_params(op, entry_point, chain_id, policy_id),
            }),
            Self::None | Self::Pimlico | Self::Alchemy => None,
        }
    }
}

fn erc7677_params(
    op: &UserOperation,
    entry_point: Address,
    chain_id: u64,
    policy_id: Option<&str>,
) -> Value {
    let context = match policy_id {
        Some(policy_id) => json!({ "sponsorshipPolicyId": policy_id }),
        None => json!({}),
    };
    json!([op, entry_point, U64::from(chain_id), context])
}
