//! Application message hashes.
//!
//! Contracts that accept passkey-signed messages recompute
//! `keccak256(abi.encodePacked(functionName, chainId, contract, user, ...params))` on-chain, so the
//! packing here has to match Solidity's packed encoding byte for byte.

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes, U256, keccak256},
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A typed parameter of a message hash.
///
/// The type is always explicit: packed encoding depends on it and values like `1` or `0x01` are
/// ambiguous on their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum PackedParam {
    /// `uint256`, 32 bytes big-endian.
    Uint256(U256),
    /// `address`, 20 bytes.
    Address(Address),
    /// `bool`, 1 byte.
    Bool(bool),
    /// `bytes32`, 32 bytes.
    Bytes32(B256),
    /// `bytes`, raw.
    Bytes(Bytes),
    /// `string`, raw UTF-8.
    String(String),
}

impl PackedParam {
    /// The Solidity type name.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Uint256(_) => "uint256",
            Self::Address(_) => "address",
            Self::Bool(_) => "bool",
            Self::Bytes32(_) => "bytes32",
            Self::Bytes(_) => "bytes",
            Self::String(_) => "string",
        }
    }

    fn to_sol_value(&self) -> DynSolValue {
        match self {
            Self::Uint256(v) => DynSolValue::Uint(*v, 256),
            Self::Address(v) => DynSolValue::Address(*v),
            Self::Bool(v) => DynSolValue::Bool(*v),
            Self::Bytes32(v) => DynSolValue::FixedBytes(*v, 32),
            Self::Bytes(v) => DynSolValue::Bytes(v.to_vec()),
            Self::String(v) => DynSolValue::String(v.clone()),
        }
    }
}

impl fmt::Display for PackedParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint256(v) => write!(f, "uint256:{v}"),
            Self::Address(v) => write!(f, "address:{v}"),
            Self::Bool(v) => write!(f, "bool:{v}"),
            Self::Bytes32(v) => write!(f, "bytes32:{v}"),
            Self::Bytes(v) => write!(f, "bytes:{v}"),
            Self::String(v) => write!(f, "string:{v}"),
        }
    }
}

impl FromStr for PackedParam {
    type Err = String;

    /// Parses `kind:value`, e.g. `uint256:42` or `address:0x...`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) =
            s.split_once(':').ok_or_else(|| format!("expected kind:value, got {s:?}"))?;
        let invalid = |err: &dyn fmt::Display| format!("invalid {kind} value {value:?}: {err}");
        Ok(match kind {
            "uint256" | "uint" => Self::Uint256(value.parse().map_err(|e| invalid(&e))?),
            "address" => Self::Address(value.parse().map_err(|e| invalid(&e))?),
            "bool" => Self::Bool(value.parse().map_err(|e| invalid(&e))?),
            "bytes32" => Self::Bytes32(value.parse().map_err(|e| invalid(&e))?),
            "bytes" => Self::Bytes(value.parse().map_err(|e| invalid(&e))?),
            "string" => Self::String(value.to_string()),
            other => return Err(format!("unsupported parameter kind {other:?}")),
        })
    }
}

/// Builds the packed message hash for a contract call authorized by a passkey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHashBuilder {
    function_name: String,
    chain_id: u64,
    contract: Address,
    user: Address,
    params: Vec<PackedParam>,
}

impl MessageHashBuilder {
    /// Starts a hash over the fixed prefix `(string, uint256, address, address)`.
    pub fn new(
        function_name: impl Into<String>,
        chain_id: u64,
        contract: Address,
        user: Address,
    ) -> Self {
        Self { function_name: function_name.into(), chain_id, contract, user, params: Vec::new() }
    }

    /// Appends a parameter.
    pub fn param(mut self, param: PackedParam) -> Self {
        self.params.push(param);
        self
    }

    /// Appends parameters.
    pub fn params(mut self, params: impl IntoIterator<Item = PackedParam>) -> Self {
        self.params.extend(params);
        self
    }

    /// Returns the packed preimage.
    pub fn packed(&self) -> Vec<u8> {
        let prefix = [
            DynSolValue::String(self.function_name.clone()),
            DynSolValue::Uint(U256::from(self.chain_id), 256),
            DynSolValue::Address(self.contract),
            DynSolValue::Address(self.user),
        ];
        prefix
            .into_iter()
            .chain(self.params.iter().map(PackedParam::to_sol_value))
            .flat_map(|value| value.abi_encode_packed())
            .collect()
    }

    /// Returns `keccak256` of the packed preimage.
    pub fn build(&self) -> B256 {
        keccak256(self.packed())
    }
}

/// Shorthand for [`MessageHashBuilder`].
pub fn message_hash(
    function_name: &str,
    chain_id: u64,
    contract: Address,
    user: Address,
    params: &[PackedParam],
) -> B256 {
    MessageHashBuilder::new(function_name, chain_id, contract, user)
        .params(params.iter().cloned())
        .build()
}
