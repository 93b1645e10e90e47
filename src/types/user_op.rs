use alloy::{
    primitives::{Address, B256, Bytes, U256, keccak256},
    sol,
    sol_types::SolValue,
};
use serde::{Deserialize, Serialize};

sol! {
    /// The static part of a v0.6 user operation that gets hashed.
    struct PackedUserOperation {
        address sender;
        uint256 nonce;
        bytes32 hashInitCode;
        bytes32 hashCallData;
        uint256 callGasLimit;
        uint256 verificationGasLimit;
        uint256 preVerificationGas;
        uint256 maxFeePerGas;
        uint256 maxPriorityFeePerGas;
        bytes32 hashPaymasterAndData;
    }
}

/// An ERC-4337 v0.6 user operation.
///
/// Serializes with the camelCase hex quantities bundlers expect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// The smart account.
    pub sender: Address,
    /// The EntryPoint nonce.
    pub nonce: U256,
    /// Factory address followed by the deployment calldata, empty once deployed.
    pub init_code: Bytes,
    /// The account call, `execute` or `executeBatch`.
    pub call_data: Bytes,
    /// Gas for the account call.
    pub call_gas_limit: U256,
    /// Gas for validation and deployment.
    pub verification_gas_limit: U256,
    /// Gas paid to the bundler for calldata and overhead.
    pub pre_verification_gas: U256,
    /// EIP-1559 max fee.
    pub max_fee_per_gas: U256,
    /// EIP-1559 priority fee.
    pub max_priority_fee_per_gas: U256,
    /// Paymaster address followed by its data, empty when unsponsored.
    pub paymaster_and_data: Bytes,
    /// Account-specific signature.
    pub signature: Bytes,
}

impl UserOperation {
    /// Whether the operation deploys its sender.
    pub fn is_deployment(&self) -> bool {
        !self.init_code.is_empty()
    }

    /// Whether the operation carries paymaster data.
    pub fn is_sponsored(&self) -> bool {
        !self.paymaster_and_data.is_empty()
    }

    /// Returns the hash the account signs, as computed by the v0.6 EntryPoint.
    ///
    /// The signature is not part of the hash.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        let packed = PackedUserOperation {
            sender: self.sender,
            nonce: self.nonce,
            hashInitCode: keccak256(&self.init_code),
            hashCallData: keccak256(&self.call_data),
            callGasLimit: self.call_gas_limit,
            verificationGasLimit: self.verification_gas_limit,
            preVerificationGas: self.pre_verification_gas,
            maxFeePerGas: self.max_fee_per_gas,
            maxPriorityFeePerGas: self.max_priority_fee_per_gas,
            hashPaymasterAndData: keccak256(&self.paymaster_and_data),
        };
        let inner = keccak256(packed.abi_encode());
        keccak256((inner, entry_point, U256::from(chain_id)).abi_encode_params())
    }

    /// Sets the signature.
    pub fn with_signature(mut self, signature: Bytes) -> Self {
        self.signature = signature;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ENTRYPOINT_V06;
    use alloy::primitives::{address, b256, bytes};

    fn op() -> UserOperation {
        UserOperation {
            sender: address!("0x1111111111111111111111111111111111111111"),
            nonce: U256::from(1),
            call_data: bytes!("0xb61d27f6"),
            call_gas_limit: U256::from(200_000),
            verification_gas_limit: U256::from(800_000),
            pre_verification_gas: U256::from(100_000),
            max_fee_per_gas: U256::from(1_000_000_000u64),
            max_priority_fee_per_gas: U256::from(100_000_000u64),
            ..Default::default()
        }
    }

    #[test]
    fn v06_hash() {
        assert_eq!(
            op().hash(ENTRYPOINT_V06, 8453),
            b256!("0xec8d256d6c3c0edb03e3393b60bf2adfc28c60755947000f21babf427d85b49d")
        );
    }

    #[test]
    fn signature_is_not_hashed() {
        let unsigned = op();
        let signed = unsigned.clone().with_signature(bytes!("0xdeadbeef"));
        assert_eq!(unsigned.hash(ENTRYPOINT_V06, 8453), signed.hash(ENTRYPOINT_V06, 8453));
        assert_ne!(unsigned.hash(ENTRYPOINT_V06, 8453), unsigned.hash(ENTRYPOINT_V06, 1));
    }

    #[test]
    fn serializes_camel_case_quantities() {
        let json = serde_json::to_value(op()).unwrap();
        assert_eq!(json["sender"], "0x1111111111111111111111111111111111111111");
        assert_eq!(json["callGasLimit"], "0x30d40");
        assert_eq!(json["initCode"], "0x");
        assert_eq!(json["paymasterAndData"], "0x");
        assert_eq!(serde_json::from_value::<UserOperation>(json).unwrap(), op());
    }
}
