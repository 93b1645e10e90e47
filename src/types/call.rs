use alloy::{
    primitives::{Address, Bytes, U256},
    sol,
    sol_types::SolCall,
};
use serde::{Deserialize, Serialize};

sol! {
    /// A call made from the smart account.
    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct Call {
        /// The call target.
        address target;
        /// Amount of native value to send to the target.
        uint256 value;
        /// The calldata bytes.
        bytes data;
    }
}

impl Call {
    /// Creates a call to `target` with ABI-encoded `call`.
    pub fn new<C: SolCall>(target: Address, call: &C) -> Self {
        Self { target, value: U256::ZERO, data: call.abi_encode().into() }
    }

    /// Creates a call from raw calldata.
    pub const fn raw(target: Address, value: U256, data: Bytes) -> Self {
        Self { target, value, data }
    }

    /// Creates a plain value transfer.
    pub const fn transfer(to: Address, value: U256) -> Self {
        Self { target: to, value, data: Bytes::new() }
    }
}
