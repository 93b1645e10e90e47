//! Smart account reads and calldata encoding.

use crate::{
    codec::P256PublicKey,
    constants::{EXECUTE_BATCH_SELECTOR, EXECUTE_SELECTOR},
    error::{BuildError, WalletError},
    types::{Call, ISmartAccount},
};
use alloy::{
    primitives::{Address, Bytes, FixedBytes, U256},
    providers::Provider,
    sol_types::SolCall,
    transports::{TransportErrorKind, TransportResult},
};
use tracing::{debug, trace};

mod factory;
pub use factory::{AccountFactory, counterfactual_address, proxy_init_code, proxy_init_code_hash};
pub(crate) use factory::split_init_code;

/// A deployed or counterfactual smart account.
#[derive(Debug, Clone)]
pub struct SmartAccount<P> {
    address: Address,
    provider: P,
}

impl<P: Provider> SmartAccount<P> {
    /// Creates a handle for the account at `address`.
    pub const fn new(address: Address, provider: P) -> Self {
        Self { address, provider }
    }

    /// The account address.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Whether the account has code.
    ///
    /// Always reads the chain, deployment may happen between two calls.
    pub async fn is_deployed(&self) -> TransportResult<bool> {
        Ok(!self.provider.get_code_at(self.address).await?.is_empty())
    }

    /// Returns the account nonce.
    ///
    /// An account without code has nonce 0 by protocol: the EntryPoint has never seen it.
    /// Deployed accounts are asked through `getNonce()`, then the legacy `nonce()`.
    pub async fn get_nonce(&self) -> Result<U256, WalletError> {
        if !self.is_deployed().await? {
            trace!(account = %self.address, "Account not deployed, nonce is 0");
            return Ok(U256::ZERO);
        }

        self.deployed_nonce().await
    }

    /// Reads the nonce of an account known to be deployed.
    pub async fn deployed_nonce(&self) -> Result<U256, WalletError> {
        let account = ISmartAccount::new(self.address, &self.provider);
        match account.getNonce().call().await {
            Ok(nonce) => Ok(nonce),
            Err(err) => {
                debug!(account = %self.address, ?err, "getNonce() failed, trying nonce()");
                Ok(account.nonce().call().await.map_err(TransportErrorKind::custom)?)
            }
        }
    }

    /// Returns the raw owner bytes registered on the account.
    pub async fn owners(&self) -> TransportResult<Vec<Bytes>> {
        ISmartAccount::new(self.address, &self.provider)
            .getOwners()
            .call()
            .await
            .map_err(TransportErrorKind::custom)
    }

    /// Returns the address registered for a secp256r1 key hash.
    pub async fn secp256r1_to_address(
        &self,
        key_hash: FixedBytes<32>,
    ) -> TransportResult<Address> {
        ISmartAccount::new(self.address, &self.provider)
            .secp256r1ToAddress(key_hash)
            .call()
            .await
            .map_err(TransportErrorKind::custom)
    }

    /// A self call registering `key` as an additional owner, to be executed by the account.
    pub fn register_key_call(&self, key: &P256PublicKey) -> Call {
        Call::new(self.address, &ISmartAccount::registerSecp256r1KeyCall { x: key.x, y: key.y })
    }
}

/// Encodes `execute(address,uint256,bytes)`.
pub fn encode_execute_call(call: &Call) -> Result<Bytes, BuildError> {
    let data = ISmartAccount::executeCall {
        target: call.target,
        value: call.value,
        data: call.data.clone(),
    }
    .abi_encode();
    check_selector(&data, EXECUTE_SELECTOR)?;
    Ok(data.into())
}

/// Encodes `executeBatch(address[],uint256[],bytes[])`.
pub fn encode_execute_batch_call(calls: &[Call]) -> Result<Bytes, BuildError> {
    if calls.is_empty() {
        return Err(BuildError::NoCalls);
    }
    let data = ISmartAccount::executeBatchCall {
        targets: calls.iter().map(|c| c.target).collect(),
        values: calls.iter().map(|c| c.value).collect(),
        data: calls.iter().map(|c| c.data.clone()).collect(),
    }
    .abi_encode();
    check_selector(&data, EXECUTE_BATCH_SELECTOR)?;
    Ok(data.into())
}

/// Encodes one call as `execute` and several as `executeBatch`.
pub fn encode_calls(calls: &[Call]) -> Result<Bytes, BuildError> {
    match calls {
        [] => Err(BuildError::NoCalls),
        [call] => encode_execute_call(call),
        calls => encode_execute_batch_call(calls),
    }
}

/// Checks that account calldata starts with an entry function the bundler accepts.
pub fn check_selector(data: &[u8], expected: FixedBytes<4>) -> Result<(), BuildError> {
    let found = data.get(..4).map(FixedBytes::<4>::from_slice).unwrap_or_default();
    if found != expected {
        return Err(BuildError::SelectorMismatch { expected, found });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::{
        primitives::{address, b256, bytes, fixed_bytes, keccak256},
        providers::ProviderBuilder,
        sol_types::SolValue,
        transports::mock::Asserter,
    };

    const TARGET: Address = address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

    #[test]
    fn execute_selector() {
        let data = encode_execute_call(&Call::transfer(TARGET, U256::from(1))).unwrap();
        assert_eq!(&data[..4], EXECUTE_SELECTOR.as_slice());
        assert_eq!(&data[..4], &[0xb6, 0x1d, 0x27, 0xf6]);

        let decoded = ISmartAccount::executeCall::abi_decode(&data).unwrap();
        assert_eq!(decoded.target, TARGET);
        assert_eq!(decoded.value, U256::from(1));
    }

    #[test]
    fn batch_selector_and_layout() {
        let calls = [
            Call::raw(TARGET, U256::ZERO, bytes!("0xa9059cbb")),
            Call::transfer(address!("0x2222222222222222222222222222222222222222"), U256::from(5)),
        ];
        let data = encode_calls(&calls).unwrap();
        assert_eq!(&data[..4], EXECUTE_BATCH_SELECTOR.as_slice());

        let decoded = ISmartAccount::executeBatchCall::abi_decode(&data).unwrap();
        assert_eq!(decoded.targets.len(), 2);
        assert_eq!(decoded.values[1], U256::from(5));
        assert_eq!(decoded.data[0], bytes!("0xa9059cbb"));
    }

    #[test]
    fn single_call_uses_execute() {
        let data = encode_calls(&[Call::transfer(TARGET, U256::ZERO)]).unwrap();
        assert_eq!(&data[..4], EXECUTE_SELECTOR.as_slice());
        assert!(matches!(encode_calls(&[]), Err(BuildError::NoCalls)));
    }

    #[test]
    fn selector_mismatch_is_build_error() {
        let err = check_selector(&[0xde, 0xad, 0xbe, 0xef, 0x00], EXECUTE_SELECTOR).unwrap_err();
        assert_eq!(
            err,
            BuildError::SelectorMismatch {
                expected: EXECUTE_SELECTOR,
                found: fixed_bytes!("0xdeadbeef")
            }
        );
        assert!(check_selector(&[0xb6], EXECUTE_SELECTOR).is_err());
    }

    #[tokio::test]
    async fn undeployed_nonce_is_zero() {
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new().connect_mocked_client(asserter.clone());
        asserter.push_success(&Bytes::new());

        let account = SmartAccount::new(TARGET, provider);
        assert_eq!(account.get_nonce().await.unwrap(), U256::ZERO);
    }

    #[tokio::test]
    async fn deployed_nonce_is_read() {
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new().connect_mocked_client(asserter.clone());
        asserter.push_success(&bytes!("0x6080"));
        asserter.push_success(&Bytes::from(U256::from(7).abi_encode()));

        let account = SmartAccount::new(TARGET, provider);
        assert_eq!(account.get_nonce().await.unwrap(), U256::from(7));
    }

    #[tokio::test]
    async fn falls_back_to_legacy_nonce() {
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new().connect_mocked_client(asserter.clone());
        asserter.push_success(&bytes!("0x6080"));
        asserter.push_failure_msg("execution reverted");
        asserter.push_success(&Bytes::from(U256::from(3).abi_encode()));

        let account = SmartAccount::new(TARGET, provider);
        assert_eq!(account.get_nonce().await.unwrap(), U256::from(3));
    }

    #[tokio::test]
    async fn reads_owners() {
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new().connect_mocked_client(asserter.clone());
        let owners = vec![Bytes::from(TARGET.abi_encode()), Bytes::from([0x11u8; 64].to_vec())];
        asserter.push_success(&Bytes::from(owners.abi_encode()));

        let account = SmartAccount::new(TARGET, provider);
        assert_eq!(account.owners().await.unwrap(), owners);
    }

    #[tokio::test]
    async fn reads_secp256r1_address() {
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new().connect_mocked_client(asserter.clone());
        let owner = address!("0x3333333333333333333333333333333333333333");
        asserter.push_success(&Bytes::from(owner.abi_encode()));
        asserter.push_failure_msg("execution reverted");

        let account = SmartAccount::new(TARGET, provider);
        let key_hash = keccak256([0x11u8; 64]);
        assert_eq!(account.secp256r1_to_address(key_hash).await.unwrap(), owner);
        assert!(account.secp256r1_to_address(key_hash).await.is_err());
    }

    #[test]
    fn register_key_targets_the_account() {
        let key = P256PublicKey {
            x: b256!("0x6B17D1F2E12C4247F8BCE6E563A440F277037D812DEB33A0F4A13945D898C296"),
            y: b256!("0x4FE342E2FE1A7F9B8EE7EB4A7C0F9E162BCE33576B315ECECBB6406837BF51F5"),
        };
        let provider = ProviderBuilder::new().connect_mocked_client(Asserter::new());
        let account = SmartAccount::new(TARGET, provider);
        let call = account.register_key_call(&key);
        assert_eq!(call.target, TARGET);
        assert_eq!(call.value, U256::ZERO);

        let decoded = ISmartAccount::registerSecp256r1KeyCall::abi_decode(&call.data).unwrap();
        assert_eq!((decoded.x, decoded.y), (key.x, key.y));
        assert_eq!(&call.data[..4], ISmartAccount::registerSecp256r1KeyCall::SELECTOR.as_slice());
    }
}
