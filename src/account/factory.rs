use super::SmartAccount;
use crate::{
    error::{AddressMismatchError, WalletError},
    types::{IAccountFactory, OwnerBytes},
};
use alloy::{
    primitives::{Address, B256, Bytes, U256, keccak256},
    providers::Provider,
    sol_types::{SolCall, SolValue},
    transports::{TransportErrorKind, TransportResult},
};
use tracing::debug;

/// Creation code of an ERC-1967 minimal proxy, split around the implementation address.
const ERC1967_PREFIX: [u8; 9] = alloy::primitives::hex!("603d3d8160223d3973");
const ERC1967_SUFFIX: [u8; 66] = alloy::primitives::hex!(
    "60095155f3363d3d373d3d363d7f360894a13ba1a3210667c828492db98dca3e"
    "2076cc3735a920a3ca505d382bbc545af43d6000803e6038573d6000fd5b3d6000f3"
);

/// Returns the creation code of an ERC-1967 proxy to `implementation`.
pub fn proxy_init_code(implementation: Address) -> Bytes {
    [ERC1967_PREFIX.as_slice(), implementation.as_slice(), ERC1967_SUFFIX.as_slice()]
        .concat()
        .into()
}

/// Returns the address `factory.createAccount(owner, salt)` deploys to.
///
/// The CREATE2 salt is `keccak256(abi.encode(owner, salt))`.
pub fn counterfactual_address(
    factory: Address,
    implementation: Address,
    owner: &OwnerBytes,
    salt: U256,
) -> Address {
    let create2_salt = keccak256((owner.to_bytes(), salt).abi_encode_params());
    factory.create2(create2_salt, keccak256(proxy_init_code(implementation)))
}

/// The account factory.
#[derive(Debug, Clone)]
pub struct AccountFactory<P> {
    address: Address,
    implementation: Address,
    provider: P,
}

impl<P: Provider> AccountFactory<P> {
    /// Creates a handle for the factory at `address` deploying proxies to `implementation`.
    pub const fn new(address: Address, implementation: Address, provider: P) -> Self {
        Self { address, implementation, provider }
    }

    /// The factory address.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// The account implementation.
    pub const fn implementation(&self) -> Address {
        self.implementation
    }

    /// Computes the account address locally.
    pub fn get_address(&self, owner: &OwnerBytes, salt: U256) -> Address {
        counterfactual_address(self.address, self.implementation, owner, salt)
    }

    /// Computes the account address and checks it against the factory's view.
    pub async fn verify_address(
        &self,
        owner: &OwnerBytes,
        salt: U256,
    ) -> Result<Address, WalletError> {
        let computed = self.get_address(owner, salt);
        let factory = IAccountFactory::new(self.address, &self.provider)
            .getAddress(owner.to_bytes(), salt)
            .call()
            .await
            .map_err(TransportErrorKind::custom)?;

        if computed != factory {
            return Err(AddressMismatchError {
                computed,
                factory,
                owner: owner.to_bytes(),
                salt,
            }
            .into());
        }
        debug!(%computed, "Counterfactual address matches factory");
        Ok(computed)
    }

    /// Whether `address` has code. Never cached.
    pub async fn is_deployed(&self, address: Address) -> TransportResult<bool> {
        SmartAccount::new(address, &self.provider).is_deployed().await
    }

    /// Whether the factory itself recorded a deployment at `address`.
    pub async fn is_wallet_deployed(&self, address: Address) -> TransportResult<bool> {
        IAccountFactory::new(self.address, &self.provider)
            .isWalletDeployed(address)
            .call()
            .await
            .map_err(TransportErrorKind::custom)
    }

    /// Encodes `createAccount(owner, salt)`.
    pub fn deployment_calldata(&self, owner: &OwnerBytes, salt: U256) -> Bytes {
        IAccountFactory::createAccountCall { owner: owner.to_bytes(), salt }.abi_encode().into()
    }

    /// Returns the user operation `initCode`: the factory address followed by the deployment
    /// calldata.
    pub fn init_code(&self, owner: &OwnerBytes, salt: U256) -> Bytes {
        [self.address.as_slice(), &self.deployment_calldata(owner, salt)[..]].concat().into()
    }
}

/// Splits `initCode` into the factory address and its calldata.
pub(crate) fn split_init_code(init_code: &[u8]) -> Option<(Address, &[u8])> {
    (init_code.len() >= 20).then(|| (Address::from_slice(&init_code[..20]), &init_code[20..]))
}

/// Hash of the proxy creation code, as used in CREATE2.
pub fn proxy_init_code_hash(implementation: Address) -> B256 {
    keccak256(proxy_init_code(implementation))
}
