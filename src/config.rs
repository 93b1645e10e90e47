//! Wallet configuration.
use crate::{
    allowlist::{Allowlist, TrustedContract},
    builder::GasPolicy,
    bundler::{PaymasterDialect, RpcBundler},
    constants::{
        BASE_MAINNET_CHAIN_ID, BASE_MAINNET_PUBLIC_RPC_URL, DEFAULT_RECEIPT_TIMEOUT,
        ENTRYPOINT_V06, WEBAUTHN_TIMEOUT,
    },
    error::AllowlistError,
    executor::SponsorshipPolicy,
};
use alloy::primitives::{Address, ChainId};
use eyre::{Context, OptionExt};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

/// Wallet configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Chain configuration.
    #[serde(default)]
    pub chain: ChainConfig,
    /// Contract addresses.
    #[serde(default)]
    pub contracts: ContractsConfig,
    /// Bundler and paymaster configuration.
    #[serde(default)]
    pub bundler: BundlerConfig,
    /// Gas fallback policy.
    #[serde(default)]
    pub gas: GasPolicy,
    /// Timeouts.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Contracts trusted in addition to the built-in allowlist.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trusted_contracts: Vec<TrustedContract>,
    /// Credential storage.
    #[serde(default)]
    pub storage: StorageConfig,
    /// WebAuthn relying party.
    #[serde(default)]
    pub relying_party: RelyingPartyConfig,
}

/// Chain configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// The chain id.
    pub chain_id: ChainId,
    /// The chain RPC endpoint.
    pub rpc_url: Url,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: BASE_MAINNET_CHAIN_ID,
            rpc_url: BASE_MAINNET_PUBLIC_RPC_URL.parse().expect("valid url"),
        }
    }
}

/// Contract addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// The ERC-4337 EntryPoint.
    pub entry_point: Address,
    /// The account factory.
    pub factory: Address,
    /// The account implementation the factory deploys proxies to.
    pub implementation: Address,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self { entry_point: ENTRYPOINT_V06, factory: Address::ZERO, implementation: Address::ZERO }
    }
}

/// Bundler and paymaster configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundlerConfig {
    /// The bundler RPC endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
    /// The sponsorship dialect spoken by the paymaster behind the bundler.
    #[serde(default)]
    pub paymaster: PaymasterDialect,
    /// The sponsorship policy id, if the paymaster wants one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    /// Whether to request sponsorship for operations that deploy the account.
    #[serde(default = "default_true")]
    pub sponsor_deployments: bool,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            url: None,
            paymaster: PaymasterDialect::None,
            policy_id: None,
            sponsor_deployments: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

/// Timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// How long to wait for a user operation receipt.
    #[serde(with = "crate::serde::duration")]
    pub receipt: Duration,
    /// Upper bound of a WebAuthn ceremony.
    #[serde(with = "crate::serde::duration")]
    pub webauthn: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self { receipt: DEFAULT_RECEIPT_TIMEOUT, webauthn: WEBAUTHN_TIMEOUT }
    }
}

/// Credential storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// The credential file.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("passkey-wallet.json") }
    }
}

/// WebAuthn relying party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingPartyConfig {
    /// The relying party id, usually the site domain.
    pub id: String,
    /// The relying party name shown by the authenticator.
    pub name: String,
    /// The origin assertions must name in their client data.
    pub origin: String,
}

impl Default for RelyingPartyConfig {
    fn default() -> Self {
        Self {
            id: "localhost".to_string(),
            name: "Passkey Wallet".to_string(),
            origin: "https://localhost".to_string(),
        }
    }
}

impl WalletConfig {
    /// Sets the chain id.
    pub fn with_chain_id(mut self, chain_id: Option<ChainId>) -> Self {
        if let Some(chain_id) = chain_id {
            self.chain.chain_id = chain_id;
        }
        self
    }

    /// Sets the chain RPC endpoint.
    pub fn with_rpc_url(mut self, rpc_url: Option<Url>) -> Self {
        if let Some(rpc_url) = rpc_url {
            self.chain.rpc_url = rpc_url;
        }
        self
    }

    /// Sets the EntryPoint.
    pub fn with_entry_point(mut self, entry_point: Option<Address>) -> Self {
        if let Some(entry_point) = entry_point {
            self.contracts.entry_point = entry_point;
        }
        self
    }

    /// Sets the account factory.
    pub fn with_factory(mut self, factory: Option<Address>) -> Self {
        if let Some(factory) = factory {
            self.contracts.factory = factory;
        }
        self
    }

    /// Sets the account implementation.
    pub fn with_implementation(mut self, implementation: Option<Address>) -> Self {
        if let Some(implementation) = implementation {
            self.contracts.implementation = implementation;
        }
        self
    }

    /// Sets the bundler endpoint.
    pub fn with_bundler_url(mut self, url: Option<Url>) -> Self {
        if url.is_some() {
            self.bundler.url = url;
        }
        self
    }

    /// Sets the paymaster dialect.
    pub fn with_paymaster(mut self, paymaster: Option<PaymasterDialect>) -> Self {
        if let Some(paymaster) = paymaster {
            self.bundler.paymaster = paymaster;
        }
        self
    }

    /// Sets the sponsorship policy id.
    pub fn with_policy_id(mut self, policy_id: Option<String>) -> Self {
        if policy_id.is_some() {
            self.bundler.policy_id = policy_id;
        }
        self
    }

    /// Sets the gas policy.
    pub fn with_gas(mut self, gas: GasPolicy) -> Self {
        self.gas = gas;
        self
    }

    /// Sets the receipt timeout.
    pub fn with_receipt_timeout(mut self, timeout: Option<Duration>) -> Self {
        if let Some(timeout) = timeout {
            self.timeouts.receipt = timeout;
        }
        self
    }

    /// Adds trusted contracts.
    pub fn with_trusted_contracts(mut self, contracts: Vec<TrustedContract>) -> Self {
        self.trusted_contracts.extend(contracts);
        self
    }

    /// Sets the credential file.
    pub fn with_storage_path(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.storage.path = path;
        }
        self
    }

    /// Sets the relying party.
    pub fn with_relying_party(mut self, relying_party: RelyingPartyConfig) -> Self {
        self.relying_party = relying_party;
        self
    }

    /// The built-in allowlist extended with [`Self::trusted_contracts`].
    pub fn allowlist(&self) -> Result<Allowlist, AllowlistError> {
        Allowlist::with_extra(self.trusted_contracts.iter().cloned())
    }

    /// A bundler client for the bundler section.
    pub fn bundler_client(&self) -> eyre::Result<RpcBundler> {
        let url = self.bundler.url.clone().ok_or_eyre("bundler.url is not configured")?;
        Ok(RpcBundler::new(url, self.contracts.entry_point, self.chain.chain_id)
            .with_dialect(self.bundler.paymaster)
            .with_policy_id(self.bundler.policy_id.clone()))
    }

    /// The sponsorship policy implied by the bundler section.
    pub fn sponsorship(&self) -> SponsorshipPolicy {
        SponsorshipPolicy {
            enabled: self.bundler.paymaster.is_enabled(),
            sponsor_deployments: self.bundler.sponsor_deployments,
        }
    }

    /// Checks that everything needed to send operations is set.
    pub fn validate(&self) -> eyre::Result<()> {
        if self.contracts.factory.is_zero() {
            eyre::bail!("contracts.factory is not configured");
        }
        if self.contracts.implementation.is_zero() {
            eyre::bail!("contracts.implementation is not configured");
        }
        if self.bundler.url.is_none() {
            eyre::bail!("bundler.url is not configured");
        }
        self.allowlist()?;
        Ok(())
    }

    /// Load from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> eyre::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("failed to read config file: {}", path.display()))?;
        let config = serde_yaml::from_reader(&file)
            .wrap_err_with(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save to a YAML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> eyre::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
