//! # Passkey wallet CLI
use crate::{
    account::counterfactual_address,
    allowlist::Validation,
    bundler::{Bundler, PaymasterDialect},
    codec::{P256PublicKey, parse_der_signature},
    config::WalletConfig,
    hash::{MessageHashBuilder, PackedParam},
    storage::{CredentialStore, FileStore},
    types::OwnerBytes,
};
use alloy::primitives::{Address, B256, Bytes, ChainId, U256};
use clap::{Parser, Subcommand};
use eyre::Context;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

/// Biometric (WebAuthn P-256) signing for ERC-4337 smart accounts.
#[derive(Debug, Parser)]
#[command(author, about = "Passkey wallet", long_about = None)]
pub struct Args {
    /// The configuration file.
    ///
    /// If missing, the defaults are used.
    #[arg(
        long,
        value_name = "CONFIG",
        env = "PASSKEY_WALLET_CONFIG",
        default_value = "passkey-wallet.yaml",
        global = true
    )]
    pub config: PathBuf,
    /// The chain id.
    #[arg(long = "chain-id", value_name = "CHAIN_ID", global = true)]
    pub chain_id: Option<ChainId>,
    /// The RPC endpoint of the chain.
    #[arg(
        long = "rpc-url",
        value_name = "RPC_ENDPOINT",
        env = "PASSKEY_WALLET_RPC_URL",
        global = true
    )]
    pub rpc_url: Option<Url>,
    /// The bundler RPC endpoint.
    #[arg(
        long = "bundler-url",
        value_name = "BUNDLER_ENDPOINT",
        env = "PASSKEY_WALLET_BUNDLER_URL",
        global = true
    )]
    pub bundler_url: Option<Url>,
    /// The ERC-4337 EntryPoint.
    #[arg(long = "entry-point", value_name = "ADDRESS", global = true)]
    pub entry_point: Option<Address>,
    /// The account factory.
    #[arg(long, value_name = "ADDRESS", global = true)]
    pub factory: Option<Address>,
    /// The account implementation.
    #[arg(long, value_name = "ADDRESS", global = true)]
    pub implementation: Option<Address>,
    /// The sponsorship dialect of the paymaster.
    #[arg(long, value_name = "DIALECT", global = true)]
    pub paymaster: Option<PaymasterDialect>,
    /// The sponsorship policy id.
    #[arg(
        long = "policy-id",
        value_name = "POLICY",
        env = "PASSKEY_WALLET_POLICY_ID",
        global = true
    )]
    pub policy_id: Option<String>,
    /// The credential file.
    #[arg(long = "storage", value_name = "PATH", global = true)]
    pub storage: Option<PathBuf>,
    /// The command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Wallet commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Writes the effective configuration to the configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Prints the owner address and the smart account address of a passkey.
    Address {
        /// The x coordinate of the public key.
        #[arg(long)]
        x: B256,
        /// The y coordinate of the public key.
        #[arg(long)]
        y: B256,
        /// The account salt.
        #[arg(long, default_value_t = U256::ZERO)]
        salt: U256,
    },
    /// Prints the packed message hash of an application call.
    MessageHash {
        /// The function name.
        #[arg(long)]
        function: String,
        /// The contract.
        #[arg(long)]
        contract: Address,
        /// The user, usually the smart account.
        #[arg(long)]
        user: Address,
        /// A parameter as `kind:value`, e.g. `uint256:1`. Repeatable, in order.
        #[arg(long = "param", value_name = "KIND:VALUE")]
        params: Vec<PackedParam>,
    },
    /// Checks a contract against the trusted allowlist.
    CheckContract {
        /// The contract.
        #[arg(long)]
        address: Address,
        /// The name the contract is expected to be listed under.
        #[arg(long)]
        name: Option<String>,
    },
    /// Parses a DER signature and prints its low-S components.
    ParseSignature {
        /// The DER signature, hex encoded.
        signature: Bytes,
    },
    /// Waits for a user operation receipt.
    WaitReceipt {
        /// The user operation hash.
        user_op_hash: B256,
        /// How long to wait, in seconds.
        #[arg(long, value_name = "SECONDS", value_parser = parse_duration_secs)]
        timeout: Option<Duration>,
    },
    /// Inspects the stored credential.
    #[command(subcommand)]
    Credential(CredentialCommand),
}

/// Credential commands.
#[derive(Debug, Subcommand)]
pub enum CredentialCommand {
    /// Prints the stored credential.
    Show,
    /// Removes the stored credential.
    Clear,
}

impl Args {
    /// Runs the command.
    pub async fn run(self) -> eyre::Result<()> {
        let base = if self.config.exists() {
            WalletConfig::load_from_file(&self.config)?
        } else {
            WalletConfig::default()
        };
        let config_path = self.config.clone();
        let (config, command) = self.merge_config(base);

        match command {
            Command::InitConfig { force } => {
                if config_path.exists() && !force {
                    eyre::bail!(
                        "{} already exists, pass --force to overwrite",
                        config_path.display()
                    );
                }
                config.save_to_file(&config_path)?;
                info!(path = %config_path.display(), "Wrote configuration");
            }
            Command::Address { x, y, salt } => {
                let key = P256PublicKey::new(x, y)?;
                println!("owner: {}", key.address());
                if config.contracts.factory.is_zero() || config.contracts.implementation.is_zero() {
                    warn!("Factory or implementation not configured, skipping account address");
                } else {
                    let account = counterfactual_address(
                        config.contracts.factory,
                        config.contracts.implementation,
                        &OwnerBytes::Passkey(key),
                        salt,
                    );
                    println!("account: {account}");
                }
            }
            Command::MessageHash { function, contract, user, params } => {
                let builder =
                    MessageHashBuilder::new(function, config.chain.chain_id, contract, user)
                        .params(params);
                println!("packed: {}", Bytes::from(builder.packed()));
                println!("hash: {}", builder.build());
            }
            Command::CheckContract { address, name } => {
                let allowlist = config.allowlist()?;
                match allowlist.validate(config.chain.chain_id, address, name.as_deref()) {
                    Validation::Trusted { name } => println!("trusted: {name}"),
                    Validation::NameMismatch { expected, name } => {
                        println!("trusted: {name} (expected {expected})")
                    }
                    Validation::Untrusted(err) => eyre::bail!(err),
                }
            }
            Command::ParseSignature { signature } => {
                let signature = parse_der_signature(&signature)?;
                println!("r: {}", signature.r_bytes());
                println!("s: {}", signature.s_bytes());
            }
            Command::WaitReceipt { user_op_hash, timeout } => {
                let bundler = config.bundler_client().wrap_err("pass --bundler-url")?;
                let receipt = bundler
                    .wait_for(user_op_hash, timeout.unwrap_or(config.timeouts.receipt))
                    .await?;
                println!("{}", serde_json::to_string_pretty(&receipt)?);
            }
            Command::Credential(command) => {
                let store = CredentialStore::new(Arc::new(FileStore::new(&config.storage.path)));
                match command {
                    CredentialCommand::Show => match store.load().await? {
                        Some(credential) => {
                            println!("{}", serde_json::to_string_pretty(&credential)?)
                        }
                        None => println!("no credential stored"),
                    },
                    CredentialCommand::Clear => match store.clear().await? {
                        Some(id) => println!("cleared {id}"),
                        None => println!("no credential stored"),
                    },
                }
            }
        }

        Ok(())
    }

    /// Merges [`Args`] values into an existing [`WalletConfig`] instance.
    pub fn merge_config(self, config: WalletConfig) -> (WalletConfig, Command) {
        let config = config
            .with_chain_id(self.chain_id)
            .with_rpc_url(self.rpc_url)
            .with_bundler_url(self.bundler_url)
            .with_entry_point(self.entry_point)
            .with_factory(self.factory)
            .with_implementation(self.implementation)
            .with_paymaster(self.paymaster)
            .with_policy_id(self.policy_id)
            .with_storage_path(self.storage);
        (config, self.command)
    }
}

/// Parses a string representing seconds to a [`Duration`].
fn parse_duration_secs(arg: &str) -> eyre::Result<Duration> {
    let seconds = arg.parse().wrap_err("expected whole seconds")?;
    Ok(Duration::from_secs(seconds))
}
