//! Trusted contract allowlist.
//!
//! Every call target must be listed here for its chain before the user is asked to sign. The
//! biometric prompt shows no transaction detail, so this table is what stands between a
//! compromised caller and a signed call to an arbitrary contract.

use crate::error::AllowlistError;
use alloy::primitives::{Address, ChainId, address};
use alloy_chains::Chain;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// A contract trusted on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedContract {
    /// The chain.
    pub chain_id: ChainId,
    /// The contract address.
    pub address: Address,
    /// A human readable name.
    pub name: String,
}

impl TrustedContract {
    /// Creates an entry.
    pub fn new(chain_id: ChainId, address: Address, name: impl Into<String>) -> Self {
        Self { chain_id, address, name: name.into() }
    }
}

/// The outcome of [`Allowlist::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation<'a> {
    /// The address is listed under the expected name, or no name was expected.
    Trusted {
        /// The listed name.
        name: &'a str,
    },
    /// The address is listed, but under another name. Still valid.
    NameMismatch {
        /// The name the caller expected.
        expected: String,
        /// The listed name.
        name: &'a str,
    },
    /// The address is not listed.
    Untrusted(AllowlistError),
}

impl Validation<'_> {
    /// Whether the address may be called.
    pub const fn is_valid(&self) -> bool {
        !matches!(self, Self::Untrusted(_))
    }

    /// Why the address was rejected, if it was.
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Untrusted(err) => Some(err.to_string()),
            _ => None,
        }
    }
}

/// Contracts trusted per chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allowlist(HashMap<(ChainId, Address), String>);

impl Allowlist {
    /// An allowlist with no entries.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Adds `entries`, rejecting the zero address and duplicates.
    pub fn extend<I>(&mut self, entries: I) -> Result<(), AllowlistError>
    where
        I: IntoIterator<Item = TrustedContract>,
    {
        for entry in entries {
            let invalid = |reason| AllowlistError::InvalidEntry {
                chain_id: entry.chain_id,
                name: entry.name.clone(),
                reason,
            };
            if entry.address.is_zero() {
                return Err(invalid("zero address"));
            }
            if self.0.contains_key(&(entry.chain_id, entry.address)) {
                return Err(invalid("duplicate address"));
            }
            self.0.insert((entry.chain_id, entry.address), entry.name);
        }
        Ok(())
    }

    /// The built-in entries followed by `extra`.
    pub fn with_extra<I>(extra: I) -> Result<Self, AllowlistError>
    where
        I: IntoIterator<Item = TrustedContract>,
    {
        let mut allowlist = Self::default();
        allowlist.extend(extra)?;
        Ok(allowlist)
    }

    /// Returns the name `address` is listed under on `chain_id`.
    pub fn get(&self, chain_id: ChainId, address: Address) -> Option<&str> {
        self.0.get(&(chain_id, address)).map(String::as_str)
    }

    /// Returns all entries of `chain_id`.
    pub fn entries(&self, chain_id: ChainId) -> impl Iterator<Item = (Address, &str)> {
        self.0
            .iter()
            .filter(move |((chain, _), _)| *chain == chain_id)
            .map(|((_, address), name)| (*address, name.as_str()))
    }

    /// Checks `address` against the entries of `chain_id`.
    ///
    /// A listed address under an unexpected name is logged and still valid.
    pub fn validate(
        &self,
        chain_id: ChainId,
        address: Address,
        expected_name: Option<&str>,
    ) -> Validation<'_> {
        let Some(name) = self.get(chain_id, address) else {
            return Validation::Untrusted(AllowlistError::Untrusted { chain_id, address });
        };

        match expected_name {
            Some(expected) if !expected.eq_ignore_ascii_case(name) => {
                warn!(chain_id, %address, expected, name, "Trusted contract name mismatch");
                Validation::NameMismatch { expected: expected.to_string(), name }
            }
            _ => Validation::Trusted { name },
        }
    }

    /// Fails unless `address` is listed on `chain_id`.
    pub fn assert_trusted(
        &self,
        chain_id: ChainId,
        address: Address,
        expected_name: Option<&str>,
    ) -> Result<(), AllowlistError> {
        match self.validate(chain_id, address, expected_name) {
            Validation::Untrusted(err) => Err(err),
            _ => Ok(()),
        }
    }
}

impl Default for Allowlist {
    fn default() -> Self {
        let base: ChainId = Chain::base_mainnet().id();
        let base_sepolia: ChainId = Chain::base_sepolia().id();

        Self(
            [
                // Base
                ((base, address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913")), "USDC"),
                ((base, address!("0xd9aAEc86B65D86f6A7B5B1b0c42FFA531710b6CA")), "USDbC"),
                ((base, address!("0x4200000000000000000000000000000000000006")), "WETH"),
                ((base, address!("0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789")), "EntryPoint"),
                // Base Sepolia
                ((base_sepolia, address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e")), "USDC"),
                ((base_sepolia, address!("0x4200000000000000000000000000000000000006")), "WETH"),
                (
                    (base_sepolia, address!("0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789")),
                    "EntryPoint",
                ),
            ]
            .into_iter()
            .map(|(key, name)| (key, name.to_string()))
            .collect(),
        )
    }
}
