use crate::{codec::P256PublicKey, error::KeyError};
use alloy::primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

/// Canonical owner encoding passed to the factory and hashed into the account address.
///
/// The exact same bytes must be used to compute the counterfactual address and to build the
/// deployment call, so this is the only place owners are turned into bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum OwnerBytes {
    /// An EOA or contract owner, encoded as a left-padded 32-byte word.
    Address(Address),
    /// A passkey owner, encoded as `x || y`.
    Passkey(P256PublicKey),
}

impl OwnerBytes {
    /// Returns the 32 or 64 byte encoding.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Address(address) => B256::left_padding_from(address.as_slice()).into(),
            Self::Passkey(key) => key.to_bytes(),
        }
    }

    /// Decodes an owner from its canonical encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        match bytes.len() {
            32 => {
                if bytes[..12].iter().any(|b| *b != 0) {
                    return Err(KeyError::MalformedKey("address owner has dirty padding".into()));
                }
                Ok(Self::Address(Address::from_slice(&bytes[12..])))
            }
            64 => P256PublicKey::new(B256::from_slice(&bytes[..32]), B256::from_slice(&bytes[32..]))
                .map(Self::Passkey),
            len => Err(KeyError::MalformedKey(format!("owner must be 32 or 64 bytes, got {len}"))),
        }
    }
}

impl From<P256PublicKey> for OwnerBytes {
    fn from(key: P256PublicKey) -> Self {
        Self::Passkey(key)
    }
}

impl From<Address> for OwnerBytes {
    fn from(address: Address) -> Self {
        Self::Address(address)
    }
}
