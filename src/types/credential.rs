use super::OwnerBytes;
use crate::{codec::P256PublicKey, error::KeyError};
use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered passkey and the smart account derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricCredential {
    /// The authenticator-issued credential id, base64url encoded.
    pub credential_id: String,
    /// The x coordinate of the public key.
    pub public_key_x: B256,
    /// The y coordinate of the public key.
    pub public_key_y: B256,
    /// The counterfactual smart account address, once derived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<Address>,
    /// When the credential was registered.
    pub created_at: DateTime<Utc>,
    /// When the credential last produced a signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl BiometricCredential {
    /// Creates a credential registered now.
    pub fn new(credential_id: impl Into<String>, public_key: P256PublicKey) -> Self {
        Self {
            credential_id: credential_id.into(),
            public_key_x: public_key.x,
            public_key_y: public_key.y,
            wallet_address: None,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    /// Returns the public key, checking it is on the curve.
    pub fn public_key(&self) -> Result<P256PublicKey, KeyError> {
        P256PublicKey::new(self.public_key_x, self.public_key_y)
    }

    /// Returns the owner encoding of this credential.
    pub fn owner(&self) -> Result<OwnerBytes, KeyError> {
        self.public_key().map(OwnerBytes::Passkey)
    }

    /// Sets the wallet address.
    pub fn with_wallet_address(mut self, address: Address) -> Self {
        self.wallet_address = Some(address);
        self
    }
}
