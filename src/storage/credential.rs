use super::{KeyValueStore, Result};
use crate::{
    codec::P256PublicKey,
    constants::{EVENT_CHANNEL_CAPACITY, LEGACY_CREDENTIAL_ID_KEY, LEGACY_PUBLIC_KEY_KEY},
    error::StorageError,
    types::BiometricCredential,
};
use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

const CREDENTIAL_PREFIX: &str = "credential:";
const ACTIVE_KEY: &str = "active_credential";

/// A change to the stored credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialEvent {
    /// A credential was registered and stored.
    Registered {
        /// The credential id.
        credential_id: String,
    },
    /// A wallet address was linked to a credential.
    WalletLinked {
        /// The credential id.
        credential_id: String,
        /// The smart account.
        wallet_address: Address,
    },
    /// A credential produced a signature.
    Used {
        /// The credential id.
        credential_id: String,
        /// When.
        at: DateTime<Utc>,
    },
    /// The active credential was removed.
    Cleared {
        /// The credential id.
        credential_id: String,
    },
    /// A credential was imported from the legacy flat layout.
    Migrated {
        /// The credential id.
        credential_id: String,
    },
}

/// Stores [`BiometricCredential`]s keyed by credential id, and tracks the active one.
///
/// Every change is published to subscribers. A subscriber receives the events emitted after it
/// subscribed, in order. One that falls more than the channel capacity behind loses the oldest.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
    events: broadcast::Sender<CredentialEvent>,
}

impl CredentialStore {
    /// Creates a credential store over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { store, events }
    }

    /// Subscribes to credential events.
    pub fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: CredentialEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    async fn write(&self, credential: &BiometricCredential) -> Result<()> {
        let key = format!("{CREDENTIAL_PREFIX}{}", credential.credential_id);
        self.store.set(&key, serde_json::to_string(credential)?).await
    }

    /// Stores `credential` and makes it the active one.
    pub async fn save(&self, credential: &BiometricCredential) -> Result<()> {
        self.write(credential).await?;
        self.store.set(ACTIVE_KEY, credential.credential_id.clone()).await?;
        debug!(credential_id = %credential.credential_id, "Stored credential");
        self.emit(CredentialEvent::Registered { credential_id: credential.credential_id.clone() });
        Ok(())
    }

    /// Reads the credential stored under `credential_id`.
    pub async fn get(&self, credential_id: &str) -> Result<Option<BiometricCredential>> {
        let key = format!("{CREDENTIAL_PREFIX}{credential_id}");
        let Some(raw) = self.store.get(&key).await? else { return Ok(None) };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Lists the ids of all stored credentials.
    pub async fn credential_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .keys(CREDENTIAL_PREFIX)
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(CREDENTIAL_PREFIX).map(str::to_string))
            .collect())
    }

    /// Reads the active credential.
    ///
    /// Falls back to importing a credential stored in the legacy layout.
    pub async fn load(&self) -> Result<Option<BiometricCredential>> {
        if let Some(active) = self.store.get(ACTIVE_KEY).await? {
            return self.get(&active).await;
        }
        self.migrate_legacy().await
    }

    async fn update(
        &self,
        credential_id: &str,
        f: impl FnOnce(&mut BiometricCredential),
    ) -> Result<BiometricCredential> {
        let mut credential = self
            .get(credential_id)
            .await?
            .ok_or_else(|| StorageError::CredentialNotFound(credential_id.to_string()))?;
        f(&mut credential);
        self.write(&credential).await?;
        Ok(credential)
    }

    /// Records the wallet derived from `credential_id`.
    pub async fn link_wallet(
        &self,
        credential_id: &str,
        wallet_address: Address,
    ) -> Result<BiometricCredential> {
        let credential =
            self.update(credential_id, |c| c.wallet_address = Some(wallet_address)).await?;
        self.emit(CredentialEvent::WalletLinked {
            credential_id: credential_id.to_string(),
            wallet_address,
        });
        Ok(credential)
    }

    /// Records that `credential_id` just signed.
    pub async fn mark_used(&self, credential_id: &str) -> Result<BiometricCredential> {
        let at = Utc::now();
        let credential = self.update(credential_id, |c| c.last_used_at = Some(at)).await?;
        self.emit(CredentialEvent::Used { credential_id: credential_id.to_string(), at });
        Ok(credential)
    }

    /// Removes the active credential. Returns its id, if there was one.
    pub async fn clear(&self) -> Result<Option<String>> {
        let Some(active) = self.store.get(ACTIVE_KEY).await? else { return Ok(None) };
        self.store.remove(&format!("{CREDENTIAL_PREFIX}{active}")).await?;
        self.store.remove(ACTIVE_KEY).await?;
        info!(credential_id = %active, "Cleared credential");
        self.emit(CredentialEvent::Cleared { credential_id: active.clone() });
        Ok(Some(active))
    }

    /// Imports a credential stored as a bare id plus a `{x, y}` JSON key.
    ///
    /// The legacy entries are removed once the credential is stored in the current layout.
    pub async fn migrate_legacy(&self) -> Result<Option<BiometricCredential>> {
        let Some(credential_id) = self.store.get(LEGACY_CREDENTIAL_ID_KEY).await? else {
            return Ok(None);
        };
        let corrupt = |reason: String| StorageError::Corrupt {
            key: LEGACY_PUBLIC_KEY_KEY.to_string(),
            reason,
        };

        let raw = self
            .store
            .get(LEGACY_PUBLIC_KEY_KEY)
            .await?
            .ok_or_else(|| corrupt("missing public key for legacy credential".into()))?;
        let key: P256PublicKey = serde_json::from_str(&raw)?;
        key.validate().map_err(|err| corrupt(err.to_string()))?;

        let credential = BiometricCredential::new(credential_id.clone(), key);
        self.write(&credential).await?;
        self.store.set(ACTIVE_KEY, credential_id.clone()).await?;
        self.store.remove(LEGACY_CREDENTIAL_ID_KEY).await?;
        self.store.remove(LEGACY_PUBLIC_KEY_KEY).await?;

        info!(%credential_id, "Migrated legacy credential");
        self.emit(CredentialEvent::Migrated { credential_id });
        Ok(Some(credential))
    }
}
