//! Software authenticator backed by in-memory P-256 keys.

use super::{
    Assertion, Authenticator, Capabilities, Registration, RegistrationOptions, client_data_json,
};
use crate::{
    codec::{P256PublicKey, P256Signature, encode_cose_key},
    constants::COSE_ALG_ES256,
    error::CredentialError,
};
use alloy::{
    primitives::{B256, U256},
    signers::k256::sha2::{Digest, Sha256},
};
use base64::Engine;
use ciborium::Value;
use dashmap::DashMap;
use p256::ecdsa::{Signature, SigningKey, signature::hazmat::PrehashSigner};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering},
};

/// User present.
const FLAG_UP: u8 = 0x01;
/// User verified.
const FLAG_UV: u8 = 0x04;
/// Attested credential data included.
const FLAG_AT: u8 = 0x40;

/// An [`Authenticator`] that keeps its keys in memory.
///
/// Produces the same artifacts as a platform authenticator: `none` attestation objects with a
/// COSE key, and DER signatures over `authenticatorData || sha256(clientDataJSON)`. Used for local
/// development and tests.
#[derive(Debug, Clone)]
pub struct SoftAuthenticator {
    origin: String,
    capabilities: Capabilities,
    keys: Arc<DashMap<String, Arc<SigningKey>>>,
    sign_count: Arc<AtomicU32>,
    deny_next: Arc<AtomicBool>,
}

impl SoftAuthenticator {
    /// Creates an authenticator signing for `origin`.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            capabilities: Capabilities {
                available: true,
                platform_authenticator: true,
                secure_enclave: false,
            },
            keys: Default::default(),
            sign_count: Default::default(),
            deny_next: Default::default(),
        }
    }

    /// Overrides the reported capabilities.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Imports an existing key under `credential_id`.
    pub fn with_key(self, credential_id: impl Into<String>, key: SigningKey) -> Self {
        self.keys.insert(credential_id.into(), Arc::new(key));
        self
    }

    /// Makes the next ceremony fail as if the user dismissed the prompt.
    pub fn deny_next(&self) {
        self.deny_next.store(true, Ordering::SeqCst);
    }

    /// Returns the public key of a credential.
    pub fn public_key(&self, credential_id: &str) -> Option<P256PublicKey> {
        self.keys.get(credential_id).map(|key| P256PublicKey::from(key.verifying_key()))
    }

    fn check_denied(&self) -> Result<(), CredentialError> {
        if self.deny_next.swap(false, Ordering::SeqCst) {
            return Err(CredentialError::Cancelled);
        }
        Ok(())
    }

    fn rp_id_hash(&self) -> [u8; 32] {
        let host = self.origin.split("://").last().unwrap_or(&self.origin);
        let host = host.split(':').next().unwrap_or(host);
        Sha256::digest(host.as_bytes()).into()
    }
}

#[async_trait::async_trait]
impl Authenticator for SoftAuthenticator {
    async fn check_support(&self) -> Capabilities {
        self.capabilities
    }

    async fn register(
        &self,
        options: &RegistrationOptions,
    ) -> Result<Registration, CredentialError> {
        self.check_denied()?;
        if !options.algorithms.contains(&COSE_ALG_ES256) {
            return Err(CredentialError::CreationFailed("ES256 was not requested".into()));
        }

        let key = SigningKey::from_slice(B256::random().as_slice())
            .map_err(|err| CredentialError::CreationFailed(err.to_string()))?;
        let raw_id = B256::random();
        let credential_id = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&raw_id[..16]);
        let public_key = P256PublicKey::from(key.verifying_key());

        let mut auth_data = Vec::with_capacity(37 + 18 + 16 + 77);
        auth_data.extend_from_slice(&Sha256::digest(options.rp_id.as_bytes()));
        auth_data.push(FLAG_UP | FLAG_UV | FLAG_AT);
        auth_data.extend_from_slice(&0u32.to_be_bytes());
        auth_data.extend_from_slice(&[0u8; 16]);
        auth_data.extend_from_slice(&16u16.to_be_bytes());
        auth_data.extend_from_slice(&raw_id[..16]);
        let cose_key = encode_cose_key(&public_key)
            .map_err(|err| CredentialError::CreationFailed(err.to_string()))?;
        auth_data.extend_from_slice(&cose_key);

        let object = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(vec![])),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]);
        let mut attestation_object = Vec::new();
        ciborium::into_writer(&object, &mut attestation_object)
            .map_err(|err| CredentialError::CreationFailed(err.to_string()))?;

        self.keys.insert(credential_id.clone(), Arc::new(key));

        Ok(Registration { credential_id, attestation_object: attestation_object.into() })
    }

    async fn authenticate(
        &self,
        credential_id: &str,
        challenge: B256,
    ) -> Result<Assertion, CredentialError> {
        self.check_denied()?;
        let key = self.keys.get(credential_id).map(|k| k.clone()).ok_or(CredentialError::NotFound)?;

        let count = self.sign_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut authenticator_data = Vec::with_capacity(37);
        authenticator_data.extend_from_slice(&self.rp_id_hash());
        authenticator_data.push(FLAG_UP | FLAG_UV);
        authenticator_data.extend_from_slice(&count.to_be_bytes());

        let client_data_json = client_data_json(challenge, &self.origin);

        // SHA256(authenticatorData || SHA256(clientDataJSON))
        let mut hasher = Sha256::new();
        hasher.update(&authenticator_data);
        hasher.update(Sha256::digest(client_data_json.as_bytes()));
        let digest = hasher.finalize();

        let signature: Signature = key
            .sign_prehash(&digest)
            .map_err(|err| CredentialError::CreationFailed(err.to_string()))?;

        // Platform authenticators do not normalize, so neither does this one.
        let (r, s) = signature.split_bytes();
        let der = P256Signature { r: U256::from_be_slice(&r), s: U256::from_be_slice(&s) }.to_der();

        Ok(Assertion {
            credential_id: credential_id.to_string(),
            authenticator_data: authenticator_data.into(),
            client_data_json,
            signature: der.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{extract_public_key, parse_authenticator_data, parse_der_signature};
    use p256::ecdsa::{VerifyingKey, signature::hazmat::PrehashVerifier};

    fn options() -> RegistrationOptions {
        RegistrationOptions::new("example.com", "Example", "user", "User")
    }

    #[tokio::test]
    async fn attestation_carries_registered_key() {
        let authenticator = SoftAuthenticator::new("https://example.com");
        let registration = authenticator.register(&options()).await.unwrap();

        let key = extract_public_key(&registration.attestation_object).unwrap();
        assert_eq!(Some(key), authenticator.public_key(&registration.credential_id));
    }

    #[tokio::test]
    async fn assertion_verifies_against_public_key() {
        let authenticator = SoftAuthenticator::new("https://example.com");
        let registration = authenticator.register(&options()).await.unwrap();
        let challenge = B256::repeat_byte(0x11);

        let assertion =
            authenticator.authenticate(&registration.credential_id, challenge).await.unwrap();
        let data = parse_authenticator_data(&assertion.authenticator_data).unwrap();
        assert!(data.user_verified());
        assert_eq!(data.sign_count, 1);
        assert_eq!(data.rp_id_hash.as_slice(), Sha256::digest(b"example.com").as_slice());

        let parsed = parse_der_signature(&assertion.signature).unwrap();
        let key = authenticator.public_key(&registration.credential_id).unwrap();
        let verifying_key = VerifyingKey::from_sec1_bytes(&key.to_sec1()).unwrap();
        let signature =
            Signature::from_scalars(parsed.r_bytes().0, parsed.s_bytes().0).unwrap();

        let mut hasher = Sha256::new();
        hasher.update(&assertion.authenticator_data);
        hasher.update(Sha256::digest(assertion.client_data_json.as_bytes()));
        verifying_key.verify_prehash(&hasher.finalize(), &signature).unwrap();
    }

    #[tokio::test]
    async fn denied_prompt_is_cancelled_once() {
        let authenticator = SoftAuthenticator::new("https://example.com");
        let registration = authenticator.register(&options()).await.unwrap();

        authenticator.deny_next();
        let err = authenticator
            .authenticate(&registration.credential_id, B256::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::Cancelled));
        assert!(authenticator.authenticate(&registration.credential_id, B256::ZERO).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_credential() {
        let authenticator = SoftAuthenticator::new("https://example.com");
        assert!(matches!(
            authenticator.authenticate("missing", B256::ZERO).await,
            Err(CredentialError::NotFound)
        ));
    }
}
