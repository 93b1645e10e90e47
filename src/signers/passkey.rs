use super::{PayloadSigner, encode_signature, webauthn_auth};
use crate::{
    codec::P256PublicKey,
    constants::FIRST_OWNER_INDEX,
    error::{CredentialError, WalletError},
    webauthn::{Assertion, Authenticator, encode_challenge},
};
use alloy::{
    primitives::{B256, Bytes, U256},
    signers::k256::sha2::{Digest, Sha256},
};
use p256::ecdsa::{Signature, VerifyingKey, signature::hazmat::PrehashVerifier};
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize)]
struct ClientData {
    origin: String,
}

/// Signs user operation hashes with a passkey.
///
/// The hash is passed as the WebAuthn challenge, so the biometric assertion commits to it.
#[derive(Debug, Clone)]
pub struct PasskeySigner<A> {
    authenticator: A,
    credential_id: String,
    public_key: P256PublicKey,
    owner_index: U256,
    origin: Option<String>,
}

impl<A: Authenticator> PasskeySigner<A> {
    /// Creates a signer for the given credential.
    ///
    /// Signatures reference owner index 0, the owner a fresh account is initialized with.
    pub fn new(
        authenticator: A,
        credential_id: impl Into<String>,
        public_key: P256PublicKey,
    ) -> Self {
        Self {
            authenticator,
            credential_id: credential_id.into(),
            public_key,
            owner_index: FIRST_OWNER_INDEX,
            origin: None,
        }
    }

    /// Only accepts assertions whose client data names `origin`.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// The credential id.
    pub fn credential_id(&self) -> &str {
        &self.credential_id
    }

    /// The credential public key.
    pub const fn public_key(&self) -> P256PublicKey {
        self.public_key
    }

    /// Checks that the assertion answers our challenge with our key.
    fn verify(&self, challenge: B256, assertion: &Assertion) -> Result<(), CredentialError> {
        if assertion.credential_id != self.credential_id {
            return Err(CredentialError::CredentialMismatch {
                expected: self.credential_id.clone(),
                got: assertion.credential_id.clone(),
            });
        }

        let expected = format!("\"challenge\":\"{}\"", encode_challenge(challenge));
        if !assertion.client_data_json.contains(&expected) {
            return Err(CredentialError::InvalidAssertion(
                "client data does not carry the requested challenge".into(),
            ));
        }

        let invalid = |reason: &str| CredentialError::InvalidAssertion(reason.to_string());
        if let Some(origin) = &self.origin {
            let client_data: ClientData = serde_json::from_str(&assertion.client_data_json)
                .map_err(|_| invalid("client data is not JSON"))?;
            if client_data.origin != *origin {
                return Err(CredentialError::InvalidAssertion(format!(
                    "client data origin {} is not {origin}",
                    client_data.origin
                )));
            }
        }

        let key = VerifyingKey::from_sec1_bytes(&self.public_key.to_sec1())
            .map_err(|_| invalid("registered key is not a P-256 point"))?;
        let signature = Signature::from_der(&assertion.signature)
            .map_err(|_| invalid("signature is not DER"))?;

        let mut hasher = Sha256::new();
        hasher.update(&assertion.authenticator_data);
        hasher.update(Sha256::digest(assertion.client_data_json.as_bytes()));
        key.verify_prehash(&hasher.finalize(), &signature)
            .map_err(|_| invalid("signature does not verify against the registered key"))
    }
}

#[async_trait::async_trait]
impl<A: Authenticator> PayloadSigner for PasskeySigner<A> {
    async fn sign_payload_hash(&self, payload_hash: B256) -> Result<Bytes, WalletError> {
        let assertion = self.authenticator.authenticate(&self.credential_id, payload_hash).await?;
        self.verify(payload_hash, &assertion)?;

        let auth = webauthn_auth(&assertion)?;
        debug!(credential_id = %self.credential_id, %payload_hash, "Signed with passkey");
        Ok(encode_signature(&auth, self.owner_index))
    }
}
