//! WebAuthn bridge.
//!
//! The [`Authenticator`] trait is the boundary to the platform credential API
//! (`navigator.credentials.create/get` in a browser). Everything past it speaks raw bytes: the
//! CBOR attestation object on registration, and the authenticator data, client data JSON and DER
//! signature on assertion.

use crate::{
    codec::{P256PublicKey, extract_public_key},
    constants::{COSE_ALG_ES256, COSE_ALG_RS256},
    error::{CredentialError, WalletError},
    types::BiometricCredential,
};
use alloy::primitives::{B256, Bytes};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, sync::Arc, time::Duration};
use tracing::debug;

mod soft;
pub use soft::SoftAuthenticator;

mod support;
pub use support::{SupportChanged, SupportMonitor, SupportObserver};

/// What the platform can do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// The WebAuthn API is present.
    pub available: bool,
    /// A user-verifying platform authenticator is present.
    pub platform_authenticator: bool,
    /// Keys live in a secure enclave.
    pub secure_enclave: bool,
}

impl Capabilities {
    /// Whether a passkey can be registered and used.
    pub fn is_supported(&self) -> bool {
        self.available && self.platform_authenticator
    }
}

/// User verification requirement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerification {
    /// Biometric or PIN verification is mandatory.
    #[default]
    Required,
    /// Verification is performed if available.
    Preferred,
}

/// Parameters of a registration ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    /// Relying party id, usually the site domain.
    pub rp_id: String,
    /// Relying party display name.
    pub rp_name: String,
    /// Opaque user handle.
    pub user_id: String,
    /// Name shown in the platform prompt.
    pub display_name: String,
    /// COSE algorithms in order of preference.
    pub algorithms: Vec<i64>,
    /// User verification requirement.
    pub user_verification: UserVerification,
}

impl RegistrationOptions {
    /// Creates options requesting ES256 with an RS256 fallback and mandatory user verification.
    pub fn new(
        rp_id: impl Into<String>,
        rp_name: impl Into<String>,
        user_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            rp_id: rp_id.into(),
            rp_name: rp_name.into(),
            user_id: user_id.into(),
            display_name: display_name.into(),
            algorithms: vec![COSE_ALG_ES256, COSE_ALG_RS256],
            user_verification: UserVerification::Required,
        }
    }
}

/// A freshly created credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// The credential id, base64url encoded.
    pub credential_id: String,
    /// The CBOR attestation object.
    pub attestation_object: Bytes,
}

/// A signed assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    /// The credential that signed, base64url encoded.
    pub credential_id: String,
    /// Raw authenticator data.
    pub authenticator_data: Bytes,
    /// The client data JSON exactly as signed.
    pub client_data_json: String,
    /// DER encoded ECDSA signature over `authenticatorData || sha256(clientDataJSON)`.
    pub signature: Bytes,
}

/// A platform authenticator.
#[async_trait::async_trait]
pub trait Authenticator: Debug + Send + Sync {
    /// Reports what the platform supports. Has no side effects.
    async fn check_support(&self) -> Capabilities;

    /// Creates a new ES256 credential.
    async fn register(&self, options: &RegistrationOptions)
    -> Result<Registration, CredentialError>;

    /// Prompts the user and signs `challenge` with the given credential.
    ///
    /// The challenge carries the application hash, which is what turns the assertion into a
    /// transaction signature.
    async fn authenticate(
        &self,
        credential_id: &str,
        challenge: B256,
    ) -> Result<Assertion, CredentialError>;
}

#[async_trait::async_trait]
impl<T: Authenticator + ?Sized> Authenticator for Arc<T> {
    async fn check_support(&self) -> Capabilities {
        (**self).check_support().await
    }

    async fn register(
        &self,
        options: &RegistrationOptions,
    ) -> Result<Registration, CredentialError> {
        (**self).register(options).await
    }

    async fn authenticate(
        &self,
        credential_id: &str,
        challenge: B256,
    ) -> Result<Assertion, CredentialError> {
        (**self).authenticate(credential_id, challenge).await
    }
}

/// Bounds every ceremony of the inner authenticator.
///
/// Expiry maps to [`CredentialError::Timeout`].
#[derive(Debug, Clone)]
pub struct TimeoutAuthenticator<A> {
    inner: A,
    timeout: Duration,
}

impl<A> TimeoutAuthenticator<A> {
    /// Wraps `inner`.
    pub const fn new(inner: A, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Returns the wrapped authenticator.
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// The bound on each ceremony.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait::async_trait]
impl<A: Authenticator> Authenticator for TimeoutAuthenticator<A> {
    async fn check_support(&self) -> Capabilities {
        self.inner.check_support().await
    }

    async fn register(
        &self,
        options: &RegistrationOptions,
    ) -> Result<Registration, CredentialError> {
        tokio::time::timeout(self.timeout, self.inner.register(options))
            .await
            .map_err(|_| CredentialError::Timeout(self.timeout))?
    }

    async fn authenticate(
        &self,
        credential_id: &str,
        challenge: B256,
    ) -> Result<Assertion, CredentialError> {
        tokio::time::timeout(self.timeout, self.inner.authenticate(credential_id, challenge))
            .await
            .map_err(|_| CredentialError::Timeout(self.timeout))?
    }
}

/// Runs a registration ceremony and extracts the credential public key.
pub async fn register_credential<A: Authenticator + ?Sized>(
    authenticator: &A,
    options: &RegistrationOptions,
) -> Result<BiometricCredential, WalletError> {
    let capabilities = authenticator.check_support().await;
    if !capabilities.is_supported() {
        return Err(CredentialError::NotSupported(
            "no user-verifying platform authenticator".into(),
        )
        .into());
    }

    let registration = authenticator.register(options).await?;
    let public_key: P256PublicKey = extract_public_key(&registration.attestation_object)?;
    debug!(
        credential_id = %registration.credential_id,
        address = %public_key.address(),
        "Registered passkey"
    );

    Ok(BiometricCredential::new(registration.credential_id, public_key))
}

/// Encodes a challenge the way browsers put it in the client data.
pub fn encode_challenge(challenge: B256) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(challenge)
}

/// Builds `webauthn.get` client data JSON for `challenge`.
pub fn client_data_json(challenge: B256, origin: &str) -> String {
    serde_json::json!({
        "type": "webauthn.get",
        "challenge": encode_challenge(challenge),
        "origin": origin,
        "crossOrigin": false
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Stalled;

    #[async_trait::async_trait]
    impl Authenticator for Stalled {
        async fn check_support(&self) -> Capabilities {
            Capabilities { available: true, platform_authenticator: true, secure_enclave: true }
        }

        async fn register(
            &self,
            _options: &RegistrationOptions,
        ) -> Result<Registration, CredentialError> {
            futures_util::future::pending().await
        }

        async fn authenticate(
            &self,
            _credential_id: &str,
            _challenge: B256,
        ) -> Result<Assertion, CredentialError> {
            futures_util::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ceremonies_time_out() {
        let authenticator = TimeoutAuthenticator::new(Stalled, Duration::from_secs(60));
        let err = authenticator.authenticate("id", B256::ZERO).await.unwrap_err();
        assert!(matches!(err, CredentialError::Timeout(d) if d == Duration::from_secs(60)));

        let options = RegistrationOptions::new("example.com", "Example", "user", "User");
        let err = authenticator.register(&options).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn challenge_is_base64url_without_padding() {
        let challenge = B256::repeat_byte(0xff);
        let encoded = encode_challenge(challenge);
        assert_eq!(encoded.len(), 43);
        assert!(!encoded.contains('=') && !encoded.contains('+') && !encoded.contains('/'));

        let json = client_data_json(challenge, "https://example.com");
        assert!(json.contains(&format!("\"challenge\":\"{encoded}\"")));
        assert!(json.contains("\"type\":\"webauthn.get\""));
    }

    #[tokio::test]
    async fn registration_extracts_public_key() {
        let authenticator = SoftAuthenticator::new("https://example.com");
        let options = RegistrationOptions::new("example.com", "Example", "user", "User");
        let credential = register_credential(&authenticator, &options).await.unwrap();

        let key = authenticator.public_key(&credential.credential_id).unwrap();
        assert_eq!(credential.public_key().unwrap(), key);
        assert!(credential.wallet_address.is_none());
    }

    #[tokio::test]
    async fn registration_requires_platform_support() {
        let authenticator = SoftAuthenticator::new("https://example.com")
            .with_capabilities(Capabilities::default());
        let options = RegistrationOptions::new("example.com", "Example", "user", "User");
        let err = register_credential(&authenticator, &options).await.unwrap_err();
        assert!(matches!(err, WalletError::Credential(CredentialError::NotSupported(_))));
    }
}
