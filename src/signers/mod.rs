//! Wallet signers.

use crate::{
    codec::{P256_HALF_N, P256_N, parse_der_signature},
    constants::FIRST_OWNER_INDEX,
    error::{CredentialError, WalletError},
    types::{SignatureWrapper, WebAuthnAuth},
    webauthn::{Assertion, client_data_json},
};
use alloy::{
    primitives::{B256, Bytes, U256},
    sol_types::SolValue,
};

mod passkey;
pub use passkey::PasskeySigner;

/// Trait for a user operation hash signer.
#[async_trait::async_trait]
pub trait PayloadSigner: std::fmt::Debug + Send + Sync {
    /// Signs the user operation hash.
    ///
    /// Returns the account-specific signature, ready for the `signature` field.
    async fn sign_payload_hash(&self, payload_hash: B256) -> Result<Bytes, WalletError>;

    /// A signature of the same shape and size as a real one, for gas estimation.
    fn dummy_signature(&self) -> Bytes {
        dummy_signature()
    }
}

/// Converts an assertion into the `WebAuthnAuth` the account verifies.
///
/// The DER signature is parsed strictly and normalized to low-S.
pub fn webauthn_auth(assertion: &Assertion) -> Result<WebAuthnAuth, WalletError> {
    let signature = parse_der_signature(&assertion.signature)?;
    let json = &assertion.client_data_json;

    let index = |needle: &str| {
        json.find(needle).map(U256::from).ok_or_else(|| {
            CredentialError::InvalidAssertion(format!("client data has no {needle} field"))
        })
    };

    Ok(WebAuthnAuth {
        authenticatorData: assertion.authenticator_data.clone(),
        clientDataJSON: json.clone(),
        challengeIndex: index("\"challenge\":")?,
        typeIndex: index("\"type\":")?,
        r: signature.r,
        s: signature.s,
    })
}

/// Wraps a `WebAuthnAuth` for the owner at `owner_index`.
pub fn encode_signature(auth: &WebAuthnAuth, owner_index: U256) -> Bytes {
    SignatureWrapper { ownerIndex: owner_index, signatureData: auth.abi_encode().into() }
        .abi_encode()
        .into()
}

/// Returns a structurally valid signature with realistic sizes.
///
/// Bundlers simulate validation to estimate `verificationGasLimit` and `preVerificationGas`, so
/// the placeholder must encode to the same length as the real assertion.
pub fn dummy_signature() -> Bytes {
    // rpIdHash || UserPresent | UserVerified || SignatureCounter
    let mut authenticator_data = vec![0x49; 32];
    authenticator_data.extend_from_slice(&[0x05, 0, 0, 0, 0]);

    let client_data_json = client_data_json(B256::ZERO, "https://passkey.invalid");
    let challenge_index = client_data_json.find("\"challenge\":").unwrap_or_default();
    let type_index = client_data_json.find("\"type\":").unwrap_or_default();

    let auth = WebAuthnAuth {
        authenticatorData: authenticator_data.into(),
        clientDataJSON: client_data_json,
        challengeIndex: U256::from(challenge_index),
        typeIndex: U256::from(type_index),
        r: P256_N - U256::from(1),
        s: P256_HALF_N,
    };
    encode_signature(&auth, FIRST_OWNER_INDEX)
}
