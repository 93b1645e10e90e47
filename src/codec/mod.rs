//! Signature and key codec.
//!
//! Conversions between the wire formats returned by WebAuthn authenticators (DER signatures,
//! CBOR attestation objects carrying COSE keys) and the fixed-width values the account contract
//! consumes.

mod address;
pub use address::derive_address;

mod cose;
pub use cose::{
    AttestedCredential, AuthenticatorData, P256PublicKey, decode_cose_key, encode_cose_key,
    extract_public_key, parse_authenticator_data,
};

mod der;
pub use der::{P256_HALF_N, P256_N, P256Signature, normalize_s, parse_der_signature};
