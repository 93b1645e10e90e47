use alloy::primitives::{Address, Bytes, U256};
use thiserror::Error;

/// Errors returned by the strict DER signature parser.
///
/// Every malformed input maps to exactly one variant; nothing is coerced into a usable result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureFormatError {
    /// The buffer ended before the structure was complete.
    #[error("truncated DER signature at offset {offset}")]
    Truncated {
        /// Offset at which more bytes were expected.
        offset: usize,
    },
    /// A tag byte did not match.
    #[error("unexpected DER tag at offset {offset}: expected {expected:#04x}, found {found:#04x}")]
    UnexpectedTag {
        /// Offset of the tag.
        offset: usize,
        /// The expected tag.
        expected: u8,
        /// The tag found.
        found: u8,
    },
    /// The declared sequence length does not cover the buffer exactly.
    #[error("DER length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch {
        /// Total length implied by the header.
        declared: usize,
        /// Length of the buffer.
        actual: usize,
    },
    /// A length is not in DER short form.
    #[error("non-canonical DER length at offset {offset}")]
    NonCanonicalLength {
        /// Offset of the length byte.
        offset: usize,
    },
    /// Bytes remain inside the sequence after `s`.
    #[error("{count} trailing bytes after DER integers")]
    TrailingBytes {
        /// Number of extra bytes.
        count: usize,
    },
    /// An integer is not a valid unsigned 256-bit DER integer.
    #[error("invalid DER integer {component}: {reason}")]
    InvalidInteger {
        /// `r` or `s`.
        component: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// An integer is zero or not below the curve order.
    #[error("signature component {component} out of range")]
    OutOfRange {
        /// `r` or `s`.
        component: &'static str,
    },
}

/// Errors returned when extracting a public key from an attestation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The attestation or COSE key is malformed.
    #[error("malformed key: {0}")]
    MalformedKey(String),
}

/// The locally computed counterfactual address diverges from the factory's.
///
/// Always fatal: deploying anyway would place the account where the client does not expect it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("address mismatch for owner {owner} salt {salt}: computed {computed}, factory {factory}")]
pub struct AddressMismatchError {
    /// Address computed locally.
    pub computed: Address,
    /// Address reported by the factory.
    pub factory: Address,
    /// The owner bytes used.
    pub owner: Bytes,
    /// The salt used.
    pub salt: U256,
}
