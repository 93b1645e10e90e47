//! Strict ASN.1 DER parsing of ECDSA P-256 signatures.

use crate::error::SignatureFormatError;
use alloy::primitives::{B256, U256, uint};
use serde::{Deserialize, Serialize};

/// The order `N` of the P-256 base point.
pub const P256_N: U256 =
    uint!(0xFFFFFFFF00000000FFFFFFFFFFFFFFFFBCE6FAADA7179E84F3B9CAC2FC632551_U256);

/// `N / 2`, the largest accepted low-S value.
pub const P256_HALF_N: U256 =
    uint!(0x7FFFFFFF800000007FFFFFFFFFFFFFFFDE737D56D38BCF4279DCE5617E3192A8_U256);

const TAG_SEQUENCE: u8 = 0x30;
const TAG_INTEGER: u8 = 0x02;

/// A P-256 ECDSA signature with both components in `(0, N)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct P256Signature {
    /// The `r` component.
    pub r: U256,
    /// The `s` component.
    pub s: U256,
}

impl P256Signature {
    /// Returns the signature with `s` in the lower half of the curve order.
    pub fn normalized(self) -> Self {
        Self { r: self.r, s: normalize_s(self.s) }
    }

    /// Whether `s` is in the lower half of the curve order.
    pub fn is_low_s(&self) -> bool {
        self.s <= P256_HALF_N
    }

    /// `r` as a big-endian word.
    pub fn r_bytes(&self) -> B256 {
        self.r.into()
    }

    /// `s` as a big-endian word.
    pub fn s_bytes(&self) -> B256 {
        self.s.into()
    }

    /// Encodes the signature as a DER `SEQUENCE { INTEGER r, INTEGER s }`.
    pub fn to_der(&self) -> Vec<u8> {
        let r = encode_integer(self.r);
        let s = encode_integer(self.s);
        let mut out = Vec::with_capacity(2 + r.len() + s.len());
        out.push(TAG_SEQUENCE);
        out.push((r.len() + s.len()) as u8);
        out.extend_from_slice(&r);
        out.extend_from_slice(&s);
        out
    }
}

/// Returns `N - s` if `s > N / 2`, `s` otherwise.
///
/// Both `(r, s)` and `(r, N - s)` verify, so only the low form is ever emitted.
pub fn normalize_s(s: U256) -> U256 {
    if s > P256_HALF_N { P256_N - s } else { s }
}

/// Parses a DER encoded P-256 signature and normalizes it to low-S.
///
/// The buffer must be exactly one `SEQUENCE` of two positive, minimally encoded `INTEGER`s, each
/// in `(0, N)`.
pub fn parse_der_signature(bytes: &[u8]) -> Result<P256Signature, SignatureFormatError> {
    let tag = *bytes.first().ok_or(SignatureFormatError::Truncated { offset: 0 })?;
    if tag != TAG_SEQUENCE {
        return Err(SignatureFormatError::UnexpectedTag {
            offset: 0,
            expected: TAG_SEQUENCE,
            found: tag,
        });
    }

    let content_len = read_length(bytes, 1)?;
    let declared = 2 + content_len;
    if declared > bytes.len() {
        return Err(SignatureFormatError::Truncated { offset: bytes.len() });
    }
    if declared != bytes.len() {
        return Err(SignatureFormatError::LengthMismatch { declared, actual: bytes.len() });
    }

    let mut pos = 2;
    let r = read_integer(bytes, &mut pos, "r")?;
    let s = read_integer(bytes, &mut pos, "s")?;

    if pos != bytes.len() {
        return Err(SignatureFormatError::TrailingBytes { count: bytes.len() - pos });
    }

    Ok(P256Signature { r, s }.normalized())
}

/// Reads a short-form length byte.
///
/// A P-256 signature never exceeds 72 bytes, so long-form lengths are never canonical.
fn read_length(bytes: &[u8], offset: usize) -> Result<usize, SignatureFormatError> {
    let len = *bytes.get(offset).ok_or(SignatureFormatError::Truncated { offset })?;
    if len & 0x80 != 0 {
        return Err(SignatureFormatError::NonCanonicalLength { offset });
    }
    Ok(len as usize)
}

fn read_integer(
    bytes: &[u8],
    pos: &mut usize,
    component: &'static str,
) -> Result<U256, SignatureFormatError> {
    let tag = *bytes.get(*pos).ok_or(SignatureFormatError::Truncated { offset: *pos })?;
    if tag != TAG_INTEGER {
        return Err(SignatureFormatError::UnexpectedTag {
            offset: *pos,
            expected: TAG_INTEGER,
            found: tag,
        });
    }

    let len = read_length(bytes, *pos + 1)?;
    let start = *pos + 2;
    let end = start + len;
    let content =
        bytes.get(start..end).ok_or(SignatureFormatError::Truncated { offset: bytes.len() })?;
    *pos = end;

    let invalid = |reason| SignatureFormatError::InvalidInteger { component, reason };
    let (first, rest) = content.split_first().ok_or_else(|| invalid("empty"))?;
    if first & 0x80 != 0 {
        return Err(invalid("negative"));
    }

    // The 0x00 pad is only allowed in front of a byte with the high bit set.
    let magnitude = if *first == 0 {
        match rest.first() {
            Some(next) if next & 0x80 != 0 => rest,
            Some(_) => return Err(invalid("non-minimal padding")),
            None => content,
        }
    } else {
        content
    };
    if magnitude.len() > 32 {
        return Err(invalid("wider than 256 bits"));
    }

    let value = U256::from_be_slice(magnitude);
    if value.is_zero() || value >= P256_N {
        return Err(SignatureFormatError::OutOfRange { component });
    }
    Ok(value)
}

fn encode_integer(value: U256) -> Vec<u8> {
    let be = value.to_be_bytes::<32>();
    let first = be.iter().position(|b| *b != 0).unwrap_or(31);
    let magnitude = &be[first..];

    let mut out = Vec::with_capacity(magnitude.len() + 3);
    out.push(TAG_INTEGER);
    if magnitude[0] & 0x80 != 0 {
        out.push(magnitude.len() as u8 + 1);
        out.push(0);
    } else {
        out.push(magnitude.len() as u8);
    }
    out.extend_from_slice(magnitude);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::hex;

    /// `r = 0x8001..01` (needs a pad byte), `s = N - 1` (high-S, needs a pad byte).
    const HIGH_S_DER: &str = concat!(
        "3046",
        "0221008001010101010101010101010101010101010101010101010101010101010101",
        "022100ffffffff00000000ffffffffffffffffbce6faada7179e84f3b9cac2fc632550",
    );

    #[test]
    fn parses_fixed_vector_to_low_s() {
        let sig = parse_der_signature(&hex::decode(HIGH_S_DER).unwrap()).unwrap();
        assert_eq!(
            sig.r,
            uint!(0x8001010101010101010101010101010101010101010101010101010101010101_U256)
        );
        assert_eq!(sig.s, U256::from(1));
        assert!(sig.is_low_s());
    }

    #[test]
    fn roundtrip_normalizes() {
        let cases = [
            (U256::from(1), U256::from(1)),
            (U256::from(0x7f), P256_HALF_N),
            (U256::from(0x80), P256_HALF_N + U256::from(1)),
            (P256_N - U256::from(1), P256_N - U256::from(1)),
            (
                uint!(0x00ff00000000000000000000000000000000000000000000000000000000ffff_U256),
                U256::from(256),
            ),
        ];
        for (r, s) in cases {
            let der = P256Signature { r, s }.to_der();
            let parsed = parse_der_signature(&der).unwrap();
            assert_eq!(parsed.r, r);
            assert_eq!(parsed.s, s.min(P256_N - s));
            assert!(parsed.is_low_s());
        }
    }

    #[test]
    fn normalize_s_boundaries() {
        assert_eq!(normalize_s(P256_HALF_N), P256_HALF_N);
        assert_eq!(normalize_s(P256_HALF_N + U256::from(1)), P256_HALF_N);
        assert_eq!(normalize_s(P256_N - U256::from(1)), U256::from(1));
    }

    #[test]
    fn rejects_malformed() {
        let valid = hex::decode(HIGH_S_DER).unwrap();

        assert_eq!(parse_der_signature(&[]), Err(SignatureFormatError::Truncated { offset: 0 }));
        assert_eq!(
            parse_der_signature(&valid[..valid.len() - 1]),
            Err(SignatureFormatError::Truncated { offset: valid.len() - 1 })
        );

        let mut wrong_tag = valid.clone();
        wrong_tag[0] = 0x31;
        assert_eq!(
            parse_der_signature(&wrong_tag),
            Err(SignatureFormatError::UnexpectedTag { offset: 0, expected: 0x30, found: 0x31 })
        );

        let mut trailing = valid.clone();
        trailing.push(0);
        assert_eq!(
            parse_der_signature(&trailing),
            Err(SignatureFormatError::LengthMismatch { declared: 72, actual: 73 })
        );

        let mut bad_int_tag = valid.clone();
        bad_int_tag[2] = 0x04;
        assert!(matches!(
            parse_der_signature(&bad_int_tag),
            Err(SignatureFormatError::UnexpectedTag { offset: 2, .. })
        ));

        let mut long_form = valid;
        long_form[1] = 0x81;
        assert_eq!(
            parse_der_signature(&long_form),
            Err(SignatureFormatError::NonCanonicalLength { offset: 1 })
        );
    }

    #[test]
    fn rejects_trailing_bytes_inside_sequence() {
        // SEQUENCE { INTEGER 1, INTEGER 1, 0x00 }
        let der = [0x30, 0x07, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01, 0x00];
        assert_eq!(
            parse_der_signature(&der),
            Err(SignatureFormatError::TrailingBytes { count: 1 })
        );
    }

    #[test]
    fn rejects_out_of_range_and_bad_integers() {
        let zero_r = [0x30, 0x06, 0x02, 0x01, 0x00, 0x02, 0x01, 0x01];
        assert_eq!(
            parse_der_signature(&zero_r),
            Err(SignatureFormatError::OutOfRange { component: "r" })
        );

        let n = P256Signature { r: U256::from(1), s: U256::from(1) }.to_der();
        let mut at_order = n[..5].to_vec();
        let mut s = vec![0x02, 0x21, 0x00];
        s.extend_from_slice(&P256_N.to_be_bytes::<32>());
        at_order.extend_from_slice(&s);
        at_order[1] = (at_order.len() - 2) as u8;
        assert_eq!(
            parse_der_signature(&at_order),
            Err(SignatureFormatError::OutOfRange { component: "s" })
        );

        let negative = [0x30, 0x06, 0x02, 0x01, 0x80, 0x02, 0x01, 0x01];
        assert_eq!(
            parse_der_signature(&negative),
            Err(SignatureFormatError::InvalidInteger { component: "r", reason: "negative" })
        );

        let padded = [0x30, 0x07, 0x02, 0x02, 0x00, 0x01, 0x02, 0x01, 0x01];
        assert_eq!(
            parse_der_signature(&padded),
            Err(SignatureFormatError::InvalidInteger {
                component: "r",
                reason: "non-minimal padding"
            })
        );

        let empty = [0x30, 0x05, 0x02, 0x00, 0x02, 0x01, 0x01];
        assert_eq!(
            parse_der_signature(&empty),
            Err(SignatureFormatError::InvalidInteger { component: "r", reason: "empty" })
        );
    }

    #[test]
    fn matches_p256_crate_encoding() {
        use p256::ecdsa::{Signature, SigningKey, signature::hazmat::PrehashSigner};

        let key = SigningKey::from_slice(&[7u8; 32]).unwrap();
        let sig: Signature = key.sign_prehash(&[42u8; 32]).unwrap();
        let parsed = parse_der_signature(sig.to_der().as_bytes()).unwrap();

        let low = sig.normalize_s().unwrap_or(sig);
        assert_eq!(parsed.r_bytes().as_slice(), low.r().to_bytes().as_slice());
        assert_eq!(parsed.s_bytes().as_slice(), low.s().to_bytes().as_slice());
    }
}
