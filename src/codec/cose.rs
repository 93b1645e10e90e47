//! CBOR attestation objects and COSE keys.
//!
//! See <https://www.w3.org/TR/webauthn-2/#sctn-attestation> for the layout of the attestation
//! object and the authenticator data it carries.

use super::derive_address;
use crate::error::KeyError;
use alloy::primitives::{Address, B256, Bytes};
use ciborium::Value;
use serde::{Deserialize, Serialize};

/// COSE key parameter labels.
const COSE_KTY: i128 = 1;
const COSE_ALG: i128 = 3;
const COSE_CRV: i128 = -1;
const COSE_X: i128 = -2;
const COSE_Y: i128 = -3;

const COSE_KTY_EC2: i128 = 2;
const COSE_CRV_P256: i128 = 1;

/// Attested credential data is included.
const FLAG_AT: u8 = 0x40;

/// rpIdHash (32) || flags (1) || signCount (4).
const AUTH_DATA_HEADER_LEN: usize = 37;
const AAGUID_LEN: usize = 16;

/// An uncompressed P-256 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct P256PublicKey {
    /// The x coordinate.
    pub x: B256,
    /// The y coordinate.
    pub y: B256,
}

impl P256PublicKey {
    /// Creates a key from its coordinates, checking that the point is on the curve.
    pub fn new(x: B256, y: B256) -> Result<Self, KeyError> {
        let key = Self { x, y };
        key.validate()?;
        Ok(key)
    }

    /// Checks that the point is on the P-256 curve.
    pub fn validate(&self) -> Result<(), KeyError> {
        p256::PublicKey::from_sec1_bytes(&self.to_sec1())
            .map(drop)
            .map_err(|_| KeyError::MalformedKey("point is not on the P-256 curve".into()))
    }

    /// Returns the SEC1 uncompressed encoding `0x04 || x || y`.
    pub fn to_sec1(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[0] = 0x04;
        out[1..33].copy_from_slice(self.x.as_slice());
        out[33..].copy_from_slice(self.y.as_slice());
        out
    }

    /// Returns `x || y`.
    pub fn to_bytes(&self) -> Bytes {
        [self.x.as_slice(), self.y.as_slice()].concat().into()
    }

    /// Returns the address derived from this key.
    pub fn address(&self) -> Address {
        derive_address(self.x, self.y)
    }
}

impl From<&p256::ecdsa::VerifyingKey> for P256PublicKey {
    fn from(key: &p256::ecdsa::VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let bytes = point.as_bytes();
        Self { x: B256::from_slice(&bytes[1..33]), y: B256::from_slice(&bytes[33..65]) }
    }
}

/// Attested credential data found in the authenticator data of a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredential {
    /// The authenticator model.
    pub aaguid: [u8; AAGUID_LEN],
    /// The raw credential id.
    pub credential_id: Bytes,
    /// The credential public key.
    pub public_key: P256PublicKey,
}

/// Parsed authenticator data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    /// SHA-256 of the relying party id.
    pub rp_id_hash: B256,
    /// The flags byte.
    pub flags: u8,
    /// The signature counter.
    pub sign_count: u32,
    /// Present on registration only.
    pub attested_credential: Option<AttestedCredential>,
}

impl AuthenticatorData {
    /// User present.
    pub fn user_present(&self) -> bool {
        self.flags & 0x01 != 0
    }

    /// User verified (biometric or PIN).
    pub fn user_verified(&self) -> bool {
        self.flags & 0x04 != 0
    }
}

/// Extracts the P-256 public key from a CBOR attestation object.
pub fn extract_public_key(attestation_object: &[u8]) -> Result<P256PublicKey, KeyError> {
    let value: Value = ciborium::from_reader(attestation_object)
        .map_err(|err| malformed(format!("attestation object is not CBOR: {err}")))?;
    let map = value.as_map().ok_or_else(|| malformed("attestation object is not a map"))?;

    let auth_data = map
        .iter()
        .find(|(k, _)| k.as_text() == Some("authData"))
        .and_then(|(_, v)| v.as_bytes())
        .ok_or_else(|| malformed("attestation object has no authData"))?;

    parse_authenticator_data(auth_data)?
        .attested_credential
        .map(|credential| credential.public_key)
        .ok_or_else(|| malformed("authenticator data carries no attested credential"))
}

/// Parses raw authenticator data.
pub fn parse_authenticator_data(data: &[u8]) -> Result<AuthenticatorData, KeyError> {
    if data.len() < AUTH_DATA_HEADER_LEN {
        return Err(malformed(format!("authenticator data too short: {} bytes", data.len())));
    }

    let rp_id_hash = B256::from_slice(&data[..32]);
    let flags = data[32];
    let sign_count = u32::from_be_bytes([data[33], data[34], data[35], data[36]]);

    let attested_credential = if flags & FLAG_AT != 0 {
        let rest = &data[AUTH_DATA_HEADER_LEN..];
        if rest.len() < AAGUID_LEN + 2 {
            return Err(malformed("attested credential data truncated"));
        }
        let mut aaguid = [0u8; AAGUID_LEN];
        aaguid.copy_from_slice(&rest[..AAGUID_LEN]);

        let id_len = u16::from_be_bytes([rest[AAGUID_LEN], rest[AAGUID_LEN + 1]]) as usize;
        let id_start = AAGUID_LEN + 2;
        let credential_id = rest
            .get(id_start..id_start + id_len)
            .ok_or_else(|| malformed("credential id truncated"))?;

        // The COSE key is followed by optional extensions, `from_reader` stops after one item.
        let public_key = decode_cose_key(&rest[id_start + id_len..])?;

        Some(AttestedCredential {
            aaguid,
            credential_id: Bytes::copy_from_slice(credential_id),
            public_key,
        })
    } else {
        None
    };

    Ok(AuthenticatorData { rp_id_hash, flags, sign_count, attested_credential })
}

/// Decodes an EC2 P-256 COSE key.
///
/// Coordinates shorter than 32 bytes are left-padded.
pub fn decode_cose_key(bytes: &[u8]) -> Result<P256PublicKey, KeyError> {
    let value: Value = ciborium::from_reader(bytes)
        .map_err(|err| malformed(format!("COSE key is not CBOR: {err}")))?;
    let map = value.as_map().ok_or_else(|| malformed("COSE key is not a map"))?;

    let param = |label: i128| {
        map.iter()
            .find(|(k, _)| k.as_integer().map(i128::from) == Some(label))
            .map(|(_, v)| v)
    };
    let int_param = |label: i128| param(label).and_then(Value::as_integer).map(i128::from);

    match int_param(COSE_KTY) {
        Some(COSE_KTY_EC2) => {}
        Some(kty) => return Err(malformed(format!("unsupported COSE key type {kty}"))),
        None => return Err(malformed("COSE key has no key type")),
    }
    if let Some(alg) = int_param(COSE_ALG)
        && alg != i128::from(crate::constants::COSE_ALG_ES256)
    {
        return Err(malformed(format!("unsupported COSE algorithm {alg}")));
    }
    if let Some(crv) = int_param(COSE_CRV)
        && crv != COSE_CRV_P256
    {
        return Err(malformed(format!("unsupported COSE curve {crv}")));
    }

    let coordinate = |label: i128, name: &str| -> Result<B256, KeyError> {
        let bytes = param(label)
            .and_then(Value::as_bytes)
            .ok_or_else(|| malformed(format!("COSE key has no {name} coordinate")))?;
        if bytes.len() > 32 {
            return Err(malformed(format!("{name} coordinate is {} bytes", bytes.len())));
        }
        Ok(B256::left_padding_from(bytes))
    };

    P256PublicKey::new(coordinate(COSE_X, "x")?, coordinate(COSE_Y, "y")?)
}

/// Encodes a P-256 public key as an ES256 COSE key.
pub fn encode_cose_key(key: &P256PublicKey) -> Result<Vec<u8>, KeyError> {
    let value = Value::Map(vec![
        (Value::from(COSE_KTY as i64), Value::from(COSE_KTY_EC2 as i64)),
        (Value::from(COSE_ALG as i64), Value::from(crate::constants::COSE_ALG_ES256)),
        (Value::from(COSE_CRV as i64), Value::from(COSE_CRV_P256 as i64)),
        (Value::from(COSE_X as i64), Value::Bytes(key.x.to_vec())),
        (Value::from(COSE_Y as i64), Value::Bytes(key.y.to_vec())),
    ]);
    let mut out = Vec::new();
    ciborium::into_writer(&value, &mut out).map_err(|err| malformed(err.to_string()))?;
    Ok(out)
}

fn malformed(reason: impl Into<String>) -> KeyError {
    KeyError::MalformedKey(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::b256;

    const GX: B256 = b256!("0x6B17D1F2E12C4247F8BCE6E563A440F277037D812DEB33A0F4A13945D898C296");
    const GY: B256 = b256!("0x4FE342E2FE1A7F9B8EE7EB4A7C0F9E162BCE33576B315ECECBB6406837BF51F5");

    fn attestation(auth_data: Vec<u8>) -> Vec<u8> {
        let value = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(vec![])),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]);
        let mut out = Vec::new();
        ciborium::into_writer(&value, &mut out).unwrap();
        out
    }

    fn auth_data(cose_key: &[u8], extensions: &[u8]) -> Vec<u8> {
        let mut data = vec![0xAA; 32];
        data.push(0x45 | if extensions.is_empty() { 0 } else { 0x80 });
        data.extend_from_slice(&7u32.to_be_bytes());
        data.extend_from_slice(&[0u8; 16]);
        data.extend_from_slice(&4u16.to_be_bytes());
        data.extend_from_slice(&[1, 2, 3, 4]);
        data.extend_from_slice(cose_key);
        data.extend_from_slice(extensions);
        data
    }

    fn cose(entries: Vec<(i64, Value)>) -> Vec<u8> {
        let value = Value::Map(entries.into_iter().map(|(k, v)| (Value::from(k), v)).collect());
        let mut out = Vec::new();
        ciborium::into_writer(&value, &mut out).unwrap();
        out
    }

    #[test]
    fn extracts_generator_point() {
        let key = P256PublicKey { x: GX, y: GY };
        let object = attestation(auth_data(&encode_cose_key(&key).unwrap(), &[]));
        assert_eq!(extract_public_key(&object).unwrap(), key);
    }

    #[test]
    fn encoded_key_decodes_back() {
        let key = P256PublicKey { x: GX, y: GY };
        let encoded = encode_cose_key(&key).unwrap();
        assert_eq!(decode_cose_key(&encoded).unwrap(), key);
    }

    #[test]
    fn parses_authenticator_data_with_extensions() {
        let key = P256PublicKey { x: GX, y: GY };
        let mut extensions = Vec::new();
        ciborium::into_writer(
            &Value::Map(vec![(Value::Text("credProtect".into()), Value::from(2))]),
            &mut extensions,
        )
        .unwrap();

        let cose_key = encode_cose_key(&key).unwrap();
        let data = parse_authenticator_data(&auth_data(&cose_key, &extensions)).unwrap();
        assert!(data.user_present());
        assert!(data.user_verified());
        assert_eq!(data.sign_count, 7);
        let credential = data.attested_credential.unwrap();
        assert_eq!(credential.credential_id, Bytes::from(vec![1, 2, 3, 4]));
        assert_eq!(credential.public_key, key);
    }

    #[test]
    fn pads_short_coordinates() {
        // A valid point whose x coordinate has a leading zero byte is hard to come by, so check
        // the padding on its own and rely on curve validation for the rest.
        let short = cose(vec![
            (1, Value::from(2)),
            (3, Value::from(-7)),
            (-1, Value::from(1)),
            (-2, Value::Bytes(GX[1..].to_vec())),
            (-3, Value::Bytes(GY.to_vec())),
        ]);
        // `00 || GX[1..]` is not the x of G, so the point is rejected as off-curve rather than
        // as a malformed length.
        assert_eq!(
            decode_cose_key(&short),
            Err(KeyError::MalformedKey("point is not on the P-256 curve".into()))
        );
    }

    #[test]
    fn rejects_missing_coordinates() {
        let missing_y = cose(vec![
            (1, Value::from(2)),
            (-1, Value::from(1)),
            (-2, Value::Bytes(GX.to_vec())),
        ]);
        assert_eq!(
            decode_cose_key(&missing_y),
            Err(KeyError::MalformedKey("COSE key has no y coordinate".into()))
        );

        let missing_x = cose(vec![(1, Value::from(2)), (-3, Value::Bytes(GY.to_vec()))]);
        assert_eq!(
            decode_cose_key(&missing_x),
            Err(KeyError::MalformedKey("COSE key has no x coordinate".into()))
        );
    }

    #[test]
    fn rejects_rsa_and_oversized_keys() {
        let rsa = cose(vec![(1, Value::from(3)), (3, Value::from(-257))]);
        assert_eq!(
            decode_cose_key(&rsa),
            Err(KeyError::MalformedKey("unsupported COSE key type 3".into()))
        );

        let oversized = cose(vec![
            (1, Value::from(2)),
            (-2, Value::Bytes(vec![1; 33])),
            (-3, Value::Bytes(GY.to_vec())),
        ]);
        assert_eq!(
            decode_cose_key(&oversized),
            Err(KeyError::MalformedKey("x coordinate is 33 bytes".into()))
        );
    }

    #[test]
    fn rejects_off_curve_point() {
        let mut y = GY;
        y.0[31] ^= 1;
        assert!(P256PublicKey::new(GX, y).is_err());
        assert!(P256PublicKey::new(GX, GY).is_ok());
    }

    #[test]
    fn rejects_attestation_without_credential() {
        let mut data = vec![0u8; 32];
        data.push(0x05);
        data.extend_from_slice(&0u32.to_be_bytes());
        assert_eq!(
            extract_public_key(&attestation(data)),
            Err(KeyError::MalformedKey("authenticator data carries no attested credential".into()))
        );
        assert!(extract_public_key(&[0xff, 0x00]).is_err());
    }
}
