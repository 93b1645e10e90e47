use alloy::primitives::{Address, B256, keccak256};

/// Derives the address of a P-256 public key: the last 20 bytes of `keccak256(x || y)`.
///
/// Coordinates are taken as 32-byte big-endian values, order matters.
pub fn derive_address(x: B256, y: B256) -> Address {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(x.as_slice());
    buf[32..].copy_from_slice(y.as_slice());
    Address::from_slice(&keccak256(buf)[12..])
}
