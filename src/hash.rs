//! Hash and address utilities.

use base58check::{FromBase58Check, ToBase58Check};
use ripemd::{Digest, Ripemd160};
use sha2::Sha256;

/// Version byte used for Base58Check address encoding.
pub const ADDR_VERSION: u8 = 0x00;

/// Double SHA-256, lowercase hex.
pub fn sha256d(bytes: &[u8]) -> String {
    hex::encode(sha256d_raw(bytes))
}

/// Double SHA-256, raw 32-byte digest. Used where the caller needs the bytes
/// rather than their hex rendering (e.g. as an ECDSA message).
pub fn sha256d_raw(bytes: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(bytes);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

/// Base58Check over `0x00 || RIPEMD160(SHA256(pubkey))`.
pub fn address_from(pubkey_bytes: &[u8]) -> String {
    let sha = Sha256::digest(pubkey_bytes);
    let ripe = Ripemd160::digest(sha);
    ripe.to_base58check(ADDR_VERSION)
}

/// Recover the RIPEMD160(SHA256(pubkey)) payload from a Base58Check address.
/// Used by the script VM's `OP_ADDR` and by validators that need to compare
/// addresses without re-deriving the string form.
pub fn address_payload(addr: &str) -> Result<Vec<u8>, String> {
    let (_version, payload) = addr
        .from_base58check()
        .map_err(|e| format!("bad base58check address: {:?}", e))?;
    Ok(payload)
}
