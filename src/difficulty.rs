//! Proof-of-work target. Dynamic difficulty retargeting is out of scope;
//! `bits` is a fixed, configured value for the life of the chain.

use num_bigint::BigUint;
use num_traits::One;

/// `target(bits) = 1 << (256 - bits)`. A block header hash, interpreted as a
/// 256-bit big-endian integer, must be strictly less than this value.
pub fn target(bits: u32) -> BigUint {
    BigUint::one() << (256 - bits as u64)
}

/// Interpret a hex-encoded sha256d digest as the 256-bit integer the
/// proof-of-work check compares against `target`.
pub fn hash_as_uint(hash_hex: &str) -> BigUint {
    let bytes = hex::decode(hash_hex).unwrap_or_default();
    BigUint::from_bytes_be(&bytes)
}

pub fn meets_target(hash_hex: &str, bits: u32) -> bool {
    hash_as_uint(hash_hex) < target(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_shrinks_as_bits_grows() {
        assert!(target(20) < target(18));
    }

    #[test]
    fn all_zero_hash_always_meets_target() {
        let zero_hash = "0".repeat(64);
        assert!(meets_target(&zero_hash, 1));
    }

    #[test]
    fn all_ff_hash_never_meets_target() {
        let max_hash = "f".repeat(64);
        assert!(!meets_target(&max_hash, 18));
    }
}
