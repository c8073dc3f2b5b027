//! Miner / PoW: nonce search for a candidate block against a target.
//! CPU-bound, cancellable between attempts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::difficulty::meets_target;
use crate::hash::sha256d;

use super::block::Block;

/// Search nonces starting at 0 until one produces a header hash under
/// `target(bits)`, or until `cancel` is set. Returns `None` if cancelled
/// before a solution was found.
pub fn mine(candidate: &Block, bits: u32, cancel: &Arc<AtomicBool>) -> Option<u64> {
    let mut nonce: u64 = 0;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }

        let header = candidate.header_text_with_nonce(nonce);
        let hash = sha256d(header.as_bytes());
        if meets_target(&hash, bits) {
            return Some(nonce);
        }

        nonce = nonce.wrapping_add(1);
    }
}
