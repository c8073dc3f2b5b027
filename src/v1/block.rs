use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::sha256d;
use crate::merkle::merkle_root;

use super::transaction::{make_coinbase, Tx};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Block {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub bits: u32,
    pub nonce: u64,
    pub prev_hash: Option<String>,
    pub txs: Vec<Tx>,
    pub merkle_root: String,
}

impl Block {
    /// Double-sha256 of the canonical header string. This, not `merkle_root`
    /// or `txs`, is what proof-of-work and chain linkage operate on.
    pub fn hash(&self) -> String {
        sha256d(self.header_text().as_bytes())
    }

    fn header_text(&self) -> String {
        format!(
            "Block(version={},timestamp={},prev_hash={},nonce={},bits={},merkle_root={})",
            self.version,
            self.timestamp.to_rfc3339(),
            self.prev_hash.as_deref().unwrap_or("None"),
            self.nonce,
            self.bits,
            self.merkle_root,
        )
    }

    /// Header text for a given candidate `nonce`, holding every other field
    /// fixed. Used by the miner's nonce search without needing a mutable
    /// clone of the whole block per attempt.
    pub fn header_text_with_nonce(&self, nonce: u64) -> String {
        format!(
            "Block(version={},timestamp={},prev_hash={},nonce={},bits={},merkle_root={})",
            self.version,
            self.timestamp.to_rfc3339(),
            self.prev_hash.as_deref().unwrap_or("None"),
            nonce,
            self.bits,
            self.merkle_root,
        )
    }

    pub fn recompute_merkle_root(&mut self) {
        let ids: Vec<String> = self.txs.iter().map(|tx| tx.id()).collect();
        self.merkle_root = merkle_root(&ids);
    }
}

/// Build the genesis block: no parent, a single coinbase output carrying
/// `initial_money` to `to_addr`.
pub fn genesis_block(to_addr: &str, initial_money: u64, bits: u32, timestamp: DateTime<Utc>) -> Block {
    let coinbase = make_coinbase(to_addr, initial_money, 0);
    let ids = vec![coinbase.id()];

    Block {
        version: 1,
        timestamp,
        bits,
        nonce: 0,
        prev_hash: None,
        merkle_root: merkle_root(&ids),
        txs: vec![coinbase],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_has_no_parent() {
        let block = genesis_block("addr1", 500, 18, Utc::now());
        assert!(block.prev_hash.is_none());
        assert!(block.txs[0].is_coinbase());
    }

    #[test]
    fn hash_is_deterministic() {
        let block = genesis_block("addr1", 500, 18, Utc::now());
        assert_eq!(block.hash(), block.hash());
    }

    #[test]
    fn recompute_merkle_root_matches_single_tx_list() {
        let mut block = genesis_block("addr1", 500, 18, Utc::now());
        let expected = block.merkle_root.clone();
        block.recompute_merkle_root();
        assert_eq!(block.merkle_root, expected);
    }
}
