//! Mem-pool and orphan pools, keyed by transaction id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::transaction::{Pointer, Tx};

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MemPool {
    pub txs: HashMap<String, Tx>,
}

impl MemPool {
    pub fn new() -> Self {
        MemPool { txs: HashMap::new() }
    }

    pub fn get(&self, tx_id: &str) -> Option<&Tx> {
        self.txs.get(tx_id)
    }

    pub fn contains(&self, tx_id: &str) -> bool {
        self.txs.contains_key(tx_id)
    }

    pub fn add(&mut self, tx: Tx) {
        self.txs.insert(tx.id(), tx);
    }

    pub fn remove(&mut self, tx_id: &str) -> Option<Tx> {
        self.txs.remove(tx_id)
    }

    /// Every input pointer currently claimed by a mem-pool transaction.
    /// Used by the double-spend-in-pool check.
    pub fn claimed_pointers(&self) -> Vec<&Pointer> {
        self.txs.values().flat_map(|tx| tx.input_pointers()).collect()
    }

    pub fn values(&self) -> impl Iterator<Item = &Tx> {
        self.txs.values()
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}

/// Transactions that failed validation solely because an input's UTXO was
/// absent; revisited after every state change.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct OrphanTxPool {
    pub txs: HashMap<String, Tx>,
}

impl OrphanTxPool {
    pub fn new() -> Self {
        OrphanTxPool { txs: HashMap::new() }
    }

    pub fn insert(&mut self, tx: Tx) {
        self.txs.insert(tx.id(), tx);
    }

    pub fn remove(&mut self, tx_id: &str) -> Option<Tx> {
        self.txs.remove(tx_id)
    }

    pub fn values(&self) -> impl Iterator<Item = &Tx> {
        self.txs.values()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Snapshot of the current orphan txs, for a single re-scan pass. The
    /// caller drives re-validation and calls `remove`/`insert` as txs are
    /// promoted or stay orphaned.
    pub fn snapshot(&self) -> Vec<Tx> {
        self.txs.values().cloned().collect()
    }
}

/// Blocks whose `prev_hash` is not (yet) known, kept as an unordered
/// collection.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct OrphanBlocks {
    pub blocks: Vec<super::block::Block>,
}

impl OrphanBlocks {
    pub fn new() -> Self {
        OrphanBlocks { blocks: vec![] }
    }

    pub fn insert(&mut self, block: super::block::Block) {
        self.blocks.push(block);
    }

    /// Remove and return every orphan block whose `prev_hash` is in
    /// `known_hashes`, for re-feeding to `ChainManager::receive_block`.
    pub fn drain_resolvable(&mut self, known_hashes: &[String]) -> Vec<super::block::Block> {
        let mut resolved = vec![];
        let mut remaining = vec![];
        for block in self.blocks.drain(..) {
            if block
                .prev_hash
                .as_ref()
                .map(|h| known_hashes.contains(h))
                .unwrap_or(false)
            {
                resolved.push(block);
            } else {
                remaining.push(block);
            }
        }
        self.blocks = remaining;
        resolved
    }
}
