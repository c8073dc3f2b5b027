//! Chain manager: append, one-deep reorg, rollback, orphan-block
//! re-evaluation.

use log::info;

use super::block::Block;
use super::block_verify_error::{BlockVerifyError, ErrorKind as BlockErrorKind};
use super::pool::{MemPool, OrphanBlocks, OrphanTxPool};
use super::transaction::{Pointer, Tx};
use super::utxo::{UTXOSet, UTXO};
use super::verify::verify_block;
use crate::difficulty::hash_as_uint;

/// What `apply_block` removed or added, so `roll_back` can restore the
/// exact prior state. Only one generation of backup is kept; reorgs deeper
/// than one block are not supported.
#[derive(Debug, Clone, Default)]
pub struct Backup {
    pub removed_utxos_from_vins: Vec<UTXO>,
    pub added_pointers: Vec<Pointer>,
    pub added_vouts: Vec<UTXO>,
    pub removed_txs: Vec<Tx>,
}

pub struct ChainManager {
    pub chain: Vec<Block>,
    pub backup: Backup,
    pub bits: u32,
    pub fixed_reward: u64,
    pub allow_utxo_from_pool: bool,
}

impl ChainManager {
    pub fn new(genesis: Block, bits: u32, fixed_reward: u64, allow_utxo_from_pool: bool) -> Self {
        ChainManager {
            chain: vec![genesis],
            backup: Backup::default(),
            bits,
            fixed_reward,
            allow_utxo_from_pool,
        }
    }

    pub fn tip(&self) -> &Block {
        self.chain.last().expect("chain always has at least genesis")
    }

    pub fn height(&self) -> usize {
        self.chain.len()
    }

    /// Orphan tx re-evaluation is the caller's job (it needs the
    /// mem-pool/orphan-tx-pool together with the UTXO set); this only
    /// handles block placement, application, and orphan block follow-up.
    pub fn receive_block(
        &mut self,
        block: Block,
        utxo_set: &mut UTXOSet,
        mempool: &mut MemPool,
        orphan_blocks: &mut OrphanBlocks,
    ) -> Result<(), BlockVerifyError> {
        verify_block(&block, utxo_set, self.bits, self.fixed_reward)?;

        let place = self
            .chain
            .iter()
            .position(|b| Some(b.hash()) == block.prev_hash);

        let place = match place {
            Some(i) => i,
            None => {
                orphan_blocks.insert(block);
                return Err(Box::new(BlockErrorKind::UnknownParent));
            }
        };

        let height_to_place = place + 1;

        if height_to_place == self.chain.len() {
            self.chain.push(block.clone());
            self.apply_block(&block.txs, utxo_set, mempool);
            info!("appended block {} at height {}", block.hash(), self.chain.len() - 1);
        } else if height_to_place == self.chain.len() - 1 {
            let current_tip_hash = self.tip().hash();
            if hash_as_uint(&current_tip_hash) < hash_as_uint(&block.hash()) {
                return Err(Box::new(BlockErrorKind::LostTieBreak));
            }

            self.chain.pop();
            self.chain.push(block.clone());
            self.roll_back(utxo_set, mempool);
            self.apply_block(&block.txs, utxo_set, mempool);
            info!("one-deep reorg: new tip {}", block.hash());
        } else {
            return Err(Box::new(BlockErrorKind::DeepFork));
        }

        let known_hashes: Vec<String> = self.chain.iter().map(|b| b.hash()).collect();
        let resolvable = orphan_blocks.drain_resolvable(&known_hashes);
        for orphan in resolvable {
            let _ = self.receive_block(orphan, utxo_set, mempool, orphan_blocks);
        }

        Ok(())
    }

    /// Captures a rollback backup and mutates the UTXO set and mem-pool in
    /// place.
    pub fn apply_block(&mut self, txs: &[Tx], utxo_set: &mut UTXOSet, mempool: &mut MemPool) {
        let removed_utxos_from_vins = utxo_set.remove_inputs(txs);

        let mut added_pointers = vec![];
        let mut added_vouts = vec![];

        for tx in txs {
            let is_coinbase = tx.is_coinbase();
            for (n, vout) in tx.tx_out.iter().enumerate() {
                let pointer = Pointer::new(tx.id(), n as u32);

                if self.allow_utxo_from_pool && !is_coinbase && utxo_set.get(&pointer).is_some() {
                    // Non-coinbase outputs were already provisionally
                    // inserted as unconfirmed when the tx entered the
                    // mem-pool; snapshot the pre-confirm UTXO for rollback
                    // before flipping its confirmed bit.
                    added_vouts.push(utxo_set.get(&pointer).unwrap().clone());
                    utxo_set.mark_confirmed(&pointer);
                } else {
                    let utxo = UTXO {
                        vout: vout.clone(),
                        pointer: pointer.clone(),
                        is_coinbase,
                        unspent: true,
                        confirmed: true,
                    };
                    utxo_set.insert(utxo.clone());
                    added_vouts.push(utxo);
                }

                added_pointers.push(pointer);
            }
        }

        let mut removed_txs = vec![];
        for tx in txs {
            if let Some(removed) = mempool.remove(&tx.id()) {
                removed_txs.push(removed);
            }
        }

        self.backup = Backup {
            removed_utxos_from_vins,
            added_pointers,
            added_vouts,
            removed_txs,
        };
    }

    /// Restores the previous-tip state exactly and clears the backup.
    pub fn roll_back(&mut self, utxo_set: &mut UTXOSet, mempool: &mut MemPool) {
        let backup = std::mem::take(&mut self.backup);

        for tx in backup.removed_txs {
            mempool.add(tx);
        }

        for utxo in backup.removed_utxos_from_vins {
            utxo_set.insert(utxo);
        }

        for pointer in &backup.added_pointers {
            utxo_set.remove(pointer);
        }

        for utxo in backup.added_vouts {
            utxo_set.insert(utxo);
        }
    }

    /// Re-evaluate the orphan tx pool once: anything that now validates
    /// against `utxo_set` moves into `mempool`.
    pub fn sweep_orphan_txs(
        orphan_tx_pool: &mut OrphanTxPool,
        utxo_set: &mut UTXOSet,
        mempool: &mut MemPool,
        allow_utxo_from_pool: bool,
    ) {
        for tx in orphan_tx_pool.snapshot() {
            if super::verify::verify_tx(&tx, utxo_set, mempool).is_ok() {
                orphan_tx_pool.remove(&tx.id());
                if allow_utxo_from_pool {
                    utxo_set.apply_tx_outputs(&tx);
                    for pointer in tx.input_pointers() {
                        utxo_set.mark_spent(pointer);
                    }
                }
                mempool.add(tx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v1::block::genesis_block;

    #[test]
    fn new_chain_starts_at_genesis_height_one() {
        let genesis = genesis_block("addr1", 500, 18, chrono::Utc::now());
        let manager = ChainManager::new(genesis, 18, 500, true);
        assert_eq!(manager.height(), 1);
    }

    #[test]
    fn apply_and_roll_back_restores_mempool_and_utxo_set() {
        let genesis = genesis_block("addr1", 500, 18, chrono::Utc::now());
        let mut manager = ChainManager::new(genesis.clone(), 18, 500, false);
        let mut utxo_set = UTXOSet::new();
        utxo_set.apply_block_outputs(&genesis.txs);
        let mut mempool = MemPool::new();

        let before_len = utxo_set.utxos.len();

        let coinbase2 = crate::v1::transaction::make_coinbase("addr1", 500, 1);
        manager.apply_block(std::slice::from_ref(&coinbase2), &mut utxo_set, &mut mempool);
        assert_eq!(utxo_set.utxos.len(), before_len + 1);

        manager.roll_back(&mut utxo_set, &mut mempool);
        assert_eq!(utxo_set.utxos.len(), before_len);
    }

    #[test]
    fn roll_back_restores_confirmed_flag_for_pool_backed_utxos() {
        use crate::v1::transaction::{Vin, Vout};

        let genesis = genesis_block("addr1", 500, 18, chrono::Utc::now());
        let mut manager = ChainManager::new(genesis.clone(), 18, 500, true);
        let mut utxo_set = UTXOSet::new();
        utxo_set.apply_block_outputs(&genesis.txs);
        let mut mempool = MemPool::new();

        let genesis_pointer = Pointer::new(genesis.txs[0].id(), 0);
        let spend = Tx {
            tx_in: vec![Vin {
                to_spend: Some(genesis_pointer),
                signature: vec![],
                pubkey: None,
            }],
            tx_out: vec![Vout {
                to_addr: "addr2".to_owned(),
                value: 500,
            }],
            fee: 0,
            locktime: 0,
        };
        let spend_pointer = Pointer::new(spend.id(), 0);

        // Mirrors what `Node::receive_transaction` does when
        // `allow_utxo_from_pool` is enabled: the output is provisionally
        // inserted as unconfirmed as soon as the tx enters the mem-pool.
        utxo_set.apply_tx_outputs(&spend);
        mempool.add(spend.clone());
        assert!(!utxo_set.get(&spend_pointer).unwrap().confirmed);

        manager.apply_block(std::slice::from_ref(&spend), &mut utxo_set, &mut mempool);
        assert!(utxo_set.get(&spend_pointer).unwrap().confirmed);

        manager.roll_back(&mut utxo_set, &mut mempool);
        assert!(!utxo_set.get(&spend_pointer).unwrap().confirmed);
    }

    #[test]
    fn receive_block_resolves_one_deep_tie_break() {
        use crate::v1::miner::mine;
        use crate::v1::transaction::{make_coinbase, Vin, Vout};
        use crate::v1::verify::sig_message;
        use crate::wallet::Wallet;
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;

        let mut wallet = Wallet::new();
        let key = wallet.generate_key().clone();
        let pubkey_bytes = key.pk.to_encoded_point(true).as_bytes().to_vec();

        let genesis = genesis_block(&key.addr, 1000, 1, chrono::Utc::now());
        let mut utxo_set = UTXOSet::new();
        utxo_set.apply_block_outputs(&genesis.txs);
        let mut mempool = MemPool::new();
        let mut orphan_blocks = OrphanBlocks::new();
        let mut manager = ChainManager::new(genesis.clone(), 1, 500, false);

        let genesis_pointer = Pointer::new(genesis.txs[0].id(), 0);
        let tx1_out = vec![Vout {
            to_addr: key.addr.clone(),
            value: 1000,
        }];
        let message = sig_message(&genesis_pointer, &pubkey_bytes, &tx1_out);
        let signature = wallet.sign(&message).unwrap();
        let tx1 = Tx {
            tx_in: vec![Vin {
                to_spend: Some(genesis_pointer),
                signature,
                pubkey: Some(pubkey_bytes.clone()),
            }],
            tx_out: tx1_out,
            fee: 0,
            locktime: 0,
        };
        let coinbase1 = make_coinbase(&key.addr, 500, 0);

        let mut block_a = Block {
            version: 1,
            timestamp: chrono::Utc::now(),
            bits: 1,
            nonce: 0,
            prev_hash: Some(genesis.hash()),
            txs: vec![coinbase1, tx1.clone()],
            merkle_root: String::new(),
        };
        block_a.recompute_merkle_root();
        let cancel = Arc::new(AtomicBool::new(false));
        block_a.nonce = mine(&block_a, 1, &cancel).unwrap();

        manager
            .receive_block(block_a.clone(), &mut utxo_set, &mut mempool, &mut orphan_blocks)
            .unwrap();
        assert_eq!(manager.height(), 2);

        // Competing block at the same height: spends tx1's output instead.
        let tx1_pointer = Pointer::new(tx1.id(), 0);
        let tx2_out = vec![Vout {
            to_addr: "addr2".to_owned(),
            value: 1000,
        }];
        let message = sig_message(&tx1_pointer, &pubkey_bytes, &tx2_out);
        let signature = wallet.sign(&message).unwrap();
        let tx2 = Tx {
            tx_in: vec![Vin {
                to_spend: Some(tx1_pointer),
                signature,
                pubkey: Some(pubkey_bytes.clone()),
            }],
            tx_out: tx2_out,
            fee: 0,
            locktime: 0,
        };
        let coinbase2 = make_coinbase("addr2", 500, 1);

        let mut block_b = Block {
            version: 2,
            timestamp: chrono::Utc::now(),
            bits: 1,
            nonce: 0,
            prev_hash: Some(genesis.hash()),
            txs: vec![coinbase2, tx2],
            merkle_root: String::new(),
        };
        block_b.recompute_merkle_root();
        block_b.nonce = mine(&block_b, 1, &cancel).unwrap();

        let block_a_hash = block_a.hash();
        let block_b_hash = block_b.hash();
        let result = manager.receive_block(block_b, &mut utxo_set, &mut mempool, &mut orphan_blocks);

        assert_eq!(manager.height(), 2);
        if hash_as_uint(&block_a_hash) < hash_as_uint(&block_b_hash) {
            assert!(matches!(result, Err(e) if matches!(*e, BlockErrorKind::LostTieBreak)));
            assert_eq!(manager.tip().hash(), block_a_hash);
        } else {
            assert!(result.is_ok());
            assert_eq!(manager.tip().hash(), block_b_hash);
        }
    }
}
