//! Node orchestrator: the single owner of the chain, UTXO set, mem-pool,
//! and orphan pools for one running node. A plain struct owned by the
//! caller and passed around explicitly, never a process-wide singleton.

use log::info;

use crate::config::Config;
use crate::wallet::Wallet;

use super::block::Block;
use super::chain::ChainManager;
use super::node_error::{ErrorKind as NodeErrorKind, NodeResult};
use super::pool::{MemPool, OrphanBlocks, OrphanTxPool};
use super::transaction::{Tx, Vin, Vout};
use super::utxo::UTXOSet;
use super::verify::{sig_message, verify_tx};

pub struct Node {
    pub wallet: Wallet,
    pub config: Config,
    pub chain: ChainManager,
    pub utxo_set: UTXOSet,
    pub mempool: MemPool,
    pub orphan_tx_pool: OrphanTxPool,
    pub orphan_blocks: OrphanBlocks,
    /// Block currently being mined, if any.
    pub candidate_block: Option<Block>,
    /// Transactions accepted locally but not yet sent to peers.
    pub tx_outbox: Vec<Tx>,
    /// Blocks accepted locally but not yet sent to peers.
    pub block_outbox: Vec<Block>,
}

impl Node {
    pub fn new(wallet: Wallet, config: Config, genesis: Block, utxo_set: UTXOSet) -> Self {
        let chain = ChainManager::new(
            genesis,
            config.difficulty_bits,
            config.fixed_reward,
            config.allow_utxo_from_pool,
        );

        Node {
            wallet,
            config,
            chain,
            utxo_set,
            mempool: MemPool::new(),
            orphan_tx_pool: OrphanTxPool::new(),
            orphan_blocks: OrphanBlocks::new(),
            candidate_block: None,
            tx_outbox: vec![],
            block_outbox: vec![],
        }
    }

    /// Build and sign a transaction paying `value` to `to_addr` from the
    /// wallet's current key, selecting spendable UTXOs smallest-value-first
    /// and returning any remainder as a change output back to the sender
    /// Does not touch the mem-pool; call `receive_transaction`
    /// with the result to accept it locally.
    pub fn create_transaction(&self, to_addr: &str, value: u64) -> NodeResult<Tx> {
        let key = self.wallet.current().ok_or_else(|| Box::new(NodeErrorKind::NoWallet))?;
        let from_addr = key.addr.clone();
        let fee = self.config.default_fee;
        let needed = value + fee;

        let mut candidates = self
            .utxo_set
            .utxos_of_addresses(std::slice::from_ref(&from_addr), true)
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();
        candidates.sort_by_key(|u| u.vout.value);

        let mut selected = vec![];
        let mut total: u64 = 0;
        for utxo in candidates {
            if total >= needed {
                break;
            }
            total += utxo.vout.value;
            selected.push(utxo);
        }

        if total < needed {
            return Err(Box::new(NodeErrorKind::InsufficientFunds(total, needed)));
        }

        let mut tx_out = vec![Vout {
            to_addr: to_addr.to_owned(),
            value,
        }];
        let change = total - needed;
        if change > 0 {
            tx_out.push(Vout {
                to_addr: from_addr.clone(),
                value: change,
            });
        }

        let pubkey_bytes = key.pk.to_encoded_point(true).as_bytes().to_vec();
        let mut tx_in = vec![];
        for utxo in &selected {
            let message = sig_message(&utxo.pointer, &pubkey_bytes, &tx_out);
            let signature = self
                .wallet
                .sign(&message)
                .ok_or_else(|| Box::new(NodeErrorKind::NoWallet))?;

            tx_in.push(Vin {
                to_spend: Some(utxo.pointer.clone()),
                signature,
                pubkey: Some(pubkey_bytes.clone()),
            });
        }

        Ok(Tx {
            tx_in,
            tx_out,
            fee,
            locktime: 0,
        })
    }

    /// Accept a transaction the node originated or received from a peer
    /// Malformed or missing-input results are not propagated as hard errors
    /// here beyond the `Result`: the caller decides whether to log and
    /// drop; no single bad transaction should be fatal to the node.
    pub fn receive_transaction(&mut self, tx: Tx) -> Result<(), super::txn_verify_error::TxnVerifyError> {
        match verify_tx(&tx, &self.utxo_set, &self.mempool) {
            Ok(_) => {
                if self.config.allow_utxo_from_pool {
                    self.utxo_set.apply_tx_outputs(&tx);
                    for pointer in tx.input_pointers() {
                        self.utxo_set.mark_spent(pointer);
                    }
                }
                self.mempool.add(tx.clone());
                self.tx_outbox.push(tx);
                Ok(())
            }
            Err(e) => {
                if let super::txn_verify_error::ErrorKind::Orphan(_) = e.as_ref() {
                    self.orphan_tx_pool.insert(tx);
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Drain the tx outbox; the caller is responsible for actually sending
    /// the returned transactions to peers.
    pub fn broadcast_txs(&mut self) -> Vec<Tx> {
        std::mem::take(&mut self.tx_outbox)
    }

    /// Accept a block mined locally or received from a peer. On success,
    /// sweeps the orphan tx pool since newly-confirmed UTXOs may
    /// unblock previously-orphaned transactions.
    pub fn receive_block(&mut self, block: Block) -> super::block_verify_error::BlockVerifyResult<()> {
        self.chain.receive_block(
            block.clone(),
            &mut self.utxo_set,
            &mut self.mempool,
            &mut self.orphan_blocks,
        )?;

        ChainManager::sweep_orphan_txs(
            &mut self.orphan_tx_pool,
            &mut self.utxo_set,
            &mut self.mempool,
            self.config.allow_utxo_from_pool,
        );

        self.block_outbox.push(block);
        info!("chain height now {}", self.chain.height());
        Ok(())
    }

    pub fn broadcast_blocks(&mut self) -> Vec<Block> {
        std::mem::take(&mut self.block_outbox)
    }

    /// Replace the local chain with `peer_chain` (from a peer holding a
    /// longer one, re-applying every
    /// block from genesis against fresh state. Rejects if `peer_chain` does
    /// not validate block-by-block or is not actually longer.
    pub fn update_chain(&mut self, peer_chain: Vec<Block>) -> NodeResult<()> {
        if peer_chain.len() <= self.chain.height() {
            return Ok(());
        }

        let genesis = peer_chain[0].clone();
        let mut fresh_utxo_set = UTXOSet::new();
        fresh_utxo_set.apply_block_outputs(&genesis.txs);

        let mut fresh_mempool = MemPool::new();
        let mut fresh_orphan_blocks = OrphanBlocks::new();
        let mut fresh_chain = ChainManager::new(
            genesis,
            self.config.difficulty_bits,
            self.config.fixed_reward,
            self.config.allow_utxo_from_pool,
        );

        for block in peer_chain.into_iter().skip(1) {
            fresh_chain
                .receive_block(block, &mut fresh_utxo_set, &mut fresh_mempool, &mut fresh_orphan_blocks)
                .map_err(|e| Box::new(NodeErrorKind::Block(e)))?;
        }

        self.chain = fresh_chain;
        self.utxo_set = fresh_utxo_set;
        self.mempool = fresh_mempool;
        self.orphan_blocks = fresh_orphan_blocks;
        info!("replaced local chain, new height {}", self.chain.height());
        Ok(())
    }

    pub fn balance(&self) -> u64 {
        match self.wallet.addr() {
            Some(addr) => self.utxo_set.balance(std::slice::from_ref(&addr.to_owned())),
            None => 0,
        }
    }
}
