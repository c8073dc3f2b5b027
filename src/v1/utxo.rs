//! UTXO set: an indexed mapping from output-pointer to spendable output,
//! with confirmed/unspent state bits.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::transaction::{Pointer, Tx, Vout};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UTXO {
    pub vout: Vout,
    pub pointer: Pointer,
    pub is_coinbase: bool,
    pub unspent: bool,
    pub confirmed: bool,
}

/// `serde_json` can only key a map by a string, so the pointer is folded
/// into `"{tx_id}:{n}"` for storage; [`UTXOSet::get`] and friends still take
/// a [`Pointer`] and hide the encoding.
fn key(pointer: &Pointer) -> String {
    format!("{}:{}", pointer.tx_id, pointer.n)
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UTXOSet {
    pub utxos: HashMap<String, UTXO>,
}

impl UTXOSet {
    pub fn new() -> Self {
        UTXOSet {
            utxos: HashMap::new(),
        }
    }

    pub fn get(&self, pointer: &Pointer) -> Option<&UTXO> {
        self.utxos.get(&key(pointer))
    }

    pub fn insert(&mut self, utxo: UTXO) {
        self.utxos.insert(key(&utxo.pointer), utxo);
    }

    pub fn remove(&mut self, pointer: &Pointer) -> Option<UTXO> {
        self.utxos.remove(&key(pointer))
    }

    pub fn remove_many(&mut self, pointers: &[Pointer]) -> Vec<UTXO> {
        pointers.iter().filter_map(|p| self.remove(p)).collect()
    }

    pub fn mark_spent(&mut self, pointer: &Pointer) {
        if let Some(utxo) = self.utxos.get_mut(&key(pointer)) {
            utxo.unspent = false;
        }
    }

    pub fn mark_confirmed(&mut self, pointer: &Pointer) {
        if let Some(utxo) = self.utxos.get_mut(&key(pointer)) {
            utxo.confirmed = true;
        }
    }

    pub fn utxos_of_addresses(&self, addrs: &[String], unspent_only: bool) -> Vec<&UTXO> {
        self.utxos
            .values()
            .filter(|u| addrs.contains(&u.vout.to_addr))
            .filter(|u| !unspent_only || u.unspent)
            .collect()
    }

    pub fn balance(&self, addrs: &[String]) -> u64 {
        self.utxos_of_addresses(addrs, true)
            .iter()
            .map(|u| u.vout.value)
            .sum()
    }

    /// Insert a tx's outputs as unconfirmed, unspent UTXOs. Used by
    /// mem-pool insertion when `allow_utxo_from_pool` is enabled.
    pub fn apply_tx_outputs(&mut self, tx: &Tx) {
        let is_coinbase = tx.is_coinbase();
        for (n, vout) in tx.tx_out.iter().enumerate() {
            let pointer = Pointer::new(tx.id(), n as u32);
            self.insert(UTXO {
                vout: vout.clone(),
                pointer,
                is_coinbase,
                unspent: true,
                confirmed: false,
            });
        }
    }

    /// Insert every tx's outputs as confirmed, unspent UTXOs. Used when a
    /// block is applied.
    pub fn apply_block_outputs(&mut self, txs: &[Tx]) {
        for tx in txs {
            let is_coinbase = tx.is_coinbase();
            for (n, vout) in tx.tx_out.iter().enumerate() {
                let pointer = Pointer::new(tx.id(), n as u32);
                self.insert(UTXO {
                    vout: vout.clone(),
                    pointer,
                    is_coinbase,
                    unspent: true,
                    confirmed: true,
                });
            }
        }
    }

    /// Remove the UTXO referenced by every non-coinbase input of `txs`.
    /// Returns the removed UTXOs so a caller (e.g. `ChainManager::apply_block`)
    /// can back them up for rollback.
    pub fn remove_inputs(&mut self, txs: &[Tx]) -> Vec<UTXO> {
        let mut removed = vec![];
        for tx in txs {
            for pointer in tx.input_pointers() {
                if let Some(utxo) = self.remove(pointer) {
                    removed.push(utxo);
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v1::transaction::make_coinbase;

    #[test]
    fn apply_and_remove_round_trip() {
        let mut set = UTXOSet::new();
        let tx = make_coinbase("addr1", 500, 0);
        set.apply_block_outputs(&[tx.clone()]);

        let pointer = Pointer::new(tx.id(), 0);
        assert!(set.get(&pointer).is_some());
        assert_eq!(set.balance(&["addr1".to_owned()]), 500);

        set.remove(&pointer);
        assert!(set.get(&pointer).is_none());
    }

    #[test]
    fn mark_spent_excludes_from_unspent_only_query() {
        let mut set = UTXOSet::new();
        let tx = make_coinbase("addr1", 500, 0);
        set.apply_block_outputs(&[tx.clone()]);
        let pointer = Pointer::new(tx.id(), 0);

        set.mark_spent(&pointer);
        assert_eq!(set.balance(&["addr1".to_owned()]), 0);
        assert_eq!(set.utxos_of_addresses(&["addr1".to_owned()], false).len(), 1);
    }
}
