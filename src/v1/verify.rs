//! Transaction and block validation rules.

use crate::hash::{address_from, sha256d_raw};
use crate::vm::{self, Token};

use super::block::Block;
use super::block_verify_error::{BlockVerifyError, ErrorKind as BlockErrorKind};
use super::pool::MemPool;
use super::transaction::{Pointer, Tx, Vout};
use super::txn_verify_error::{ErrorKind as TxnErrorKind, TxnVerifyError};
use super::utxo::UTXOSet;

/// Outcome of validating a single non-coinbase tx: the fee implied by its
/// inputs/outputs, so the caller doesn't need to re-derive it.
pub struct TxVerifyOk {
    pub fee: u64,
}

/// Validate a non-coinbase tx against `utxo_set` and `mempool`. Does not
/// mutate either; the caller decides what to do with `Orphan` (usually: file
/// under the orphan tx pool) versus other errors (reject).
pub fn verify_tx(
    tx: &Tx,
    utxo_set: &UTXOSet,
    mempool: &MemPool,
) -> Result<TxVerifyOk, TxnVerifyError> {
    if tx.tx_in.is_empty() {
        return Err(Box::new(TxnErrorKind::EmptyInputs));
    }
    if tx.tx_out.is_empty() {
        return Err(Box::new(TxnErrorKind::EmptyOutputs));
    }

    let tx_id = tx.id();
    if mempool.contains(&tx_id) {
        return Err(Box::new(TxnErrorKind::AlreadyInMemPool));
    }

    let claimed = mempool.claimed_pointers();
    for pointer in tx.input_pointers() {
        if claimed.contains(&pointer) {
            return Err(Box::new(TxnErrorKind::DoubleSpendInPool(pointer.clone())));
        }
    }

    let mut total_in: u64 = 0;
    for vin in &tx.tx_in {
        let pointer = match vin.to_spend.as_ref() {
            Some(pointer) => pointer,
            None => return Err(Box::new(TxnErrorKind::MissingInputPointer)),
        };

        let utxo = match utxo_set.get(pointer) {
            Some(utxo) => utxo,
            None => return Err(Box::new(TxnErrorKind::Orphan(pointer.clone()))),
        };

        let pubkey = vin.pubkey.clone().unwrap_or_default();
        let message = sig_message(pointer, &pubkey, &tx.tx_out);

        let stack_init = vec![
            Token::Bytes(vin.signature.clone()),
            Token::Bytes(pubkey.clone()),
        ];
        let result = vm::execute(&utxo.vout.pubkey_script(), stack_init, &message)
            .map_err(|e| Box::new(TxnErrorKind::Script(e)))?;

        if !result.succeeded() {
            return Err(Box::new(TxnErrorKind::BadUnlockScript(pointer.clone())));
        }

        if address_from(&pubkey) != utxo.vout.to_addr {
            return Err(Box::new(TxnErrorKind::AddressMismatch(pointer.clone())));
        }

        total_in += utxo.vout.value;
    }

    let total_out = tx.total_out();
    if total_in < total_out {
        return Err(Box::new(TxnErrorKind::Overspend(total_in, total_out)));
    }

    Ok(TxVerifyOk {
        fee: total_in - total_out,
    })
}

/// The ECDSA message any input consuming `pointer` must be signed against:
/// `sha256d(canonical(pointer) || canonical(pubkey) || canonical(tx_out))`.
pub fn sig_message(pointer: &Pointer, pubkey: &[u8], tx_out: &[Vout]) -> Vec<u8> {
    let text = format!(
        "{}{}{}",
        pointer.canonical_text(),
        hex::encode(pubkey),
        super::transaction::canonical_text_vouts(tx_out)
    );
    sha256d_raw(text.as_bytes()).to_vec()
}

/// Coinbase validity: exactly one output, value equal to the fixed reward
/// plus the sum of every other tx's fee.
pub fn verify_coinbase(tx: &Tx, fixed_reward: u64, other_fees: u64) -> Result<(), TxnVerifyError> {
    if !tx.is_coinbase() || tx.tx_out.len() != 1 {
        return Err(Box::new(TxnErrorKind::BadCoinbase));
    }

    let expected = fixed_reward + other_fees;
    if tx.tx_out[0].value != expected {
        return Err(Box::new(TxnErrorKind::BadCoinbase));
    }

    Ok(())
}

/// Block validity. Proof-of-work and shape are checked first
/// (cheap); then the merkle root; then every non-coinbase tx against a
/// scratch copy of `utxo_set` that absorbs each validated tx's outputs in
/// turn, so later txs in the block may spend earlier ones.
pub fn verify_block(
    block: &Block,
    utxo_set: &UTXOSet,
    bits: u32,
    fixed_reward: u64,
) -> Result<(), BlockVerifyError> {
    if !crate::difficulty::meets_target(&block.hash(), bits) {
        return Err(Box::new(BlockErrorKind::FailedProofOfWork));
    }

    if block.txs.len() < 2 {
        return Err(Box::new(BlockErrorKind::TooFewTxs(block.txs.len())));
    }

    let ids: Vec<String> = block.txs.iter().map(|tx| tx.id()).collect();
    if crate::merkle::merkle_root(&ids) != block.merkle_root {
        return Err(Box::new(BlockErrorKind::InvalidMerkleRoot));
    }

    let mut seen_pointers = std::collections::HashSet::new();
    for tx in block.txs.iter().skip(1) {
        for pointer in tx.input_pointers() {
            let key = (pointer.tx_id.clone(), pointer.n);
            if !seen_pointers.insert(key) {
                return Err(Box::new(BlockErrorKind::DuplicateInputPointer));
            }
        }
    }

    let mut scratch = utxo_set.clone();
    let mut other_fees: u64 = 0;
    let empty_pool = MemPool::new();
    for tx in block.txs.iter().skip(1) {
        let ok = verify_tx(tx, &scratch, &empty_pool)
            .map_err(|e| Box::new(BlockErrorKind::TxnError(e, tx.id())))?;
        other_fees += ok.fee;
        scratch.remove_inputs(std::slice::from_ref(tx));
        scratch.apply_block_outputs(std::slice::from_ref(tx));
    }

    let coinbase = &block.txs[0];
    verify_coinbase(coinbase, fixed_reward, other_fees).map_err(|_| {
        Box::new(BlockErrorKind::InvalidCoinbaseAmount(
            fixed_reward + other_fees,
            coinbase.tx_out.first().map(|v| v.value).unwrap_or(0),
        ))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v1::transaction::make_coinbase;

    #[test]
    fn coinbase_with_correct_reward_passes() {
        let tx = make_coinbase("addr1", 500, 0);
        assert!(verify_coinbase(&tx, 500, 0).is_ok());
    }

    #[test]
    fn coinbase_with_wrong_reward_fails() {
        let tx = make_coinbase("addr1", 400, 0);
        assert!(verify_coinbase(&tx, 500, 0).is_err());
    }

    #[test]
    fn non_coinbase_input_with_missing_spend_pointer_is_rejected() {
        let tx = Tx {
            tx_in: vec![
                super::super::transaction::Vin {
                    to_spend: Some(Pointer::new("some-other-tx".to_owned(), 0)),
                    signature: vec![],
                    pubkey: None,
                },
                super::super::transaction::Vin {
                    to_spend: None,
                    signature: vec![],
                    pubkey: None,
                },
            ],
            tx_out: vec![Vout {
                to_addr: "addr1".to_owned(),
                value: 10,
            }],
            fee: 0,
            locktime: 0,
        };
        let utxo_set = UTXOSet::new();
        let mempool = MemPool::new();
        let err = verify_tx(&tx, &utxo_set, &mempool).unwrap_err();
        assert!(matches!(*err, TxnErrorKind::MissingInputPointer));
    }

    #[test]
    fn empty_inputs_rejected() {
        let tx = Tx {
            tx_in: vec![],
            tx_out: vec![Vout {
                to_addr: "addr1".to_owned(),
                value: 10,
            }],
            fee: 0,
            locktime: 0,
        };
        let utxo_set = UTXOSet::new();
        let mempool = MemPool::new();
        assert!(verify_tx(&tx, &utxo_set, &mempool).is_err());
    }
}
