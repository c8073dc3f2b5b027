//! Node state persistence: newline-delimited JSON, one record per line, in
//! the fixed order chain / outbox / mempool / UTXO set / known peers /
//! candidate block / orphan tx pool / orphan blocks.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::v1::block::Block;
use crate::v1::net::PeerEntry;
use crate::v1::pool::{MemPool, OrphanBlocks, OrphanTxPool};
use crate::v1::transaction::Tx;
use crate::v1::utxo::UTXOSet;

/// One line of the persisted-peers section; `PeerEntry` itself carries an
/// `Instant`, which isn't serializable, so only the address and advertised
/// height are durable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedPeer {
    pub addr: String,
    pub best_height: Option<usize>,
}

impl From<&PeerEntry> for PersistedPeer {
    fn from(p: &PeerEntry) -> Self {
        PersistedPeer {
            addr: p.addr.to_string(),
            best_height: p.best_height,
        }
    }
}

/// The full set of in-memory node state this module round-trips. Does not
/// own a `Node` reference directly so callers can persist subsets (e.g. at
/// shutdown versus periodic snapshotting) without borrowing conflicts.
pub struct Snapshot<'a> {
    pub chain: &'a [Block],
    pub outbox: &'a [Tx],
    pub mempool: &'a MemPool,
    pub utxo_set: &'a UTXOSet,
    pub peers: &'a [PersistedPeer],
    pub candidate_block: &'a Option<Block>,
    pub orphan_tx_pool: &'a OrphanTxPool,
    pub orphan_blocks: &'a OrphanBlocks,
}

/// One line per section, each itself a JSON array/object.
pub fn save(path: &Path, snapshot: &Snapshot) -> io::Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    write_line(&mut w, &snapshot.chain)?;
    write_line(&mut w, &snapshot.outbox)?;
    write_line(&mut w, &snapshot.mempool)?;
    write_line(&mut w, &snapshot.utxo_set)?;
    write_line(&mut w, &snapshot.peers)?;
    write_line(&mut w, &snapshot.candidate_block)?;
    write_line(&mut w, &snapshot.orphan_tx_pool)?;
    write_line(&mut w, &snapshot.orphan_blocks)?;

    w.flush()
}

fn write_line<W: Write, T: Serialize>(w: &mut W, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *w, value)?;
    writeln!(w)
}

/// The owned counterpart to [`Snapshot`], produced by [`load`].
pub struct LoadedState {
    pub chain: Vec<Block>,
    pub outbox: Vec<Tx>,
    pub mempool: MemPool,
    pub utxo_set: UTXOSet,
    pub peers: Vec<PersistedPeer>,
    pub candidate_block: Option<Block>,
    pub orphan_tx_pool: OrphanTxPool,
    pub orphan_blocks: OrphanBlocks,
}

pub fn load(path: &Path) -> io::Result<LoadedState> {
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();

    let chain = read_line(&mut lines)?;
    let outbox = read_line(&mut lines)?;
    let mempool = read_line(&mut lines)?;
    let utxo_set = read_line(&mut lines)?;
    let peers = read_line(&mut lines)?;
    let candidate_block = read_line(&mut lines)?;
    let orphan_tx_pool = read_line(&mut lines)?;
    let orphan_blocks = read_line(&mut lines)?;

    Ok(LoadedState {
        chain,
        outbox,
        mempool,
        utxo_set,
        peers,
        candidate_block,
        orphan_tx_pool,
        orphan_blocks,
    })
}

fn read_line<T: for<'de> Deserialize<'de>>(
    lines: &mut std::io::Lines<BufReader<File>>,
) -> io::Result<T> {
    let line = lines
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "missing persisted section"))??;
    serde_json::from_str(&line).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v1::block::genesis_block;

    #[test]
    fn save_and_load_round_trips_chain_and_utxo_set() {
        let genesis = genesis_block("addr1", 500, 18, chrono::Utc::now());
        let mut utxo_set = UTXOSet::new();
        utxo_set.apply_block_outputs(&genesis.txs);

        let chain = vec![genesis];
        let outbox = vec![];
        let mempool = MemPool::new();
        let peers = vec![];
        let candidate_block = None;
        let orphan_tx_pool = OrphanTxPool::new();
        let orphan_blocks = OrphanBlocks::new();

        let snapshot = Snapshot {
            chain: &chain,
            outbox: &outbox,
            mempool: &mempool,
            utxo_set: &utxo_set,
            peers: &peers,
            candidate_block: &candidate_block,
            orphan_tx_pool: &orphan_tx_pool,
            orphan_blocks: &orphan_blocks,
        };

        let path = std::env::temp_dir().join(format!("ledger-state-test-{}.ndjson", std::process::id()));
        save(&path, &snapshot).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.chain.len(), 1);
        assert_eq!(loaded.utxo_set.utxos.len(), 1);

        let _ = std::fs::remove_file(&path);
    }
}
