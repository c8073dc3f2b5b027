//! Node entry point. A hand-rolled `--port` flag, a coarse `Mutex<Node>`
//! shared across a UDP receive loop, a heartbeat loop, and a cancellable
//! miner thread.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use ledger_core::config::Config;
use ledger_core::v1::block::genesis_block;
use ledger_core::v1::miner::mine;
use ledger_core::v1::net::{self, Message, PeerTable};
use ledger_core::v1::node::Node;
use ledger_core::v1::transaction::make_coinbase;
use ledger_core::v1::utxo::UTXOSet;
use ledger_core::wallet::Wallet;

const WALLET_FILE: &str = "wallet.txt";

/// Parse `--port <N>` from argv, falling back to the config default. Any
/// other flag is ignored.
fn parse_port(args: &[String], default: u16) -> u16 {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--port" {
            if let Some(value) = iter.next() {
                if let Ok(port) = value.parse() {
                    return port;
                }
            }
        }
    }
    default
}

fn load_or_create_wallet() -> Wallet {
    let mut wallet = Wallet::new();
    if wallet.load_keys(WALLET_FILE).is_err() {
        wallet.generate_key();
        if let Err(e) = wallet.save_keys(WALLET_FILE) {
            warn!("could not persist wallet: {}", e);
        }
    }
    wallet
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::from_env();
    config.port = parse_port(&args[1..], config.port);

    let wallet = load_or_create_wallet();
    let addr = wallet.addr().expect("wallet always holds at least one key").to_owned();

    let genesis = genesis_block(&addr, config.fixed_reward, config.difficulty_bits, chrono::Utc::now());
    let mut utxo_set = UTXOSet::new();
    utxo_set.apply_block_outputs(&genesis.txs);

    info!("starting node at address {} on port {}", addr, config.port);

    let node = Arc::new(Mutex::new(Node::new(wallet, config.clone(), genesis, utxo_set)));
    let peers = Arc::new(Mutex::new(PeerTable::new()));

    let socket = UdpSocket::bind(("0.0.0.0", config.port))?;
    socket.set_read_timeout(Some(Duration::from_millis(500)))?;

    if let Some(seed) = &config.seed_addr {
        if let Ok(addr) = seed.parse::<SocketAddr>() {
            net::send(&socket, addr, &Message::NewPeer);
        }
    }

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    let cancel_miner = Arc::new(AtomicBool::new(false));

    spawn_receive_loop(socket.try_clone()?, Arc::clone(&node), Arc::clone(&peers));
    spawn_heartbeat_loop(
        socket.try_clone()?,
        Arc::clone(&node),
        Arc::clone(&peers),
        config.clone(),
    );
    spawn_miner_thread(Arc::clone(&node), Arc::clone(&cancel_miner), config.clone());

    ctrlc_shutdown(shutdown_tx);
    let _ = shutdown_rx.recv();

    cancel_miner.store(true, Ordering::Relaxed);
    info!("shutting down");
    Ok(())
}

/// Best-effort Ctrl-C handling without pulling in a signal-handling crate:
/// a dedicated thread blocks on stdin EOF, which a terminal delivers on
/// Ctrl-D and most process managers deliver on termination.
fn ctrlc_shutdown(shutdown_tx: mpsc::Sender<()>) {
    thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = shutdown_tx.send(());
    });
}

fn spawn_receive_loop(socket: UdpSocket, node: Arc<Mutex<Node>>, peers: Arc<Mutex<PeerTable>>) {
    thread::Builder::new()
        .name("recv".to_owned())
        .spawn(move || loop {
            let mut buf = [0u8; 65536];
            match socket.recv_from(&mut buf) {
                Ok((len, from)) => handle_datagram(&socket, &buf[..len], from, &node, &peers),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => debug!("recv error: {}", e),
            }
        })
        .expect("failed to spawn receive thread");
}

fn handle_datagram(
    socket: &UdpSocket,
    bytes: &[u8],
    from: SocketAddr,
    node: &Arc<Mutex<Node>>,
    peers: &Arc<Mutex<PeerTable>>,
) {
    let msg = match net::decode(bytes) {
        Ok(msg) => msg,
        Err(e) => {
            debug!("dropping undecodable datagram from {}: {}", from, e);
            return;
        }
    };

    peers.lock().unwrap().mark_seen(from);

    match msg {
        Message::NewPeer | Message::Introduce => {
            let known = peers.lock().unwrap().addrs();
            let listing = known
                .iter()
                .filter_map(|a| match a {
                    SocketAddr::V4(v4) => Some((v4.ip().to_string(), v4.port())),
                    SocketAddr::V6(_) => None,
                })
                .collect();
            net::send(socket, from, &Message::Peers(listing));
        }
        Message::Peers(listing) => {
            let mut table = peers.lock().unwrap();
            for (ip, port) in listing {
                if let Ok(addr) = format!("{}:{}", ip, port).parse() {
                    table.mark_seen(addr);
                }
            }
        }
        Message::HeartbeatRequest => {
            let height = node.lock().unwrap().chain.height();
            net::send(socket, from, &Message::HeartbeatResponse(height));
        }
        Message::HeartbeatResponse(height) => {
            peers.lock().unwrap().set_best_height(from, height);
        }
    }
}

fn spawn_heartbeat_loop(
    socket: UdpSocket,
    node: Arc<Mutex<Node>>,
    peers: Arc<Mutex<PeerTable>>,
    config: Config,
) {
    thread::Builder::new()
        .name("heartbeat".to_owned())
        .spawn(move || loop {
            thread::sleep(config.update_interval());

            let addrs = {
                let mut table = peers.lock().unwrap();
                table.sweep(config.alive_timeout());
                table.addrs()
            };
            net::broadcast(&socket, &addrs, &Message::HeartbeatRequest);

            if let Some(most_updated) = peers.lock().unwrap().most_updated() {
                let local_height = node.lock().unwrap().chain.height();
                if most_updated.best_height.unwrap_or(0) > local_height {
                    info!(
                        "peer {} advertises a longer chain ({} > {})",
                        most_updated.addr,
                        most_updated.best_height.unwrap(),
                        local_height
                    );
                }
            }
        })
        .expect("failed to spawn heartbeat thread");
}

/// Mines against a snapshot of the current tip, off the shared lock, then
/// re-acquires it to install the solved block (or discard it, if the tip
/// moved while mining).
fn spawn_miner_thread(node: Arc<Mutex<Node>>, cancel: Arc<AtomicBool>, config: Config) {
    thread::Builder::new()
        .name("miner".to_owned())
        .spawn_with_priority(ThreadPriority::Max, move |_| loop {
            if cancel.load(Ordering::Relaxed) {
                return;
            }

            let (candidate, parent_hash) = {
                let guard = node.lock().unwrap();
                let tip = guard.chain.tip();
                let tip_hash = tip.hash();
                let addr = guard.wallet.addr().unwrap_or("").to_owned();

                let mut candidate = tip.clone();
                candidate.timestamp = chrono::Utc::now();
                candidate.prev_hash = Some(tip_hash.clone());

                let coinbase = make_coinbase(&addr, config.fixed_reward, guard.chain.height() as u64);
                candidate.txs = std::iter::once(coinbase)
                    .chain(guard.mempool.values().cloned())
                    .collect();
                candidate.recompute_merkle_root();

                (candidate, tip_hash)
            };

            if candidate.txs.len() < 2 {
                thread::sleep(Duration::from_millis(200));
                continue;
            }

            match mine(&candidate, config.difficulty_bits, &cancel) {
                Some(nonce) => {
                    let mut solved = candidate;
                    solved.nonce = nonce;

                    let mut guard = node.lock().unwrap();
                    if guard.chain.tip().hash() != parent_hash {
                        debug!("tip moved while mining, discarding solved block");
                        continue;
                    }
                    if let Err(e) = guard.receive_block(solved) {
                        error!("mined block rejected: {}", e);
                    }
                }
                None => return,
            }
        })
        .expect("failed to spawn miner thread");
}
