//! P2P messaging: unreliable UDP datagrams between peers,
//! a small tag vocabulary, and a peer state machine
//! UNKNOWN → KNOWN → SILENT → DROPPED.

use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use log::debug;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Unknown,
    Known,
    Silent,
    Dropped,
}

#[derive(Debug, Clone)]
pub struct PeerEntry {
    pub addr: SocketAddr,
    pub state: PeerState,
    pub last_seen: Instant,
    /// Chain length last advertised in a `heartbeat_response`.
    pub best_height: Option<usize>,
}

impl PartialEq for PeerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl PartialEq<SocketAddr> for PeerEntry {
    fn eq(&self, other: &SocketAddr) -> bool {
        self.addr == *other
    }
}

#[derive(Debug, Default)]
pub struct PeerTable {
    pub peers: Vec<PeerEntry>,
}

impl PeerTable {
    pub fn new() -> Self {
        PeerTable { peers: vec![] }
    }

    /// Mark `addr` as having just sent us a message: UNKNOWN/SILENT -> KNOWN,
    /// inserting a fresh entry if this is the first time we've heard from it.
    pub fn mark_seen(&mut self, addr: SocketAddr) {
        match self.peers.iter_mut().find(|p| p.addr == addr) {
            Some(entry) => {
                entry.state = PeerState::Known;
                entry.last_seen = Instant::now();
            }
            None => self.peers.push(PeerEntry {
                addr,
                state: PeerState::Known,
                last_seen: Instant::now(),
                best_height: None,
            }),
        }
    }

    pub fn set_best_height(&mut self, addr: SocketAddr, height: usize) {
        if let Some(entry) = self.peers.iter_mut().find(|p| p.addr == addr) {
            entry.best_height = Some(height);
        }
    }

    /// Move any peer silent beyond `alive_timeout` into SILENT, then drop
    /// (remove) any already in SILENT. This mirrors the two-step
    /// KNOWN -> SILENT -> DROPPED state machine running once per heartbeat
    /// tick rather than on a per-peer timer.
    pub fn sweep(&mut self, alive_timeout: Duration) {
        let now = Instant::now();
        for entry in self.peers.iter_mut() {
            if entry.state == PeerState::Known && now.duration_since(entry.last_seen) > alive_timeout {
                entry.state = PeerState::Silent;
                debug!("peer {} went silent", entry.addr);
            }
        }

        self.peers.retain(|p| {
            if p.state == PeerState::Silent {
                debug!("dropping silent peer {}", p.addr);
                false
            } else {
                true
            }
        });
    }

    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.peers.iter().map(|p| p.addr).collect()
    }

    /// The peer that has advertised the longest chain, for `update_chain`.
    pub fn most_updated(&self) -> Option<&PeerEntry> {
        self.peers
            .iter()
            .filter(|p| p.best_height.is_some())
            .max_by_key(|p| p.best_height.unwrap())
    }
}

/// Wire message tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Message {
    NewPeer,
    Peers(Vec<(String, u16)>),
    Introduce,
    HeartbeatRequest,
    HeartbeatResponse(usize),
}

pub fn encode(msg: &Message) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(msg)
}

pub fn decode(bytes: &[u8]) -> serde_json::Result<Message> {
    serde_json::from_slice(bytes)
}

/// Best-effort send: failures are logged at debug level and otherwise
/// ignored.
pub fn send(socket: &UdpSocket, to: SocketAddr, msg: &Message) {
    match encode(msg) {
        Ok(bytes) => {
            if let Err(e) = socket.send_to(&bytes, to) {
                debug!("send to {} failed: {}", to, e);
            }
        }
        Err(e) => debug!("failed to encode message for {}: {}", to, e),
    }
}

pub fn broadcast(socket: &UdpSocket, peers: &[SocketAddr], msg: &Message) {
    for addr in peers {
        send(socket, *addr, msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trips_through_json() {
        let msg = Message::HeartbeatResponse(42);
        let bytes = encode(&msg).unwrap();
        let decoded = decode(&bytes).unwrap();
        match decoded {
            Message::HeartbeatResponse(n) => assert_eq!(n, 42),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn mark_seen_transitions_unknown_peer_to_known() {
        let mut table = PeerTable::new();
        let addr: SocketAddr = "127.0.0.1:5001".parse().unwrap();
        table.mark_seen(addr);
        assert_eq!(table.peers[0].state, PeerState::Known);
    }

    #[test]
    fn sweep_drops_peers_silent_past_timeout() {
        let mut table = PeerTable::new();
        let addr: SocketAddr = "127.0.0.1:5002".parse().unwrap();
        table.mark_seen(addr);
        table.peers[0].last_seen = Instant::now() - Duration::from_secs(120);
        table.sweep(Duration::from_secs(30));
        table.sweep(Duration::from_secs(30));
        assert!(table.peers.is_empty());
    }

    #[test]
    fn most_updated_picks_highest_height() {
        let mut table = PeerTable::new();
        let a: SocketAddr = "127.0.0.1:5003".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:5004".parse().unwrap();
        table.mark_seen(a);
        table.mark_seen(b);
        table.set_best_height(a, 3);
        table.set_best_height(b, 10);
        assert_eq!(table.most_updated().unwrap().addr, b);
    }
}
