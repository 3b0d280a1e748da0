use std::collections::hash_map::{Entry, HashMap};

use bustlink_network_primitives::record::PeerRecord;
use libp2p::{Multiaddr, PeerId};

#[derive(Debug, Default)]
struct PeerState {
    connections: u32,
    /// Where the peer's live connections terminate on its side
    remote_addrs: Vec<Multiaddr>,
    /// Addresses the peer listens on, from identify or gossip
    listen_addrs: Vec<Multiaddr>,
}

/// Connection and address bookkeeping fed by the swarm event loop.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<PeerId, PeerState>,
}

impl PeerTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_established(&mut self, peer_id: PeerId, remote_addr: Multiaddr) {
        let state = self.peers.entry(peer_id).or_default();

        state.connections = state.connections.saturating_add(1);

        if !state.remote_addrs.contains(&remote_addr) {
            state.remote_addrs.push(remote_addr);
        }
    }

    pub fn connection_closed(&mut self, peer_id: &PeerId, remote_addr: &Multiaddr) {
        let Entry::Occupied(mut entry) = self.peers.entry(*peer_id) else {
            return;
        };

        let state = entry.get_mut();

        state.connections = state.connections.saturating_sub(1);
        state.remote_addrs.retain(|addr| addr != remote_addr);

        if state.connections == 0 && state.listen_addrs.is_empty() {
            let _ignored = entry.remove();
        }
    }

    /// Returns whether the address was new.
    pub fn add_listen_addr(&mut self, peer_id: PeerId, addr: Multiaddr) -> bool {
        let state = self.peers.entry(peer_id).or_default();

        if state.listen_addrs.contains(&addr) {
            return false;
        }

        state.listen_addrs.push(addr);

        true
    }

    #[must_use]
    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.peers
            .get(peer_id)
            .is_some_and(|state| state.connections > 0)
    }

    #[must_use]
    pub fn connected(&self) -> Vec<PeerId> {
        self.peers
            .iter()
            .filter(|(_, state)| state.connections > 0)
            .map(|(peer_id, _)| *peer_id)
            .collect()
    }

    #[must_use]
    pub fn remote_addr(&self, peer_id: &PeerId) -> Option<Multiaddr> {
        self.peers
            .get(peer_id)
            .and_then(|state| state.remote_addrs.first().cloned())
    }

    /// Listen addresses first, then the addresses of live connections.
    #[must_use]
    pub fn record(&self, peer_id: &PeerId) -> PeerRecord {
        let addrs = self
            .peers
            .get(peer_id)
            .into_iter()
            .flat_map(|state| state.listen_addrs.iter().chain(&state.remote_addrs))
            .cloned();

        PeerRecord::new(*peer_id, addrs)
    }
}

#[cfg(test)]
#[path = "tests/peers.rs"]
mod tests;
