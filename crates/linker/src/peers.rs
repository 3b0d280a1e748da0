use std::collections::HashMap;
use std::time::Instant;

use bustlink_network_primitives::record::PeerRecord;
use libp2p::{Multiaddr, PeerId};
use parking_lot::RwLock;

#[derive(Debug)]
struct Entry {
    record: PeerRecord,
    last_seen: Instant,
}

impl Entry {
    fn new(record: PeerRecord) -> Self {
        Self {
            record,
            last_seen: Instant::now(),
        }
    }
}

/// Every peer this node has heard of, keyed by identity.
#[derive(Debug, Default)]
pub struct PeerAddressCache {
    entries: RwLock<HashMap<PeerId, Entry>>,
}

impl PeerAddressCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.entries.read().contains_key(peer_id)
    }

    /// Inserts `record` unless its identity is already cached.
    ///
    /// Returns `true` only for the caller whose insert actually happened; racing
    /// callers with the same identity all observe `false` but one.
    pub fn add_if_absent(&self, record: PeerRecord) -> bool {
        if self.contains(&record.id) {
            return false;
        }

        let mut entries = self.entries.write();

        if entries.contains_key(&record.id) {
            return false;
        }

        let _ = entries.insert(record.id, Entry::new(record));

        true
    }

    /// Replaces whatever is cached for `record.id`.
    pub fn upsert(&self, record: PeerRecord) {
        let _ = self.entries.write().insert(record.id, Entry::new(record));
    }

    /// Folds the addresses of `record` into its entry, creating it if missing.
    /// Returns how many addresses were new.
    pub fn merge(&self, record: PeerRecord) -> usize {
        let mut entries = self.entries.write();

        let peer_id = record.id;

        let entry = entries
            .entry(peer_id)
            .or_insert_with(|| Entry::new(PeerRecord::new(peer_id, None)));

        entry.last_seen = Instant::now();

        entry.record.merge(record)
    }

    /// Merges an address we saw the peer connect from. Returns whether the address was new.
    pub fn observe(&self, peer_id: PeerId, addr: Multiaddr) -> bool {
        let mut entries = self.entries.write();

        let entry = entries
            .entry(peer_id)
            .or_insert_with(|| Entry::new(PeerRecord::new(peer_id, None)));

        entry.last_seen = Instant::now();

        entry.record.add_addr(addr)
    }

    #[must_use]
    pub fn get(&self, peer_id: &PeerId) -> Option<PeerRecord> {
        self.entries
            .read()
            .get(peer_id)
            .map(|entry| entry.record.clone())
    }

    #[must_use]
    pub fn last_seen(&self, peer_id: &PeerId) -> Option<Instant> {
        self.entries.read().get(peer_id).map(|entry| entry.last_seen)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        self.entries
            .read()
            .values()
            .map(|entry| entry.record.clone())
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/peers.rs"]
mod tests;
