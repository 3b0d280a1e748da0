use std::collections::HashMap;

use libp2p::PeerId;
use parking_lot::Mutex;

/// Failed direct-connect attempts, per peer.
#[derive(Debug, Default)]
pub struct RetryLedger {
    failures: Mutex<HashMap<PeerId, u64>>,
}

impl RetryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one more failure against `peer_id`, returning the count before it.
    pub fn record_failure(&self, peer_id: PeerId) -> u64 {
        let mut failures = self.failures.lock();

        let count = failures.entry(peer_id).or_default();
        let previous = *count;
        *count = count.saturating_add(1);

        previous
    }

    #[must_use]
    pub fn failures(&self, peer_id: &PeerId) -> u64 {
        self.failures.lock().get(peer_id).copied().unwrap_or_default()
    }

    /// Whether `peer_id` has failed more than `max_attempts` times.
    #[must_use]
    pub fn is_exhausted(&self, peer_id: &PeerId, max_attempts: u64) -> bool {
        self.failures(peer_id) > max_attempts
    }

    pub fn reset(&self, peer_id: &PeerId) {
        let _ = self.failures.lock().remove(peer_id);
    }
}
