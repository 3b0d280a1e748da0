use core::fmt::{self, Display, Formatter};

use libp2p::PeerId;
use multiaddr::{Multiaddr, Protocol};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// A peer identity together with the addresses it is known to be reachable at.
///
/// The JSON form matches libp2p's `AddrInfo` (`{"ID": .., "Addrs": [..]}`) so
/// records interoperate with go-libp2p based linkers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    #[serde(rename = "ID")]
    pub id: PeerId,
    #[serde(rename = "Addrs", default)]
    pub addrs: Vec<Multiaddr>,
}

#[derive(Clone, Debug, ThisError)]
#[error("address {0} does not end with a /p2p/ component")]
pub struct MissingPeerId(pub Multiaddr);

impl PeerRecord {
    #[must_use]
    pub fn new(id: PeerId, addrs: impl IntoIterator<Item = Multiaddr>) -> Self {
        let mut record = Self {
            id,
            addrs: Vec::new(),
        };

        for addr in addrs {
            let _ = record.add_addr(addr);
        }

        record
    }

    /// Appends `addr` unless it is already present. Returns whether it was added.
    pub fn add_addr(&mut self, addr: Multiaddr) -> bool {
        if self.contains_addr(&addr) {
            return false;
        }

        self.addrs.push(addr);

        true
    }

    #[must_use]
    pub fn contains_addr(&self, addr: &Multiaddr) -> bool {
        self.addrs.iter().any(|known| known == addr)
    }

    pub fn merge(&mut self, other: Self) -> usize {
        other
            .addrs
            .into_iter()
            .map(|addr| self.add_addr(addr))
            .filter(|added| *added)
            .count()
    }

    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

impl TryFrom<Multiaddr> for PeerRecord {
    type Error = MissingPeerId;

    fn try_from(mut addr: Multiaddr) -> Result<Self, Self::Error> {
        let Some(Protocol::P2p(peer_id)) = addr.iter().last() else {
            return Err(MissingPeerId(addr));
        };

        let _ = addr.pop();

        let addrs = (!addr.is_empty()).then_some(addr);

        Ok(Self::new(peer_id, addrs))
    }
}

impl Display for PeerRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}: [", self.id)?;

        for (idx, addr) in self.addrs.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{addr}")?;
        }

        f.write_str("]}")
    }
}

#[cfg(test)]
#[path = "tests/record.rs"]
mod tests;
