use core::fmt::{self, Display, Formatter};
use core::str::FromStr;
use std::collections::{BTreeSet, HashMap};

use libp2p::PeerId;
use parking_lot::RwLock;
use thiserror::Error as ThisError;

/// Longest identifier accepted from the wire.
pub const MAX_CONTENT_ID_LENGTH: usize = 256;

/// A content identifier as announced on the hash-list protocol.
///
/// Only the shape is checked: non-empty, printable and free of whitespace. The
/// pin store remains the authority on whether it names real content.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ContentId(String);

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[non_exhaustive]
pub enum InvalidContentId {
    #[error("content identifier is empty")]
    Empty,
    #[error("content identifier is longer than {MAX_CONTENT_ID_LENGTH} bytes")]
    TooLong,
    #[error("content identifier contains invalid character {0:?}")]
    InvalidChar(char),
}

impl ContentId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ContentId {
    type Err = InvalidContentId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_end_matches('\r');

        if s.is_empty() {
            return Err(InvalidContentId::Empty);
        }

        if s.len() > MAX_CONTENT_ID_LENGTH {
            return Err(InvalidContentId::TooLong);
        }

        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.')))
        {
            return Err(InvalidContentId::InvalidChar(c));
        }

        Ok(Self(s.to_owned()))
    }
}

impl Display for ContentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Which peers announced which content identifiers.
///
/// Entries are never removed and a peer set only grows.
#[derive(Debug, Default)]
pub struct HashCache {
    entries: RwLock<HashMap<String, BTreeSet<PeerId>>>,
}

impl HashCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `peer_id` announced `hash`. Returns whether the pair was new.
    pub fn add(&self, hash: &str, peer_id: PeerId) -> bool {
        let mut entries = self.entries.write();

        if let Some(peers) = entries.get_mut(hash) {
            return peers.insert(peer_id);
        }

        let _ = entries.insert(hash.to_owned(), BTreeSet::from([peer_id]));

        true
    }

    #[must_use]
    pub fn peers(&self, hash: &str) -> Option<BTreeSet<PeerId>> {
        self.entries.read().get(hash).cloned()
    }

    #[must_use]
    pub fn contains(&self, hash: &str) -> bool {
        self.entries.read().contains_key(hash)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
#[path = "tests/hashes.rs"]
mod tests;
