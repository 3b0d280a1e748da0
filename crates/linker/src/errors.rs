use bustlink_network_primitives::stream::CodecError;
use eyre::Report;
use libp2p::{PeerId, StreamProtocol};
use thiserror::Error as ThisError;

use crate::hashes::InvalidContentId;

#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum LinkError {
    #[error("failed to read link configuration: {0}")]
    Config(Report),
    #[error("giving up on {peer_id} after {attempts} failed connection attempts")]
    RetryExhausted { peer_id: PeerId, attempts: u64 },
    #[error("connection attempt {attempt} to {peer_id} failed: {reason}")]
    Dial {
        peer_id: PeerId,
        attempt: u64,
        reason: Report,
    },
    #[error("failed to register handler for {protocol}: {reason}")]
    Register {
        protocol: StreamProtocol,
        reason: Report,
    },
}

/// Why a single peer-list or hash-list exchange ended early.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum ExchangeError {
    #[error("failed to open stream: {0}")]
    Open(Report),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("malformed peer record: {0}")]
    MalformedRecord(#[from] serde_json::Error),
    #[error("malformed content identifier: {0}")]
    MalformedHash(#[from] InvalidContentId),
}

impl ExchangeError {
    /// Whether the remote sent something we could not parse.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::MalformedRecord(_)
                | Self::MalformedHash(_)
                | Self::Codec(CodecError::LineTooLong(_) | CodecError::SerDe(_))
        )
    }
}
