use core::fmt::Debug;

use async_trait::async_trait;
use eyre::Result as EyreResult;
use futures_util::stream::BoxStream;
use libp2p::{Multiaddr, PeerId, StreamProtocol};

use crate::record::PeerRecord;
use crate::stream::Stream;

/// A stream opened by a remote peer under one of our registered protocols.
#[derive(Debug)]
pub struct InboundStream {
    pub peer_id: PeerId,
    /// The remote address of the connection the stream arrived on, when known.
    pub remote_addr: Option<Multiaddr>,
    pub stream: Stream,
}

pub type InboundStreams = BoxStream<'static, InboundStream>;

/// What the linker needs from the overlay network.
#[async_trait]
pub trait Network: Debug + Send + Sync + 'static {
    fn local_peer_id(&self) -> PeerId;

    /// Peers with at least one live connection, never including ourselves.
    fn connected_peers(&self) -> Vec<PeerId>;

    /// Everything the network layer knows about how to reach `peer_id`.
    fn peer_record(&self, peer_id: &PeerId) -> PeerRecord;

    /// Records `addr` in the network layer's address book for `peer_id`.
    fn add_address(&self, peer_id: PeerId, addr: Multiaddr);

    /// Registers an inbound handler; every stream opened by a remote peer under
    /// `protocol` is yielded by the returned stream.
    fn accept(&self, protocol: StreamProtocol) -> EyreResult<InboundStreams>;

    async fn open_stream(&self, peer_id: PeerId, protocol: StreamProtocol) -> EyreResult<Stream>;

    /// Connects directly to `record.id` using the advertised addresses.
    async fn dial(&self, record: &PeerRecord) -> EyreResult<()>;
}
