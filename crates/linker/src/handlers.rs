use std::sync::Arc;

use async_trait::async_trait;
use bustlink_network_primitives::client::{InboundStream, Network};
use bustlink_network_primitives::stream::{
    CodecError, LINK_ADDRESS_PROTOCOL, LINK_HASH_PROTOCOL, LINK_PEERS_PROTOCOL,
};
use futures_util::{SinkExt, StreamExt};
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use tokio::task::JoinHandle;
use tokio::{select, spawn};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::LinkError;
use crate::peers::PeerAddressCache;
use crate::pinning::PinningGateway;

/// Serves one inbound protocol.
#[async_trait]
pub trait StreamHandler: Send + Sync + 'static {
    const PROTOCOL: StreamProtocol;

    async fn handle(&self, inbound: InboundStream) -> Result<(), CodecError>;
}

/// Streams every connected peer's record to whoever asks.
#[derive(Debug)]
pub struct PeerListHandler {
    network: Arc<dyn Network>,
    peers: Arc<PeerAddressCache>,
}

impl PeerListHandler {
    #[must_use]
    pub fn new(network: Arc<dyn Network>, peers: Arc<PeerAddressCache>) -> Self {
        Self { network, peers }
    }
}

#[async_trait]
impl StreamHandler for PeerListHandler {
    const PROTOCOL: StreamProtocol = LINK_PEERS_PROTOCOL;

    async fn handle(&self, inbound: InboundStream) -> Result<(), CodecError> {
        let InboundStream {
            peer_id: remote,
            remote_addr,
            mut stream,
        } = inbound;

        record_observed(&*self.network, &self.peers, remote, remote_addr);

        let local = self.network.local_peer_id();

        let mut sent = 0_usize;

        for peer_id in self.network.connected_peers() {
            if peer_id == remote || peer_id == local {
                continue;
            }

            let mut record = self.network.peer_record(&peer_id);

            if let Some(cached) = self.peers.get(&peer_id) {
                let _ = record.merge(cached);
            }

            stream.feed(record.to_json_line()?).await?;

            sent = sent.saturating_add(1);
        }

        stream.close().await?;

        debug!(%remote, sent, "Served peer list");

        Ok(())
    }
}

/// Streams the identifiers this node announces.
#[derive(Debug)]
pub struct HashListHandler {
    pinning: Arc<PinningGateway>,
}

impl HashListHandler {
    #[must_use]
    pub const fn new(pinning: Arc<PinningGateway>) -> Self {
        Self { pinning }
    }
}

#[async_trait]
impl StreamHandler for HashListHandler {
    const PROTOCOL: StreamProtocol = LINK_HASH_PROTOCOL;

    async fn handle(&self, inbound: InboundStream) -> Result<(), CodecError> {
        let InboundStream {
            peer_id: remote,
            mut stream,
            ..
        } = inbound;

        let hashes = self.pinning.list();

        for hash in &hashes {
            stream.feed(hash.as_str()).await?;
        }

        stream.close().await?;

        debug!(%remote, sent = hashes.len(), "Served hash list");

        Ok(())
    }
}

/// Legacy address advertisement: remembers where the remote dialed from.
#[derive(Debug)]
pub struct AddressHandler {
    network: Arc<dyn Network>,
    peers: Arc<PeerAddressCache>,
}

impl AddressHandler {
    #[must_use]
    pub fn new(network: Arc<dyn Network>, peers: Arc<PeerAddressCache>) -> Self {
        Self { network, peers }
    }
}

#[async_trait]
impl StreamHandler for AddressHandler {
    const PROTOCOL: StreamProtocol = LINK_ADDRESS_PROTOCOL;

    async fn handle(&self, inbound: InboundStream) -> Result<(), CodecError> {
        let InboundStream {
            peer_id,
            remote_addr,
            mut stream,
        } = inbound;

        record_observed(&*self.network, &self.peers, peer_id, remote_addr);

        stream.close().await
    }
}

fn record_observed(
    network: &dyn Network,
    peers: &PeerAddressCache,
    peer_id: PeerId,
    remote_addr: Option<Multiaddr>,
) {
    let Some(addr) = remote_addr else {
        return;
    };

    if peers.observe(peer_id, addr.clone()) {
        debug!(%peer_id, %addr, "Learned observed address");

        network.add_address(peer_id, addr);
    }
}

/// Registers `handler` with the network and spawns its accept loop.
///
/// Every inbound stream is served on its own task; all of them stop when
/// `token` is cancelled.
pub fn serve<H: StreamHandler>(
    network: &dyn Network,
    handler: H,
    token: CancellationToken,
) -> Result<JoinHandle<()>, LinkError> {
    let mut incoming = network
        .accept(H::PROTOCOL)
        .map_err(|reason| LinkError::Register {
            protocol: H::PROTOCOL,
            reason,
        })?;

    let handler = Arc::new(handler);

    let task = spawn(async move {
        #[expect(clippy::redundant_pub_crate, reason = "Needed for Tokio code")]
        loop {
            let inbound = select! {
                () = token.cancelled() => break,
                inbound = incoming.next() => {
                    let Some(inbound) = inbound else {
                        warn!(protocol = %H::PROTOCOL, "Inbound stream source closed");
                        break;
                    };

                    inbound
                }
            };

            let handler = Arc::clone(&handler);
            let token = token.clone();

            drop(spawn(async move {
                let peer_id = inbound.peer_id;

                select! {
                    () = token.cancelled() => {}
                    result = handler.handle(inbound) => {
                        if let Err(err) = result {
                            debug!(%peer_id, protocol = %H::PROTOCOL, %err, "Inbound stream aborted");
                        }
                    }
                }
            }));
        }
    });

    Ok(task)
}
