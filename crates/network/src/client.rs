use core::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use bustlink_network_primitives::client::{InboundStream, InboundStreams, Network};
use bustlink_network_primitives::record::PeerRecord;
use bustlink_network_primitives::stream::Stream;
use eyre::{eyre, Result as EyreResult};
use futures_util::StreamExt;
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use libp2p_stream::Control;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tracing::warn;

use crate::peers::PeerTable;
use crate::Command;

/// Handle to a running swarm.
#[derive(Clone)]
pub struct NetworkClient {
    local_peer_id: PeerId,
    control: Control,
    peers: Arc<RwLock<PeerTable>>,
    sender: mpsc::Sender<Command>,
}

impl NetworkClient {
    pub(crate) const fn new(
        local_peer_id: PeerId,
        control: Control,
        peers: Arc<RwLock<PeerTable>>,
        sender: mpsc::Sender<Command>,
    ) -> Self {
        Self {
            local_peer_id,
            control,
            peers,
            sender,
        }
    }

    pub async fn listen_on(&self, addr: Multiaddr) -> EyreResult<()> {
        self.request(|sender| Command::ListenOn { addr, sender })
            .await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<EyreResult<T>>) -> Command,
    ) -> EyreResult<T> {
        let (sender, receiver) = oneshot::channel();

        self.sender
            .send(command(sender))
            .await
            .map_err(|_| eyre!("network event loop is not running"))?;

        receiver
            .await
            .map_err(|_| eyre!("network event loop dropped the request"))?
    }
}

impl Debug for NetworkClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkClient")
            .field("local_peer_id", &self.local_peer_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Network for NetworkClient {
    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.peers.read().connected()
    }

    fn peer_record(&self, peer_id: &PeerId) -> PeerRecord {
        self.peers.read().record(peer_id)
    }

    fn add_address(&self, peer_id: PeerId, addr: Multiaddr) {
        if !self.peers.write().add_listen_addr(peer_id, addr.clone()) {
            return;
        }

        if let Err(err) = self.sender.try_send(Command::AddAddress { peer_id, addr }) {
            warn!(%peer_id, %err, "Failed to hand address to the swarm");
        }
    }

    fn accept(&self, protocol: StreamProtocol) -> EyreResult<InboundStreams> {
        let incoming = self
            .control
            .clone()
            .accept(protocol.clone())
            .map_err(|err| eyre!("{protocol}: {err}"))?;

        let peers = Arc::clone(&self.peers);

        Ok(incoming
            .map(move |(peer_id, stream)| InboundStream {
                peer_id,
                remote_addr: peers.read().remote_addr(&peer_id),
                stream: Stream::new(stream.compat()),
            })
            .boxed())
    }

    async fn open_stream(&self, peer_id: PeerId, protocol: StreamProtocol) -> EyreResult<Stream> {
        let stream = self
            .control
            .clone()
            .open_stream(peer_id, protocol.clone())
            .await
            .map_err(|err| eyre!("failed to open {protocol} to {peer_id}: {err}"))?;

        Ok(Stream::new(stream.compat()))
    }

    async fn dial(&self, record: &PeerRecord) -> EyreResult<()> {
        self.request(|sender| Command::Dial {
            record: record.clone(),
            sender,
        })
        .await
    }
}
