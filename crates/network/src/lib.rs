//! libp2p transport for the bustlink linker.
//!
//! [`run`] builds the swarm, spawns its event loop and hands back a
//! [`NetworkClient`] implementing [`Network`](bustlink_network_primitives::client::Network).

use std::collections::hash_map::{Entry, HashMap};
use std::sync::Arc;

use bustlink_network_primitives::config::NetworkConfig;
use bustlink_network_primitives::record::PeerRecord;
use eyre::{eyre, Result as EyreResult};
use futures_util::StreamExt;
use libp2p::identify::{Behaviour as IdentifyBehaviour, Config as IdentifyConfig};
use libp2p::multiaddr::Protocol;
use libp2p::noise::Config as NoiseConfig;
use libp2p::ping::Behaviour as PingBehaviour;
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::swarm::{DialError, NetworkBehaviour, Swarm, SwarmEvent};
use libp2p::tcp::Config as TcpConfig;
use libp2p::tls::Config as TlsConfig;
use libp2p::yamux::Config as YamuxConfig;
use libp2p::{Multiaddr, PeerId, SwarmBuilder};
use libp2p_stream::Behaviour as StreamBehaviour;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::{select, spawn};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

pub mod client;
mod events;
pub mod peers;

pub use client::NetworkClient;
use events::EventHandler;
use peers::PeerTable;

const PROTOCOL_VERSION: &str = concat!("/", env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const COMMAND_CHANNEL_SIZE: usize = 32;

#[derive(NetworkBehaviour)]
struct Behaviour {
    identify: IdentifyBehaviour,
    ping: PingBehaviour,
    stream: StreamBehaviour,
}

/// Starts the swarm and listens on every configured address.
///
/// The event loop stops once `token` is cancelled.
pub async fn run(config: &NetworkConfig, token: CancellationToken) -> EyreResult<NetworkClient> {
    let (client, event_loop) = init(config, token)?;

    drop(spawn(event_loop.run()));

    for addr in &config.swarm.listen {
        client.listen_on(addr.clone()).await?;
    }

    Ok(client)
}

fn init(
    config: &NetworkConfig,
    token: CancellationToken,
) -> EyreResult<(NetworkClient, EventLoop)> {
    let swarm = SwarmBuilder::with_existing_identity(config.identity.clone())
        .with_tokio()
        .with_tcp(
            TcpConfig::default(),
            (TlsConfig::new, NoiseConfig::new),
            YamuxConfig::default,
        )?
        .with_quic()
        .with_behaviour(|key| Behaviour {
            identify: IdentifyBehaviour::new(
                IdentifyConfig::new(PROTOCOL_VERSION.to_owned(), key.public())
                    .with_push_listen_addr_updates(true),
            ),
            ping: PingBehaviour::default(),
            stream: StreamBehaviour::new(),
        })?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(config.swarm.idle_timeout))
        .build();

    let local_peer_id = *swarm.local_peer_id();
    let control = swarm.behaviour().stream.new_control();
    let peers = Arc::new(RwLock::new(PeerTable::new()));

    let (command_sender, command_receiver) = mpsc::channel(COMMAND_CHANNEL_SIZE);

    let client = NetworkClient::new(local_peer_id, control, Arc::clone(&peers), command_sender);

    let event_loop = EventLoop::new(swarm, command_receiver, peers, token);

    Ok((client, event_loop))
}

pub(crate) struct EventLoop {
    swarm: Box<Swarm<Behaviour>>,
    command_receiver: mpsc::Receiver<Command>,
    peers: Arc<RwLock<PeerTable>>,
    pending_dial: HashMap<PeerId, Vec<oneshot::Sender<EyreResult<()>>>>,
    token: CancellationToken,
}

impl EventLoop {
    fn new(
        swarm: Swarm<Behaviour>,
        command_receiver: mpsc::Receiver<Command>,
        peers: Arc<RwLock<PeerTable>>,
        token: CancellationToken,
    ) -> Self {
        Self {
            swarm: Box::new(swarm),
            command_receiver,
            peers,
            pending_dial: HashMap::default(),
            token,
        }
    }

    pub(crate) async fn run(mut self) {
        #[expect(clippy::redundant_pub_crate, reason = "Needed for Tokio code")]
        loop {
            select! {
                event = self.swarm.next() => {
                    let Some(event) = event else { break };
                    self.handle_swarm_event(event).await;
                }
                command = self.command_receiver.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command);
                }
                () = self.token.cancelled() => break,
            }
        }

        debug!("Network event loop stopped");
    }

    async fn handle_swarm_event(&mut self, event: SwarmEvent<BehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(BehaviourEvent::Identify(event)) => {
                EventHandler::handle(self, event).await;
            }
            SwarmEvent::Behaviour(BehaviourEvent::Ping(event)) => {
                EventHandler::handle(self, event).await;
            }
            SwarmEvent::Behaviour(BehaviourEvent::Stream(())) => {}
            SwarmEvent::NewListenAddr {
                listener_id,
                address,
            } => {
                let local_peer_id = *self.swarm.local_peer_id();

                let _ignored = self
                    .peers
                    .write()
                    .add_listen_addr(local_peer_id, address.clone());

                info!(
                    %listener_id,
                    "Listening on {}",
                    address.with(Protocol::P2p(local_peer_id))
                );
            }
            SwarmEvent::ConnectionEstablished {
                peer_id, endpoint, ..
            } => {
                debug!(%peer_id, "Connection established");

                self.peers
                    .write()
                    .connection_established(peer_id, endpoint.get_remote_address().clone());

                self.resolve_dial(&peer_id, || Ok(()));
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                endpoint,
                num_established,
                cause,
                ..
            } => {
                debug!(%peer_id, ?cause, num_established, "Connection closed");

                self.peers
                    .write()
                    .connection_closed(&peer_id, endpoint.get_remote_address());
            }
            SwarmEvent::OutgoingConnectionError {
                peer_id: Some(peer_id),
                error,
                ..
            } => {
                debug!(%peer_id, %error, "Outgoing connection failed");

                let reason = error.to_string();

                self.resolve_dial(&peer_id, || Err(eyre!("{reason}")));
            }
            unhandled => trace!("Unhandled swarm event: {:?}", unhandled),
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::ListenOn { addr, sender } => {
                let result = self
                    .swarm
                    .listen_on(addr)
                    .map(|_listener_id| ())
                    .map_err(|err| eyre!(err));

                let _ignored = sender.send(result);
            }
            Command::Dial { record, sender } => self.dial(record, sender),
            Command::AddAddress { peer_id, addr } => {
                self.swarm.add_peer_address(peer_id, addr);
            }
        }
    }

    fn dial(&mut self, record: PeerRecord, sender: oneshot::Sender<EyreResult<()>>) {
        let PeerRecord { id, addrs } = record;

        if self.swarm.is_connected(&id) {
            let _ignored = sender.send(Ok(()));
            return;
        }

        let entry = match self.pending_dial.entry(id) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().push(sender);
                return;
            }
            Entry::Vacant(entry) => entry,
        };

        match self.swarm.dial(DialOpts::peer_id(id).addresses(addrs).build()) {
            Ok(()) => {
                let _ignored = entry.insert(vec![sender]);
            }
            // Someone else is already dialing; resolve with their outcome.
            Err(DialError::DialPeerConditionFalse(_)) => {
                let _ignored = entry.insert(vec![sender]);
            }
            Err(err) => {
                let _ignored = sender.send(Err(eyre!(err)));
            }
        }
    }

    fn resolve_dial(&mut self, peer_id: &PeerId, outcome: impl Fn() -> EyreResult<()>) {
        for sender in self.pending_dial.remove(peer_id).into_iter().flatten() {
            let _ignored = sender.send(outcome());
        }
    }
}

#[derive(Debug)]
pub(crate) enum Command {
    ListenOn {
        addr: Multiaddr,
        sender: oneshot::Sender<EyreResult<()>>,
    },
    Dial {
        record: PeerRecord,
        sender: oneshot::Sender<EyreResult<()>>,
    },
    AddAddress {
        peer_id: PeerId,
        addr: Multiaddr,
    },
}
