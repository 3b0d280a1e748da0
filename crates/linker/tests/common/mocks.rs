//! In-memory stand-ins for the network and the pin store

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bustlink_linker::pinning::PinStore;
use bustlink_network_primitives::client::{InboundStream, InboundStreams, Network};
use bustlink_network_primitives::record::PeerRecord;
use bustlink_network_primitives::stream::Stream;
use eyre::{bail, eyre, Result};
use futures_util::{future, stream};
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use parking_lot::Mutex;
use tokio::io::duplex;
use tokio::sync::mpsc;
use tokio::time::sleep;

const DUPLEX_CAPACITY: usize = 64 * 1024;

/// A set of mock nodes that can open streams to and dial one another
#[derive(Debug, Default)]
pub struct Mesh {
    nodes: Mutex<HashMap<PeerId, Arc<MockNetwork>>>,
}

impl Mesh {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds a node with a fresh identity and a unique address
    pub fn join(self: &Arc<Self>) -> Arc<MockNetwork> {
        let mut nodes = self.nodes.lock();

        let peer_id = PeerId::random();
        let addr = format!("/ip4/10.0.0.{}/tcp/4101", nodes.len() + 1)
            .parse()
            .unwrap();

        let node = Arc::new(MockNetwork {
            peer_id,
            addr,
            mesh: Arc::downgrade(self),
            connected: Mutex::default(),
            handlers: Mutex::default(),
            unreachable: Mutex::default(),
            stalled: Mutex::default(),
            dials: Mutex::default(),
            learned: Mutex::default(),
        });

        let _ = nodes.insert(peer_id, Arc::clone(&node));

        node
    }

    /// Marks `a` and `b` as connected to each other
    pub fn connect(&self, a: &MockNetwork, b: &MockNetwork) {
        let _ = a.connected.lock().insert(b.peer_id);
        let _ = b.connected.lock().insert(a.peer_id);
    }

    pub fn disconnect(&self, a: &MockNetwork, b: &MockNetwork) {
        let _ = a.connected.lock().remove(&b.peer_id);
        let _ = b.connected.lock().remove(&a.peer_id);
    }

    fn node(&self, peer_id: &PeerId) -> Option<Arc<MockNetwork>> {
        self.nodes.lock().get(peer_id).cloned()
    }
}

/// Mock Network backed by a [`Mesh`]
#[derive(Debug)]
pub struct MockNetwork {
    peer_id: PeerId,
    addr: Multiaddr,
    mesh: Weak<Mesh>,
    /// Peers with a live connection
    connected: Mutex<BTreeSet<PeerId>>,
    /// Registered inbound protocols
    handlers: Mutex<HashMap<StreamProtocol, mpsc::UnboundedSender<InboundStream>>>,
    /// Peers every dial to fails
    unreachable: Mutex<HashSet<PeerId>>,
    /// Peers whose streams never open
    stalled: Mutex<HashSet<PeerId>>,
    /// Dial attempts per peer
    dials: Mutex<HashMap<PeerId, u64>>,
    /// Addresses handed to the address book
    learned: Mutex<Vec<(PeerId, Multiaddr)>>,
}

impl MockNetwork {
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn addr(&self) -> Multiaddr {
        self.addr.clone()
    }

    pub fn record(&self) -> PeerRecord {
        PeerRecord::new(self.peer_id, [self.addr.clone()])
    }

    /// Make every dial to `peer_id` fail
    pub fn set_unreachable(&self, peer_id: PeerId) {
        let _ = self.unreachable.lock().insert(peer_id);
    }

    pub fn set_reachable(&self, peer_id: &PeerId) {
        let _ = self.unreachable.lock().remove(peer_id);
    }

    /// Make streams to `peer_id` hang forever
    pub fn set_stalled(&self, peer_id: PeerId) {
        let _ = self.stalled.lock().insert(peer_id);
    }

    pub fn dial_count(&self, peer_id: &PeerId) -> u64 {
        self.dials
            .lock()
            .get(peer_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.connected.lock().contains(peer_id)
    }

    pub fn learned_addresses(&self) -> Vec<(PeerId, Multiaddr)> {
        self.learned.lock().clone()
    }
}

#[async_trait]
impl Network for MockNetwork {
    fn local_peer_id(&self) -> PeerId {
        self.peer_id
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.connected.lock().iter().copied().collect()
    }

    fn peer_record(&self, peer_id: &PeerId) -> PeerRecord {
        let addrs = self
            .mesh
            .upgrade()
            .and_then(|mesh| mesh.node(peer_id))
            .map(|node| node.addr());

        PeerRecord::new(*peer_id, addrs)
    }

    fn add_address(&self, peer_id: PeerId, addr: Multiaddr) {
        self.learned.lock().push((peer_id, addr));
    }

    fn accept(&self, protocol: StreamProtocol) -> Result<InboundStreams> {
        let mut handlers = self.handlers.lock();

        if handlers.contains_key(&protocol) {
            bail!("protocol {protocol} already registered");
        }

        let (tx, rx) = mpsc::unbounded_channel();

        let _ = handlers.insert(protocol, tx);

        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|inbound| (inbound, rx))
        })))
    }

    async fn open_stream(&self, peer_id: PeerId, protocol: StreamProtocol) -> Result<Stream> {
        if !self.is_connected(&peer_id) {
            bail!("not connected to {peer_id}");
        }

        let stalled = self.stalled.lock().contains(&peer_id);

        if stalled {
            future::pending::<()>().await;
        }

        let remote = self
            .mesh
            .upgrade()
            .and_then(|mesh| mesh.node(&peer_id))
            .ok_or_else(|| eyre!("unknown peer {peer_id}"))?;

        let sender = remote
            .handlers
            .lock()
            .get(&protocol)
            .cloned()
            .ok_or_else(|| eyre!("{peer_id} does not support {protocol}"))?;

        let (local, far) = duplex(DUPLEX_CAPACITY);

        sender
            .send(InboundStream {
                peer_id: self.peer_id,
                remote_addr: Some(self.addr()),
                stream: Stream::new(far),
            })
            .map_err(|_| eyre!("{peer_id} stopped accepting {protocol}"))?;

        Ok(Stream::new(local))
    }

    async fn dial(&self, record: &PeerRecord) -> Result<()> {
        *self.dials.lock().entry(record.id).or_default() += 1;

        if self.unreachable.lock().contains(&record.id) {
            bail!("dial to {} refused", record.id);
        }

        let mesh = self.mesh.upgrade().ok_or_else(|| eyre!("mesh dropped"))?;

        let Some(remote) = mesh.node(&record.id) else {
            bail!("no route to {}", record.id);
        };

        let Some(me) = mesh.node(&self.peer_id) else {
            bail!("dialing node left the mesh");
        };

        mesh.connect(&me, &remote);

        Ok(())
    }
}

/// Mock PinStore recording every pin request
#[derive(Clone, Debug, Default)]
pub struct MockPinStore {
    /// What `list` returns
    listed: Arc<Mutex<Vec<String>>>,
    /// Successful pins, in order
    pinned: Arc<Mutex<Vec<String>>>,
    /// Identifiers that fail to pin
    failing: Arc<Mutex<HashSet<String>>>,
    /// Identifiers whose pin takes this long to complete
    slow: Arc<Mutex<HashMap<String, Duration>>>,
}

impl MockPinStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pins(pins: &[&str]) -> Self {
        let store = Self::new();
        *store.listed.lock() = pins.iter().map(|pin| (*pin).to_owned()).collect();
        store
    }

    pub fn fail_on(&self, hash: &str) {
        let _ = self.failing.lock().insert(hash.to_owned());
    }

    pub fn delay_on(&self, hash: &str, delay: Duration) {
        let _ = self.slow.lock().insert(hash.to_owned(), delay);
    }

    pub fn pinned(&self) -> Vec<String> {
        self.pinned.lock().clone()
    }
}

#[async_trait]
impl PinStore for MockPinStore {
    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.listed.lock().clone())
    }

    async fn pin(&self, hash: &str) -> Result<()> {
        let delay = self.slow.lock().get(hash).copied();

        if let Some(delay) = delay {
            sleep(delay).await;
        }

        if self.failing.lock().contains(hash) {
            bail!("pin of {hash} refused");
        }

        self.pinned.lock().push(hash.to_owned());
        self.listed.lock().push(hash.to_owned());

        Ok(())
    }
}
