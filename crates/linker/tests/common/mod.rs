//! Common fixtures for linker tests

pub mod mocks;

use std::sync::Arc;
use std::time::Duration;

use bustlink_linker::config::{BootstrapConfig, LinkConfig, PinningConfig, SyncConfig};
use bustlink_linker::Linker;
use bustlink_network_primitives::config::BootstrapNodes;
use libp2p::Multiaddr;
use tokio_util::sync::CancellationToken;

use mocks::{Mesh, MockNetwork, MockPinStore};

/// Link configuration with short timeouts
pub fn test_config(max_attempts: u64) -> LinkConfig {
    LinkConfig::new(
        max_attempts,
        BootstrapConfig::new(BootstrapNodes::default(), Duration::from_millis(500)),
        SyncConfig::new(Duration::from_secs(1), Duration::from_secs(2), 30),
        PinningConfig::new(Duration::from_secs(60), true),
    )
}

pub fn with_bootstrap(config: LinkConfig, nodes: Vec<Multiaddr>) -> LinkConfig {
    LinkConfig::new(
        config.max_attempts,
        BootstrapConfig::new(BootstrapNodes::new(nodes), config.bootstrap.timeout),
        config.sync,
        config.pinning,
    )
}

/// A linker wired to a mesh node and a recording pin store
pub struct TestNode {
    pub network: Arc<MockNetwork>,
    pub store: MockPinStore,
    pub linker: Linker,
    pub token: CancellationToken,
}

impl TestNode {
    pub fn new(mesh: &Arc<Mesh>, config: LinkConfig, store: MockPinStore) -> Self {
        let network = mesh.join();
        let token = CancellationToken::new();

        let linker = Linker::new(
            Arc::clone(&network) as _,
            Arc::new(store.clone()),
            Arc::new(config),
            token.clone(),
        );

        Self {
            network,
            store,
            linker,
            token,
        }
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
