use std::fs::create_dir_all;

use bustlink_config::{ConfigFile, StoreConfig, DEFAULT_STORE_API};
use bustlink_linker::config::{
    BootstrapConfig, LinkConfig, PinningConfig, SyncConfig, DEFAULT_MAX_ATTEMPTS,
};
use bustlink_network_primitives::config::{BootstrapNodes, SwarmConfig, DEFAULT_PORT};
use clap::Parser;
use eyre::{bail, Result as EyreResult, WrapErr};
use libp2p::identity::Keypair;
use libp2p::multiaddr::Protocol;
use libp2p::Multiaddr;
use tracing::{info, warn};
use url::Url;

use crate::cli::RootArgs;

/// Initialize node configuration
#[derive(Debug, Parser)]
pub struct InitCommand {
    /// Host to listen on
    #[arg(long, value_name = "HOST", default_value = "0.0.0.0")]
    pub swarm_host: String,

    /// Port to listen on
    #[arg(long, value_name = "PORT", default_value_t = DEFAULT_PORT)]
    pub swarm_port: u16,

    /// List of bootstrap nodes, each ending in /p2p/<peer id>
    #[arg(long, value_name = "ADDR", value_delimiter = ',')]
    pub boot_nodes: Vec<Multiaddr>,

    /// Kubo RPC endpoint used to list and pin content
    #[arg(long, value_name = "URL", default_value = DEFAULT_STORE_API)]
    pub store_api: Url,

    /// How often a newly learned peer may fail to connect before it is given up on
    #[arg(long, value_name = "COUNT", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u64,

    /// Force overwrite of an existing configuration
    #[arg(long, short)]
    pub force: bool,
}

impl InitCommand {
    pub fn run(self, root_args: &RootArgs) -> EyreResult<()> {
        let path = root_args.node_dir();

        if !path.exists() {
            create_dir_all(&path)
                .wrap_err_with(|| format!("failed to create directory {path:?}"))?;
        }

        if ConfigFile::exists(&path) {
            if !self.force {
                bail!("Node is already initialized in {:?}", path);
            }

            warn!("Overwriting the existing configuration in {:?}", path);
        }

        for addr in &self.boot_nodes {
            if !matches!(addr.iter().last(), Some(Protocol::P2p(_))) {
                bail!("Bootstrap node {addr} does not end with a /p2p/ component");
            }
        }

        let identity = Keypair::generate_ed25519();
        info!(peer_id = %identity.public().to_peer_id(), "Generated identity");

        let link = LinkConfig::new(
            self.max_attempts,
            BootstrapConfig::new(
                BootstrapNodes::new(self.boot_nodes),
                BootstrapConfig::default().timeout,
            ),
            SyncConfig::default(),
            PinningConfig::default(),
        );

        let config = ConfigFile::new(
            identity,
            SwarmConfig::new(SwarmConfig::default_listen(
                &self.swarm_host,
                self.swarm_port,
            )),
            link,
            StoreConfig::new(self.store_api),
        );

        config.save(&path)?;

        info!("Initialized a node in {:?}", path);

        Ok(())
    }
}
