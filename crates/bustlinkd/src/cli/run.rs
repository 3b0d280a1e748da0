use std::sync::Arc;

use bustlink_config::{ConfigFile, FileConfigSource};
use bustlink_linker::Linker;
use bustlink_network_primitives::config::NetworkConfig;
use clap::Parser;
use eyre::{bail, Result as EyreResult, WrapErr};
use tokio::signal::ctrl_c;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::RootArgs;
use crate::pin_store::KuboPinStore;

/// Run a node
#[derive(Debug, Parser)]
pub struct RunCommand {}

impl RunCommand {
    pub async fn run(self, root_args: &RootArgs) -> EyreResult<()> {
        let path = root_args.node_dir();

        if !ConfigFile::exists(&path) {
            bail!("Node is not initialized in {:?}", path);
        }

        let config = ConfigFile::load(&path)?;

        let peer_id = config.identity.public().to_peer_id();
        info!(%peer_id, "Starting node");

        let token = CancellationToken::new();
        let _shutdown = token.clone().drop_guard();

        let network = bustlink_network::run(
            &NetworkConfig::new(config.identity, config.swarm),
            token.clone(),
        )
        .await?;

        let pin_store = KuboPinStore::new(config.store.api)?;

        let linker = Linker::new(
            Arc::new(network),
            Arc::new(pin_store),
            Arc::new(FileConfigSource::new(&path)),
            token.clone(),
        );

        linker.start().await?;

        ctrl_c().await.wrap_err("failed to listen for ctrl-c")?;

        info!("Shutting down");

        Ok(())
    }
}
