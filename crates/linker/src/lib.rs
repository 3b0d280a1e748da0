//! Gossip of peer addresses and pinned content between linked nodes.
//!
//! Every round, each connected peer is asked for the peers it is connected to
//! and for the content identifiers it has pinned. Newly learned peers are dialed
//! and announced content is pinned locally.

use core::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use bustlink_network_primitives::client::Network;
use bustlink_network_primitives::record::PeerRecord;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio::{select, spawn};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConfigSource;
use crate::errors::LinkError;
use crate::handlers::{serve, AddressHandler, HashListHandler, PeerListHandler};
use crate::hashes::HashCache;
use crate::peers::PeerAddressCache;
use crate::pinning::{PinStore, PinningGateway};
use crate::retry::RetryLedger;
use crate::sync::SyncEngine;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod hashes;
pub mod peers;
pub mod pinning;
pub mod retry;
pub mod sync;

pub struct Linker {
    network: Arc<dyn Network>,
    config: Arc<dyn ConfigSource>,
    peers: Arc<PeerAddressCache>,
    hashes: Arc<HashCache>,
    retries: Arc<RetryLedger>,
    pinning: Arc<PinningGateway>,
    engine: SyncEngine,
    token: CancellationToken,
}

impl Debug for Linker {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Linker")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl Linker {
    #[must_use]
    pub fn new(
        network: Arc<dyn Network>,
        pin_store: Arc<dyn PinStore>,
        config: Arc<dyn ConfigSource>,
        token: CancellationToken,
    ) -> Self {
        let peers = Arc::new(PeerAddressCache::new());
        let hashes = Arc::new(HashCache::new());
        let retries = Arc::new(RetryLedger::new());
        let pinning = Arc::new(PinningGateway::new(pin_store));

        let engine = SyncEngine::new(
            Arc::clone(&network),
            Arc::clone(&config),
            Arc::clone(&peers),
            Arc::clone(&hashes),
            Arc::clone(&retries),
            Arc::clone(&pinning),
            token.clone(),
        );

        Self {
            network,
            config,
            peers,
            hashes,
            retries,
            pinning,
            engine,
            token,
        }
    }

    /// Registers the protocol handlers, connects to the bootstrap peers and
    /// spawns the sync and harvest loops.
    ///
    /// Bootstrapping gives up silently once the configured timeout elapses; only
    /// configuration errors make this fail.
    pub async fn start(&self) -> Result<(), LinkError> {
        self.register_handlers()?;

        self.bootstrap().await?;

        if self.token.is_cancelled() {
            return Ok(());
        }

        drop(spawn(self.engine.clone().run()));
        drop(spawn(self.engine.clone().harvest_pins()));

        info!(peer_id = %self.network.local_peer_id(), "Linker started");

        Ok(())
    }

    /// Starts serving the peer-list, hash-list and address protocols.
    pub fn register_handlers(&self) -> Result<(), LinkError> {
        drop(serve(
            &*self.network,
            PeerListHandler::new(Arc::clone(&self.network), Arc::clone(&self.peers)),
            self.token.clone(),
        )?);
        drop(serve(
            &*self.network,
            HashListHandler::new(Arc::clone(&self.pinning)),
            self.token.clone(),
        )?);
        drop(serve(
            &*self.network,
            AddressHandler::new(Arc::clone(&self.network), Arc::clone(&self.peers)),
            self.token.clone(),
        )?);

        Ok(())
    }

    /// Feeds the configured bootstrap peers through
    /// [`SyncEngine::update_peer_address`] until they are exhausted or the
    /// bootstrap timeout elapses.
    pub async fn bootstrap(&self) -> Result<(), LinkError> {
        let config = self.config.snapshot().await.map_err(LinkError::Config)?;

        let nodes = config.bootstrap.nodes.list;

        if nodes.is_empty() {
            return Ok(());
        }

        let (tx, mut rx) = mpsc::channel(nodes.len());

        drop(spawn(async move {
            for addr in nodes {
                let record = match PeerRecord::try_from(addr) {
                    Ok(record) => record,
                    Err(err) => {
                        warn!(%err, "Skipping bootstrap address");
                        continue;
                    }
                };

                if tx.send(record).await.is_err() {
                    break;
                }
            }
        }));

        let drain = async {
            let mut count = 0_usize;

            while let Some(record) = rx.recv().await {
                let peer_id = record.id;

                match self.engine.update_peer_address(record).await {
                    Ok(outcome) => debug!(%peer_id, ?outcome, "Bootstrapped peer"),
                    Err(err @ LinkError::Config(_)) => return Err(err),
                    Err(err) => warn!(%peer_id, %err, "Failed to bootstrap peer"),
                }

                count = count.saturating_add(1);
            }

            Ok(count)
        };

        #[expect(clippy::redundant_pub_crate, reason = "Needed for Tokio code")]
        let result = select! {
            () = self.token.cancelled() => return Ok(()),
            result = timeout(config.bootstrap.timeout, drain) => result,
        };

        match result {
            Ok(count) => {
                let count = count?;

                debug!(count, "Bootstrap finished");
            }
            Err(_elapsed) => debug!(timeout = ?config.bootstrap.timeout, "Bootstrap timed out"),
        }

        Ok(())
    }

    #[must_use]
    pub const fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    #[must_use]
    pub const fn peers(&self) -> &Arc<PeerAddressCache> {
        &self.peers
    }

    #[must_use]
    pub const fn hashes(&self) -> &Arc<HashCache> {
        &self.hashes
    }

    #[must_use]
    pub const fn retries(&self) -> &Arc<RetryLedger> {
        &self.retries
    }

    #[must_use]
    pub const fn pinning(&self) -> &Arc<PinningGateway> {
        &self.pinning
    }
}
