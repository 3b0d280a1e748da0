use core::fmt::{self, Debug, Formatter};
use core::time::Duration;
use std::sync::Arc;

use bustlink_network_primitives::client::Network;
use bustlink_network_primitives::record::PeerRecord;
use bustlink_network_primitives::stream::{LINK_HASH_PROTOCOL, LINK_PEERS_PROTOCOL};
use futures_util::stream::FuturesUnordered;
use futures_util::{StreamExt, TryStreamExt};
use libp2p::PeerId;
use tokio::select;
use tokio::time::error::Elapsed;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{
    ConfigSource, LinkConfig, PinningConfig, DEFAULT_SYNC_INTERVAL_MS, HARVEST_FALLBACK_INTERVAL,
};
use crate::errors::{ExchangeError, LinkError};
use crate::hashes::{ContentId, HashCache};
use crate::peers::PeerAddressCache;
use crate::pinning::PinningGateway;
use crate::retry::RetryLedger;

/// What [`SyncEngine::update_peer_address`] concluded about a candidate.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PeerUpdate {
    /// The record names this node.
    Local,
    /// A stream could be opened, so the peer is already reachable.
    Reachable,
    /// Already cached and never failed to connect; nothing to do.
    Known,
    /// A direct connection was established.
    Connected,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Exchange {
    Peers,
    Hashes,
}

/// Outcome of one gossip round.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct RoundReport {
    pub peers: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Drives the periodic gossip rounds and the local pin harvest.
#[derive(Clone)]
pub struct SyncEngine {
    network: Arc<dyn Network>,
    config: Arc<dyn ConfigSource>,
    peers: Arc<PeerAddressCache>,
    hashes: Arc<HashCache>,
    retries: Arc<RetryLedger>,
    pinning: Arc<PinningGateway>,
    token: CancellationToken,
}

impl Debug for SyncEngine {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("network", &self.network)
            .field("peers", &self.peers.len())
            .field("hashes", &self.hashes.len())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    #[must_use]
    pub fn new(
        network: Arc<dyn Network>,
        config: Arc<dyn ConfigSource>,
        peers: Arc<PeerAddressCache>,
        hashes: Arc<HashCache>,
        retries: Arc<RetryLedger>,
        pinning: Arc<PinningGateway>,
        token: CancellationToken,
    ) -> Self {
        Self {
            network,
            config,
            peers,
            hashes,
            retries,
            pinning,
            token,
        }
    }

    /// Runs gossip rounds until cancelled, sleeping the configured interval
    /// between the end of one round and the start of the next.
    pub async fn run(self) {
        #[expect(clippy::redundant_pub_crate, reason = "Needed for Tokio code")]
        loop {
            let interval = match self.config.snapshot().await {
                Ok(config) => {
                    let start = Instant::now();

                    select! {
                        () = self.token.cancelled() => break,
                        report = self.sync_round(&config) => {
                            debug!(
                                peers = report.peers,
                                completed = report.completed,
                                failed = report.failed,
                                took = ?start.elapsed(),
                                "Sync round finished"
                            );
                        }
                    }

                    config.sync.interval
                }
                Err(err) => {
                    error!(?err, "Failed to read link configuration, skipping sync round");

                    Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS)
                }
            };

            select! {
                () = self.token.cancelled() => break,
                () = sleep(interval) => {}
            }
        }

        debug!("Sync loop stopped");
    }

    /// Asks every connected peer for its peer list and its hash list.
    ///
    /// Resolves only once every exchange of the round has finished or timed out.
    pub async fn sync_round(&self, config: &LinkConfig) -> RoundReport {
        let local = self.network.local_peer_id();

        let peers = self
            .network
            .connected_peers()
            .into_iter()
            .filter(|peer_id| *peer_id != local)
            .collect::<Vec<_>>();

        let mut report = RoundReport {
            peers: peers.len(),
            ..RoundReport::default()
        };

        if peers.is_empty() {
            debug!("No peers to sync with");

            return report;
        }

        let max_concurrent = config.sync.max_concurrent.max(1);

        let mut futs = FuturesUnordered::new();

        let mut tally = |succeeded: bool| {
            if succeeded {
                report.completed = report.completed.saturating_add(1);
            } else {
                report.failed = report.failed.saturating_add(1);
            }
        };

        for peer_id in peers {
            for exchange in [Exchange::Peers, Exchange::Hashes] {
                if futs.len() >= max_concurrent {
                    if let Some(succeeded) = futs.next().await {
                        tally(succeeded);
                    }
                }

                futs.push(self.exchange(peer_id, exchange, config));
            }
        }

        while let Some(succeeded) = futs.next().await {
            tally(succeeded);
        }

        report
    }

    async fn exchange(&self, peer_id: PeerId, exchange: Exchange, config: &LinkConfig) -> bool {
        let start = Instant::now();

        let result = match exchange {
            Exchange::Peers => timeout(config.sync.timeout, self.pull_peers(peer_id)).await,
            Exchange::Hashes => self.pull_hashes(peer_id, config).await,
        };

        let took = start.elapsed();

        match result {
            Ok(Ok(received)) => {
                debug!(%peer_id, ?exchange, received, ?took, "Exchange finished");

                true
            }
            Ok(Err(err)) if err.is_malformed() => {
                warn!(%peer_id, ?exchange, %err, "Peer sent a malformed record");

                false
            }
            Ok(Err(err)) => {
                debug!(%peer_id, ?exchange, %err, "Exchange failed");

                false
            }
            Err(_elapsed) => {
                debug!(%peer_id, ?exchange, ?took, "Exchange timed out");

                false
            }
        }
    }

    async fn pull_peers(&self, peer_id: PeerId) -> Result<usize, ExchangeError> {
        let mut stream = self
            .network
            .open_stream(peer_id, LINK_PEERS_PROTOCOL)
            .await
            .map_err(ExchangeError::Open)?;

        let mut received = 0_usize;

        while let Some(line) = stream.try_next().await? {
            let record = PeerRecord::from_json_line(&line)?;

            received = received.saturating_add(1);

            let candidate = record.id;

            match self.update_peer_address(record).await {
                Ok(outcome) => debug!(from = %peer_id, %candidate, ?outcome, "Processed peer record"),
                Err(err @ LinkError::Config(_)) => {
                    error!(from = %peer_id, %candidate, %err, "Failed to process peer record");
                }
                Err(err) => debug!(from = %peer_id, %candidate, %err, "Failed to process peer record"),
            }
        }

        Ok(received)
    }

    /// Reads the hash list under the exchange timeout, then applies whatever
    /// arrived. Pinning is not bounded by the timeout.
    async fn pull_hashes(
        &self,
        peer_id: PeerId,
        config: &LinkConfig,
    ) -> Result<Result<usize, ExchangeError>, Elapsed> {
        let mut hashes = Vec::new();

        let result = timeout(config.sync.timeout, self.read_hashes(peer_id, &mut hashes)).await;

        let received = hashes.len();

        for hash in &hashes {
            self.update_hash(hash, peer_id, &config.pinning).await;
        }

        result.map(|read| read.map(|()| received))
    }

    async fn read_hashes(
        &self,
        peer_id: PeerId,
        hashes: &mut Vec<ContentId>,
    ) -> Result<(), ExchangeError> {
        let mut stream = self
            .network
            .open_stream(peer_id, LINK_HASH_PROTOCOL)
            .await
            .map_err(ExchangeError::Open)?;

        while let Some(line) = stream.try_next().await? {
            hashes.push(line.parse::<ContentId>()?);
        }

        Ok(())
    }

    /// Makes sure `record.id` is reachable, connecting to it directly when it
    /// is newly learned or still has attempts left.
    pub async fn update_peer_address(&self, record: PeerRecord) -> Result<PeerUpdate, LinkError> {
        let peer_id = record.id;

        if peer_id == self.network.local_peer_id() {
            return Ok(PeerUpdate::Local);
        }

        match self.network.open_stream(peer_id, LINK_PEERS_PROTOCOL).await {
            Ok(mut stream) => {
                let _ignored = stream.close().await;

                return Ok(PeerUpdate::Reachable);
            }
            Err(err) => debug!(%peer_id, %err, "Peer is not reachable yet"),
        }

        let config = self.config.snapshot().await.map_err(LinkError::Config)?;

        let novel = self.peers.add_if_absent(record.clone());

        let failures = self.retries.failures(&peer_id);

        if !novel && failures == 0 {
            return Ok(PeerUpdate::Known);
        }

        if self.retries.is_exhausted(&peer_id, config.max_attempts) {
            return Err(LinkError::RetryExhausted {
                peer_id,
                attempts: failures,
            });
        }

        let mut target = self.peers.get(&peer_id).unwrap_or_else(|| record.clone());
        let _ = target.merge(record);

        let attempt = failures.saturating_add(1);

        if let Err(reason) = self.network.dial(&target).await {
            let _ignored = self.retries.record_failure(peer_id);

            return Err(LinkError::Dial {
                peer_id,
                attempt,
                reason,
            });
        }

        info!(%peer_id, attempt, "Connected to newly learned peer");

        let _ = self.peers.merge(target);
        self.retries.reset(&peer_id);

        Ok(PeerUpdate::Connected)
    }

    /// Records that `peer_id` announced `hash` and pins it locally.
    pub async fn update_hash(&self, hash: &ContentId, peer_id: PeerId, pinning: &PinningConfig) {
        if self.hashes.add(hash.as_str(), peer_id) {
            debug!(%hash, %peer_id, "Learned announced hash");
        }

        if pinning.wait {
            let _ignored = self.pinning.add_sync(hash.as_str()).await;
        } else {
            drop(self.pinning.add(hash.to_string()));
        }
    }

    /// Periodically lists the local pin store so its content is announced.
    ///
    /// The first harvest happens after the configured delay, every later one
    /// after [`HARVEST_FALLBACK_INTERVAL`].
    pub async fn harvest_pins(self) {
        let mut delay = match self.config.snapshot().await {
            Ok(config) => config.pinning.harvest_after,
            Err(err) => {
                error!(?err, "Failed to read link configuration, using default harvest delay");

                PinningConfig::default().harvest_after
            }
        };

        let local = self.network.local_peer_id();

        #[expect(clippy::redundant_pub_crate, reason = "Needed for Tokio code")]
        loop {
            select! {
                () = self.token.cancelled() => break,
                () = sleep(delay) => {}
            }

            delay = HARVEST_FALLBACK_INTERVAL;

            let result = select! {
                () = self.token.cancelled() => break,
                result = self.pinning.harvest() => result,
            };

            match result {
                Ok(pins) => {
                    for pin in pins {
                        let _ = self.hashes.add(&pin, local);
                    }
                }
                Err(err) => warn!(%err, "Failed to list local pins"),
            }
        }

        debug!("Pin harvest stopped");
    }
}
