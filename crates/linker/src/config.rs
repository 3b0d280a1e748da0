use core::time::Duration;

use async_trait::async_trait;
use bustlink_network_primitives::config::BootstrapNodes;
use eyre::Result as EyreResult;
use serde::{Deserialize, Serialize};

/// Direct-connect attempts allowed per peer before it is given up on.
pub const DEFAULT_MAX_ATTEMPTS: u64 = 5;

/// How long startup waits for bootstrap addresses before gossip begins (5 seconds).
pub const DEFAULT_BOOTSTRAP_TIMEOUT_MS: u64 = 5_000;

/// Delay between two gossip rounds (30 seconds).
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 30_000;

/// Budget for a single peer-list or hash-list exchange (30 seconds).
pub const DEFAULT_SYNC_TIMEOUT_MS: u64 = 30_000;

/// Per-round cap on concurrently running exchanges.
pub const DEFAULT_MAX_CONCURRENT: usize = 30;

/// Delay before the first pin harvest (60 seconds).
pub const DEFAULT_PIN_HARVEST_SECS: u64 = 60;

/// Interval between pin harvests after the first one.
pub const HARVEST_FALLBACK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct LinkConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u64,

    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub pinning: PinningConfig,
}

impl LinkConfig {
    #[must_use]
    pub const fn new(
        max_attempts: u64,
        bootstrap: BootstrapConfig,
        sync: SyncConfig,
        pinning: PinningConfig,
    ) -> Self {
        Self {
            max_attempts,
            bootstrap,
            sync,
            pinning,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            bootstrap: BootstrapConfig::default(),
            sync: SyncConfig::default(),
            pinning: PinningConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct BootstrapConfig {
    #[serde(default)]
    pub nodes: BootstrapNodes,

    #[serde(
        rename = "timeout_ms",
        with = "serde_duration",
        default = "default_bootstrap_timeout"
    )]
    pub timeout: Duration,
}

impl BootstrapConfig {
    #[must_use]
    pub const fn new(nodes: BootstrapNodes, timeout: Duration) -> Self {
        Self { nodes, timeout }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            nodes: BootstrapNodes::default(),
            timeout: default_bootstrap_timeout(),
        }
    }
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct SyncConfig {
    /// Delay between gossip rounds
    #[serde(
        rename = "interval_ms",
        with = "serde_duration",
        default = "default_sync_interval"
    )]
    pub interval: Duration,

    /// Budget for one exchange with one peer
    #[serde(
        rename = "timeout_ms",
        with = "serde_duration",
        default = "default_sync_timeout"
    )]
    pub timeout: Duration,

    /// Maximum exchanges in flight within a round
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl SyncConfig {
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            interval,
            timeout,
            max_concurrent,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: default_sync_interval(),
            timeout: default_sync_timeout(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct PinningConfig {
    /// Delay before the first harvest of the local pin set
    #[serde(
        rename = "per_seconds",
        with = "serde_secs",
        default = "default_pin_harvest"
    )]
    pub harvest_after: Duration,

    /// Whether announced hashes are pinned before the next line is read
    #[serde(default = "default_wait")]
    pub wait: bool,
}

impl PinningConfig {
    #[must_use]
    pub const fn new(harvest_after: Duration, wait: bool) -> Self {
        Self {
            harvest_after,
            wait,
        }
    }
}

impl Default for PinningConfig {
    fn default() -> Self {
        Self {
            harvest_after: default_pin_harvest(),
            wait: true,
        }
    }
}

const fn default_max_attempts() -> u64 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_bootstrap_timeout() -> Duration {
    Duration::from_millis(DEFAULT_BOOTSTRAP_TIMEOUT_MS)
}

const fn default_sync_interval() -> Duration {
    Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS)
}

const fn default_sync_timeout() -> Duration {
    Duration::from_millis(DEFAULT_SYNC_TIMEOUT_MS)
}

const fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

const fn default_pin_harvest() -> Duration {
    Duration::from_secs(DEFAULT_PIN_HARVEST_SECS)
}

const fn default_wait() -> bool {
    true
}

/// Supplies the current link configuration.
///
/// Read at the start of every operation that depends on it, so implementations
/// backed by a file pick up edits without a restart.
#[async_trait]
pub trait ConfigSource: Send + Sync + 'static {
    async fn snapshot(&self) -> EyreResult<LinkConfig>;
}

#[async_trait]
impl ConfigSource for LinkConfig {
    async fn snapshot(&self) -> EyreResult<LinkConfig> {
        Ok(self.clone())
    }
}

mod serde_duration {
    use core::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod serde_secs {
    use core::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
