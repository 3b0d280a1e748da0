use core::fmt::{self, Formatter};
use core::time::Duration;

use libp2p::identity::Keypair;
use multiaddr::{Multiaddr, Protocol};
use serde::de::{Error as SerdeError, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_PORT: u16 = 4101;

/// Connections idle for longer than this are closed by the swarm.
///
/// Must stay above the gossip interval or the mesh falls apart between rounds.
pub const DEFAULT_IDLE_CONNECTION_TIMEOUT_SECS: u64 = 300;

#[derive(Debug)]
#[non_exhaustive]
pub struct NetworkConfig {
    pub identity: Keypair,

    pub swarm: SwarmConfig,
}

impl NetworkConfig {
    #[must_use]
    pub const fn new(identity: Keypair, swarm: SwarmConfig) -> Self {
        Self { identity, swarm }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct SwarmConfig {
    pub listen: Vec<Multiaddr>,

    #[serde(
        rename = "idle_timeout_secs",
        with = "serde_secs",
        default = "default_idle_timeout"
    )]
    pub idle_timeout: Duration,
}

impl SwarmConfig {
    #[must_use]
    pub const fn new(listen: Vec<Multiaddr>) -> Self {
        Self {
            listen,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_CONNECTION_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn default_listen(host: &str, port: u16) -> Vec<Multiaddr> {
        [
            format!("/ip4/{host}/tcp/{port}"),
            format!("/ip4/{host}/udp/{port}/quic-v1"),
        ]
        .iter()
        .filter_map(|addr| addr.parse().ok())
        .collect()
    }
}

const fn default_idle_timeout() -> Duration {
    Duration::from_secs(DEFAULT_IDLE_CONNECTION_TIMEOUT_SECS)
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct BootstrapNodes {
    #[serde(deserialize_with = "deserialize_bootstrap")]
    pub list: Vec<Multiaddr>,
}

impl BootstrapNodes {
    #[must_use]
    pub const fn new(list: Vec<Multiaddr>) -> Self {
        Self { list }
    }
}

fn deserialize_bootstrap<'de, D>(deserializer: D) -> Result<Vec<Multiaddr>, D::Error>
where
    D: Deserializer<'de>,
{
    struct BootstrapVisitor;

    impl<'de> Visitor<'de> for BootstrapVisitor {
        type Value = Vec<Multiaddr>;

        fn expecting(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
            formatter.write_str("a list of multiaddresses ending in /p2p/<peer id>")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut addrs = Vec::new();

            while let Some(addr) = seq.next_element::<Multiaddr>()? {
                let Some(Protocol::P2p(_)) = addr.iter().last() else {
                    return Err(SerdeError::custom(format!(
                        "bootstrap address {addr} is missing a peer ID"
                    )));
                };

                addrs.push(addr);
            }

            Ok(addrs)
        }
    }

    deserializer.deserialize_seq(BootstrapVisitor)
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
