use std::fs::{read_to_string, write};

use async_trait::async_trait;
use bustlink_linker::config::{ConfigSource, LinkConfig};
use bustlink_network_primitives::config::SwarmConfig;
use camino::{Utf8Path, Utf8PathBuf};
use eyre::{Result as EyreResult, WrapErr};
use libp2p_identity::Keypair;
use serde::{Deserialize, Serialize};
use tokio::fs;
use url::Url;

pub const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_STORE_API: &str = "http://127.0.0.1:5001";

#[derive(Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct ConfigFile {
    #[serde(with = "serde_identity")]
    pub identity: Keypair,

    pub swarm: SwarmConfig,

    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

/// Where the local pin store (a kubo node) is reached.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct StoreConfig {
    #[serde(default = "default_store_api")]
    pub api: Url,
}

impl StoreConfig {
    #[must_use]
    pub const fn new(api: Url) -> Self {
        Self { api }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(default_store_api())
    }
}

fn default_store_api() -> Url {
    DEFAULT_STORE_API.parse().expect("invalid default store API URL")
}

impl ConfigFile {
    #[must_use]
    pub const fn new(
        identity: Keypair,
        swarm: SwarmConfig,
        link: LinkConfig,
        store: StoreConfig,
    ) -> Self {
        Self {
            identity,
            swarm,
            link,
            store,
        }
    }

    #[must_use]
    pub fn exists(dir: &Utf8Path) -> bool {
        dir.join(CONFIG_FILE).is_file()
    }

    pub fn load(dir: &Utf8Path) -> EyreResult<Self> {
        let path = dir.join(CONFIG_FILE);
        let content = read_to_string(&path)
            .wrap_err_with(|| format!("failed to read configuration from {path:?}"))?;

        toml::from_str(&content).map_err(Into::into)
    }

    pub fn save(&self, dir: &Utf8Path) -> EyreResult<()> {
        let path = dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)?;

        write(&path, content)
            .wrap_err_with(|| format!("failed to write configuration to {path:?}"))?;

        Ok(())
    }
}

/// Reads the `[link]` section afresh from `config.toml` on every snapshot.
#[derive(Clone, Debug)]
pub struct FileConfigSource {
    path: Utf8PathBuf,
}

impl FileConfigSource {
    #[must_use]
    pub fn new(dir: &Utf8Path) -> Self {
        Self {
            path: dir.join(CONFIG_FILE),
        }
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn snapshot(&self) -> EyreResult<LinkConfig> {
        let content = fs::read_to_string(&self.path)
            .await
            .wrap_err_with(|| format!("failed to read configuration from {:?}", self.path))?;

        let config: ConfigFile = toml::from_str(&content)
            .wrap_err_with(|| format!("failed to parse configuration in {:?}", self.path))?;

        Ok(config.link)
    }
}

pub mod serde_identity {
    use core::fmt::{self, Formatter};

    use libp2p_identity::Keypair;
    use serde::de::{self, MapAccess};
    use serde::ser::{self, SerializeMap};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(key: &Keypair, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut keypair = serializer.serialize_map(Some(2))?;
        keypair.serialize_entry("peer_id", &key.public().to_peer_id().to_base58())?;
        keypair.serialize_entry(
            "keypair",
            &bs58::encode(&key.to_protobuf_encoding().map_err(ser::Error::custom)?).into_string(),
        )?;
        keypair.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Keypair, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdentityVisitor;

        impl<'de> de::Visitor<'de> for IdentityVisitor {
            type Value = Keypair;

            fn expecting(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
                formatter.write_str("an identity")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut peer_id = None::<String>;
                let mut priv_key = None::<String>;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "peer_id" => peer_id = Some(map.next_value()?),
                        "keypair" => priv_key = Some(map.next_value()?),
                        _ => {}
                    }
                }

                let peer_id = peer_id.ok_or_else(|| de::Error::missing_field("peer_id"))?;
                let priv_key = priv_key.ok_or_else(|| de::Error::missing_field("keypair"))?;

                let decoded_priv_key = bs58::decode(&priv_key)
                    .into_vec()
                    .map_err(de::Error::custom)?;

                let keypair =
                    Keypair::from_protobuf_encoding(&decoded_priv_key).map_err(de::Error::custom)?;

                if peer_id != keypair.public().to_peer_id().to_base58() {
                    return Err(de::Error::custom(format!(
                        "peer_id {peer_id} does not match the keypair"
                    )));
                }

                Ok(keypair)
            }
        }

        deserializer.deserialize_map(IdentityVisitor)
    }
}

#[cfg(test)]
#[path = "tests/config.rs"]
mod tests;
