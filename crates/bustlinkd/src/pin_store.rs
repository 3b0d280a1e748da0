use std::collections::BTreeMap;

use async_trait::async_trait;
use bustlink_linker::pinning::PinStore;
use eyre::{Result as EyreResult, WrapErr};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Pin store backed by the RPC API of a local kubo node.
#[derive(Clone, Debug)]
pub struct KuboPinStore {
    client: Client,
    api: Url,
}

#[derive(Debug, Deserialize)]
struct PinLsResponse {
    #[serde(rename = "Keys", default)]
    keys: BTreeMap<String, PinInfo>,
}

#[derive(Debug, Deserialize)]
struct PinInfo {
    #[serde(rename = "Type")]
    kind: String,
}

impl PinLsResponse {
    fn into_recursive(self) -> Vec<String> {
        self.keys
            .into_iter()
            .filter(|(_, info)| info.kind == "recursive")
            .map(|(cid, _)| cid)
            .collect()
    }
}

impl KuboPinStore {
    pub fn new(api: Url) -> EyreResult<Self> {
        // Cannot-be-a-base URLs have nothing to join onto.
        let _probe = api.join("api/v0/")?;

        Ok(Self {
            client: Client::new(),
            api,
        })
    }

    fn endpoint(&self, command: &str) -> EyreResult<Url> {
        self.api
            .join(&format!("api/v0/{command}"))
            .wrap_err_with(|| format!("invalid store API url {}", self.api))
    }
}

#[async_trait]
impl PinStore for KuboPinStore {
    async fn list(&self) -> EyreResult<Vec<String>> {
        let mut url = self.endpoint("pin/ls")?;
        let _pairs = url.query_pairs_mut().append_pair("type", "recursive");

        let response: PinLsResponse = self
            .client
            .post(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .wrap_err("malformed pin/ls response")?;

        Ok(response.into_recursive())
    }

    async fn pin(&self, hash: &str) -> EyreResult<()> {
        let mut url = self.endpoint("pin/add")?;
        let _pairs = url.query_pairs_mut().append_pair("arg", hash);

        debug!(%hash, "Pinning");

        let _response = self
            .client
            .post(url)
            .send()
            .await?
            .error_for_status()
            .wrap_err_with(|| format!("pin/add {hash} rejected"))?;

        Ok(())
    }
}
