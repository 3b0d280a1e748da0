use core::fmt::{self, Debug, Formatter};
use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result as EyreResult;
use parking_lot::RwLock;
use tokio::spawn;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// The local pinning engine.
#[async_trait]
pub trait PinStore: Send + Sync + 'static {
    /// Identifiers pinned recursively on this node.
    async fn list(&self) -> EyreResult<Vec<String>>;

    /// Pins `hash`, returning once the store has completed the pin.
    async fn pin(&self, hash: &str) -> EyreResult<()>;
}

/// Front of the pin store used by the gossip loop.
///
/// Keeps the set of identifiers this node announces to its peers. The set is
/// filled by harvesting the store and by every pin that succeeds.
pub struct PinningGateway {
    store: Arc<dyn PinStore>,
    announced: RwLock<BTreeSet<String>>,
}

impl Debug for PinningGateway {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinningGateway")
            .field("announced", &self.announced.read().len())
            .finish_non_exhaustive()
    }
}

impl PinningGateway {
    #[must_use]
    pub fn new(store: Arc<dyn PinStore>) -> Self {
        Self {
            store,
            announced: RwLock::default(),
        }
    }

    /// Identifiers currently announced, in a stable order.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.announced.read().iter().cloned().collect()
    }

    /// Lists the store and merges the result into the announced set.
    ///
    /// Returns everything the store listed.
    pub async fn harvest(&self) -> EyreResult<Vec<String>> {
        let pins = self.store.list().await?;

        let added = {
            let mut announced = self.announced.write();
            pins.iter()
                .map(|hash| announced.insert(hash.clone()))
                .filter(|added| *added)
                .count()
        };

        debug!(total = pins.len(), added, "Harvested local pins");

        Ok(pins)
    }

    /// Pins `hash` in the background.
    pub fn add(self: &Arc<Self>, hash: String) -> JoinHandle<bool> {
        let this = Arc::clone(self);

        spawn(async move { this.add_sync(&hash).await })
    }

    /// Pins `hash` and waits for the store. Failures are logged, never returned.
    pub async fn add_sync(&self, hash: &str) -> bool {
        if let Err(err) = self.store.pin(hash).await {
            warn!(%hash, %err, "Failed to pin announced content");
            return false;
        }

        debug!(%hash, "Pinned announced content");

        let _ = self.announced.write().insert(hash.to_owned());

        true
    }
}

#[cfg(test)]
mod tests {
    use eyre::bail;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingStore {
        listed: Vec<String>,
        pinned: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PinStore for RecordingStore {
        async fn list(&self) -> EyreResult<Vec<String>> {
            Ok(self.listed.clone())
        }

        async fn pin(&self, hash: &str) -> EyreResult<()> {
            if hash == "broken" {
                bail!("pin refused");
            }

            self.pinned.lock().push(hash.to_owned());

            Ok(())
        }
    }

    #[tokio::test]
    async fn test_harvest_fills_announced_set() {
        let store = Arc::new(RecordingStore {
            listed: vec!["QmB".to_owned(), "QmA".to_owned()],
            ..RecordingStore::default()
        });
        let gateway = PinningGateway::new(store);

        assert!(gateway.list().is_empty());

        let pins = gateway.harvest().await.unwrap();

        assert_eq!(pins.len(), 2);
        assert_eq!(gateway.list(), vec!["QmA".to_owned(), "QmB".to_owned()]);
    }

    #[tokio::test]
    async fn test_add_sync_swallows_failures() {
        let store = Arc::new(RecordingStore::default());
        let gateway = PinningGateway::new(Arc::clone(&store) as Arc<dyn PinStore>);

        assert!(gateway.add_sync("QmA").await);
        assert!(!gateway.add_sync("broken").await);

        assert_eq!(*store.pinned.lock(), vec!["QmA".to_owned()]);
        assert_eq!(gateway.list(), vec!["QmA".to_owned()]);
    }

    #[tokio::test]
    async fn test_add_pins_in_background() {
        let store = Arc::new(RecordingStore::default());
        let gateway = Arc::new(PinningGateway::new(
            Arc::clone(&store) as Arc<dyn PinStore>
        ));

        assert!(gateway.add("QmA".to_owned()).await.unwrap());
        assert_eq!(*store.pinned.lock(), vec!["QmA".to_owned()]);
    }
}
