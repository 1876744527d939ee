//! Typed adapter over a raw config subscription.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::warn;

use lattice_eventbus::EventReceiver;

use crate::node::ConfigPayload;

/// Tracks the latest value of one registrable subtree.
///
/// The bus delivers erased payloads; the watcher downcasts them to `T`,
/// keeps the newest value and hands each one to a callback.
pub struct ConfigWatcher<T> {
    current: Arc<RwLock<T>>,
}

impl<T: Clone + Send + Sync + 'static> ConfigWatcher<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: Arc::new(RwLock::new(initial)),
        }
    }

    /// The most recently seen value.
    pub fn config(&self) -> T {
        self.current.read().clone()
    }

    /// Drain the subscription on a background task.
    ///
    /// Payloads that are not a `T` are logged and dropped. The task ends
    /// when the sending side goes away.
    pub fn listen<F>(&self, mut rx: EventReceiver<ConfigPayload>, callback: F) -> JoinHandle<()>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let current = self.current.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event.into_data().downcast::<T>() {
                    Ok(config) => {
                        let config = (*config).clone();
                        *current.write() = config.clone();
                        callback(config);
                    }
                    Err(_) => warn!("config payload has unexpected type"),
                }
            }
        })
    }
}
