//! The Manager - orchestrates updates, persistence and notification.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use lattice_eventbus::{EventBus, EventReceiver, Topic};
use lattice_kvstore::KvStore;

use crate::error::ConfigError;
use crate::node::{Config, ConfigPayload, Registrable};
use crate::paths;
use crate::queue::EventQueue;
use crate::rollback::RollbackJournal;
use crate::update::{apply_node, expand, flatten, UpdateContext};

/// Keeps a typed root config consistent between memory and a
/// [`KvStore`], applies dotted-path partial updates transactionally, and
/// fans out change notifications per registrable subtree.
///
/// Updates are serialized internally; callers may share the manager
/// freely behind an `Arc`.
pub struct Manager<C: Config> {
    store: Arc<dyn KvStore>,
    bus: EventBus<ConfigPayload>,
    root: Mutex<C>,
}

impl<C: Config> Manager<C> {
    /// Build a manager from a default root and whatever the store
    /// already holds.
    ///
    /// The store's persisted leaves win over the defaults; the combined
    /// overlay is applied through the normal update path (validation
    /// skipped), so a persisted value that no longer fits the config
    /// type fails construction.
    pub async fn new(store: Arc<dyn KvStore>, root: C) -> Result<Self, ConfigError> {
        let manager = Self {
            store: store.clone(),
            bus: EventBus::new(),
            root: Mutex::new(root),
        };

        let defaults = {
            let root = manager.root.lock().await;
            flatten(&*root)
        };
        let persisted = store.get_all().await?;
        debug!(
            defaults = defaults.len(),
            persisted = persisted.len(),
            "seeding config manager"
        );

        // Persisted entries win, structurally too: a default leaf is
        // dropped when the store holds the same key, an ancestor of it,
        // or anything below it (e.g. an optional that was allocated or
        // nulled out after the defaults were authored).
        let mut overlay: BTreeMap<String, Value> = defaults
            .into_iter()
            .filter(|(key, _)| !is_shadowed(&persisted, key))
            .collect();
        overlay.extend(persisted);
        manager.update_unvalidated(overlay).await?;

        Ok(manager)
    }

    /// A copy of the current root. Mutating it has no effect on the
    /// manager; updates go through [`update`](Manager::update).
    pub async fn root_config(&self) -> C {
        self.root.lock().await.clone()
    }

    /// Subscribe to the topic of a registrable subtree.
    ///
    /// The returned channel yields the subtree's new value (behind an
    /// erased `Arc`, downcast with [`ConfigWatcher`](crate::ConfigWatcher)
    /// or by hand) after every successful update that touches it.
    pub fn register<R: Registrable>(&self, capability: &R) -> EventReceiver<ConfigPayload> {
        self.bus.subscribe(capability.topic())
    }

    /// Subscribe to a topic directly.
    pub fn subscribe_topic(&self, topic: impl Into<Topic>) -> EventReceiver<ConfigPayload> {
        self.bus.subscribe(topic)
    }

    /// Walk every subtree of the current root and run its validation.
    pub async fn validate_all(&self) -> Result<(), ConfigError> {
        let root = self.root.lock().await;
        let name = root.name().to_string();
        root.visit(&name, &mut |path, node| {
            node.validate_node()
                .map_err(|source| ConfigError::Validation {
                    path: path.to_string(),
                    source,
                })
        })
    }

    /// Apply a dotted-path partial update: validate, persist, publish.
    ///
    /// Either the whole input lands (in memory, in the store, and on
    /// the bus) or none of it does.
    pub async fn update(&self, data: BTreeMap<String, Value>) -> Result<(), ConfigError> {
        self.apply(data, true).await
    }

    /// Like [`update`](Manager::update) but skips `Validatable` checks.
    /// Used internally during construction.
    pub async fn update_unvalidated(&self, data: BTreeMap<String, Value>) -> Result<(), ConfigError> {
        self.apply(data, false).await
    }

    async fn apply(&self, data: BTreeMap<String, Value>, validate: bool) -> Result<(), ConfigError> {
        // One update at a time; the journal and queue are per-call.
        let mut root = self.root.lock().await;

        let expanded = expand(&data)?;
        let name = root.name().to_string();
        let Some(subtree) = expanded.get(&name) else {
            return Err(ConfigError::InvalidData);
        };

        let mut staged = root.clone();
        let mut journal = RollbackJournal::new();
        let mut changes = BTreeMap::new();
        let mut queue = EventQueue::new();

        let walked = {
            let mut ctx = UpdateContext {
                journal: &mut journal,
                changes: &mut changes,
                queue: &mut queue,
                validate,
            };
            apply_node(&mut staged, subtree, &name, &mut ctx)
        };
        if let Err(err) = walked {
            debug!(error = %err, "update rejected, rolling back staged tree");
            journal.replay(&mut staged);
            return Err(err);
        }

        if let Err(err) = self.store.set_many(changes).await {
            debug!(error = %err, "store commit failed, rolling back staged tree");
            journal.replay(&mut staged);
            return Err(err.into());
        }

        // Commit: notify (deepest subtrees first), then swap the root.
        for (topic, payload) in queue.into_events() {
            self.bus.publish(topic, payload);
        }
        *root = staged;

        Ok(())
    }
}

/// Whether a persisted entry makes the default at `key` redundant:
/// the exact key, any ancestor of it, or anything below it.
fn is_shadowed(persisted: &BTreeMap<String, Value>, key: &str) -> bool {
    if persisted.contains_key(key) {
        return true;
    }
    let mut ancestor = String::new();
    for segment in paths::segments(key) {
        ancestor = paths::join(&ancestor, segment);
        if ancestor.len() < key.len() && persisted.contains_key(&ancestor) {
            return true;
        }
    }
    let below = format!("{key}.");
    persisted
        .range(below.clone()..)
        .next()
        .is_some_and(|(k, _)| k.starts_with(&below))
}
