//! Lattice Config - Structural Live Configuration
//!
//! A strongly-typed root config lives in memory and in a key-value store
//! at the same time. Callers patch it with dotted-path updates
//! (`"app.server.port" → 8080`); the manager applies the patch against a
//! staged copy, validates every touched subtree, persists the changed
//! leaves atomically, publishes change notifications per subtree, and
//! only then swaps the root. Any failure rolls the staged tree back and
//! leaves both memory and store untouched.
//!
//! Config trees are ordinary structs deriving [`Config`](derive@Config);
//! sequences, mappings, optionals and scalars nest freely. Subtrees opt
//! into validation by implementing [`Validatable`] and into change
//! notifications by implementing [`Registrable`].

pub mod error;
pub mod manager;
pub mod node;
pub mod paths;
pub mod queue;
pub mod rollback;
pub mod update;
pub mod watcher;

pub use error::ConfigError;
pub use manager::Manager;
pub use node::{Config, ConfigNode, ConfigPayload, Registrable, Validatable};
pub use rollback::{RollbackJournal, RollbackOp};
pub use update::{expand, flatten};
pub use watcher::ConfigWatcher;

pub use lattice_eventbus::{Event, EventReceiver, Topic};

/// Derive the structural [`ConfigNode`] impl (and optionally the
/// [`Config`] root capability) for a record type.
pub use lattice_macros::Config;

// Used by macro-generated code; not public API.
#[doc(hidden)]
pub mod __private {
    pub use anyhow;
    pub use serde_json::{Map, Value};
    pub use std::collections::BTreeMap;
    pub use std::sync::Arc;
}
