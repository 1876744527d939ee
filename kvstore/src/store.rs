//! The `KvStore` contract.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

/// The value type stored under each key.
///
/// Values cross the store boundary as JSON; backends may persist them in
/// whatever representation they like as long as they round-trip.
pub type Data = serde_json::Value;

/// Storage-side failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The staged view handed to a [`KvStore::transaction`] closure.
///
/// Writes against this view become visible only when the closure returns
/// `Ok`; an `Err` discards everything.
pub trait StagedStore: Send {
    fn get(&self, key: &str) -> Option<Data>;
    fn set(&mut self, key: &str, value: Data);
    fn delete(&mut self, key: &str);
    fn has(&self, key: &str) -> bool;
}

/// A transaction body: runs against the staged view, commits on `Ok`.
pub type TxFn = Box<dyn FnOnce(&mut dyn StagedStore) -> Result<(), StoreError> + Send>;

/// String → value store with atomic batch writes.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Data>, StoreError>;

    async fn set(&self, key: &str, value: Data) -> Result<(), StoreError>;

    /// Write every entry, atomically: either all entries land or none do.
    async fn set_many(&self, entries: BTreeMap<String, Data>) -> Result<(), StoreError>;

    async fn get_all(&self) -> Result<BTreeMap<String, Data>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn delete_all(&self) -> Result<(), StoreError>;

    async fn has(&self, key: &str) -> Result<bool, StoreError>;

    /// Run `f` against a staged view of the store.
    ///
    /// When `f` returns `Ok` the staged writes are committed atomically;
    /// when it returns `Err` nothing is stored and the error is passed
    /// through.
    async fn transaction(&self, f: TxFn) -> Result<(), StoreError>;
}
