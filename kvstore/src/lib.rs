//! KvStore - Typed Key-Value Persistence Contract
//!
//! The storage seam consumed by the config manager: a string-keyed map of
//! JSON values with an all-or-nothing `transaction` primitive. Backends
//! implement [`KvStore`]; [`MemStore`] is the in-memory reference used in
//! tests and examples.

pub mod memstore;
pub mod store;

pub use memstore::MemStore;
pub use store::{Data, KvStore, StagedStore, StoreError, TxFn};
