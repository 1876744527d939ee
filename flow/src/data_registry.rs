//! Flow-data registry - maps flow types to their data shapes.
//!
//! A snapshot only carries the flow type as a string; this registry knows
//! which concrete data type that string stands for and how to decode the
//! encoded payload into it.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::FlowError;
use crate::snapshot::{DecodedSnapshot, Snapshot};
use crate::types::FlowType;

static GLOBAL: Lazy<DataRegistry> = Lazy::new(DataRegistry::new);

/// Internal data a flow can carry: serializable, cloneable, sendable.
pub trait FlowData: Any + Serialize + DeserializeOwned + Clone + Send + Sync {}

impl<T> FlowData for T where T: Any + Serialize + DeserializeOwned + Clone + Send + Sync {}

/// Decoded-but-erased flow data, downcast by the caller.
pub type BoxedFlowData = Box<dyn Any + Send>;

type DecodeFn = Arc<dyn Fn(&serde_json::Value) -> Result<BoxedFlowData, FlowError> + Send + Sync>;

/// `FlowType` → data-shape registry.
#[derive(Default)]
pub struct DataRegistry {
    decoders: RwLock<HashMap<FlowType, DecodeFn>>,
}

impl DataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static DataRegistry {
        &GLOBAL
    }

    /// Bind `flow_type` to the data shape `D`.
    pub fn register<D: FlowData>(&self, flow_type: impl Into<FlowType>) {
        let decode: DecodeFn = Arc::new(|value: &serde_json::Value| {
            let data: D = serde_json::from_value(value.clone()).map_err(FlowError::SnapshotDecode)?;
            Ok(Box::new(data) as BoxedFlowData)
        });
        self.decoders.write().insert(flow_type.into(), decode);
    }

    pub fn is_registered(&self, flow_type: &FlowType) -> bool {
        self.decoders.read().contains_key(flow_type)
    }

    /// Decode an encoded payload for the given flow type.
    pub fn decode(
        &self,
        flow_type: &FlowType,
        value: &serde_json::Value,
    ) -> Result<BoxedFlowData, FlowError> {
        let decoder = self
            .decoders
            .read()
            .get(flow_type)
            .cloned()
            .ok_or_else(|| FlowError::UnknownFlowType(flow_type.clone()))?;
        decoder(value)
    }

    /// Decode a snapshot's payload, returning the snapshot alongside its
    /// decoded data.
    pub fn decode_snapshot(&self, snapshot: Snapshot) -> Result<DecodedSnapshot, FlowError> {
        let data = self.decode(&snapshot.flow_type, &snapshot.data)?;
        Ok(DecodedSnapshot { snapshot, data })
    }
}
