//! Snapshots - the persistence form of a flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data_registry::BoxedFlowData;
use crate::types::{FlowType, State};

/// Self-describing record of a flow's persisted fields.
///
/// `data` holds the encoded internal data; decoding it back into the
/// concrete type goes through the [`DataRegistry`](crate::DataRegistry)
/// (or directly through [`Flow::from_snapshot`](crate::Flow::from_snapshot)
/// when the data type is statically known). Decoders tolerate a missing
/// `expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub flow_type: FlowType,
    pub data: serde_json::Value,
    pub current_state: State,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_completed: bool,
}

/// A snapshot whose `data` field has been decoded by the registry.
pub struct DecodedSnapshot {
    pub snapshot: Snapshot,
    pub data: BoxedFlowData,
}
