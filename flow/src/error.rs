//! Error taxonomy of the flow engine.

use thiserror::Error;

use crate::types::{ActionType, Event, FlowType, State};

#[derive(Debug, Error)]
pub enum FlowError {
    /// The flow reached a final state; no further actions are accepted.
    #[error("flow is completed")]
    Completed,

    /// The flow passed its expiration time.
    #[error("flow expired")]
    Expired,

    /// The current state has no entry in the transition table.
    #[error("illegal state: {0}")]
    IllegalState(State),

    /// An initial state must be a non-empty tag.
    #[error("initial state cannot be empty")]
    EmptyInitialState,

    /// Neither the state nor the flow defines a handler.
    #[error("no handler for state {0} and no default handler set")]
    NoHandler(State),

    /// The router has no route for the incoming action type.
    #[error("no handler for action type: {0}")]
    NoRoute(ActionType),

    /// The handler produced an event the current state cannot follow.
    #[error("no transition found for event {event} in state {state}")]
    NoTransition { state: State, event: Event },

    /// A typed adapter received an action of the wrong concrete type.
    #[error("invalid action type: {0}")]
    InvalidActionType(ActionType),

    /// Registry data was registered under a different data type than the
    /// flow carries.
    #[error("flow data type does not match the registered type")]
    DataTypeMismatch,

    /// No data shape registered for the snapshot's flow type.
    #[error("flow type {0} not registered")]
    UnknownFlowType(FlowType),

    #[error("failed to decode snapshot data: {0}")]
    SnapshotDecode(#[source] serde_json::Error),

    #[error("failed to encode snapshot data: {0}")]
    SnapshotEncode(#[source] serde_json::Error),

    /// Failure raised by a user handler or hook.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
