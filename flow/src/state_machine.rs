//! Object-safe view over flows of any data type.

use std::any::Any;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::action::Action;
use crate::context::Context;
use crate::data_registry::FlowData;
use crate::error::FlowError;
use crate::flow::Flow;
use crate::snapshot::Snapshot;
use crate::types::{FlowType, State};

/// The erased surface of a [`Flow`], for collections that hold machines
/// of different data types side by side.
#[async_trait]
pub trait StateMachine: Send {
    async fn handle_action(&mut self, ctx: &Context, action: &dyn Action)
        -> Result<(), FlowError>;

    fn id(&self) -> &str;
    fn flow_type(&self) -> &FlowType;
    fn current_state(&self) -> &State;
    /// The internal data, erased; downcast to the concrete type.
    fn data_any(&self) -> &dyn Any;
    fn is_completed(&self) -> bool;
    fn is_expired(&self) -> bool;
    fn expires_at(&self) -> Option<DateTime<Utc>>;
    fn set_expiration_at(&mut self, at: DateTime<Utc>);
    fn set_expiration_in(&mut self, d: Duration);
    fn to_snapshot(&self) -> Result<Snapshot, FlowError>;
}

#[async_trait]
impl<D: FlowData> StateMachine for Flow<D> {
    async fn handle_action(
        &mut self,
        ctx: &Context,
        action: &dyn Action,
    ) -> Result<(), FlowError> {
        Flow::handle_action(self, ctx, action).await
    }

    fn id(&self) -> &str {
        Flow::id(self)
    }

    fn flow_type(&self) -> &FlowType {
        Flow::flow_type(self)
    }

    fn current_state(&self) -> &State {
        Flow::current_state(self)
    }

    fn data_any(&self) -> &dyn Any {
        self.data()
    }

    fn is_completed(&self) -> bool {
        Flow::is_completed(self)
    }

    fn is_expired(&self) -> bool {
        Flow::is_expired(self)
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        Flow::expires_at(self)
    }

    fn set_expiration_at(&mut self, at: DateTime<Utc>) {
        Flow::set_expiration_at(self, at)
    }

    fn set_expiration_in(&mut self, d: Duration) {
        Flow::set_expiration_in(self, d)
    }

    fn to_snapshot(&self) -> Result<Snapshot, FlowError> {
        Flow::to_snapshot(self)
    }
}
