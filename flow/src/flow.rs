//! The Flow - one live state machine instance.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::action::{Action, AutopassAction};
use crate::context::Context;
use crate::data_registry::FlowData;
use crate::error::FlowError;
use crate::handler::ActionHandler;
use crate::hook::{
    run_hydration_hooks, run_pre_hooks, run_silent_hooks, PreTransitionHook, SilentHook,
};
use crate::registry::HookRegistry;
use crate::snapshot::{DecodedSnapshot, Snapshot};
use crate::table::TransitionTable;
use crate::types::{FlowType, State};

/// Everything needed to create a [`Flow`].
///
/// `id` and `flow_type` identify the flow and let a snapshot find its way
/// back to the right transition table and data shape.
pub struct CreateFlowOpts<D> {
    pub id: String,
    pub flow_type: FlowType,
    /// Initial internal data.
    pub data: D,
    /// Must name a state of the transition table.
    pub initial_state: State,
    pub table: Arc<TransitionTable<D>>,
    /// Used by states that define no handler of their own.
    pub default_handler: Option<Arc<dyn ActionHandler<D>>>,
    /// Absolute expiration; `None` means the flow never expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// Relative expiration; wins over `expires_at` when both are set.
    pub expires_in: Option<Duration>,
}

/// A state machine instance.
///
/// The flow owns its internal data and current state; both change only
/// through [`handle_action`](Flow::handle_action). Entering a state
/// marked final completes the flow exactly once; a completed or expired
/// flow rejects all further actions.
pub struct Flow<D> {
    id: String,
    flow_type: FlowType,
    data: D,
    current_state: State,
    table: Arc<TransitionTable<D>>,
    default_handler: Option<Arc<dyn ActionHandler<D>>>,
    expires_at: Option<DateTime<Utc>>,
    completed: bool,
    pre_hooks: HashMap<State, Vec<Arc<dyn PreTransitionHook<D>>>>,
    post_hooks: HashMap<State, Vec<Arc<dyn SilentHook<D>>>>,
    completion_hooks: Vec<Arc<dyn SilentHook<D>>>,
}

impl<D: Clone + Send + Sync + 'static> Flow<D> {
    pub fn new(opts: CreateFlowOpts<D>) -> Result<Self, FlowError> {
        if opts.initial_state.is_empty() {
            return Err(FlowError::EmptyInitialState);
        }
        debug!(flow_type = %opts.flow_type, id = %opts.id, "creating flow");

        let expires_at = match opts.expires_in {
            Some(d) => Some(Utc::now() + d),
            None => opts.expires_at,
        };

        Ok(Self {
            id: opts.id,
            flow_type: opts.flow_type,
            data: opts.data,
            current_state: opts.initial_state,
            table: opts.table,
            default_handler: opts.default_handler,
            expires_at,
            completed: false,
            pre_hooks: HashMap::new(),
            post_hooks: HashMap::new(),
            completion_hooks: Vec::new(),
        })
    }

    /// Set the handler used by states that define none of their own.
    pub fn with_default_handler(mut self, handler: Arc<dyn ActionHandler<D>>) -> Self {
        self.default_handler = Some(handler);
        self
    }

    /// Feed one action through the machine.
    ///
    /// The state's handler (or the default handler) maps the action to an
    /// event; the transition table maps the event to the next state.
    /// Pre-transition hooks may abort the transition, in which case
    /// neither state nor data changes. After the transition commits,
    /// post-transition hooks run; entering a final state completes the
    /// flow and runs completion hooks; entering an autopass state
    /// re-dispatches immediately with [`AutopassAction`].
    pub async fn handle_action(
        &mut self,
        ctx: &Context,
        action: &dyn Action,
    ) -> Result<(), FlowError> {
        let autopass = AutopassAction;
        let mut action: &dyn Action = action;

        loop {
            if self.completed {
                return Err(FlowError::Completed);
            }
            if self.is_expired() {
                return Err(FlowError::Expired);
            }

            let table = self.table.clone();
            let state_config = table
                .get(&self.current_state)
                .ok_or_else(|| FlowError::IllegalState(self.current_state.clone()))?;
            let handler = state_config
                .handler
                .clone()
                .or_else(|| self.default_handler.clone())
                .ok_or_else(|| FlowError::NoHandler(self.current_state.clone()))?;

            let action_type = action.action_type();
            debug!(
                flow_type = %self.flow_type,
                id = %self.id,
                action = %action_type,
                state = %self.current_state,
                "incoming action"
            );

            let (event, next_data) = handler.handle(ctx, &self.data, action).await?;

            let next_state = match event {
                None => {
                    debug!(action = %action_type, "no event");
                    self.current_state.clone()
                }
                Some(event) => {
                    let next = state_config
                        .transitions
                        .get(&event)
                        .cloned()
                        .ok_or_else(|| FlowError::NoTransition {
                            state: self.current_state.clone(),
                            event: event.clone(),
                        })?;
                    debug!(action = %action_type, event = %event, "event produced");

                    self.run_pre_transition_hooks(ctx, &next_data, &next).await?;
                    debug!(from = %self.current_state, to = %next, "transition");
                    next
                }
            };

            self.data = next_data;
            self.current_state = next_state.clone();
            self.run_post_transition_hooks(ctx, &next_state).await;

            let Some(next_config) = table.get(&next_state) else {
                return Ok(());
            };

            if next_config.is_final {
                self.completed = true;
                self.run_completion_hooks(ctx).await;
                debug!(flow_type = %self.flow_type, id = %self.id, "flow completed");
                return Ok(());
            }

            if next_config.autopass {
                debug!(state = %next_state, "autopass state reached");
                action = &autopass;
                continue;
            }

            return Ok(());
        }
    }

    async fn run_pre_transition_hooks(
        &self,
        ctx: &Context,
        data: &D,
        next_state: &State,
    ) -> Result<(), FlowError> {
        if let Some(hooks) = self.pre_hooks.get(next_state) {
            debug!(state = %next_state, "running pre-transition hooks");
            run_pre_hooks(hooks, ctx, data).await?;
        }
        let registry_hooks =
            HookRegistry::global().pre_transition_hooks::<D>(&self.flow_type, next_state)?;
        if !registry_hooks.is_empty() {
            debug!(state = %next_state, "running registry pre-transition hooks");
            run_pre_hooks(&registry_hooks, ctx, data).await?;
        }
        Ok(())
    }

    async fn run_post_transition_hooks(&self, ctx: &Context, state: &State) {
        if let Some(hooks) = self.post_hooks.get(state) {
            debug!(state = %state, "running post-transition hooks");
            run_silent_hooks(hooks, ctx, &self.data, "post-transition").await;
        }
        match HookRegistry::global().post_transition_hooks::<D>(&self.flow_type, state) {
            Ok(hooks) => run_silent_hooks(&hooks, ctx, &self.data, "post-transition").await,
            Err(err) => warn!(error = %err, "skipping registry post-transition hooks"),
        }
    }

    async fn run_completion_hooks(&self, ctx: &Context) {
        if !self.completion_hooks.is_empty() {
            debug!("running completion hooks");
            run_silent_hooks(&self.completion_hooks, ctx, &self.data, "completion").await;
        }
        match HookRegistry::global().completion_hooks::<D>(&self.flow_type) {
            Ok(hooks) => run_silent_hooks(&hooks, ctx, &self.data, "completion").await,
            Err(err) => warn!(error = %err, "skipping registry completion hooks"),
        }
    }

    /// Register a hook that runs before the flow transitions into
    /// `state`; an error from it aborts the transition.
    pub fn register_pre_transition(
        &mut self,
        state: impl Into<State>,
        hook: impl PreTransitionHook<D> + 'static,
    ) {
        self.pre_hooks
            .entry(state.into())
            .or_default()
            .push(Arc::new(hook));
    }

    /// Register a hook that runs after the flow transitions into `state`.
    pub fn register_post_transition(
        &mut self,
        state: impl Into<State>,
        hook: impl SilentHook<D> + 'static,
    ) {
        self.post_hooks
            .entry(state.into())
            .or_default()
            .push(Arc::new(hook));
    }

    /// Register a hook that runs once, when the flow completes.
    pub fn register_completion_hook(&mut self, hook: impl SilentHook<D> + 'static) {
        self.completion_hooks.push(Arc::new(hook));
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn flow_type(&self) -> &FlowType {
        &self.flow_type
    }

    pub fn current_state(&self) -> &State {
        &self.current_state
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn transition_table(&self) -> &Arc<TransitionTable<D>> {
        &self.table
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() > at)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn set_expiration_at(&mut self, at: DateTime<Utc>) {
        self.expires_at = Some(at);
    }

    pub fn set_expiration_in(&mut self, d: Duration) {
        self.expires_at = Some(Utc::now() + d);
    }
}

impl<D: FlowData> Flow<D> {
    /// Convert the flow into its persistence form.
    pub fn to_snapshot(&self) -> Result<Snapshot, FlowError> {
        let data = serde_json::to_value(&self.data).map_err(FlowError::SnapshotEncode)?;
        Ok(Snapshot {
            id: self.id.clone(),
            flow_type: self.flow_type.clone(),
            data,
            current_state: self.current_state.clone(),
            expires_at: self.expires_at,
            is_completed: self.completed,
        })
    }

    /// Restore a flow from a snapshot without running hydration hooks.
    pub fn from_snapshot(
        snapshot: &Snapshot,
        table: Arc<TransitionTable<D>>,
    ) -> Result<Self, FlowError> {
        let data: D =
            serde_json::from_value(snapshot.data.clone()).map_err(FlowError::SnapshotDecode)?;
        Ok(Self::restored(snapshot, data, table))
    }

    /// Restore a flow from a snapshot, then run the hydration hooks
    /// registered for its flow type.
    pub async fn from_snapshot_hydrated(
        ctx: &Context,
        snapshot: &Snapshot,
        table: Arc<TransitionTable<D>>,
    ) -> Result<Self, FlowError> {
        let mut flow = Self::from_snapshot(snapshot, table)?;
        let hooks = HookRegistry::global().hydration_hooks::<D>(&flow.flow_type)?;
        if !hooks.is_empty() {
            debug!(flow_type = %flow.flow_type, id = %flow.id, "hydrating restored flow");
            flow.data = run_hydration_hooks(&hooks, ctx, flow.data).await?;
        }
        Ok(flow)
    }

    /// Restore a flow from a registry-decoded snapshot.
    pub fn from_decoded(
        decoded: DecodedSnapshot,
        table: Arc<TransitionTable<D>>,
    ) -> Result<Self, FlowError> {
        let data = decoded
            .data
            .downcast::<D>()
            .map_err(|_| FlowError::DataTypeMismatch)?;
        Ok(Self::restored(&decoded.snapshot, *data, table))
    }

    fn restored(snapshot: &Snapshot, data: D, table: Arc<TransitionTable<D>>) -> Self {
        Self {
            id: snapshot.id.clone(),
            flow_type: snapshot.flow_type.clone(),
            data,
            current_state: snapshot.current_state.clone(),
            table,
            default_handler: None,
            expires_at: snapshot.expires_at,
            completed: snapshot.is_completed,
            pre_hooks: HashMap::new(),
            post_hooks: HashMap::new(),
            completion_hooks: Vec::new(),
        }
    }
}
