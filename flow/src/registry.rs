//! Process-wide hook registry.
//!
//! Hooks that apply to every flow of a type live here instead of on the
//! instances: pre/post hooks keyed by `(FlowType, State)`, completion and
//! hydration hooks keyed by `FlowType` alone. Registration is append-only
//! and should happen at process start, before the affected flows are
//! created; lookups reflect the registry contents at each dispatch, not
//! at flow creation.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::FlowError;
use crate::hook::{HydrationHook, PreTransitionHook, SilentHook};
use crate::types::{FlowType, State};

static GLOBAL: Lazy<HookRegistry> = Lazy::new(HookRegistry::new);

/// Hooks of one flow type, typed on its data.
struct HookSet<D> {
    pre: HashMap<State, Vec<Arc<dyn PreTransitionHook<D>>>>,
    post: HashMap<State, Vec<Arc<dyn SilentHook<D>>>>,
    completion: Vec<Arc<dyn SilentHook<D>>>,
    hydration: Vec<Arc<dyn HydrationHook<D>>>,
}

impl<D> Default for HookSet<D> {
    fn default() -> Self {
        Self {
            pre: HashMap::new(),
            post: HashMap::new(),
            completion: Vec::new(),
            hydration: Vec::new(),
        }
    }
}

/// Per-flow-type hook tables, erased over the data type.
///
/// Each `FlowType` is bound to exactly one data type `D` on first
/// registration; registering or looking up the same type with a
/// different `D` yields [`FlowError::DataTypeMismatch`].
#[derive(Default)]
pub struct HookRegistry {
    sets: RwLock<HashMap<FlowType, Box<dyn Any + Send + Sync>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static HookRegistry {
        &GLOBAL
    }

    pub fn register_pre_transition<D: Send + Sync + 'static>(
        &self,
        flow_type: impl Into<FlowType>,
        state: impl Into<State>,
        hook: impl PreTransitionHook<D> + 'static,
    ) -> Result<(), FlowError> {
        self.with_set(flow_type.into(), |set: &mut HookSet<D>| {
            set.pre.entry(state.into()).or_default().push(Arc::new(hook));
        })
    }

    pub fn register_post_transition<D: Send + Sync + 'static>(
        &self,
        flow_type: impl Into<FlowType>,
        state: impl Into<State>,
        hook: impl SilentHook<D> + 'static,
    ) -> Result<(), FlowError> {
        self.with_set(flow_type.into(), |set: &mut HookSet<D>| {
            set.post.entry(state.into()).or_default().push(Arc::new(hook));
        })
    }

    pub fn register_completion<D: Send + Sync + 'static>(
        &self,
        flow_type: impl Into<FlowType>,
        hook: impl SilentHook<D> + 'static,
    ) -> Result<(), FlowError> {
        self.with_set(flow_type.into(), |set: &mut HookSet<D>| {
            set.completion.push(Arc::new(hook));
        })
    }

    pub fn register_hydration<D: Send + Sync + 'static>(
        &self,
        flow_type: impl Into<FlowType>,
        hook: impl HydrationHook<D> + 'static,
    ) -> Result<(), FlowError> {
        self.with_set(flow_type.into(), |set: &mut HookSet<D>| {
            set.hydration.push(Arc::new(hook));
        })
    }

    pub(crate) fn pre_transition_hooks<D: 'static>(
        &self,
        flow_type: &FlowType,
        state: &State,
    ) -> Result<Vec<Arc<dyn PreTransitionHook<D>>>, FlowError> {
        self.read_set(flow_type, |set: &HookSet<D>| {
            set.pre.get(state).cloned().unwrap_or_default()
        })
    }

    pub(crate) fn post_transition_hooks<D: 'static>(
        &self,
        flow_type: &FlowType,
        state: &State,
    ) -> Result<Vec<Arc<dyn SilentHook<D>>>, FlowError> {
        self.read_set(flow_type, |set: &HookSet<D>| {
            set.post.get(state).cloned().unwrap_or_default()
        })
    }

    pub(crate) fn completion_hooks<D: 'static>(
        &self,
        flow_type: &FlowType,
    ) -> Result<Vec<Arc<dyn SilentHook<D>>>, FlowError> {
        self.read_set(flow_type, |set: &HookSet<D>| set.completion.clone())
    }

    pub(crate) fn hydration_hooks<D: 'static>(
        &self,
        flow_type: &FlowType,
    ) -> Result<Vec<Arc<dyn HydrationHook<D>>>, FlowError> {
        self.read_set(flow_type, |set: &HookSet<D>| set.hydration.clone())
    }

    fn with_set<D: Send + Sync + 'static>(
        &self,
        flow_type: FlowType,
        register: impl FnOnce(&mut HookSet<D>),
    ) -> Result<(), FlowError> {
        let mut sets = self.sets.write();
        let entry = sets
            .entry(flow_type)
            .or_insert_with(|| Box::new(HookSet::<D>::default()));
        let set = entry
            .downcast_mut::<HookSet<D>>()
            .ok_or(FlowError::DataTypeMismatch)?;
        register(set);
        Ok(())
    }

    fn read_set<D: 'static, T>(
        &self,
        flow_type: &FlowType,
        read: impl FnOnce(&HookSet<D>) -> T,
    ) -> Result<T, FlowError>
    where
        T: Default,
    {
        let sets = self.sets.read();
        let Some(entry) = sets.get(flow_type) else {
            return Ok(T::default());
        };
        let set = entry
            .downcast_ref::<HookSet<D>>()
            .ok_or(FlowError::DataTypeMismatch)?;
        Ok(read(set))
    }
}
