//! Transition tables - the static description of a state machine.

use std::collections::HashMap;
use std::sync::Arc;

use crate::handler::ActionHandler;
use crate::types::{Event, State};

/// Event → next-state mapping of one state.
pub type Transitions = HashMap<Event, State>;

/// Configuration of a single state.
///
/// A state with a handler consumes actions itself; without one, the
/// flow's default handler steps in. `final_state` marks the flow as
/// completed on entry; `autopass` makes the engine immediately re-dispatch
/// with [`AutopassAction`](crate::AutopassAction) after entering.
pub struct StateConfig<D> {
    pub handler: Option<Arc<dyn ActionHandler<D>>>,
    pub transitions: Transitions,
    pub is_final: bool,
    pub autopass: bool,
}

impl<D> Default for StateConfig<D> {
    fn default() -> Self {
        Self {
            handler: None,
            transitions: Transitions::new(),
            is_final: false,
            autopass: false,
        }
    }
}

impl<D> StateConfig<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(mut self, handler: Arc<dyn ActionHandler<D>>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Add a transition: when the handler returns `event`, move to `next`.
    pub fn on(mut self, event: impl Into<Event>, next: impl Into<State>) -> Self {
        self.transitions.insert(event.into(), next.into());
        self
    }

    pub fn final_state(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn autopass(mut self) -> Self {
        self.autopass = true;
        self
    }
}

/// State → [`StateConfig`] mapping describing the whole machine.
pub struct TransitionTable<D> {
    states: HashMap<State, StateConfig<D>>,
}

impl<D> Default for TransitionTable<D> {
    fn default() -> Self {
        Self {
            states: HashMap::new(),
        }
    }
}

impl<D> TransitionTable<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a state. Re-registering a state replaces its config.
    pub fn state(mut self, state: impl Into<State>, config: StateConfig<D>) -> Self {
        self.states.insert(state.into(), config);
        self
    }

    pub fn get(&self, state: &State) -> Option<&StateConfig<D>> {
        self.states.get(state)
    }

    pub fn contains(&self, state: &State) -> bool {
        self.states.contains_key(state)
    }

    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.keys()
    }
}
