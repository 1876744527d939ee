// Re-export the component crates under stable module names.
pub use lattice_config as config;
pub use lattice_eventbus as eventbus;
pub use lattice_flow as flow;
pub use lattice_kvstore as kvstore;

pub mod prelude {
    pub use lattice_config::{
        Config, ConfigError, ConfigNode, ConfigWatcher, Manager, Registrable, Validatable,
    };
    pub use lattice_eventbus::{Event, EventBus, EventReceiver, Topic};
    pub use lattice_flow::{
        typed, Action, ActionHandler, ActionRouter, ActionType, Context, CreateFlowOpts,
        DataRegistry, Event as FlowEvent, Flow, FlowError, FlowType, HandlerResult, HookRegistry,
        Snapshot, State, StateConfig, StateMachine, TransitionTable,
    };
    pub use lattice_kvstore::{KvStore, MemStore, StoreError};
}
