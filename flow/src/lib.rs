//! Lattice Flow - Persistable State Machines
//!
//! A `Flow` is one live state machine: typed internal data, a transition
//! table describing its states, and handlers that turn incoming actions
//! into events. Events pick the next state; pre/post/completion hooks run
//! around every transition; snapshots carry a flow across a serialization
//! boundary and back.
//!
//! # Example
//! ```rust,ignore
//! let table = Arc::new(
//!     TransitionTable::new()
//!         .state("AwaitingPayment", StateConfig::new()
//!             .handler(typed(handle_payment))
//!             .on("OrderPaid", "AwaitingShipping"))
//!         .state("AwaitingShipping", StateConfig::new()
//!             .handler(typed(handle_shipping))
//!             .on("OrderShipped", "OrderFulfilled")
//!             .autopass())
//!         .state("OrderFulfilled", StateConfig::new().final_state()),
//! );
//! let mut flow = Flow::new(CreateFlowOpts { /* ... */ })?;
//! flow.handle_action(&Context::background(), &PaymentAction { amount: 100 }).await?;
//! ```

pub mod action;
pub mod context;
pub mod data_registry;
pub mod error;
pub mod flow;
pub mod handler;
pub mod hook;
pub mod registry;
pub mod snapshot;
pub mod state_machine;
pub mod table;
pub mod types;

pub use action::{Action, AutopassAction, NilAction};
pub use context::Context;
pub use data_registry::{BoxedFlowData, DataRegistry, FlowData};
pub use error::FlowError;
pub use flow::{CreateFlowOpts, Flow};
pub use handler::{typed, ActionHandler, ActionRouter, ActionRoutes, HandlerResult};
pub use hook::{HydrationHook, PreTransitionHook, SilentHook};
pub use registry::HookRegistry;
pub use snapshot::{DecodedSnapshot, Snapshot};
pub use state_machine::StateMachine;
pub use table::{StateConfig, TransitionTable, Transitions};
pub use types::{ActionType, Event, FlowType, State};
