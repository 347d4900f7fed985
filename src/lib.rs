//! rschart - Hierarchical statechart runtime
//!
//! A statechart (SCXML) runtime for Rust: machines are declared as JSON
//! data, compiled into an immutable node tree, and driven either through
//! the pure transition function or a long-running interpreter with
//! delayed events and spawned child actors.
//!
//! ```
//! use rschart::{interpret, Machine};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), rschart::MachineError> {
//! let machine = Machine::from_json(json!({
//!     "id": "toggle",
//!     "initial": "off",
//!     "states": {
//!         "off": {"on": {"TOGGLE": "on"}},
//!         "on": {"on": {"TOGGLE": "off"}}
//!     }
//! }))?;
//!
//! let state = machine.initial_state()?;
//! let state = machine.transition(&state, "TOGGLE")?;
//! assert!(state.matches("on"));
//! # Ok(())
//! # }
//! ```

pub use rschart_actor::{
    from_reducer, interpret, ActorRef, ActorRegistry, ActorSource, Behavior, InterpreterError,
    Interpreter, InterpreterOptions, SendBack, Status, Subscription,
};
pub use rschart_core::{
    Action, Assign, DelaySpec, Event, EventKind, EventObject, EventTemplate, Guard, GuardArgs,
    GuardExpr, InvokeDef, InvokeSource, Machine, MachineError, MachineOptions, SendAction, State,
    StateValue, TransitionRecord,
};
