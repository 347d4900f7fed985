//! # rschart-core
//!
//! Statechart machine compiler and transition algorithm.
//!
//! This crate provides:
//! - Machine definition parsing and compilation into an indexed node tree
//! - The SCXML microstep/macrostep algorithm (transition selection,
//!   conflict removal, exit/entry sets, history, eventless closure)
//! - Guard descriptors and the guard expression language
//! - Action descriptors and the ordered action resolver
//! - Serializable state snapshots with rehydration
//!
//! The long-running interpreter and child-actor adapters live in
//! `rschart-actor`.

pub mod action;
pub mod config;
pub mod error;
pub mod event;
pub mod guard;
pub mod machine;
pub mod microstep;
pub mod node;
pub mod options;
pub mod state;
pub mod state_value;
pub mod transition;

pub use action::{Action, Assign, DelaySpec, EventTemplate, InvokeDef, InvokeSource, SendAction};
pub use error::MachineError;
pub use event::{Event, EventKind, EventObject};
pub use guard::{Guard, GuardArgs, GuardExpr};
pub use machine::Machine;
pub use options::MachineOptions;
pub use state::State;
pub use state_value::StateValue;
pub use transition::TransitionRecord;
