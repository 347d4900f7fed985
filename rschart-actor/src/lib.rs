//! # rschart-actor
//!
//! Asynchronous interpreter for rschart machines.
//!
//! This crate provides:
//! - The [`Interpreter`]: external event queue, macrostep loop,
//!   subscribers, delayed sends and batch delivery
//! - Child-actor management with a uniform [`ActorRef`] handle
//! - Adapters for nested machines, promises, callbacks, observables
//!   and reducer behaviors

pub mod actor;
pub mod behavior;
pub mod error;
pub mod interpreter;
pub mod registry;
mod scheduler;
mod spawn;

pub use actor::{ActorRef, SendBack};
pub use behavior::{from_reducer, Behavior};
pub use error::InterpreterError;
pub use interpreter::{interpret, Interpreter, InterpreterOptions, Status, Subscription};
pub use registry::{ActorRegistry, ActorSource};
