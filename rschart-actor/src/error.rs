//! Interpreter error types.

use rschart_core::MachineError;
use thiserror::Error;

/// Errors from the interpreter and its child actors.
#[derive(Debug, Error)]
pub enum InterpreterError {
    #[error("interpreter has not been started")]
    NotStarted,

    #[error("interpreter has been stopped")]
    Stopped,

    #[error("unknown actor source '{name}'")]
    UnknownActor { name: String },

    #[error("escalated error with no parent to receive it: {data}")]
    Escalated { data: serde_json::Value },

    #[error(transparent)]
    Core(#[from] MachineError),
}
