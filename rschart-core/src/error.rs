//! Core error types.

use thiserror::Error;

/// Errors from machine compilation and the transition algorithm.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("invalid machine definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("duplicate state id: {id}")]
    DuplicateStateId { id: String },

    #[error("compound state '{id}' has no initial state")]
    MissingInitial { id: String },

    #[error("initial target '{target}' of '{id}' is not a descendant")]
    InvalidInitial { id: String, target: String },

    #[error("unknown transition target '{target}' from '{source_state}'")]
    UnknownTarget { target: String, source_state: String },

    #[error("unknown state '{id}'")]
    UnknownState { id: String },

    #[error("invalid guard expression: {reason}")]
    InvalidGuard { reason: String },

    #[error("unknown guard '{name}' on event '{event}' in state '{source_state}'")]
    UnknownGuard {
        name: String,
        event: String,
        source_state: String,
    },

    #[error("guard '{name}' failed on event '{event}' in state '{source_state}': {reason}")]
    GuardError {
        name: String,
        event: String,
        source_state: String,
        reason: String,
    },

    #[error("unknown delay '{name}'")]
    UnknownDelay { name: String },

    #[error("event '{event}' not handled by machine '{machine}' (strict mode)")]
    UnknownEvent { event: String, machine: String },

    #[error("unhandled '{event}' error event (strict mode)")]
    UnhandledErrorEvent { event: String },

    #[error("state value does not match machine '{machine}': {reason}")]
    InvalidStateValue { machine: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
