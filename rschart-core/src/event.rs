//! Events and the SCXML event envelope.
//!
//! A plain [`Event`] is what callers send; the interpreter and the
//! transition algorithm work with the [`EventObject`] envelope, which
//! carries the SCXML event type, the originating actor and the send id
//! of the delayed send that produced it (if any).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Synthetic event dispatched when a machine computes its initial state.
pub const INIT_EVENT: &str = "xstate.init";

/// Event carrying a sync-mode child machine state update.
pub const UPDATE_EVENT: &str = "xstate.update";

/// Raised when an assign updater or an action exec fails.
pub const ERROR_EXECUTION_EVENT: &str = "error.execution";

/// The NULL event driving eventless ("always") transitions.
pub const NULL_EVENT: &str = "";

/// Wildcard event descriptor matching any non-NULL event.
pub const WILDCARD: &str = "*";

/// Event name for a finished child actor.
pub fn done_invoke(id: &str) -> String {
    format!("done.invoke.{id}")
}

/// Event name raised when a compound or parallel state reaches a final child.
pub fn done_state(id: &str) -> String {
    format!("done.state.{id}")
}

/// Event name for a failed child actor or an escalated child error.
pub fn error_platform(id: &str) -> String {
    format!("error.platform.{id}")
}

/// Event name synthesized for a delayed (`after`) transition.
pub fn after_event(delay_ref: &str, source_id: &str) -> String {
    format!("xstate.after({delay_ref})#{source_id}")
}

/// A user-visible event: a name plus an arbitrary JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Value::Null,
        }
    }

    pub fn with_data(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

impl From<&str> for Event {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Event {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// SCXML event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Sent from outside the machine (callers, timers, child actors).
    External,
    /// Raised within a macrostep.
    Internal,
    /// Generated by the runtime itself (init, done.invoke, update).
    Platform,
    /// An error event (error.execution, error.platform.*).
    Error,
}

/// The SCXML event envelope (`_event`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventObject {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: EventKind,

    /// Send id of the delayed send that produced this event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sendid: Option<String>,

    /// Id of the actor that sent this event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl EventObject {
    /// Wraps a caller-supplied event as an external event.
    pub fn external(event: Event) -> Self {
        Self {
            name: event.name,
            kind: EventKind::External,
            sendid: None,
            origin: None,
            data: event.data,
        }
    }

    /// Wraps an event raised within a macrostep.
    pub fn internal(event: Event) -> Self {
        Self {
            name: event.name,
            kind: EventKind::Internal,
            sendid: None,
            origin: None,
            data: event.data,
        }
    }

    /// Builds a platform event (init, done.invoke, xstate.update).
    pub fn platform(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            kind: EventKind::Platform,
            sendid: None,
            origin: None,
            data,
        }
    }

    /// Builds an error event (error.execution, error.platform.*).
    pub fn error(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            kind: EventKind::Error,
            sendid: None,
            origin: None,
            data,
        }
    }

    /// The synthetic initial event.
    pub fn init() -> Self {
        Self::platform(INIT_EVENT, Value::Null)
    }

    /// The NULL event used as the eventless-closure sentinel.
    pub fn null() -> Self {
        Self {
            name: NULL_EVENT.to_string(),
            kind: EventKind::Internal,
            sendid: None,
            origin: None,
            data: Value::Null,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_sendid(mut self, sendid: impl Into<String>) -> Self {
        self.sendid = Some(sendid.into());
        self
    }

    /// Returns true for the NULL (eventless) sentinel.
    pub fn is_null(&self) -> bool {
        self.name.is_empty()
    }

    /// The user-visible event this envelope wraps.
    pub fn event(&self) -> Event {
        Event {
            name: self.name.clone(),
            data: self.data.clone(),
        }
    }

    /// Looks up a dotted path on the envelope, for guard expressions and
    /// templates (`name`, `type`, `sendid`, `origin`, `data.<path>`).
    pub fn lookup(&self, path: &str) -> Value {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        let value = match head {
            "name" => Value::String(self.name.clone()),
            "type" => match self.kind {
                EventKind::External => Value::String("external".into()),
                EventKind::Internal => Value::String("internal".into()),
                EventKind::Platform => Value::String("platform".into()),
                EventKind::Error => Value::String("error".into()),
            },
            "sendid" => self
                .sendid
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
            "origin" => self
                .origin
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
            "data" => self.data.clone(),
            _ => Value::Null,
        };

        match rest {
            None => value,
            Some(rest) => crate::guard::get_path(&value, rest),
        }
    }
}
