//! The runtime state snapshot.
//!
//! A [`State`] is an immutable value produced by a macrostep: the state
//! value, context, triggering event, recorded history, the actions the
//! interpreter must execute, and the active configuration. States
//! serialize to a JSON-safe subset and rehydrate against a machine.

use crate::action::Action;
use crate::error::MachineError;
use crate::event::{Event, EventObject};
use crate::machine::Machine;
use crate::microstep::HistoryValue;
use crate::node::NodeId;
use crate::state_value::StateValue;
use crate::transition::TransitionRecord;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// A snapshot of a machine at a macrostep boundary.
#[derive(Debug, Clone)]
pub struct State {
    pub value: StateValue,

    pub context: Value,

    /// The user-visible event that produced this state.
    pub event: Event,

    /// The full SCXML envelope of that event (`_event`).
    pub event_object: EventObject,

    /// Recorded history per history-node id.
    pub history_value: HistoryValue,

    /// Actions for the interpreter to execute, in order.
    pub actions: Vec<Action>,

    /// The set of simultaneously active state nodes.
    pub configuration: BTreeSet<NodeId>,

    /// The transitions that produced this state.
    pub transitions: Vec<TransitionRecord>,

    /// Union of the active nodes' tags.
    pub tags: BTreeSet<String>,

    /// Meta values of active nodes, keyed by state id.
    pub meta: BTreeMap<String, Value>,

    /// Whether this state differs from its predecessor; `None` on the
    /// initial state.
    pub changed: Option<bool>,

    /// True iff the root is in a final configuration.
    pub done: bool,

    /// The previous state; its own `history` link is pruned so chains
    /// stay bounded.
    pub history: Option<Box<State>>,

    /// Events raised but not yet consumed; drained by the macrostep
    /// driver, always empty on returned states.
    pub(crate) internal_queue: VecDeque<EventObject>,
}

impl State {
    /// True if the given partial state value is contained in this
    /// state's value. Accepts dotted paths (`"a.b"`).
    pub fn matches(&self, pattern: impl Into<StateValue>) -> bool {
        pattern.into().matches(&self.value)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Serializes to a JSON-safe snapshot.
    pub fn to_json(&self) -> Value {
        json!({
            "value": self.value.to_json(),
            "context": self.context,
            "event": self.event,
            "_event": self.event_object,
            "historyValue": self.history_value,
            "tags": self.tags,
            "done": self.done,
            "changed": self.changed,
        })
    }

    /// Rebuilds a state from a persisted snapshot, resolving the
    /// configuration from the state value against the machine.
    pub fn from_json(machine: &Machine, snapshot: &Value) -> Result<State, MachineError> {
        let value = StateValue::from_json(snapshot.get("value").ok_or_else(|| {
            MachineError::InvalidDefinition {
                reason: "state snapshot requires a 'value' field".to_string(),
            }
        })?)?;

        let context = snapshot.get("context").cloned().unwrap_or(Value::Null);

        let event_object = match snapshot.get("_event") {
            Some(raw) => serde_json::from_value(raw.clone())?,
            None => EventObject::init(),
        };
        let event = match snapshot.get("event") {
            Some(raw) => serde_json::from_value(raw.clone())?,
            None => event_object.event(),
        };

        let history_value: HistoryValue = match snapshot.get("historyValue") {
            Some(raw) => serde_json::from_value(raw.clone())?,
            None => HistoryValue::new(),
        };

        let mut state = machine.state_from_parts(value, context, history_value)?;
        state.event = event;
        state.event_object = event_object;
        if let Some(done) = snapshot.get("done").and_then(Value::as_bool) {
            state.done = done;
        }
        Ok(state)
    }
}
