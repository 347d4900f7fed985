//! Declarative machine configuration.
//!
//! Machine definitions use a JSON DSL:
//!
//! ```json
//! {
//!   "id": "fetch",
//!   "initial": "idle",
//!   "context": {"retries": 0},
//!   "states": {
//!     "idle": {"on": {"FETCH": "loading"}},
//!     "loading": {
//!       "invoke": {"src": "fetchData", "onDone": {"target": "success"}},
//!       "after": {"5000": "failure"}
//!     },
//!     "success": {"type": "final"},
//!     "failure": {"on": {"RETRY": {"target": "loading", "guard": "ctx.retries < 3"}}}
//!   }
//! }
//! ```
//!
//! Configs are raw, order-preserving serde structs; validation and
//! indexing happen when the [`Machine`](crate::machine::Machine) is
//! compiled from them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level machine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Machine key; state ids are derived from it unless overridden.
    pub id: Option<String>,

    /// Initial child key (required when `states` is non-empty).
    pub initial: Option<String>,

    /// Initial context object.
    pub context: Value,

    /// When true, unhandled events and unhandled error events are fatal.
    pub strict: bool,

    #[serde(rename = "type")]
    pub kind: Option<String>,

    pub states: IndexMap<String, StateConfig>,

    pub on: IndexMap<String, TransitionsConfig>,

    pub entry: ActionsConfig,

    pub exit: ActionsConfig,

    pub always: Option<TransitionsConfig>,

    pub after: IndexMap<String, TransitionsConfig>,

    pub invoke: InvokesConfig,

    #[serde(rename = "onDone")]
    pub on_done: Option<TransitionsConfig>,

    pub tags: Vec<String>,

    pub meta: Option<Value>,
}

/// Configuration of a single state node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Explicit stable id; defaults to `machineKey.path.to.state`.
    pub id: Option<String>,

    /// `"atomic"`, `"compound"`, `"parallel"`, `"final"` or `"history"`.
    /// Inferred from the rest of the config when absent.
    #[serde(rename = "type")]
    pub kind: Option<String>,

    pub initial: Option<String>,

    /// `"shallow"` (default) or `"deep"`, on history nodes.
    pub history: Option<String>,

    /// Default target of a history node.
    pub target: Option<String>,

    pub states: IndexMap<String, StateConfig>,

    pub on: IndexMap<String, TransitionsConfig>,

    pub entry: ActionsConfig,

    pub exit: ActionsConfig,

    /// Eventless transitions, checked after every microstep.
    pub always: Option<TransitionsConfig>,

    /// Delayed transitions keyed by milliseconds or a named delay.
    pub after: IndexMap<String, TransitionsConfig>,

    pub invoke: InvokesConfig,

    /// Transition taken when this compound/parallel state is done.
    #[serde(rename = "onDone")]
    pub on_done: Option<TransitionsConfig>,

    /// Done-data template on final nodes.
    pub data: Option<Value>,

    pub tags: Vec<String>,

    pub meta: Option<Value>,
}

/// One or many transitions for a single event descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransitionsConfig {
    Single(TransitionConfig),
    Many(Vec<TransitionConfig>),
}

impl TransitionsConfig {
    /// Flattens into candidate order.
    pub fn iter(&self) -> impl Iterator<Item = &TransitionConfig> {
        match self {
            TransitionsConfig::Single(t) => std::slice::from_ref(t).iter(),
            TransitionsConfig::Many(ts) => ts.iter(),
        }
    }
}

/// A transition: either a bare target string or a full object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransitionConfig {
    Target(String),
    Full(TransitionObject),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionObject {
    pub target: Option<TargetConfig>,

    /// Raw guard JSON, parsed by [`Guard::from_json`](crate::guard::Guard).
    pub guard: Option<Value>,

    pub actions: ActionsConfig,

    /// Forces an internal transition regardless of target syntax.
    pub internal: Option<bool>,
}

/// One or many transition targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetConfig {
    Single(String),
    Many(Vec<String>),
}

impl TargetConfig {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        match self {
            TargetConfig::Single(t) => std::slice::from_ref(t).iter(),
            TargetConfig::Many(ts) => ts.iter(),
        }
        .map(String::as_str)
    }
}

/// One or many raw action descriptors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionsConfig {
    One(Value),
    Many(Vec<Value>),
}

impl ActionsConfig {
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        match self {
            ActionsConfig::One(v) => std::slice::from_ref(v).iter(),
            ActionsConfig::Many(vs) => vs.iter(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ActionsConfig::One(_) => false,
            ActionsConfig::Many(vs) => vs.is_empty(),
        }
    }
}

impl Default for ActionsConfig {
    fn default() -> Self {
        ActionsConfig::Many(Vec::new())
    }
}

/// One or many invocation descriptors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvokesConfig {
    One(InvokeConfig),
    Many(Vec<InvokeConfig>),
}

impl InvokesConfig {
    pub fn iter(&self) -> impl Iterator<Item = &InvokeConfig> {
        match self {
            InvokesConfig::One(i) => std::slice::from_ref(i).iter(),
            InvokesConfig::Many(is) => is.iter(),
        }
    }
}

impl Default for InvokesConfig {
    fn default() -> Self {
        InvokesConfig::Many(Vec::new())
    }
}

/// Configuration of a child-actor invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InvokeConfig {
    /// Invocation id; defaults to the source tag.
    pub id: Option<String>,

    /// Actor source: a bare registry tag or `{"type": tag, ...params}`.
    pub src: Value,

    /// Input template mapping the parent context to the child's input.
    pub data: Option<Value>,

    pub on_done: Option<TransitionsConfig>,

    pub on_error: Option<TransitionsConfig>,

    /// Forward every event the parent receives to this child.
    pub auto_forward: bool,

    /// Re-emit child machine state changes as `xstate.update` events.
    pub sync: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_config() {
        let config: MachineConfig = serde_json::from_value(json!({
            "id": "toggle",
            "initial": "off",
            "states": {
                "off": {"on": {"TOGGLE": "on"}},
                "on": {"on": {"TOGGLE": "off"}}
            }
        }))
        .unwrap();

        assert_eq!(config.id.as_deref(), Some("toggle"));
        assert_eq!(config.initial.as_deref(), Some("off"));
        assert_eq!(config.states.len(), 2);

        let off = &config.states["off"];
        let t = off.on["TOGGLE"].iter().next().unwrap();
        assert!(matches!(t, TransitionConfig::Target(s) if s == "on"));
    }

    #[test]
    fn test_states_preserve_declaration_order() {
        let config: MachineConfig = serde_json::from_value(json!({
            "initial": "zulu",
            "states": {
                "zulu": {},
                "alpha": {},
                "mike": {}
            }
        }))
        .unwrap();

        let keys: Vec<_> = config.states.keys().cloned().collect();
        assert_eq!(keys, vec!["zulu", "alpha", "mike"]);
    }

    #[test]
    fn test_transition_forms() {
        let config: StateConfig = serde_json::from_value(json!({
            "on": {
                "A": "next",
                "B": {"target": "next", "guard": "ctx.ok", "internal": true},
                "C": [
                    {"target": "x", "guard": "ctx.a"},
                    {"target": "y"}
                ],
                "D": {"actions": [{"type": "log", "message": "hi"}]}
            }
        }))
        .unwrap();

        assert_eq!(config.on["C"].iter().count(), 2);

        let d = config.on["D"].iter().next().unwrap();
        match d {
            TransitionConfig::Full(obj) => {
                assert!(obj.target.is_none());
                assert_eq!(obj.actions.iter().count(), 1);
            }
            TransitionConfig::Target(_) => panic!("expected full transition object"),
        }
    }

    #[test]
    fn test_invoke_forms() {
        let config: StateConfig = serde_json::from_value(json!({
            "invoke": {
                "id": "loader",
                "src": "fetchData",
                "onDone": {"target": "success"},
                "onError": "failure",
                "autoForward": true
            }
        }))
        .unwrap();

        let invoke = config.invoke.iter().next().unwrap();
        assert_eq!(invoke.id.as_deref(), Some("loader"));
        assert_eq!(invoke.src, json!("fetchData"));
        assert!(invoke.auto_forward);
        assert!(!invoke.sync);

        let config: StateConfig = serde_json::from_value(json!({
            "invoke": [
                {"src": "a"},
                {"src": {"type": "b", "url": "http://example"}}
            ]
        }))
        .unwrap();
        assert_eq!(config.invoke.iter().count(), 2);
    }

    #[test]
    fn test_single_action_form() {
        let config: StateConfig = serde_json::from_value(json!({
            "entry": {"type": "log", "message": "entered"}
        }))
        .unwrap();
        assert_eq!(config.entry.iter().count(), 1);
    }
}
