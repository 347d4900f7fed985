//! State-value shapes.
//!
//! A state value is either an atomic leaf (the key of an active atomic
//! state) or a mapping from child key to the child's own state value.
//! Two values are equal iff they are the same tree of keys with identical
//! leaves.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A recursively defined state value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    /// A single active atomic (or final) state, by key.
    Leaf(String),
    /// Child key to child state value; parallel states map every region.
    Compound(BTreeMap<String, StateValue>),
}

impl StateValue {
    pub fn leaf(key: impl Into<String>) -> Self {
        StateValue::Leaf(key.into())
    }

    pub fn empty() -> Self {
        StateValue::Compound(BTreeMap::new())
    }

    /// Parses a dotted path (`"a.b.c"`) into a nested value
    /// (`{a: {b: "c"}}`). A path without dots stays a leaf.
    pub fn parse(path: &str) -> Self {
        match path.split_once('.') {
            None => StateValue::Leaf(path.to_string()),
            Some((head, rest)) => {
                let mut map = BTreeMap::new();
                map.insert(head.to_string(), StateValue::parse(rest));
                StateValue::Compound(map)
            }
        }
    }

    /// Builds a state value from JSON: a string or a nested string map.
    pub fn from_json(value: &Value) -> Result<Self, crate::error::MachineError> {
        match value {
            Value::String(s) => Ok(StateValue::parse(s)),
            Value::Object(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    out.insert(k.clone(), StateValue::from_json(v)?);
                }
                Ok(StateValue::Compound(out))
            }
            other => Err(crate::error::MachineError::InvalidDefinition {
                reason: format!("invalid state value: {other}"),
            }),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            StateValue::Leaf(s) => Value::String(s.clone()),
            StateValue::Compound(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Returns true if `self`, taken as a partial pattern, is contained in
    /// `actual`. A leaf pattern matches an equal leaf or a compound value
    /// holding that key; a compound pattern requires every named region to
    /// match recursively.
    pub fn matches(&self, actual: &StateValue) -> bool {
        match (self, actual) {
            (StateValue::Leaf(p), StateValue::Leaf(a)) => p == a,
            (StateValue::Leaf(p), StateValue::Compound(map)) => map.contains_key(p),
            (StateValue::Compound(pm), StateValue::Compound(am)) => pm
                .iter()
                .all(|(k, pv)| am.get(k).is_some_and(|av| pv.matches(av))),
            (StateValue::Compound(pm), StateValue::Leaf(a)) => {
                // {a: {}} is the same shape as the leaf "a"
                pm.len() == 1
                    && pm.get(a).is_some_and(|pv| {
                        matches!(pv, StateValue::Compound(m) if m.is_empty())
                    })
            }
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Leaf(s) => write!(f, "{s}"),
            StateValue::Compound(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for StateValue {
    fn from(path: &str) -> Self {
        StateValue::parse(path)
    }
}
