//! Compiled transitions, event-token matching and candidate selection.

use crate::action::Action;
use crate::error::MachineError;
use crate::event::{EventObject, NULL_EVENT, WILDCARD};
use crate::guard::Guard;
use crate::node::{NodeId, Tree};
use crate::options::MachineOptions;
use crate::state_value::StateValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// A normalized transition on a state node.
#[derive(Debug, Clone)]
pub struct TransitionDef {
    pub source: NodeId,
    /// Event token; empty for eventless transitions.
    pub event_type: String,
    pub guard: Option<Guard>,
    pub actions: Vec<Action>,
    /// `None` denotes an internal no-target transition.
    pub target: Option<Vec<NodeId>>,
    pub internal: bool,
    /// Machine-wide declaration order, used as a stable identity.
    pub order: usize,
}

/// A lightweight record of a taken transition, carried on states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub source: String,
    pub event_type: String,
    pub targets: Vec<String>,
}

impl TransitionRecord {
    pub(crate) fn new(tree: &Tree, t: &TransitionDef) -> Self {
        Self {
            source: tree.node(t.source).id.clone(),
            event_type: t.event_type.clone(),
            targets: t
                .target
                .iter()
                .flatten()
                .map(|&n| tree.node(n).id.clone())
                .collect(),
        }
    }
}

/// Matches an event descriptor against an event name.
///
/// - the empty descriptor matches only the NULL event;
/// - `*` matches any non-NULL event;
/// - `a.b.*` matches any event whose dot-separated tokens have `a.b`
///   as a prefix;
/// - otherwise the match is exact.
pub fn event_matches(descriptor: &str, event_name: &str) -> bool {
    if event_name == NULL_EVENT {
        return descriptor == NULL_EVENT;
    }
    if descriptor == NULL_EVENT {
        return false;
    }
    if descriptor == WILDCARD {
        return true;
    }
    if let Some(prefix) = descriptor.strip_suffix(".*") {
        let descriptor_tokens: Vec<&str> = prefix.split('.').collect();
        let event_tokens: Vec<&str> = event_name.split('.').collect();
        return event_tokens.len() >= descriptor_tokens.len()
            && descriptor_tokens
                .iter()
                .zip(event_tokens.iter())
                .all(|(d, e)| d == e);
    }
    descriptor == event_name
}

/// Selects the first matching candidate whose guard passes on a single
/// node, scanning in declaration order. A failing guard moves on to the
/// next candidate; a guard *error* aborts selection.
fn select_on_node<'a>(
    tree: &'a Tree,
    node: NodeId,
    event: &EventObject,
    ctx: &Value,
    state: &StateValue,
    options: &MachineOptions,
) -> Result<Option<&'a TransitionDef>, MachineError> {
    for t in &tree.node(node).transitions {
        if !event_matches(&t.event_type, &event.name) {
            continue;
        }
        let passes = match &t.guard {
            None => true,
            Some(guard) => guard
                .evaluate(ctx, event, state, &options.guards)
                .map_err(|failure| {
                    failure.into_machine_error(&event.name, &tree.node(node).id)
                })?,
        };
        if passes {
            return Ok(Some(t));
        }
    }
    Ok(None)
}

/// Selects the enabled transitions for an event: each active atomic
/// state attempts selection at itself, then at successive ancestors
/// until a candidate passes. The result is deduplicated and ordered by
/// first selection.
pub fn select_transitions<'a>(
    tree: &'a Tree,
    configuration: &BTreeSet<NodeId>,
    event: &EventObject,
    ctx: &Value,
    state: &StateValue,
    options: &MachineOptions,
) -> Result<Vec<&'a TransitionDef>, MachineError> {
    let mut selected: Vec<&TransitionDef> = Vec::new();
    let mut seen = BTreeSet::new();

    for &atomic in configuration {
        if !tree.node(atomic).is_atomic() {
            continue;
        }
        let mut chain = vec![atomic];
        chain.extend(tree.proper_ancestors(atomic));

        for node in chain {
            if let Some(t) = select_on_node(tree, node, event, ctx, state, options)? {
                if seen.insert(t.order) {
                    selected.push(t);
                }
                break;
            }
        }
    }

    Ok(selected)
}
