//! The compiled state-node tree.
//!
//! Compilation turns a raw [`MachineConfig`] into an arena of immutable
//! [`StateNode`]s in document (pre-order) order, with a machine-wide id
//! map, normalized transitions, resolved targets and `after` rewrites.
//! The arena index of a node is its document order.

use crate::action::{Action, DelaySpec, EventTemplate, InvokeDef, InvokeSource, SendAction};
use crate::config::{MachineConfig, StateConfig, TransitionConfig};
use crate::error::MachineError;
use crate::event::{after_event, done_invoke, done_state, error_platform, NULL_EVENT};
use crate::guard::Guard;
use crate::transition::TransitionDef;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Separator used in derived state ids and dotted target paths.
pub const DELIMITER: char = '.';

/// Index of a node in the machine arena; doubles as its document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The document order of this node.
    pub fn order(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Atomic,
    Compound,
    Parallel,
    Final,
    History,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    Shallow,
    Deep,
}

/// An immutable node in the compiled machine tree.
#[derive(Debug)]
pub struct StateNode {
    /// Stable id, unique machine-wide.
    pub id: String,
    /// Key relative to the parent.
    pub key: String,
    /// Keys from the root down to this node.
    pub path: Vec<String>,
    pub kind: NodeKind,
    /// Set on history nodes.
    pub history: Option<HistoryKind>,
    pub parent: Option<NodeId>,
    /// Children in declaration order.
    pub children: Vec<NodeId>,
    pub entry: Vec<Action>,
    pub exit: Vec<Action>,
    /// Normalized transitions in candidate order.
    pub transitions: Vec<TransitionDef>,
    /// Pre-resolved initial-transition target of a compound node.
    pub initial_target: Vec<NodeId>,
    /// Default target of a history node.
    pub history_target: Vec<NodeId>,
    /// Done-data template of a final node.
    pub done_data: Option<Value>,
    pub invokes: Vec<Arc<InvokeDef>>,
    pub tags: Vec<String>,
    pub meta: Option<Value>,
}

impl StateNode {
    /// Atomic in the SCXML sense: a leaf that can sit in a configuration.
    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, NodeKind::Atomic | NodeKind::Final)
    }

    pub fn is_compound(&self) -> bool {
        self.kind == NodeKind::Compound
    }

    pub fn is_parallel(&self) -> bool {
        self.kind == NodeKind::Parallel
    }

    pub fn is_final(&self) -> bool {
        self.kind == NodeKind::Final
    }

    pub fn is_history(&self) -> bool {
        self.kind == NodeKind::History
    }
}

/// The compiled node arena plus the machine-wide id map.
#[derive(Debug)]
pub struct Tree {
    pub(crate) nodes: Vec<StateNode>,
    pub(crate) ids: HashMap<String, NodeId>,
    pub(crate) root: NodeId,
}

impl Tree {
    pub fn node(&self, id: NodeId) -> &StateNode {
        &self.nodes[id.0]
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get_by_id(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    /// Proper ancestors, closest first, ending at the root.
    pub fn proper_ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.node(id).parent;
        while let Some(parent) = current {
            out.push(parent);
            current = self.node(parent).parent;
        }
        out
    }

    /// True iff `node` is a proper descendant of `ancestor`.
    pub fn is_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.node(node).parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.node(parent).parent;
        }
        false
    }

    /// `node == ancestor` or a proper descendant of it.
    pub fn is_self_or_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        node == ancestor || self.is_descendant(node, ancestor)
    }

    /// Child of `parent` by key.
    pub fn child_by_key(&self, parent: NodeId, key: &str) -> Option<NodeId> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).key == key)
    }

    /// Descends from `from` along dotted path segments.
    pub fn descend(&self, from: NodeId, path: &str) -> Option<NodeId> {
        let mut current = from;
        for segment in path.split(DELIMITER).filter(|s| !s.is_empty()) {
            current = self.child_by_key(current, segment)?;
        }
        Some(current)
    }

    /// All atomic descendants of `node` (including `node` itself when
    /// atomic), in document order.
    pub fn atomic_descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let n = self.node(id);
            if n.is_atomic() {
                out.push(id);
            } else {
                for &child in n.children.iter().rev() {
                    if !self.node(child).is_history() {
                        stack.push(child);
                    }
                }
            }
        }
        out.sort();
        out
    }

    /// History children of a node.
    pub fn history_children(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node)
            .children
            .iter()
            .copied()
            .filter(|&c| self.node(c).is_history())
            .collect()
    }
}

/// Compiles a machine config into a tree.
pub(crate) fn compile(machine_key: &str, config: &MachineConfig) -> Result<Tree, MachineError> {
    let root_cfg = root_state_config(config);
    let mut builder = TreeBuilder {
        nodes: Vec::new(),
        ids: HashMap::new(),
        cfgs: Vec::new(),
        transition_seq: 0,
    };

    let root = builder.create_node(&root_cfg, None, machine_key.to_string(), Vec::new())?;
    debug_assert_eq!(root, NodeId(0));

    for idx in 0..builder.nodes.len() {
        builder.finish_node(NodeId(idx))?;
    }

    Ok(Tree {
        nodes: builder.nodes,
        ids: builder.ids,
        root,
    })
}

/// Views the top-level machine config as a state config for the root.
fn root_state_config(config: &MachineConfig) -> StateConfig {
    StateConfig {
        id: None,
        kind: config.kind.clone(),
        initial: config.initial.clone(),
        history: None,
        target: None,
        states: config.states.clone(),
        on: config.on.clone(),
        entry: config.entry.clone(),
        exit: config.exit.clone(),
        always: config.always.clone(),
        after: config.after.clone(),
        invoke: config.invoke.clone(),
        on_done: config.on_done.clone(),
        data: None,
        tags: config.tags.clone(),
        meta: config.meta.clone(),
    }
}

struct TreeBuilder<'a> {
    nodes: Vec<StateNode>,
    ids: HashMap<String, NodeId>,
    cfgs: Vec<&'a StateConfig>,
    transition_seq: usize,
}

impl<'a> TreeBuilder<'a> {
    /// Phase 1: creates the node, registers its id and recurses into its
    /// children in declaration order, yielding pre-order arena indices.
    fn create_node(
        &mut self,
        cfg: &'a StateConfig,
        parent: Option<NodeId>,
        key: String,
        path: Vec<String>,
    ) -> Result<NodeId, MachineError> {
        let id = match (&cfg.id, parent) {
            (Some(explicit), _) => explicit.clone(),
            (None, None) => key.clone(),
            (None, Some(_)) => {
                let machine_key = &self.nodes[0].id;
                let mut id = machine_key.clone();
                for segment in &path {
                    id.push(DELIMITER);
                    id.push_str(segment);
                }
                id
            }
        };

        let kind = infer_kind(cfg, &id)?;
        let history = if kind == NodeKind::History {
            Some(match cfg.history.as_deref() {
                None | Some("shallow") => HistoryKind::Shallow,
                Some("deep") => HistoryKind::Deep,
                Some(other) => {
                    return Err(MachineError::InvalidDefinition {
                        reason: format!("invalid history kind '{other}' on '{id}'"),
                    })
                }
            })
        } else {
            None
        };

        let mut entry = Action::from_json_list(cfg.entry.iter())?;
        let mut exit = Action::from_json_list(cfg.exit.iter())?;

        let mut invokes = Vec::new();
        for (index, invoke) in cfg.invoke.iter().enumerate() {
            if invoke.src.is_null() {
                return Err(MachineError::InvalidDefinition {
                    reason: format!("invoke on '{id}' requires a 'src'"),
                });
            }
            let src = InvokeSource::from_json(&invoke.src)?;
            let invoke_id = invoke
                .id
                .clone()
                .unwrap_or_else(|| {
                    if src.kind.is_empty() {
                        format!("{id}:invocation[{index}]")
                    } else {
                        src.kind.clone()
                    }
                });
            invokes.push(Arc::new(InvokeDef {
                id: invoke_id,
                src,
                data: invoke.data.clone(),
                auto_forward: invoke.auto_forward,
                sync: invoke.sync,
                state_id: id.clone(),
            }));
        }

        // after: delayed sends are armed on entry and canceled on exit
        for delay_key in cfg.after.keys() {
            let event_name = after_event(delay_key, &id);
            entry.push(Action::Send(SendAction {
                event: EventTemplate::named(event_name.clone()),
                to: None,
                delay: Some(DelaySpec::parse(delay_key)),
                id: Some(event_name),
            }));
        }
        for delay_key in cfg.after.keys() {
            exit.push(Action::Cancel {
                send_id: after_event(delay_key, &id),
            });
        }

        let node = StateNode {
            id: id.clone(),
            key,
            path: path.clone(),
            kind,
            history,
            parent,
            children: Vec::new(),
            entry,
            exit,
            transitions: Vec::new(),
            initial_target: Vec::new(),
            history_target: Vec::new(),
            done_data: cfg.data.clone(),
            invokes,
            tags: cfg.tags.clone(),
            meta: cfg.meta.clone(),
        };

        let node_id = NodeId(self.nodes.len());
        if self.ids.insert(id.clone(), node_id).is_some() {
            return Err(MachineError::DuplicateStateId { id });
        }
        self.nodes.push(node);
        self.cfgs.push(cfg);

        let mut children = Vec::with_capacity(cfg.states.len());
        for (child_key, child_cfg) in &cfg.states {
            let mut child_path = path.clone();
            child_path.push(child_key.clone());
            children.push(self.create_node(
                child_cfg,
                Some(node_id),
                child_key.clone(),
                child_path,
            )?);
        }
        self.nodes[node_id.0].children = children;

        Ok(node_id)
    }

    /// Phase 2: resolves targets and normalizes every transition source
    /// into the node's `transitions` list, now that all ids exist.
    fn finish_node(&mut self, node_id: NodeId) -> Result<(), MachineError> {
        let cfg = self.cfgs[node_id.0];
        let mut transitions = Vec::new();

        for (descriptor, configs) in &cfg.on {
            validate_event_descriptor(descriptor, &self.nodes[node_id.0].id)?;
            for t in configs.iter() {
                transitions.push(self.build_transition(node_id, descriptor.clone(), t)?);
            }
        }

        if let Some(on_done) = &cfg.on_done {
            let kind = self.nodes[node_id.0].kind;
            if !matches!(kind, NodeKind::Compound | NodeKind::Parallel) {
                return Err(MachineError::InvalidDefinition {
                    reason: format!(
                        "onDone on '{}' requires a compound or parallel state",
                        self.nodes[node_id.0].id
                    ),
                });
            }
            let descriptor = done_state(&self.nodes[node_id.0].id);
            for t in on_done.iter() {
                transitions.push(self.build_transition(node_id, descriptor.clone(), t)?);
            }
        }

        let invokes: Vec<Arc<InvokeDef>> = self.nodes[node_id.0].invokes.clone();
        for (invoke, invoke_cfg) in invokes.iter().zip(cfg.invoke.iter()) {
            if let Some(on_done) = &invoke_cfg.on_done {
                let descriptor = done_invoke(&invoke.id);
                for t in on_done.iter() {
                    transitions.push(self.build_transition(node_id, descriptor.clone(), t)?);
                }
            }
            if let Some(on_error) = &invoke_cfg.on_error {
                let descriptor = error_platform(&invoke.id);
                for t in on_error.iter() {
                    transitions.push(self.build_transition(node_id, descriptor.clone(), t)?);
                }
            }
        }

        for (delay_key, configs) in &cfg.after {
            let descriptor = after_event(delay_key, &self.nodes[node_id.0].id);
            for t in configs.iter() {
                transitions.push(self.build_transition(node_id, descriptor.clone(), t)?);
            }
        }

        if let Some(always) = &cfg.always {
            for t in always.iter() {
                transitions.push(self.build_transition(node_id, NULL_EVENT.to_string(), t)?);
            }
        }

        self.nodes[node_id.0].transitions = transitions;

        // initial transition of compound nodes
        if self.nodes[node_id.0].kind == NodeKind::Compound {
            let id = self.nodes[node_id.0].id.clone();
            let initial = cfg
                .initial
                .as_deref()
                .ok_or_else(|| MachineError::MissingInitial { id: id.clone() })?;
            let target = self
                .descend_existing(node_id, initial)
                .ok_or_else(|| MachineError::InvalidInitial {
                    id: id.clone(),
                    target: initial.to_string(),
                })?;
            if !self.node_is_descendant(target, node_id) {
                return Err(MachineError::InvalidInitial {
                    id,
                    target: initial.to_string(),
                });
            }
            self.nodes[node_id.0].initial_target = vec![target];
        }

        // history default target
        if self.nodes[node_id.0].kind == NodeKind::History {
            if let Some(target) = &cfg.target {
                let resolved = self.resolve_target(node_id, target)?;
                self.nodes[node_id.0].history_target = vec![resolved];
            }
        }

        Ok(())
    }

    fn build_transition(
        &mut self,
        source: NodeId,
        event_type: String,
        cfg: &TransitionConfig,
    ) -> Result<TransitionDef, MachineError> {
        let (target_strings, guard, actions, internal_flag) = match cfg {
            TransitionConfig::Target(t) => (vec![t.clone()], None, Vec::new(), None),
            TransitionConfig::Full(obj) => {
                let targets = obj
                    .target
                    .as_ref()
                    .map(|t| t.iter().map(str::to_string).collect())
                    .unwrap_or_default();
                let guard = obj.guard.as_ref().map(Guard::from_json).transpose()?;
                let actions = Action::from_json_list(obj.actions.iter())?;
                (targets, guard, actions, obj.internal)
            }
        };

        let target = if target_strings.is_empty() {
            None
        } else {
            let mut resolved = Vec::with_capacity(target_strings.len());
            for t in &target_strings {
                resolved.push(self.resolve_target(source, t)?);
            }
            Some(resolved)
        };

        // Internal iff explicitly flagged, targetless, or every string
        // target begins with the delimiter.
        let internal = internal_flag.unwrap_or_else(|| {
            target.is_none()
                || target_strings
                    .iter()
                    .all(|t| t.starts_with(DELIMITER))
        });

        let order = self.transition_seq;
        self.transition_seq += 1;

        Ok(TransitionDef {
            source,
            event_type,
            guard,
            actions,
            target,
            internal,
            order,
        })
    }

    /// Resolves a target string: `#id` lookup, leading-delimiter descent
    /// from the source, then sibling key, then bare id.
    fn resolve_target(&self, source: NodeId, target: &str) -> Result<NodeId, MachineError> {
        let err = || MachineError::UnknownTarget {
            target: target.to_string(),
            source_state: self.nodes[source.0].id.clone(),
        };

        if let Some(id) = target.strip_prefix('#') {
            return self.ids.get(id).copied().ok_or_else(err);
        }

        if target.starts_with(DELIMITER) {
            return self.descend_existing(source, target).ok_or_else(err);
        }

        let base = self.nodes[source.0].parent.unwrap_or(source);
        if let Some(found) = self.descend_existing(base, target) {
            return Ok(found);
        }

        self.ids.get(target).copied().ok_or_else(err)
    }

    fn descend_existing(&self, from: NodeId, path: &str) -> Option<NodeId> {
        let mut current = from;
        for segment in path.split(DELIMITER).filter(|s| !s.is_empty()) {
            current = self.nodes[current.0]
                .children
                .iter()
                .copied()
                .find(|&c| self.nodes[c.0].key == segment)?;
        }
        if current == from {
            None
        } else {
            Some(current)
        }
    }

    fn node_is_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.nodes[node.0].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes[parent.0].parent;
        }
        false
    }
}

fn infer_kind(cfg: &StateConfig, id: &str) -> Result<NodeKind, MachineError> {
    match cfg.kind.as_deref() {
        Some("atomic") => Ok(NodeKind::Atomic),
        Some("compound") => Ok(NodeKind::Compound),
        Some("parallel") => Ok(NodeKind::Parallel),
        Some("final") => Ok(NodeKind::Final),
        Some("history") => Ok(NodeKind::History),
        Some(other) => Err(MachineError::InvalidDefinition {
            reason: format!("invalid state type '{other}' on '{id}'"),
        }),
        None => {
            if cfg.states.is_empty() {
                Ok(NodeKind::Atomic)
            } else {
                Ok(NodeKind::Compound)
            }
        }
    }
}

/// `*` is only legal alone or as the trailing token of a `.*` pattern.
fn validate_event_descriptor(descriptor: &str, state_id: &str) -> Result<(), MachineError> {
    if descriptor == crate::event::WILDCARD {
        return Ok(());
    }
    let stripped = descriptor.strip_suffix(".*").unwrap_or(descriptor);
    if stripped.contains('*') {
        return Err(MachineError::InvalidDefinition {
            reason: format!("invalid event descriptor '{descriptor}' on '{state_id}'"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile_json(v: Value) -> Result<Tree, MachineError> {
        let config: MachineConfig = serde_json::from_value(v).unwrap();
        let key = config.id.clone().unwrap_or_else(|| "(machine)".to_string());
        compile(&key, &config)
    }

    fn tree(v: Value) -> Tree {
        compile_json(v).unwrap()
    }

    #[test]
    fn test_document_order_is_preorder() {
        let tree = tree(json!({
            "id": "m",
            "initial": "a",
            "states": {
                "a": {"initial": "a1", "states": {"a1": {}, "a2": {}}},
                "b": {}
            }
        }));

        let order: Vec<&str> = tree.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(order, vec!["m", "m.a", "m.a.a1", "m.a.a2", "m.b"]);
        assert_eq!(tree.get_by_id("m.a.a2"), Some(NodeId(3)));
    }

    #[test]
    fn test_explicit_id_and_collision() {
        let tree = tree(json!({
            "id": "m",
            "initial": "a",
            "states": {"a": {"id": "custom"}, "b": {}}
        }));
        assert!(tree.get_by_id("custom").is_some());
        assert!(tree.get_by_id("m.a").is_none());

        let err = compile_json(json!({
            "id": "m",
            "initial": "a",
            "states": {"a": {"id": "dup"}, "b": {"id": "dup"}}
        }))
        .unwrap_err();
        assert!(matches!(err, MachineError::DuplicateStateId { id } if id == "dup"));
    }

    #[test]
    fn test_missing_initial_is_fatal() {
        let err = compile_json(json!({
            "id": "m",
            "states": {"a": {}, "b": {}}
        }))
        .unwrap_err();
        assert!(matches!(err, MachineError::MissingInitial { id } if id == "m"));
    }

    #[test]
    fn test_initial_must_be_descendant() {
        let err = compile_json(json!({
            "id": "m",
            "initial": "a",
            "states": {
                "a": {"initial": "nope", "states": {"a1": {}}},
                "b": {}
            }
        }))
        .unwrap_err();
        assert!(matches!(err, MachineError::InvalidInitial { .. }));
    }

    #[test]
    fn test_sibling_id_and_absolute_targets() {
        let tree = tree(json!({
            "id": "m",
            "initial": "a",
            "states": {
                "a": {"on": {"GO": "b", "JUMP": "#deep", "NEST": "b.inner"}},
                "b": {"initial": "inner", "states": {"inner": {"id": "deep"}}}
            }
        }));

        let a = tree.get_by_id("m.a").unwrap();
        let deep = tree.get_by_id("deep").unwrap();
        let b = tree.get_by_id("m.b").unwrap();

        let targets: Vec<Vec<NodeId>> = tree
            .node(a)
            .transitions
            .iter()
            .map(|t| t.target.clone().unwrap())
            .collect();
        assert_eq!(targets, vec![vec![b], vec![deep], vec![deep]]);
    }

    #[test]
    fn test_unknown_target_is_fatal() {
        let err = compile_json(json!({
            "id": "m",
            "initial": "a",
            "states": {"a": {"on": {"GO": "nowhere"}}}
        }))
        .unwrap_err();
        assert!(matches!(err, MachineError::UnknownTarget { .. }));
    }

    #[test]
    fn test_after_rewrite() {
        let tree = tree(json!({
            "id": "m",
            "initial": "doing",
            "states": {
                "doing": {"after": {"100": "idle"}},
                "idle": {}
            }
        }));

        let doing = tree.get_by_id("m.doing").unwrap();
        let node = tree.node(doing);
        let event_name = "xstate.after(100)#m.doing";

        match node.entry.last().unwrap() {
            Action::Send(send) => {
                assert_eq!(send.event.name, event_name);
                assert_eq!(send.delay, Some(DelaySpec::Ms(100)));
                assert_eq!(send.send_id(), event_name);
            }
            other => panic!("expected entry send, got {other:?}"),
        }
        match node.exit.last().unwrap() {
            Action::Cancel { send_id } => assert_eq!(send_id, event_name),
            other => panic!("expected exit cancel, got {other:?}"),
        }
        assert!(node
            .transitions
            .iter()
            .any(|t| t.event_type == event_name));
    }

    #[test]
    fn test_named_after_delay() {
        let tree = tree(json!({
            "id": "m",
            "initial": "doing",
            "states": {
                "doing": {"after": {"SESSION_TTL": "idle"}},
                "idle": {}
            }
        }));

        let doing = tree.get_by_id("m.doing").unwrap();
        match tree.node(doing).entry.last().unwrap() {
            Action::Send(send) => {
                assert_eq!(send.delay, Some(DelaySpec::Named("SESSION_TTL".into())));
            }
            other => panic!("expected entry send, got {other:?}"),
        }
    }

    #[test]
    fn test_invoke_normalization() {
        let tree = tree(json!({
            "id": "m",
            "initial": "loading",
            "states": {
                "loading": {
                    "invoke": {
                        "src": "fetchData",
                        "onDone": {"target": "ok"},
                        "onError": "bad"
                    }
                },
                "ok": {},
                "bad": {}
            }
        }));

        let loading = tree.get_by_id("m.loading").unwrap();
        let node = tree.node(loading);
        assert_eq!(node.invokes.len(), 1);
        assert_eq!(node.invokes[0].id, "fetchData");
        assert_eq!(node.invokes[0].state_id, "m.loading");

        let events: Vec<&str> = node
            .transitions
            .iter()
            .map(|t| t.event_type.as_str())
            .collect();
        assert!(events.contains(&"done.invoke.fetchData"));
        assert!(events.contains(&"error.platform.fetchData"));
    }

    #[test]
    fn test_eventless_normalization() {
        let tree = tree(json!({
            "id": "m",
            "initial": "a",
            "states": {
                "a": {"always": [{"target": "b", "guard": "ctx.go"}]},
                "b": {}
            }
        }));

        let a = tree.get_by_id("m.a").unwrap();
        let t = &tree.node(a).transitions[0];
        assert_eq!(t.event_type, NULL_EVENT);
        assert!(t.guard.is_some());
    }

    #[test]
    fn test_wildcard_descriptor_validation() {
        assert!(compile_json(json!({
            "id": "m",
            "initial": "a",
            "states": {"a": {"on": {"*": "b", "x.*": "b"}}, "b": {}}
        }))
        .is_ok());

        let err = compile_json(json!({
            "id": "m",
            "initial": "a",
            "states": {"a": {"on": {"x.*.y": "b"}}, "b": {}}
        }))
        .unwrap_err();
        assert!(matches!(err, MachineError::InvalidDefinition { .. }));
    }

    #[test]
    fn test_internal_transition_convention() {
        let tree = tree(json!({
            "id": "m",
            "initial": "a",
            "states": {
                "a": {
                    "initial": "a1",
                    "states": {"a1": {}, "a2": {}},
                    "on": {
                        "DOTTED": ".a2",
                        "PLAIN": "b",
                        "FORCED": {"target": "b", "internal": true},
                        "ACTIONS_ONLY": {"actions": [{"type": "log", "message": "x"}]}
                    }
                },
                "b": {}
            }
        }));

        let a = tree.get_by_id("m.a").unwrap();
        let internal: Vec<bool> = tree.node(a).transitions.iter().map(|t| t.internal).collect();
        assert_eq!(internal, vec![true, false, true, true]);
    }

    #[test]
    fn test_history_node() {
        let tree = tree(json!({
            "id": "m",
            "initial": "on",
            "states": {
                "on": {
                    "initial": "low",
                    "states": {
                        "low": {},
                        "high": {},
                        "memo": {"type": "history", "history": "deep", "target": "high"}
                    }
                }
            }
        }));

        let memo = tree.get_by_id("m.on.memo").unwrap();
        let node = tree.node(memo);
        assert_eq!(node.history, Some(HistoryKind::Deep));
        let high = tree.get_by_id("m.on.high").unwrap();
        assert_eq!(node.history_target, vec![high]);
    }
}
