//! The compiled machine and its pure transition function.
//!
//! `Machine` owns the compiled node tree and the option registries and
//! exposes the deterministic transition function
//! `(state, event) -> state'`. A macrostep runs one microstep for the
//! supplied event, then drains the internal queue (eventless closure
//! first, then raised events) until quiescence.

use crate::action::{resolve_actions, Action, EventTemplate, SendAction};
use crate::config::MachineConfig;
use crate::error::MachineError;
use crate::event::{done_state, Event, EventKind, EventObject};
use crate::microstep::{
    compute_entry_set, compute_exit_set, config_from_value, initial_entry_set, is_in_final_state,
    record_history, remove_conflicting, value_from_config, HistoryValue,
};
use crate::node::{compile, NodeId, Tree};
use crate::options::MachineOptions;
use crate::state::State;
use crate::state_value::StateValue;
use crate::transition::{select_transitions, TransitionDef, TransitionRecord};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

const DEFAULT_MACHINE_KEY: &str = "(machine)";

/// A compiled statechart. Cheap to clone; the node tree is shared.
#[derive(Debug, Clone)]
pub struct Machine {
    key: String,
    tree: Arc<Tree>,
    initial_context: Value,
    strict: bool,
    options: MachineOptions,
}

impl Machine {
    /// Compiles a machine from its JSON definition.
    pub fn from_json(definition: Value) -> Result<Machine, MachineError> {
        let config: MachineConfig = serde_json::from_value(definition)?;
        Self::from_config(config)
    }

    /// Compiles a machine from a parsed config.
    pub fn from_config(config: MachineConfig) -> Result<Machine, MachineError> {
        let key = config
            .id
            .clone()
            .unwrap_or_else(|| DEFAULT_MACHINE_KEY.to_string());
        let tree = compile(&key, &config)?;
        Ok(Machine {
            key,
            tree: Arc::new(tree),
            initial_context: config.context.clone(),
            strict: config.strict,
            options: MachineOptions::default(),
        })
    }

    /// Returns a machine with the given registries merged over the
    /// current ones. The original is untouched.
    pub fn with_options(&self, options: MachineOptions) -> Machine {
        let mut next = self.clone();
        next.options = next.options.merge(options);
        next
    }

    /// Returns a machine with a different initial context.
    pub fn with_context(&self, context: Value) -> Machine {
        let mut next = self.clone();
        next.initial_context = context;
        next
    }

    pub fn id(&self) -> &str {
        &self.key
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    pub fn options(&self) -> &MachineOptions {
        &self.options
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn initial_context(&self) -> &Value {
        &self.initial_context
    }

    /// The machine's initial state: the closure of the root's initial
    /// transitions, with all initial entry actions in one batch.
    pub fn initial_state(&self) -> Result<State, MachineError> {
        self.macrostep(None, EventObject::init())
    }

    /// Applies an external event to a state.
    pub fn transition(
        &self,
        state: &State,
        event: impl Into<Event>,
    ) -> Result<State, MachineError> {
        self.macrostep(Some(state), EventObject::external(event.into()))
    }

    /// Applies a full event envelope to a state (interpreter path).
    pub fn transition_event(
        &self,
        state: &State,
        event: EventObject,
    ) -> Result<State, MachineError> {
        self.macrostep(Some(state), event)
    }

    /// Applies an event to a bare state value (with an optional context
    /// override), resolving the value to a full state first.
    pub fn transition_value(
        &self,
        value: &StateValue,
        context: Option<Value>,
        event: impl Into<Event>,
    ) -> Result<State, MachineError> {
        let resolved = self.state_from_parts(
            value.clone(),
            context.unwrap_or_else(|| self.initial_context.clone()),
            HistoryValue::new(),
        )?;
        self.transition(&resolved, event)
    }

    /// Builds a resolved state from persisted parts: the configuration
    /// is recomputed from the value (partial values expand through
    /// initial transitions), tags and meta from the active nodes.
    pub(crate) fn state_from_parts(
        &self,
        value: StateValue,
        context: Value,
        history_value: HistoryValue,
    ) -> Result<State, MachineError> {
        let configuration = config_from_value(&self.tree, &value)?;
        let value = value_from_config(&self.tree, &configuration);
        let done = is_in_final_state(&self.tree, self.tree.root(), &configuration);
        Ok(State {
            value,
            context,
            event: EventObject::init().event(),
            event_object: EventObject::init(),
            history_value,
            actions: Vec::new(),
            configuration: configuration.clone(),
            transitions: Vec::new(),
            tags: self.tags_of(&configuration),
            meta: self.meta_of(&configuration),
            changed: None,
            done,
            history: None,
            internal_queue: VecDeque::new(),
        })
    }

    /// The delayed entry sends of a state's active configuration, with
    /// delays and payloads resolved. Used to re-arm `after` timers when
    /// an interpreter starts from a rehydrated state.
    pub fn delayed_entry_sends(&self, state: &State) -> Result<Vec<SendAction>, MachineError> {
        let mut out = Vec::new();
        for &node in &state.configuration {
            for action in &self.tree.node(node).entry {
                if let Action::Send(send) = action {
                    if send.delay.is_some() {
                        let resolved = resolve_actions(
                            std::slice::from_ref(action),
                            &state.context,
                            &state.event_object,
                            &state.value,
                            &self.options,
                        )?;
                        for resolved_action in resolved.actions {
                            if let Action::Send(send) = resolved_action {
                                out.push(send);
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Runs a full macrostep: one microstep for the supplied event, then
    /// eventless closure and internal-queue draining until quiescence.
    fn macrostep(
        &self,
        prev: Option<&State>,
        event: EventObject,
    ) -> Result<State, MachineError> {
        let mut state = match prev {
            None => self.initial_microstep(event)?,
            Some(p) => {
                let selected = select_transitions(
                    &self.tree,
                    &p.configuration,
                    &event,
                    &p.context,
                    &p.value,
                    &self.options,
                )?;
                if selected.is_empty() {
                    self.check_unhandled(&event)?;
                    tracing::debug!(machine = %self.key, event = %event.name, "event not handled");
                    let mut next = p.clone();
                    next.event = event.event();
                    next.event_object = event;
                    next.actions = Vec::new();
                    next.transitions = Vec::new();
                    next.changed = Some(false);
                    next.history = Some(prune_history(p.clone()));
                    return Ok(next);
                }
                self.apply_microstep(p, &selected, &event)?
            }
        };

        loop {
            if state.done {
                state.internal_queue.clear();
                break;
            }

            if self.has_enabled_eventless(&state)? {
                state.internal_queue.push_front(EventObject::null());
            }

            let Some(next_event) = state.internal_queue.pop_front() else {
                break;
            };
            let is_null = next_event.is_null();

            let selected = select_transitions(
                &self.tree,
                &state.configuration,
                &next_event,
                &state.context,
                &state.value,
                &self.options,
            )?;
            if selected.is_empty() {
                self.check_unhandled(&next_event)?;
                continue;
            }

            let mut next = self.apply_microstep(&state, &selected, &next_event)?;
            if is_null {
                // an eventless step does not change the visible event
                next.event = state.event.clone();
                next.event_object = state.event_object.clone();
            }

            let mut actions = std::mem::take(&mut state.actions);
            actions.extend(next.actions);
            next.actions = actions;

            let mut transitions = std::mem::take(&mut state.transitions);
            transitions.extend(next.transitions);
            next.transitions = transitions;

            state = next;
        }

        // invocations are deferred to the macrostep boundary: an actor
        // whose state was exited again before quiescence never starts
        let configuration = state.configuration.clone();
        state.actions.retain(|action| match action {
            Action::Invoke(def) => self
                .tree
                .get_by_id(&def.state_id)
                .is_some_and(|node| configuration.contains(&node)),
            _ => true,
        });

        if let Some(p) = prev {
            state.changed = Some(
                !state.transitions.is_empty()
                    && (state.value != p.value
                        || state.context != p.context
                        || !state.actions.is_empty()),
            );
            state.history = Some(prune_history(p.clone()));
        }

        Ok(state)
    }

    /// Applies one batch of transitions: conflict removal, exit set with
    /// history recording and invocation stops, transition actions, entry
    /// set with default entry, done-event generation and deferred
    /// invocations, then ordered action resolution.
    fn apply_microstep(
        &self,
        prev: &State,
        selected: &[&TransitionDef],
        event: &EventObject,
    ) -> Result<State, MachineError> {
        let tree = &self.tree;
        let filtered = remove_conflicting(
            tree,
            selected.to_vec(),
            &prev.configuration,
            &prev.history_value,
        );

        let exit_set = compute_exit_set(
            tree,
            &filtered,
            &prev.configuration,
            &prev.history_value,
        );
        let history_value = record_history(
            tree,
            &exit_set,
            &prev.configuration,
            &prev.history_value,
        );

        let mut ordered = Vec::new();

        // exits in reverse document order; stop invocations first
        for &node in &exit_set {
            for invoke in &tree.node(node).invokes {
                ordered.push(Action::Stop {
                    child: invoke.id.clone(),
                });
            }
            ordered.extend(tree.node(node).exit.iter().cloned());
        }

        for t in &filtered {
            ordered.extend(t.actions.iter().cloned());
        }

        let mut configuration: BTreeSet<NodeId> = prev
            .configuration
            .iter()
            .copied()
            .filter(|n| !exit_set.contains(n))
            .collect();

        let entry = compute_entry_set(tree, &filtered, &history_value);
        let entered: Vec<NodeId> = entry.to_enter.iter().copied().collect();
        configuration.extend(entered.iter().copied());

        self.push_entry_actions(&entered, &configuration, &mut ordered);

        let resolved = resolve_actions(
            &ordered,
            &prev.context,
            event,
            &prev.value,
            &self.options,
        )?;

        let mut internal_queue = prev.internal_queue.clone();
        internal_queue.extend(resolved.raised);

        let value = value_from_config(tree, &configuration);
        let done = is_in_final_state(tree, tree.root(), &configuration);

        Ok(State {
            value,
            context: resolved.context,
            event: event.event(),
            event_object: event.clone(),
            history_value,
            actions: resolved.actions,
            configuration: configuration.clone(),
            transitions: filtered
                .iter()
                .map(|t| TransitionRecord::new(tree, t))
                .collect(),
            tags: self.tags_of(&configuration),
            meta: self.meta_of(&configuration),
            changed: Some(true),
            done,
            history: None,
            internal_queue,
        })
    }

    /// The initial microstep has no previous state: nothing is exited
    /// and every entered node produces its entry actions in one batch.
    fn initial_microstep(&self, event: EventObject) -> Result<State, MachineError> {
        let tree = &self.tree;
        let history_value = HistoryValue::new();
        let entry = initial_entry_set(tree, &history_value);
        let configuration = entry.to_enter;
        let entered: Vec<NodeId> = configuration.iter().copied().collect();

        let mut ordered = Vec::new();
        self.push_entry_actions(&entered, &configuration, &mut ordered);

        let value = value_from_config(tree, &configuration);
        let resolved = resolve_actions(
            &ordered,
            &self.initial_context,
            &event,
            &value,
            &self.options,
        )?;

        let done = is_in_final_state(tree, tree.root(), &configuration);

        Ok(State {
            value,
            context: resolved.context,
            event: event.event(),
            event_object: event,
            history_value,
            actions: resolved.actions,
            configuration: configuration.clone(),
            transitions: Vec::new(),
            tags: self.tags_of(&configuration),
            meta: self.meta_of(&configuration),
            changed: None,
            done,
            history: None,
            internal_queue: resolved.raised.into(),
        })
    }

    /// Entry actions in document order, each node followed by its
    /// deferred invocations; entering a final node raises the parent's
    /// done event (and the grandparent's, when a parallel completes).
    fn push_entry_actions(
        &self,
        entered: &[NodeId],
        configuration: &BTreeSet<NodeId>,
        ordered: &mut Vec<Action>,
    ) {
        let tree = &self.tree;
        for &node in entered {
            let n = tree.node(node);
            ordered.extend(n.entry.iter().cloned());
            for invoke in &n.invokes {
                ordered.push(Action::Invoke(invoke.clone()));
            }

            if !n.is_final() {
                continue;
            }
            let Some(parent) = n.parent else { continue };

            ordered.push(Action::Raise(EventTemplate {
                name: done_state(&tree.node(parent).id),
                data: n.done_data.clone().unwrap_or(Value::Null),
            }));

            if let Some(grandparent) = tree.node(parent).parent {
                if tree.node(grandparent).is_parallel()
                    && is_in_final_state(tree, grandparent, configuration)
                {
                    ordered.push(Action::Raise(EventTemplate::named(done_state(
                        &tree.node(grandparent).id,
                    ))));
                }
            }
        }
    }

    fn has_enabled_eventless(&self, state: &State) -> Result<bool, MachineError> {
        let selected = select_transitions(
            &self.tree,
            &state.configuration,
            &EventObject::null(),
            &state.context,
            &state.value,
            &self.options,
        )?;
        Ok(!selected.is_empty())
    }

    /// Strict-mode checks for events nothing handled.
    fn check_unhandled(&self, event: &EventObject) -> Result<(), MachineError> {
        if !self.strict {
            return Ok(());
        }
        match event.kind {
            EventKind::Error => Err(MachineError::UnhandledErrorEvent {
                event: event.name.clone(),
            }),
            EventKind::External
                if !event.name.starts_with("xstate.") && !event.name.starts_with("done.") =>
            {
                Err(MachineError::UnknownEvent {
                    event: event.name.clone(),
                    machine: self.key.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn tags_of(&self, configuration: &BTreeSet<NodeId>) -> BTreeSet<String> {
        configuration
            .iter()
            .flat_map(|&n| self.tree.node(n).tags.iter().cloned())
            .collect()
    }

    fn meta_of(&self, configuration: &BTreeSet<NodeId>) -> BTreeMap<String, Value> {
        configuration
            .iter()
            .filter_map(|&n| {
                let node = self.tree.node(n);
                node.meta
                    .clone()
                    .map(|meta| (node.id.clone(), meta))
            })
            .collect()
    }
}

/// The previous state is kept one level deep: its own history link is
/// dropped so chains do not grow without bound.
fn prune_history(mut prev: State) -> Box<State> {
    prev.history = None;
    Box::new(prev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::DelaySpec;
    use serde_json::json;

    fn toggle() -> Machine {
        Machine::from_json(json!({
            "id": "toggle",
            "initial": "off",
            "context": {"flips": 0},
            "states": {
                "off": {"on": {"TOGGLE": {
                    "target": "on",
                    "actions": [{"type": "assign", "updater": "flip"}]
                }}},
                "on": {"on": {"TOGGLE": "off"}}
            }
        }))
        .unwrap()
        .with_options(MachineOptions::new().updater("flip", |ctx, _| {
            Ok(json!({"flips": ctx["flips"].as_i64().unwrap_or(0) + 1}))
        }))
    }

    #[test]
    fn test_initial_state() {
        let machine = toggle();
        let state = machine.initial_state().unwrap();
        assert!(state.matches("off"));
        assert_eq!(state.context, json!({"flips": 0}));
        assert_eq!(state.event.name, "xstate.init");
        assert!(state.changed.is_none());
        assert!(!state.done);
    }

    #[test]
    fn test_basic_transition_updates_context() {
        let machine = toggle();
        let state = machine.initial_state().unwrap();
        let state = machine.transition(&state, "TOGGLE").unwrap();
        assert!(state.matches("on"));
        assert_eq!(state.context["flips"], 1);
        assert_eq!(state.changed, Some(true));
    }

    #[test]
    fn test_unhandled_event_leaves_state_unchanged() {
        let machine = toggle();
        let state = machine.initial_state().unwrap();
        let next = machine.transition(&state, "NOPE").unwrap();
        assert!(next.matches("off"));
        assert_eq!(next.changed, Some(false));
        assert!(next.actions.is_empty());
    }

    #[test]
    fn test_strict_mode_rejects_unknown_event() {
        let machine = Machine::from_json(json!({
            "id": "m",
            "strict": true,
            "initial": "a",
            "states": {"a": {}}
        }))
        .unwrap();
        let state = machine.initial_state().unwrap();
        let err = machine.transition(&state, "NOPE").unwrap_err();
        assert!(matches!(err, MachineError::UnknownEvent { .. }));
    }

    #[test]
    fn test_transition_source_in_configuration() {
        let machine = toggle();
        let state = machine.initial_state().unwrap();
        let next = machine.transition(&state, "TOGGLE").unwrap();
        assert_eq!(next.transitions.len(), 1);
        assert_eq!(next.transitions[0].source, "toggle.off");
        assert!(state
            .configuration
            .iter()
            .any(|&n| machine.tree().node(n).id == "toggle.off"));
    }

    #[test]
    fn test_guard_blocks_transition() {
        let machine = Machine::from_json(json!({
            "id": "m",
            "initial": "a",
            "context": {"ok": false},
            "states": {
                "a": {"on": {"GO": {"target": "b", "guard": "ctx.ok"}}},
                "b": {}
            }
        }))
        .unwrap();

        let state = machine.initial_state().unwrap();
        let next = machine.transition(&state, "GO").unwrap();
        assert!(next.matches("a"));
        assert_eq!(next.changed, Some(false));

        let armed = machine.with_context(json!({"ok": true}));
        let state = armed.initial_state().unwrap();
        let next = armed.transition(&state, "GO").unwrap();
        assert!(next.matches("b"));
    }

    #[test]
    fn test_guard_error_propagates() {
        let machine = Machine::from_json(json!({
            "id": "m",
            "initial": "a",
            "states": {
                "a": {"on": {"GO": {"target": "b", "guard": "missingGuard"}}},
                "b": {}
            }
        }))
        .unwrap();

        let state = machine.initial_state().unwrap();
        let err = machine.transition(&state, "GO").unwrap_err();
        match err {
            MachineError::UnknownGuard { name, event, source_state } => {
                assert_eq!(name, "missingGuard");
                assert_eq!(event, "GO");
                assert_eq!(source_state, "m.a");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_entry_exit_action_order() {
        let machine = Machine::from_json(json!({
            "id": "m",
            "initial": "a",
            "states": {
                "a": {
                    "initial": "a1",
                    "exit": [{"type": "log", "message": "exit a"}],
                    "states": {
                        "a1": {"exit": [{"type": "log", "message": "exit a1"}]}
                    },
                    "on": {"GO": "b"}
                },
                "b": {
                    "initial": "b1",
                    "entry": [{"type": "log", "message": "enter b"}],
                    "states": {
                        "b1": {"entry": [{"type": "log", "message": "enter b1"}]}
                    }
                }
            }
        }))
        .unwrap();

        let state = machine.initial_state().unwrap();
        let next = machine.transition(&state, "GO").unwrap();

        let messages: Vec<&str> = next
            .actions
            .iter()
            .filter_map(|a| match a {
                Action::Log { message } => Some(message.as_str()),
                _ => None,
            })
            .collect();
        // exits innermost-first, entries in document order
        assert_eq!(messages, vec!["exit a1", "exit a", "enter b", "enter b1"]);
    }

    #[test]
    fn test_internal_queue_ordering_eventless_before_raised() {
        // entry raises BAR and an eventless transition leaves b; the
        // eventless step must run before BAR is drained
        let machine = Machine::from_json(json!({
            "id": "m",
            "initial": "a",
            "states": {
                "a": {"on": {"FOO": "b"}},
                "b": {
                    "entry": [{"type": "raise", "event": "BAR"}],
                    "always": "c"
                },
                "c": {"on": {"BAR": "e"}},
                "e": {}
            }
        }))
        .unwrap();

        let state = machine.initial_state().unwrap();
        let next = machine.transition(&state, "FOO").unwrap();
        assert!(next.matches("e"));
        // the whole chain ran in one macrostep
        assert_eq!(next.event.name, "FOO");
    }

    #[test]
    fn test_eventless_closure_across_parallel_regions() {
        let machine = Machine::from_json(json!({
            "id": "p",
            "type": "parallel",
            "states": {
                "A": {
                    "initial": "A1",
                    "states": {
                        "A1": {"on": {"E": "A2"}},
                        "A2": {"always": {
                            "target": "A3",
                            "guard": {"type": "stateIn", "state": {"B": "B3"}}
                        }},
                        "A3": {"always": {
                            "target": "A4",
                            "guard": {"type": "stateIn", "state": {"B": "B3"}}
                        }},
                        "A4": {}
                    }
                },
                "B": {
                    "initial": "B1",
                    "states": {
                        "B1": {"on": {"E": "B2"}},
                        "B2": {"always": {
                            "target": "B3",
                            "guard": {"type": "stateIn", "state": {"A": "A2"}}
                        }},
                        "B3": {"always": {
                            "target": "B4",
                            "guard": {"type": "stateIn", "state": {"A": "A3"}}
                        }},
                        "B4": {}
                    }
                }
            }
        }))
        .unwrap();

        let state = machine.initial_state().unwrap();
        assert_eq!(state.value.to_json(), json!({"A": "A1", "B": "B1"}));

        let next = machine.transition(&state, "E").unwrap();
        assert_eq!(next.value.to_json(), json!({"A": "A4", "B": "B4"}));
    }

    #[test]
    fn test_after_send_appears_in_entry_actions() {
        let machine = Machine::from_json(json!({
            "id": "m",
            "initial": "idle",
            "states": {
                "idle": {"on": {"START": "doing"}},
                "doing": {"after": {"100": "idle"}}
            }
        }))
        .unwrap();

        let state = machine.initial_state().unwrap();
        let next = machine.transition(&state, "START").unwrap();

        let send = next
            .actions
            .iter()
            .find_map(|a| match a {
                Action::Send(send) => Some(send),
                _ => None,
            })
            .expect("expected a delayed send");
        assert_eq!(send.event.name, "xstate.after(100)#m.doing");
        assert_eq!(send.delay, Some(DelaySpec::Ms(100)));

        // taking the delayed event leaves the state and cancels the timer
        let fired = machine
            .transition(&next, "xstate.after(100)#m.doing")
            .unwrap();
        assert!(fired.matches("idle"));
        assert!(fired.actions.iter().any(|a| matches!(
            a,
            Action::Cancel { send_id } if send_id == "xstate.after(100)#m.doing"
        )));
    }

    #[test]
    fn test_on_done_from_final_child() {
        let machine = Machine::from_json(json!({
            "id": "m",
            "initial": "work",
            "states": {
                "work": {
                    "initial": "step1",
                    "states": {
                        "step1": {"on": {"NEXT": "finished"}},
                        "finished": {"type": "final", "data": {"result": "ctx.total"}}
                    },
                    "onDone": "celebrate"
                },
                "celebrate": {}
            },
            "context": {"total": 42}
        }))
        .unwrap();

        let state = machine.initial_state().unwrap();
        let next = machine.transition(&state, "NEXT").unwrap();
        assert!(next.matches("celebrate"));
    }

    #[test]
    fn test_done_data_on_machine_final() {
        let machine = Machine::from_json(json!({
            "id": "m",
            "initial": "a",
            "context": {"answer": 42},
            "states": {
                "a": {"on": {"END": "finished"}},
                "finished": {"type": "final", "data": {"result": "ctx.answer"}}
            }
        }))
        .unwrap();

        let state = machine.initial_state().unwrap();
        let next = machine.transition(&state, "END").unwrap();
        assert!(next.done);
    }

    #[test]
    fn test_history_restores_previous_child() {
        let machine = Machine::from_json(json!({
            "id": "m",
            "initial": "on",
            "states": {
                "on": {
                    "initial": "low",
                    "states": {
                        "low": {"on": {"UP": "high"}},
                        "high": {},
                        "memo": {"type": "history"}
                    },
                    "on": {"OFF": "off"}
                },
                "off": {"on": {"ON": "on.memo"}}
            }
        }))
        .unwrap();

        let state = machine.initial_state().unwrap();
        let state = machine.transition(&state, "UP").unwrap();
        assert!(state.matches("on.high"));

        let state = machine.transition(&state, "OFF").unwrap();
        assert!(state.matches("off"));
        assert_eq!(state.history_value["m.on.memo"], vec!["m.on.high"]);

        let state = machine.transition(&state, "ON").unwrap();
        assert!(state.matches("on.high"));
    }

    #[test]
    fn test_wildcard_and_prefix_transitions() {
        let machine = Machine::from_json(json!({
            "id": "m",
            "initial": "a",
            "states": {
                "a": {"on": {
                    "sys.*": "c",
                    "*": "b"
                }},
                "b": {},
                "c": {}
            }
        }))
        .unwrap();

        let state = machine.initial_state().unwrap();
        let next = machine.transition(&state, "sys.restart").unwrap();
        assert!(next.matches("c"));

        let state = machine.initial_state().unwrap();
        let next = machine.transition(&state, "anything").unwrap();
        assert!(next.matches("b"));
    }

    #[test]
    fn test_ancestor_handles_event_unclaimed_by_leaf() {
        let machine = Machine::from_json(json!({
            "id": "m",
            "initial": "parent",
            "states": {
                "parent": {
                    "initial": "child",
                    "states": {"child": {}},
                    "on": {"ESCAPE": "out"}
                },
                "out": {}
            }
        }))
        .unwrap();

        let state = machine.initial_state().unwrap();
        let next = machine.transition(&state, "ESCAPE").unwrap();
        assert!(next.matches("out"));
    }

    #[test]
    fn test_leaf_transition_preempts_ancestor() {
        let machine = Machine::from_json(json!({
            "id": "m",
            "initial": "parent",
            "states": {
                "parent": {
                    "initial": "child",
                    "states": {
                        "child": {"on": {"GO": "#m.win"}},
                        "other": {}
                    },
                    "on": {"GO": "lose"}
                },
                "win": {},
                "lose": {}
            }
        }))
        .unwrap();

        let state = machine.initial_state().unwrap();
        let next = machine.transition(&state, "GO").unwrap();
        assert!(next.matches("win"));
    }

    #[test]
    fn test_targetless_transition_only_runs_actions() {
        let machine = Machine::from_json(json!({
            "id": "m",
            "initial": "a",
            "context": {"n": 0},
            "states": {
                "a": {
                    "entry": [{"type": "log", "message": "entered a"}],
                    "on": {"BUMP": {"actions": [{"type": "assign", "updater": "bump"}]}}
                }
            }
        }))
        .unwrap()
        .with_options(MachineOptions::new().updater("bump", |ctx, _| {
            Ok(json!({"n": ctx["n"].as_i64().unwrap_or(0) + 1}))
        }));

        let state = machine.initial_state().unwrap();
        let next = machine.transition(&state, "BUMP").unwrap();
        assert!(next.matches("a"));
        assert_eq!(next.context["n"], 1);
        assert_eq!(next.changed, Some(true));
        // no re-entry: the entry log does not run again
        assert!(!next.actions.iter().any(|a| matches!(
            a,
            Action::Log { message } if message == "entered a"
        )));
    }

    #[test]
    fn test_transition_value() {
        let machine = toggle();
        let next = machine
            .transition_value(&StateValue::leaf("on"), None, "TOGGLE")
            .unwrap();
        assert!(next.matches("off"));
    }

    #[test]
    fn test_tags_union_of_active_nodes() {
        let machine = Machine::from_json(json!({
            "id": "m",
            "initial": "a",
            "states": {
                "a": {
                    "tags": ["outer"],
                    "initial": "a1",
                    "states": {"a1": {"tags": ["inner", "busy"]}}
                }
            }
        }))
        .unwrap();

        let state = machine.initial_state().unwrap();
        assert!(state.has_tag("outer"));
        assert!(state.has_tag("inner"));
        assert!(state.has_tag("busy"));
    }

    #[test]
    fn test_history_chain_is_pruned() {
        let machine = toggle();
        let s0 = machine.initial_state().unwrap();
        let s1 = machine.transition(&s0, "TOGGLE").unwrap();
        let s2 = machine.transition(&s1, "TOGGLE").unwrap();

        let prev = s2.history.as_ref().unwrap();
        assert!(prev.matches("on"));
        assert!(prev.history.is_none());
    }

    #[test]
    fn test_error_execution_raised_for_failing_updater() {
        let machine = Machine::from_json(json!({
            "id": "m",
            "initial": "a",
            "states": {
                "a": {"on": {"GO": {
                    "target": "b",
                    "actions": [{"type": "assign", "updater": "boom"}]
                }}},
                "b": {"on": {"error.execution": "failed"}},
                "failed": {}
            }
        }))
        .unwrap()
        .with_options(
            MachineOptions::new().updater("boom", |_, _| Err("broken".to_string())),
        );

        let state = machine.initial_state().unwrap();
        let next = machine.transition(&state, "GO").unwrap();
        // the raised error.execution is consumed within the macrostep
        assert!(next.matches("failed"));
    }

    #[test]
    fn test_invoke_dropped_when_state_exited_within_macrostep() {
        let machine = Machine::from_json(json!({
            "id": "m",
            "initial": "a",
            "states": {
                "a": {"on": {"GO": "b"}},
                "b": {
                    "invoke": {"src": "worker"},
                    "always": "c"
                },
                "c": {"invoke": {"src": "keeper"}}
            }
        }))
        .unwrap();

        let state = machine.initial_state().unwrap();
        let next = machine.transition(&state, "GO").unwrap();
        assert!(next.matches("c"));

        let invoked: Vec<&str> = next
            .actions
            .iter()
            .filter_map(|a| match a {
                Action::Invoke(def) => Some(def.id.as_str()),
                _ => None,
            })
            .collect();
        // b was exited before the macrostep finished, so its worker
        // never starts; the stop for it is likewise present
        assert_eq!(invoked, vec!["keeper"]);
        assert!(next
            .actions
            .iter()
            .any(|a| matches!(a, Action::Stop { child } if child == "worker")));
    }
}
