//! Action descriptors and the action resolver.
//!
//! Actions are serializable descriptors; effectful implementations are
//! looked up by name in [`MachineOptions`]. The resolver interprets an
//! ordered descriptor list against the current context and event:
//! `assign` updates the context immediately (later actions in the same
//! list observe it), `raise` and internal sends are queued, `choose` and
//! `pure` expand lazily, and everything else is passed through for the
//! interpreter to execute. The resolver itself never runs a side effect.

use crate::error::MachineError;
use crate::event::{EventObject, ERROR_EXECUTION_EVENT};
use crate::guard::{get_path, Guard};
use crate::options::MachineOptions;
use crate::state_value::StateValue;
use serde_json::{json, Value};
use std::sync::Arc;

/// Target of a delayed or immediate send.
pub const SEND_TARGET_INTERNAL: &str = "#_internal";
/// Send target addressing the parent actor.
pub const SEND_TARGET_PARENT: &str = "#_parent";

/// An event template: resolved against the context and the triggering
/// event when the owning action is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTemplate {
    pub name: String,
    pub data: Value,
}

impl EventTemplate {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Value::Null,
        }
    }

    fn from_json(value: &Value) -> Result<Self, MachineError> {
        match value {
            Value::String(name) => Ok(Self::named(name.clone())),
            Value::Object(map) => {
                let name = map.get("name").and_then(Value::as_str).ok_or_else(|| {
                    MachineError::InvalidDefinition {
                        reason: "event template requires a 'name' field".to_string(),
                    }
                })?;
                Ok(Self {
                    name: name.to_string(),
                    data: map.get("data").cloned().unwrap_or(Value::Null),
                })
            }
            other => Err(MachineError::InvalidDefinition {
                reason: format!("invalid event template: {other}"),
            }),
        }
    }
}

/// A send delay: literal milliseconds or a named delay from the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum DelaySpec {
    Ms(u64),
    Named(String),
}

impl DelaySpec {
    fn from_json(value: &Value) -> Result<Self, MachineError> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .map(DelaySpec::Ms)
                .ok_or_else(|| MachineError::InvalidDefinition {
                    reason: format!("invalid delay: {n}"),
                }),
            Value::String(s) => Ok(DelaySpec::parse(s)),
            other => Err(MachineError::InvalidDefinition {
                reason: format!("invalid delay: {other}"),
            }),
        }
    }

    /// Numeric strings are literal milliseconds, anything else is a name.
    pub fn parse(s: &str) -> Self {
        match s.parse::<u64>() {
            Ok(ms) => DelaySpec::Ms(ms),
            Err(_) => DelaySpec::Named(s.to_string()),
        }
    }
}

/// A `send` action.
#[derive(Debug, Clone, PartialEq)]
pub struct SendAction {
    pub event: EventTemplate,
    /// `None` sends to self; `#_parent`, `#_internal` or a child name.
    pub to: Option<String>,
    pub delay: Option<DelaySpec>,
    /// Send id for cancellation; defaults to the event name.
    pub id: Option<String>,
}

impl SendAction {
    /// The effective send id.
    pub fn send_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.event.name)
    }
}

/// The context update of an `assign` action.
#[derive(Debug, Clone)]
pub enum Assign {
    /// Static partial object, with template substitution on its values.
    Merge(Value),
    /// Named updater from the registry.
    Updater(String),
}

/// A branch of a `choose` action.
#[derive(Debug, Clone)]
pub struct ChooseBranch {
    pub guard: Option<Guard>,
    pub actions: Vec<Action>,
}

/// An invocation descriptor, owned by the state node that declares it.
#[derive(Debug, Clone)]
pub struct InvokeDef {
    pub id: String,
    /// Registry tag plus free-form parameters.
    pub src: InvokeSource,
    /// Input template mapping the parent context to the child's input.
    pub data: Option<Value>,
    pub auto_forward: bool,
    pub sync: bool,
    /// Id of the state node declaring this invocation.
    pub state_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvokeSource {
    pub kind: String,
    pub params: Value,
}

impl InvokeSource {
    pub fn from_json(value: &Value) -> Result<Self, MachineError> {
        match value {
            Value::String(kind) => Ok(Self {
                kind: kind.clone(),
                params: Value::Null,
            }),
            Value::Object(map) => {
                let kind = map.get("type").and_then(Value::as_str).ok_or_else(|| {
                    MachineError::InvalidDefinition {
                        reason: "invoke src object requires a 'type' field".to_string(),
                    }
                })?;
                let mut params = map.clone();
                params.shift_remove("type");
                Ok(Self {
                    kind: kind.to_string(),
                    params: Value::Object(params),
                })
            }
            other => Err(MachineError::InvalidDefinition {
                reason: format!("invalid invoke src: {other}"),
            }),
        }
    }
}

/// An action descriptor.
#[derive(Debug, Clone)]
pub enum Action {
    Assign(Assign),
    Raise(EventTemplate),
    Send(SendAction),
    Cancel { send_id: String },
    Log { message: String },
    Choose(Vec<ChooseBranch>),
    Pure { factory: String },
    Invoke(Arc<InvokeDef>),
    Stop { child: String },
    Escalate { data: Value },
    /// User-defined action resolved against the `actions` registry. The
    /// `ctx` snapshot is captured at resolution time so the effect sees
    /// the context that was current when the action ran, not the final
    /// context of the macrostep.
    Custom {
        name: String,
        params: Value,
        ctx: Option<Value>,
    },
}

impl Action {
    /// Parses an action from its JSON form. Bare strings name registry
    /// actions; objects select built-ins by `type`, falling back to
    /// registry actions with `params`.
    pub fn from_json(value: &Value) -> Result<Self, MachineError> {
        match value {
            Value::String(name) => Ok(Action::Custom {
                name: name.clone(),
                params: Value::Null,
                ctx: None,
            }),
            Value::Object(map) => {
                let kind = map
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or_else(|| MachineError::InvalidDefinition {
                        reason: "action object requires a 'type' field".to_string(),
                    })?;

                match kind {
                    "assign" => {
                        if let Some(updater) = map.get("updater").and_then(Value::as_str) {
                            Ok(Action::Assign(Assign::Updater(updater.to_string())))
                        } else if let Some(assignment) = map.get("assignment") {
                            Ok(Action::Assign(Assign::Merge(assignment.clone())))
                        } else {
                            Err(MachineError::InvalidDefinition {
                                reason: "assign requires 'assignment' or 'updater'".to_string(),
                            })
                        }
                    }
                    "raise" => {
                        let event = map.get("event").ok_or_else(|| {
                            MachineError::InvalidDefinition {
                                reason: "raise requires an 'event' field".to_string(),
                            }
                        })?;
                        Ok(Action::Raise(EventTemplate::from_json(event)?))
                    }
                    "send" => {
                        let event = map.get("event").ok_or_else(|| {
                            MachineError::InvalidDefinition {
                                reason: "send requires an 'event' field".to_string(),
                            }
                        })?;
                        let delay = map
                            .get("delay")
                            .map(DelaySpec::from_json)
                            .transpose()?;
                        Ok(Action::Send(SendAction {
                            event: EventTemplate::from_json(event)?,
                            to: map.get("to").and_then(Value::as_str).map(str::to_string),
                            delay,
                            id: map.get("id").and_then(Value::as_str).map(str::to_string),
                        }))
                    }
                    "cancel" => {
                        let send_id = map.get("sendId").and_then(Value::as_str).ok_or_else(
                            || MachineError::InvalidDefinition {
                                reason: "cancel requires a 'sendId' field".to_string(),
                            },
                        )?;
                        Ok(Action::Cancel {
                            send_id: send_id.to_string(),
                        })
                    }
                    "log" => {
                        let message = map
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        Ok(Action::Log {
                            message: message.to_string(),
                        })
                    }
                    "choose" => {
                        let branches = map
                            .get("branches")
                            .and_then(Value::as_array)
                            .ok_or_else(|| MachineError::InvalidDefinition {
                                reason: "choose requires a 'branches' array".to_string(),
                            })?;
                        let branches = branches
                            .iter()
                            .map(|branch| {
                                let guard = branch
                                    .get("guard")
                                    .map(Guard::from_json)
                                    .transpose()?;
                                let actions = branch
                                    .get("actions")
                                    .and_then(Value::as_array)
                                    .map(|actions| {
                                        actions.iter().map(Action::from_json).collect()
                                    })
                                    .transpose()?
                                    .unwrap_or_default();
                                Ok(ChooseBranch { guard, actions })
                            })
                            .collect::<Result<Vec<_>, MachineError>>()?;
                        Ok(Action::Choose(branches))
                    }
                    "pure" => {
                        let factory = map.get("factory").and_then(Value::as_str).ok_or_else(
                            || MachineError::InvalidDefinition {
                                reason: "pure requires a 'factory' field".to_string(),
                            },
                        )?;
                        Ok(Action::Pure {
                            factory: factory.to_string(),
                        })
                    }
                    "stop" => {
                        let child = map.get("child").and_then(Value::as_str).ok_or_else(
                            || MachineError::InvalidDefinition {
                                reason: "stop requires a 'child' field".to_string(),
                            },
                        )?;
                        Ok(Action::Stop {
                            child: child.to_string(),
                        })
                    }
                    "escalate" => Ok(Action::Escalate {
                        data: map.get("data").cloned().unwrap_or(Value::Null),
                    }),
                    name => Ok(Action::Custom {
                        name: name.to_string(),
                        params: map.get("params").cloned().unwrap_or(Value::Null),
                        ctx: None,
                    }),
                }
            }
            other => Err(MachineError::InvalidDefinition {
                reason: format!("invalid action: {other}"),
            }),
        }
    }

    pub fn from_json_list<'a>(
        values: impl Iterator<Item = &'a Value>,
    ) -> Result<Vec<Action>, MachineError> {
        values.map(Action::from_json).collect()
    }
}

/// Resolves a JSON template: string values `"ctx.<path>"` and
/// `"event"` / `"event.<path>"` are substituted, containers recurse,
/// everything else is passed through.
pub fn resolve_template(template: &Value, ctx: &Value, event: &EventObject) -> Value {
    match template {
        Value::String(s) => {
            if let Some(path) = s.strip_prefix("ctx.") {
                get_path(ctx, path)
            } else if s == "event" {
                serde_json::to_value(event).unwrap_or(Value::Null)
            } else if let Some(path) = s.strip_prefix("event.") {
                event.lookup(path)
            } else {
                template.clone()
            }
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_template(item, ctx, event))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_template(v, ctx, event)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Merges a partial object into the context: top-level keys of the
/// partial overwrite the context's.
pub fn merge_context(ctx: &Value, partial: &Value) -> Value {
    match (ctx, partial) {
        (Value::Object(ctx_map), Value::Object(partial_map)) => {
            let mut result = ctx_map.clone();
            for (k, v) in partial_map {
                result.insert(k.clone(), v.clone());
            }
            Value::Object(result)
        }
        (Value::Null, Value::Object(_)) => partial.clone(),
        _ => {
            tracing::warn!("ignoring non-object assign partial: {partial}");
            ctx.clone()
        }
    }
}

/// Interpolates `{ctx.<path>}` and `{event.<path>}` placeholders in a
/// log message.
fn interpolate(message: &str, ctx: &Value, event: &EventObject) -> String {
    let mut out = String::with_capacity(message.len());
    let mut rest = message;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let placeholder = &after[..close];
                let value = resolve_template(
                    &Value::String(placeholder.to_string()),
                    ctx,
                    event,
                );
                match value {
                    Value::String(s) => out.push_str(&s),
                    other => out.push_str(&other.to_string()),
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// The output of resolving an ordered action list.
#[derive(Debug)]
pub struct ResolvedActions {
    /// Context after all `assign` actions were applied in order.
    pub context: Value,
    /// Actions to expose on the next state, in execution order.
    pub actions: Vec<Action>,
    /// Events raised during resolution (raise, internal sends,
    /// error.execution), in order.
    pub raised: Vec<EventObject>,
}

/// Resolves an ordered action list against a context snapshot.
pub fn resolve_actions(
    actions: &[Action],
    ctx: &Value,
    event: &EventObject,
    state: &StateValue,
    options: &MachineOptions,
) -> Result<ResolvedActions, MachineError> {
    let mut resolver = Resolver {
        ctx: ctx.clone(),
        event,
        state,
        options,
        out: Vec::new(),
        raised: Vec::new(),
    };
    resolver.resolve_list(actions)?;
    Ok(ResolvedActions {
        context: resolver.ctx,
        actions: resolver.out,
        raised: resolver.raised,
    })
}

struct Resolver<'a> {
    ctx: Value,
    event: &'a EventObject,
    state: &'a StateValue,
    options: &'a MachineOptions,
    out: Vec<Action>,
    raised: Vec<EventObject>,
}

impl Resolver<'_> {
    fn resolve_list(&mut self, actions: &[Action]) -> Result<(), MachineError> {
        for action in actions {
            self.resolve_one(action)?;
        }
        Ok(())
    }

    fn resolve_one(&mut self, action: &Action) -> Result<(), MachineError> {
        match action {
            Action::Assign(assign) => {
                match assign {
                    Assign::Merge(template) => {
                        let partial = resolve_template(template, &self.ctx, self.event);
                        self.ctx = merge_context(&self.ctx, &partial);
                    }
                    Assign::Updater(name) => match self.options.updaters.get(name) {
                        Some(updater) => match updater(&self.ctx, self.event) {
                            Ok(partial) => {
                                self.ctx = merge_context(&self.ctx, &partial);
                            }
                            Err(reason) => self.raise_execution_error(name, reason),
                        },
                        None => self.raise_execution_error(
                            name,
                            format!("unknown assign updater '{name}'"),
                        ),
                    },
                }
                self.out.push(action.clone());
            }

            Action::Raise(template) => {
                let data = resolve_template(&template.data, &self.ctx, self.event);
                self.raised.push(EventObject::internal(
                    crate::event::Event::with_data(template.name.clone(), data),
                ));
            }

            Action::Send(send) => {
                let data = resolve_template(&send.event.data, &self.ctx, self.event);
                let delay = match &send.delay {
                    None => None,
                    Some(DelaySpec::Ms(ms)) => Some(DelaySpec::Ms(*ms)),
                    Some(DelaySpec::Named(name)) => {
                        let delay_fn = self.options.delays.get(name).ok_or_else(|| {
                            MachineError::UnknownDelay { name: name.clone() }
                        })?;
                        Some(DelaySpec::Ms(delay_fn(&self.ctx, self.event)))
                    }
                };

                if send.to.as_deref() == Some(SEND_TARGET_INTERNAL) && delay.is_none() {
                    self.raised.push(EventObject::internal(
                        crate::event::Event::with_data(send.event.name.clone(), data),
                    ));
                } else {
                    self.out.push(Action::Send(SendAction {
                        event: EventTemplate {
                            name: send.event.name.clone(),
                            data,
                        },
                        to: send.to.clone(),
                        delay,
                        id: Some(send.send_id().to_string()),
                    }));
                }
            }

            Action::Cancel { .. } | Action::Invoke(_) | Action::Stop { .. } => {
                self.out.push(action.clone());
            }

            Action::Log { message } => {
                self.out.push(Action::Log {
                    message: interpolate(message, &self.ctx, self.event),
                });
            }

            Action::Choose(branches) => {
                for branch in branches {
                    let taken = match &branch.guard {
                        None => true,
                        Some(guard) => guard
                            .evaluate(&self.ctx, self.event, self.state, &self.options.guards)
                            .map_err(|failure| {
                                failure.into_machine_error(&self.event.name, "choose")
                            })?,
                    };
                    if taken {
                        self.resolve_list(&branch.actions)?;
                        break;
                    }
                }
            }

            Action::Pure { factory } => match self.options.factories.get(factory) {
                Some(f) => {
                    let expanded = f(&self.ctx, self.event);
                    self.resolve_list(&expanded)?;
                }
                None => self.raise_execution_error(
                    factory,
                    format!("unknown pure factory '{factory}'"),
                ),
            },

            Action::Escalate { data } => {
                self.out.push(Action::Escalate {
                    data: resolve_template(data, &self.ctx, self.event),
                });
            }

            Action::Custom { name, params, .. } => {
                self.out.push(Action::Custom {
                    name: name.clone(),
                    params: params.clone(),
                    ctx: Some(self.ctx.clone()),
                });
            }
        }
        Ok(())
    }

    fn raise_execution_error(&mut self, source: &str, reason: String) {
        tracing::warn!(action = source, %reason, "action execution error");
        self.raised.push(EventObject::error(
            ERROR_EXECUTION_EVENT,
            json!({ "message": reason }),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use serde_json::json;

    fn ev(name: &str, data: Value) -> EventObject {
        EventObject::external(Event::with_data(name, data))
    }

    fn resolve(
        actions: &[Action],
        ctx: Value,
        event: EventObject,
        options: &MachineOptions,
    ) -> ResolvedActions {
        let state = StateValue::leaf("s");
        resolve_actions(actions, &ctx, &event, &state, options).unwrap()
    }

    #[test]
    fn test_parse_action_forms() {
        assert!(matches!(
            Action::from_json(&json!("notify")).unwrap(),
            Action::Custom { name, .. } if name == "notify"
        ));
        assert!(matches!(
            Action::from_json(&json!({"type": "assign", "assignment": {"a": 1}})).unwrap(),
            Action::Assign(Assign::Merge(_))
        ));
        assert!(matches!(
            Action::from_json(&json!({"type": "raise", "event": "PING"})).unwrap(),
            Action::Raise(t) if t.name == "PING"
        ));
        assert!(matches!(
            Action::from_json(&json!({"type": "cancel", "sendId": "t"})).unwrap(),
            Action::Cancel { send_id } if send_id == "t"
        ));
        assert!(Action::from_json(&json!(42)).is_err());
        assert!(Action::from_json(&json!({"no": "type"})).is_err());
    }

    #[test]
    fn test_assign_merge_with_template() {
        let actions = vec![Action::Assign(Assign::Merge(
            json!({"data": "event.data", "fixed": true}),
        ))];
        let resolved = resolve(
            &actions,
            json!({"old": 1}),
            ev("done.invoke.loader", json!("fake data")),
            &MachineOptions::default(),
        );

        assert_eq!(
            resolved.context,
            json!({"old": 1, "data": "fake data", "fixed": true})
        );
        assert_eq!(resolved.actions.len(), 1);
        assert!(resolved.raised.is_empty());
    }

    #[test]
    fn test_assign_order_observed_by_later_actions() {
        let options = MachineOptions::new().updater("bump", |ctx, _| {
            let n = ctx["n"].as_i64().unwrap_or(0);
            Ok(json!({"n": n + 1}))
        });

        let actions = vec![
            Action::Assign(Assign::Updater("bump".into())),
            Action::Assign(Assign::Updater("bump".into())),
            Action::Log {
                message: "n is {ctx.n}".into(),
            },
        ];
        let resolved = resolve(&actions, json!({"n": 0}), ev("E", Value::Null), &options);

        assert_eq!(resolved.context, json!({"n": 2}));
        assert!(matches!(
            &resolved.actions[2],
            Action::Log { message } if message == "n is 2"
        ));
    }

    #[test]
    fn test_failed_updater_raises_error_execution() {
        let options = MachineOptions::new().updater("boom", |_, _| Err("kaput".to_string()));
        let actions = vec![Action::Assign(Assign::Updater("boom".into()))];
        let resolved = resolve(&actions, json!({}), ev("E", Value::Null), &options);

        assert_eq!(resolved.raised.len(), 1);
        assert_eq!(resolved.raised[0].name, ERROR_EXECUTION_EVENT);
        assert_eq!(resolved.raised[0].data["message"], "kaput");
    }

    #[test]
    fn test_send_internal_reroutes_as_raise() {
        let actions = vec![Action::Send(SendAction {
            event: EventTemplate::named("PING"),
            to: Some(SEND_TARGET_INTERNAL.to_string()),
            delay: None,
            id: None,
        })];
        let resolved = resolve(
            &actions,
            json!({}),
            ev("E", Value::Null),
            &MachineOptions::default(),
        );

        assert!(resolved.actions.is_empty());
        assert_eq!(resolved.raised.len(), 1);
        assert_eq!(resolved.raised[0].name, "PING");
    }

    #[test]
    fn test_send_named_delay_resolution() {
        let options = MachineOptions::new().delay("SLOW", |ctx, _| {
            ctx["timeout"].as_u64().unwrap_or(1000)
        });
        let actions = vec![Action::Send(SendAction {
            event: EventTemplate::named("TIMEOUT"),
            to: None,
            delay: Some(DelaySpec::Named("SLOW".into())),
            id: None,
        })];
        let resolved = resolve(&actions, json!({"timeout": 250}), ev("E", Value::Null), &options);

        match &resolved.actions[0] {
            Action::Send(send) => {
                assert_eq!(send.delay, Some(DelaySpec::Ms(250)));
                assert_eq!(send.send_id(), "TIMEOUT");
            }
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn test_send_unknown_delay_is_error() {
        let actions = vec![Action::Send(SendAction {
            event: EventTemplate::named("TIMEOUT"),
            to: None,
            delay: Some(DelaySpec::Named("MISSING".into())),
            id: None,
        })];
        let state = StateValue::leaf("s");
        let result = resolve_actions(
            &actions,
            &json!({}),
            &ev("E", Value::Null),
            &state,
            &MachineOptions::default(),
        );
        assert!(matches!(result, Err(MachineError::UnknownDelay { .. })));
    }

    #[test]
    fn test_choose_picks_first_passing_branch() {
        let actions = vec![Action::Choose(vec![
            ChooseBranch {
                guard: Some(Guard::from_json(&json!("ctx.a")).unwrap()),
                actions: vec![Action::Assign(Assign::Merge(json!({"picked": "a"})))],
            },
            ChooseBranch {
                guard: None,
                actions: vec![Action::Assign(Assign::Merge(json!({"picked": "fallback"})))],
            },
        ])];

        let resolved = resolve(
            &actions,
            json!({"a": false}),
            ev("E", Value::Null),
            &MachineOptions::default(),
        );
        assert_eq!(resolved.context["picked"], "fallback");

        let resolved = resolve(
            &actions,
            json!({"a": true}),
            ev("E", Value::Null),
            &MachineOptions::default(),
        );
        assert_eq!(resolved.context["picked"], "a");
    }

    #[test]
    fn test_pure_expansion() {
        let options = MachineOptions::new().factory("fanout", |ctx, _| {
            let n = ctx["n"].as_u64().unwrap_or(0);
            (0..n)
                .map(|i| Action::Log {
                    message: format!("item {i}"),
                })
                .collect()
        });

        let actions = vec![Action::Pure {
            factory: "fanout".into(),
        }];
        let resolved = resolve(&actions, json!({"n": 3}), ev("E", Value::Null), &options);
        assert_eq!(resolved.actions.len(), 3);
    }

    #[test]
    fn test_custom_action_captures_context_snapshot() {
        let actions = vec![
            Action::Custom {
                name: "first".into(),
                params: Value::Null,
                ctx: None,
            },
            Action::Assign(Assign::Merge(json!({"n": 1}))),
            Action::Custom {
                name: "second".into(),
                params: Value::Null,
                ctx: None,
            },
        ];
        let resolved = resolve(
            &actions,
            json!({"n": 0}),
            ev("E", Value::Null),
            &MachineOptions::default(),
        );

        match (&resolved.actions[0], &resolved.actions[2]) {
            (
                Action::Custom { ctx: Some(first), .. },
                Action::Custom { ctx: Some(second), .. },
            ) => {
                assert_eq!(first["n"], 0);
                assert_eq!(second["n"], 1);
            }
            other => panic!("expected custom actions, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_context_semantics() {
        assert_eq!(
            merge_context(&json!({"a": 1, "b": 2}), &json!({"b": 3})),
            json!({"a": 1, "b": 3})
        );
        assert_eq!(merge_context(&Value::Null, &json!({"a": 1})), json!({"a": 1}));
        assert_eq!(merge_context(&json!({"a": 1}), &json!(5)), json!({"a": 1}));
    }

    #[test]
    fn test_interpolate_log_message() {
        let out = interpolate(
            "user {ctx.user.name} sent {event.name}",
            &json!({"user": {"name": "alice"}}),
            &ev("PAY", Value::Null),
        );
        assert_eq!(out, "user alice sent PAY");
    }
}
