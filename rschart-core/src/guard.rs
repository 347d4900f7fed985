//! Guard descriptors and the guard expression language.
//!
//! A transition guard is one of:
//!
//! - an inline expression over the context and the triggering event
//!   (`ctx.amount > 100 && !ctx.locked`, `event.data == "oops"`),
//! - a named guard resolved against the machine's guard registry,
//! - the built-in `stateIn` check against the active state value,
//! - the boolean combinators `and`, `or`, `not` over child guards.
//!
//! The expression language supports:
//!
//! - `ctx.field` / `event.data.field` - field access (truthy check)
//! - `== value`, `!= value` - equality (strings, numbers, booleans, null)
//! - `>`, `>=`, `<`, `<=` - numeric comparison
//! - `!expr`, `expr && expr`, `expr || expr`, `(expr)`
//!
//! Guards are pure with respect to `(context, event, state)`; evaluation
//! never mutates anything it observes.

use crate::error::MachineError;
use crate::event::EventObject;
use crate::state_value::StateValue;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A named guard implementation. Receives the context, the triggering
/// event envelope and the evaluation arguments (active state value and
/// the descriptor's parameters).
pub type GuardFn =
    dyn Fn(&Value, &EventObject, &GuardArgs<'_>) -> Result<bool, String> + Send + Sync;

/// Extra arguments passed to named guards.
pub struct GuardArgs<'a> {
    /// The state value the machine is in while the guard is evaluated.
    pub state: &'a StateValue,
    /// The `params` value of the guard descriptor.
    pub params: &'a Value,
}

/// A guard descriptor.
#[derive(Debug, Clone)]
pub enum Guard {
    /// Inline expression in the guard expression language.
    Expr(GuardExpr),
    /// Named guard resolved against the registry at evaluation time.
    Named { name: String, params: Value },
    /// True iff the active state value contains the given partial value.
    StateIn(StateValue),
    And(Vec<Guard>),
    Or(Vec<Guard>),
    Not(Box<Guard>),
}

impl Guard {
    /// Parses a guard from its JSON form.
    ///
    /// Strings starting with `ctx.`, `event.`, `!` or `(` are inline
    /// expressions; any other string names a registered guard.
    pub fn from_json(value: &Value) -> Result<Self, MachineError> {
        match value {
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.starts_with("ctx.")
                    || trimmed.starts_with("event.")
                    || trimmed.starts_with('!')
                    || trimmed.starts_with('(')
                {
                    Ok(Guard::Expr(GuardExpr::parse(trimmed)?))
                } else {
                    Ok(Guard::Named {
                        name: s.clone(),
                        params: Value::Null,
                    })
                }
            }
            Value::Object(map) => {
                let kind = map
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or_else(|| MachineError::InvalidGuard {
                        reason: "guard object requires a 'type' field".to_string(),
                    })?;

                match kind {
                    "stateIn" => {
                        let state = map.get("state").ok_or_else(|| {
                            MachineError::InvalidGuard {
                                reason: "stateIn guard requires a 'state' field".to_string(),
                            }
                        })?;
                        Ok(Guard::StateIn(StateValue::from_json(state)?))
                    }
                    "and" | "or" => {
                        let children = map
                            .get("guards")
                            .and_then(Value::as_array)
                            .ok_or_else(|| MachineError::InvalidGuard {
                                reason: format!("'{kind}' guard requires a 'guards' array"),
                            })?
                            .iter()
                            .map(Guard::from_json)
                            .collect::<Result<Vec<_>, _>>()?;
                        if kind == "and" {
                            Ok(Guard::And(children))
                        } else {
                            Ok(Guard::Or(children))
                        }
                    }
                    "not" => {
                        let child = map.get("guard").ok_or_else(|| {
                            MachineError::InvalidGuard {
                                reason: "'not' guard requires a 'guard' field".to_string(),
                            }
                        })?;
                        Ok(Guard::Not(Box::new(Guard::from_json(child)?)))
                    }
                    name => Ok(Guard::Named {
                        name: name.to_string(),
                        params: map.get("params").cloned().unwrap_or(Value::Null),
                    }),
                }
            }
            other => Err(MachineError::InvalidGuard {
                reason: format!("invalid guard: {other}"),
            }),
        }
    }

    /// A short tag for error reporting.
    pub fn kind(&self) -> String {
        match self {
            Guard::Expr(_) => "expr".to_string(),
            Guard::Named { name, .. } => name.clone(),
            Guard::StateIn(_) => "stateIn".to_string(),
            Guard::And(_) => "and".to_string(),
            Guard::Or(_) => "or".to_string(),
            Guard::Not(_) => "not".to_string(),
        }
    }

    /// Evaluates the guard. Unknown guard names and registry failures are
    /// errors; the caller rewraps them with the transition context.
    pub fn evaluate(
        &self,
        ctx: &Value,
        event: &EventObject,
        state: &StateValue,
        registry: &HashMap<String, Arc<GuardFn>>,
    ) -> Result<bool, GuardFailure> {
        match self {
            Guard::Expr(expr) => Ok(expr.evaluate(ctx, event)),
            Guard::Named { name, params } => {
                let guard = registry.get(name).ok_or_else(|| GuardFailure {
                    guard: name.clone(),
                    reason: None,
                })?;
                let args = GuardArgs { state, params };
                guard(ctx, event, &args).map_err(|reason| GuardFailure {
                    guard: name.clone(),
                    reason: Some(reason),
                })
            }
            Guard::StateIn(pattern) => Ok(pattern.matches(state)),
            Guard::And(children) => {
                for child in children {
                    if !child.evaluate(ctx, event, state, registry)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Guard::Or(children) => {
                for child in children {
                    if child.evaluate(ctx, event, state, registry)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Guard::Not(child) => Ok(!child.evaluate(ctx, event, state, registry)?),
        }
    }
}

/// An evaluation failure: either an unknown guard name (`reason: None`)
/// or a registry guard that returned an error.
#[derive(Debug)]
pub struct GuardFailure {
    pub guard: String,
    pub reason: Option<String>,
}

impl GuardFailure {
    /// Rewraps the failure with the transition that was being selected.
    pub fn into_machine_error(self, event: &str, source: &str) -> MachineError {
        match self.reason {
            None => MachineError::UnknownGuard {
                name: self.guard,
                event: event.to_string(),
                source_state: source.to_string(),
            },
            Some(reason) => MachineError::GuardError {
                name: self.guard,
                event: event.to_string(),
                source_state: source.to_string(),
                reason,
            },
        }
    }
}

/// A field reference in a guard expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRef {
    /// Dotted path into the context object.
    Ctx(String),
    /// Dotted path into the event envelope (`data.x`, `name`, `origin`).
    Event(String),
}

impl FieldRef {
    fn resolve(&self, ctx: &Value, event: &EventObject) -> Value {
        match self {
            FieldRef::Ctx(path) => get_path(ctx, path),
            FieldRef::Event(path) => event.lookup(path),
        }
    }
}

/// A parsed guard expression.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardExpr {
    /// Field is truthy.
    Truthy(FieldRef),
    /// Equality comparison.
    Eq(FieldRef, Value),
    /// Inequality comparison.
    Ne(FieldRef, Value),
    /// Greater than.
    Gt(FieldRef, f64),
    /// Greater or equal.
    Ge(FieldRef, f64),
    /// Less than.
    Lt(FieldRef, f64),
    /// Less or equal.
    Le(FieldRef, f64),
    And(Box<GuardExpr>, Box<GuardExpr>),
    Or(Box<GuardExpr>, Box<GuardExpr>),
    Not(Box<GuardExpr>),
}

impl GuardExpr {
    /// Parses a guard expression from a string.
    pub fn parse(s: &str) -> Result<Self, MachineError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MachineError::InvalidGuard {
                reason: "empty guard expression".to_string(),
            });
        }

        let mut parser = Parser::new(s);
        let expr = parser.parse_expr()?;
        parser.skip_whitespace();
        if parser.pos != s.len() {
            return Err(MachineError::InvalidGuard {
                reason: format!("trailing input at offset {}", parser.pos),
            });
        }
        Ok(expr)
    }

    /// Evaluates the expression. Missing fields resolve to null and fail
    /// truthy checks and comparisons.
    pub fn evaluate(&self, ctx: &Value, event: &EventObject) -> bool {
        match self {
            GuardExpr::Truthy(field) => is_truthy(&field.resolve(ctx, event)),
            GuardExpr::Eq(field, expected) => values_equal(&field.resolve(ctx, event), expected),
            GuardExpr::Ne(field, expected) => !values_equal(&field.resolve(ctx, event), expected),
            GuardExpr::Gt(field, expected) => {
                as_f64(&field.resolve(ctx, event)).is_some_and(|v| v > *expected)
            }
            GuardExpr::Ge(field, expected) => {
                as_f64(&field.resolve(ctx, event)).is_some_and(|v| v >= *expected)
            }
            GuardExpr::Lt(field, expected) => {
                as_f64(&field.resolve(ctx, event)).is_some_and(|v| v < *expected)
            }
            GuardExpr::Le(field, expected) => {
                as_f64(&field.resolve(ctx, event)).is_some_and(|v| v <= *expected)
            }
            GuardExpr::And(left, right) => {
                left.evaluate(ctx, event) && right.evaluate(ctx, event)
            }
            GuardExpr::Or(left, right) => {
                left.evaluate(ctx, event) || right.evaluate(ctx, event)
            }
            GuardExpr::Not(inner) => !inner.evaluate(ctx, event),
        }
    }
}

/// Looks up a dotted path inside a JSON value. Missing segments yield null.
pub fn get_path(value: &Value, path: &str) -> Value {
    let mut current = value;
    for part in path.split('.') {
        match current {
            Value::Object(map) => {
                current = map.get(part).unwrap_or(&Value::Null);
            }
            _ => return Value::Null,
        }
    }
    current.clone()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .is_some_and(|(a, b)| (a - b).abs() < f64::EPSILON),
        (Value::String(a), Value::String(b)) => a == b,
        _ => false,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Recursive descent parser for guard expressions.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_expr(&mut self) -> Result<GuardExpr, MachineError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<GuardExpr, MachineError> {
        let mut left = self.parse_and()?;
        self.skip_whitespace();

        while self.peek_str("||") {
            self.pos += 2;
            self.skip_whitespace();
            let right = self.parse_and()?;
            left = GuardExpr::Or(Box::new(left), Box::new(right));
            self.skip_whitespace();
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<GuardExpr, MachineError> {
        let mut left = self.parse_unary()?;
        self.skip_whitespace();

        while self.peek_str("&&") {
            self.pos += 2;
            self.skip_whitespace();
            let right = self.parse_unary()?;
            left = GuardExpr::And(Box::new(left), Box::new(right));
            self.skip_whitespace();
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<GuardExpr, MachineError> {
        self.skip_whitespace();

        if self.peek_char() == Some('!') && !self.peek_str("!=") {
            self.pos += 1;
            self.skip_whitespace();
            let inner = self.parse_unary()?;
            return Ok(GuardExpr::Not(Box::new(inner)));
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<GuardExpr, MachineError> {
        self.skip_whitespace();

        if self.peek_char() == Some('(') {
            self.pos += 1;
            let expr = self.parse_expr()?;
            self.skip_whitespace();
            if self.peek_char() != Some(')') {
                return Err(MachineError::InvalidGuard {
                    reason: "expected ')'".to_string(),
                });
            }
            self.pos += 1;
            return Ok(expr);
        }

        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<GuardExpr, MachineError> {
        self.skip_whitespace();
        let field = self.parse_field()?;
        self.skip_whitespace();

        if self.peek_str("==") {
            self.pos += 2;
            self.skip_whitespace();
            let value = self.parse_value()?;
            return Ok(GuardExpr::Eq(field, value));
        }

        if self.peek_str("!=") {
            self.pos += 2;
            self.skip_whitespace();
            let value = self.parse_value()?;
            return Ok(GuardExpr::Ne(field, value));
        }

        if self.peek_str(">=") {
            self.pos += 2;
            self.skip_whitespace();
            let num = self.parse_number()?;
            return Ok(GuardExpr::Ge(field, num));
        }

        if self.peek_str("<=") {
            self.pos += 2;
            self.skip_whitespace();
            let num = self.parse_number()?;
            return Ok(GuardExpr::Le(field, num));
        }

        if self.peek_char() == Some('>') {
            self.pos += 1;
            self.skip_whitespace();
            let num = self.parse_number()?;
            return Ok(GuardExpr::Gt(field, num));
        }

        if self.peek_char() == Some('<') {
            self.pos += 1;
            self.skip_whitespace();
            let num = self.parse_number()?;
            return Ok(GuardExpr::Lt(field, num));
        }

        Ok(GuardExpr::Truthy(field))
    }

    fn parse_field(&mut self) -> Result<FieldRef, MachineError> {
        let event_ref = if self.peek_str("ctx.") {
            self.pos += 4;
            false
        } else if self.peek_str("event.") {
            self.pos += 6;
            true
        } else {
            return Err(MachineError::InvalidGuard {
                reason: "field must start with 'ctx.' or 'event.'".to_string(),
            });
        };

        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                self.pos += 1;
            } else {
                break;
            }
        }

        let path = &self.input[start..self.pos];
        if path.is_empty() {
            return Err(MachineError::InvalidGuard {
                reason: "empty field name".to_string(),
            });
        }

        Ok(if event_ref {
            FieldRef::Event(path.to_string())
        } else {
            FieldRef::Ctx(path.to_string())
        })
    }

    fn parse_value(&mut self) -> Result<Value, MachineError> {
        self.skip_whitespace();
        let rest = &self.input[self.pos..];

        if rest.starts_with("true") {
            self.pos += 4;
            return Ok(Value::Bool(true));
        }
        if rest.starts_with("false") {
            self.pos += 5;
            return Ok(Value::Bool(false));
        }
        if rest.starts_with("null") {
            self.pos += 4;
            return Ok(Value::Null);
        }

        if rest.starts_with('"') {
            return self.parse_string_value();
        }

        let num = self.parse_number()?;
        serde_json::Number::from_f64(num)
            .map(Value::Number)
            .ok_or_else(|| MachineError::InvalidGuard {
                reason: format!("non-finite number: {num}"),
            })
    }

    fn parse_string_value(&mut self) -> Result<Value, MachineError> {
        // opening quote
        self.pos += 1;

        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c == '"' {
                let s = &self.input[start..self.pos];
                self.pos += 1;
                return Ok(Value::String(s.to_string()));
            }
            if c == '\\' {
                self.pos += 2;
            } else {
                self.pos += c.len_utf8();
            }
        }

        Err(MachineError::InvalidGuard {
            reason: "unterminated string".to_string(),
        })
    }

    fn parse_number(&mut self) -> Result<f64, MachineError> {
        self.skip_whitespace();
        let start = self.pos;

        if self.peek_char() == Some('-') {
            self.pos += 1;
        }

        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else {
                break;
            }
        }

        if self.peek_char() == Some('.') {
            self.pos += 1;
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }

        let num_str = &self.input[start..self.pos];
        num_str
            .parse::<f64>()
            .map_err(|_| MachineError::InvalidGuard {
                reason: format!("invalid number: '{num_str}'"),
            })
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }
}
