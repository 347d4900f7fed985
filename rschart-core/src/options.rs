//! Named implementation registries.
//!
//! Machine definitions stay serializable by referring to actions, guards
//! and delays by name; the implementations live here and are resolved at
//! macrostep time. Registries hold `Arc`-wrapped closures, so options and
//! machines clone cheaply.

use crate::action::Action;
use crate::event::EventObject;
use crate::guard::GuardFn;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A custom action effect. Receives the context snapshot in effect when
/// the action was resolved, the triggering event and the descriptor
/// params. Errors become raised `error.execution` events.
pub type ActionFn = dyn Fn(&Value, &EventObject, &Value) -> Result<(), String> + Send + Sync;

/// An assign updater: returns a partial object merged into the context.
pub type UpdaterFn = dyn Fn(&Value, &EventObject) -> Result<Value, String> + Send + Sync;

/// A `pure` factory: expands into actions based on the current context.
pub type PureFn = dyn Fn(&Value, &EventObject) -> Vec<Action> + Send + Sync;

/// A named delay: milliseconds computed from the context and event.
pub type DelayFn = dyn Fn(&Value, &EventObject) -> u64 + Send + Sync;

/// Name-to-implementation registries supplied alongside a machine config.
#[derive(Clone, Default)]
pub struct MachineOptions {
    pub actions: HashMap<String, Arc<ActionFn>>,
    pub updaters: HashMap<String, Arc<UpdaterFn>>,
    pub factories: HashMap<String, Arc<PureFn>>,
    pub guards: HashMap<String, Arc<GuardFn>>,
    pub delays: HashMap<String, Arc<DelayFn>>,
}

impl MachineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a custom action effect.
    pub fn action(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Value, &EventObject, &Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.actions.insert(name.into(), Arc::new(f));
        self
    }

    /// Registers an assign updater.
    pub fn updater(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Value, &EventObject) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.updaters.insert(name.into(), Arc::new(f));
        self
    }

    /// Registers a `pure` action factory.
    pub fn factory(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Value, &EventObject) -> Vec<Action> + Send + Sync + 'static,
    ) -> Self {
        self.factories.insert(name.into(), Arc::new(f));
        self
    }

    /// Registers a named guard.
    pub fn guard(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Value, &EventObject, &crate::guard::GuardArgs<'_>) -> Result<bool, String>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.guards.insert(name.into(), Arc::new(f));
        self
    }

    /// Registers a named delay.
    pub fn delay(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Value, &EventObject) -> u64 + Send + Sync + 'static,
    ) -> Self {
        self.delays.insert(name.into(), Arc::new(f));
        self
    }

    /// Registers a constant named delay.
    pub fn delay_ms(self, name: impl Into<String>, ms: u64) -> Self {
        self.delay(name, move |_, _| ms)
    }

    /// Merges `other` into `self`, with `other` winning on name clashes.
    pub fn merge(mut self, other: MachineOptions) -> Self {
        self.actions.extend(other.actions);
        self.updaters.extend(other.updaters);
        self.factories.extend(other.factories);
        self.guards.extend(other.guards);
        self.delays.extend(other.delays);
        self
    }
}

impl fmt::Debug for MachineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn keys<V>(m: &HashMap<String, V>) -> Vec<String> {
            let mut v: Vec<_> = m.keys().cloned().collect();
            v.sort();
            v
        }
        f.debug_struct("MachineOptions")
            .field("actions", &keys(&self.actions))
            .field("updaters", &keys(&self.updaters))
            .field("factories", &keys(&self.factories))
            .field("guards", &keys(&self.guards))
            .field("delays", &keys(&self.delays))
            .finish()
    }
}
