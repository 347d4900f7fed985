//! Reducer behaviors: minimal actors defined by a transition function.

use crate::actor::ActorRef;
use parking_lot::Mutex;
use rschart_core::EventObject;
use serde_json::Value;
use std::sync::Arc;

/// A minimal actor behavior: a snapshot plus a pure transition
/// function. Snapshots are exposed through [`ActorRef::snapshot`].
pub trait Behavior: Send + Sync {
    fn initial_state(&self) -> Value;

    fn transition(&self, state: Value, event: &EventObject) -> Value;
}

/// Builds a behavior from an initial snapshot and a reducer closure.
pub fn from_reducer(
    initial: Value,
    reducer: impl Fn(Value, &EventObject) -> Value + Send + Sync + 'static,
) -> Arc<dyn Behavior> {
    Arc::new(ReducerBehavior { initial, reducer })
}

struct ReducerBehavior<F> {
    initial: Value,
    reducer: F,
}

impl<F> Behavior for ReducerBehavior<F>
where
    F: Fn(Value, &EventObject) -> Value + Send + Sync,
{
    fn initial_state(&self) -> Value {
        self.initial.clone()
    }

    fn transition(&self, state: Value, event: &EventObject) -> Value {
        (self.reducer)(state, event)
    }
}

/// A spawned behavior actor holding the current snapshot.
pub(crate) struct BehaviorActor {
    id: String,
    behavior: Arc<dyn Behavior>,
    state: Mutex<Value>,
}

impl BehaviorActor {
    pub(crate) fn new(id: String, behavior: Arc<dyn Behavior>) -> Self {
        let state = Mutex::new(behavior.initial_state());
        Self {
            id,
            behavior,
            state,
        }
    }
}

impl ActorRef for BehaviorActor {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, event: EventObject) {
        let mut state = self.state.lock();
        let current = std::mem::take(&mut *state);
        *state = self.behavior.transition(current, &event);
    }

    fn stop(&self) {}

    fn snapshot(&self) -> Option<Value> {
        Some(self.state.lock().clone())
    }
}
