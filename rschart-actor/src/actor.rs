//! Actor references and parent links.
//!
//! Every spawned child is held behind the uniform [`ActorRef`] handle;
//! parents own their children's handles, children hold only a weak link
//! back to the parent. Dropping the root interpreter therefore tears
//! down the whole actor tree.

use crate::interpreter::InterpreterInner;
use rschart_core::{Event, EventObject};
use serde_json::Value;
use std::sync::Weak;

/// A handle to a running child actor.
pub trait ActorRef: Send + Sync {
    /// The invocation id the parent knows this actor by.
    fn id(&self) -> &str;

    /// Delivers an event envelope to the actor. Adapters that cannot
    /// receive (promises, observables) ignore it.
    fn send(&self, event: EventObject);

    /// Stops the actor and releases its resources. Idempotent.
    fn stop(&self);

    /// The actor's current snapshot, when it exposes one.
    fn snapshot(&self) -> Option<Value>;
}

/// A weak link from a child actor back to its parent interpreter.
#[derive(Clone)]
pub(crate) struct ParentHandle {
    target: Weak<InterpreterInner>,
    /// The invocation id under which the parent registered the child.
    pub(crate) child_id: String,
}

impl ParentHandle {
    pub(crate) fn new(target: Weak<InterpreterInner>, child_id: String) -> Self {
        Self { target, child_id }
    }

    /// Sends to the parent if it is still alive, stamping the child as
    /// the origin.
    pub(crate) fn send(&self, event: EventObject) {
        if let Some(inner) = self.target.upgrade() {
            crate::interpreter::Interpreter::from_inner(inner)
                .send_object(event.with_origin(self.child_id.clone()));
        }
    }
}

/// The sender handed to callback actors for pushing events to the
/// parent machine.
#[derive(Clone)]
pub struct SendBack {
    parent: ParentHandle,
}

impl SendBack {
    pub(crate) fn new(parent: ParentHandle) -> Self {
        Self { parent }
    }

    pub fn send(&self, event: impl Into<Event>) {
        self.parent.send(EventObject::external(event.into()));
    }
}
