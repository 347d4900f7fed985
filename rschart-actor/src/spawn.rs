//! Task-backed child actors: promises, callbacks and observables.

use crate::actor::{ActorRef, ParentHandle, SendBack};
use crate::registry::{CallbackFuture, EventStream, PromiseFuture};
use futures::StreamExt;
use parking_lot::Mutex;
use rschart_core::event::{done_invoke, error_platform};
use rschart_core::EventObject;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A fire-and-forget child driven by a spawned task (promise or
/// observable). Incoming events are ignored; stopping aborts the task.
pub(crate) struct TaskActor {
    id: String,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskActor {
    fn new(id: String, handle: JoinHandle<()>) -> Arc<Self> {
        Arc::new(Self {
            id,
            handle: Mutex::new(Some(handle)),
        })
    }
}

impl ActorRef for TaskActor {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, _event: EventObject) {}

    fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    fn snapshot(&self) -> Option<Value> {
        None
    }
}

/// Spawns a promise body: resolution sends `done.invoke.<id>` to the
/// parent, rejection sends `error.platform.<id>`.
pub(crate) fn spawn_promise(
    id: String,
    future: PromiseFuture,
    parent: ParentHandle,
) -> Arc<dyn ActorRef> {
    let actor_id = id.clone();
    let handle = tokio::spawn(async move {
        match future.await {
            Ok(data) => parent.send(EventObject::platform(done_invoke(&id), data)),
            Err(data) => parent.send(EventObject::error(error_platform(&id), data)),
        }
    });
    TaskActor::new(actor_id, handle)
}

/// Spawns an observable: each emission is sent to the parent as an
/// external event; completion sends `done.invoke.<id>`.
pub(crate) fn spawn_observable(
    id: String,
    mut stream: EventStream,
    parent: ParentHandle,
) -> Arc<dyn ActorRef> {
    let actor_id = id.clone();
    let handle = tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            parent.send(EventObject::external(event));
        }
        parent.send(EventObject::platform(done_invoke(&id), Value::Null));
    });
    TaskActor::new(actor_id, handle)
}

/// A callback child: the factory's future runs as a task, sends reach
/// the parent through the [`SendBack`] handle, and events forwarded by
/// the parent arrive on the receiver.
pub(crate) struct CallbackActor {
    id: String,
    sender: mpsc::UnboundedSender<rschart_core::Event>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ActorRef for CallbackActor {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, event: EventObject) {
        // receiver gone means the callback body already returned
        let _ = self.sender.send(event.event());
    }

    fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    fn snapshot(&self) -> Option<Value> {
        None
    }
}

pub(crate) fn spawn_callback(
    id: String,
    make: impl FnOnce(SendBack, mpsc::UnboundedReceiver<rschart_core::Event>) -> CallbackFuture,
    parent: ParentHandle,
) -> Arc<dyn ActorRef> {
    let (sender, receiver) = mpsc::unbounded_channel();
    let future = make(SendBack::new(parent), receiver);
    let handle = tokio::spawn(future);
    Arc::new(CallbackActor {
        id,
        sender,
        handle: Mutex::new(Some(handle)),
    })
}
