//! Actor source registry.
//!
//! Invocation descriptors name their source by tag; the registry maps
//! tags to spawnable sources. Sources are `Arc`-wrapped so registries
//! clone cheaply and can be shared down the actor tree.

use crate::actor::SendBack;
use crate::behavior::Behavior;
use futures::stream::Stream;
use rschart_core::{Event, Machine};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// A boxed promise body: resolves with `done.invoke` data or rejects
/// with `error.platform` data.
pub type PromiseFuture = Pin<Box<dyn Future<Output = Result<Value, Value>> + Send>>;

/// A boxed callback body; the actor lives until this future completes
/// or the actor is stopped.
pub type CallbackFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A boxed stream of events emitted into the parent.
pub type EventStream = Pin<Box<dyn Stream<Item = Event> + Send>>;

type PromiseFn = dyn Fn(Value) -> PromiseFuture + Send + Sync;
type CallbackFn =
    dyn Fn(Value, SendBack, UnboundedReceiver<Event>) -> CallbackFuture + Send + Sync;
type ObservableFn = dyn Fn(Value) -> EventStream + Send + Sync;

/// A spawnable actor source.
#[derive(Clone)]
pub enum ActorSource {
    /// A nested machine, run under a fresh child interpreter.
    Machine(Arc<Machine>),
    /// A promise: one `done.invoke.<id>` or `error.platform.<id>`.
    Promise(Arc<PromiseFn>),
    /// A callback: receives a send-back handle and the parent's
    /// forwarded events.
    Callback(Arc<CallbackFn>),
    /// An observable: each emission becomes an event; completion emits
    /// `done.invoke.<id>`.
    Observable(Arc<ObservableFn>),
    /// A reducer behavior with a readable snapshot.
    Behavior(Arc<dyn Behavior>),
}

/// Name-to-source registry supplied to the interpreter.
#[derive(Clone, Default)]
pub struct ActorRegistry {
    sources: HashMap<String, ActorSource>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn machine(mut self, name: impl Into<String>, machine: Machine) -> Self {
        self.sources
            .insert(name.into(), ActorSource::Machine(Arc::new(machine)));
        self
    }

    pub fn promise<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Value>> + Send + 'static,
    {
        self.sources.insert(
            name.into(),
            ActorSource::Promise(Arc::new(move |input| Box::pin(f(input)))),
        );
        self
    }

    pub fn callback<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, SendBack, UnboundedReceiver<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.sources.insert(
            name.into(),
            ActorSource::Callback(Arc::new(move |input, send_back, receiver| {
                Box::pin(f(input, send_back, receiver))
            })),
        );
        self
    }

    pub fn observable<F, S>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> S + Send + Sync + 'static,
        S: Stream<Item = Event> + Send + 'static,
    {
        self.sources.insert(
            name.into(),
            ActorSource::Observable(Arc::new(move |input| Box::pin(f(input)))),
        );
        self
    }

    pub fn behavior(mut self, name: impl Into<String>, behavior: Arc<dyn Behavior>) -> Self {
        self.sources
            .insert(name.into(), ActorSource::Behavior(behavior));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ActorSource> {
        self.sources.get(name)
    }
}

impl fmt::Debug for ActorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.sources.keys().cloned().collect();
        names.sort();
        f.debug_struct("ActorRegistry").field("sources", &names).finish()
    }
}
