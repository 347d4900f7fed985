//! The interpreter: a long-running actor around a machine.
//!
//! The interpreter owns the external event queue, drives macrosteps to
//! completion one event at a time, executes resolved actions (sends,
//! timers, logs, custom effects), manages invoked child actors at
//! macrostep boundaries, and notifies subscribers with each
//! post-macrostep state. Scheduling is single-threaded and cooperative:
//! a `send` while an event is being processed enqueues and returns; the
//! active drain loop picks it up in FIFO order.

use crate::actor::{ActorRef, ParentHandle};
use crate::behavior::BehaviorActor;
use crate::error::InterpreterError;
use crate::registry::{ActorRegistry, ActorSource};
use crate::scheduler::Scheduler;
use crate::spawn::{spawn_callback, spawn_observable, spawn_promise};
use parking_lot::Mutex;
use rschart_core::action::{
    merge_context, resolve_template, SEND_TARGET_INTERNAL, SEND_TARGET_PARENT,
};
use rschart_core::event::{done_invoke, done_state, error_platform, UPDATE_EVENT};
use rschart_core::{
    Action, DelaySpec, Event, EventObject, InvokeDef, Machine, SendAction, State,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Lifecycle of an interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NotStarted,
    Running,
    Stopped,
}

/// Options for [`Interpreter::new`].
pub struct InterpreterOptions {
    /// Actor sources available to `invoke`.
    pub actors: ActorRegistry,
    /// Queue events received before `start` instead of dropping them.
    pub defer_events: bool,
    /// Actor id; defaults to the machine id.
    pub id: Option<String>,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            actors: ActorRegistry::default(),
            defer_events: true,
            id: None,
        }
    }
}

/// Creates an interpreter with default options.
pub fn interpret(machine: Machine) -> Interpreter {
    Interpreter::new(machine, InterpreterOptions::default())
}

type TransitionFn = Arc<dyn Fn(&State) + Send + Sync>;
type DoneFn = Arc<dyn Fn(&Event) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&InterpreterError) + Send + Sync>;
type StopFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    seq: u64,
    transition: Vec<(u64, TransitionFn)>,
    done: Vec<(u64, DoneFn)>,
    error: Vec<(u64, ErrorFn)>,
    stop: Vec<(u64, StopFn)>,
}

struct Core {
    status: Status,
    state: Option<State>,
    queue: VecDeque<EventObject>,
    draining: bool,
    children: HashMap<String, Arc<dyn ActorRef>>,
    auto_forward: HashSet<String>,
}

impl Default for Core {
    fn default() -> Self {
        Self {
            status: Status::NotStarted,
            state: None,
            queue: VecDeque::new(),
            draining: false,
            children: HashMap::new(),
            auto_forward: HashSet::new(),
        }
    }
}

pub(crate) struct InterpreterInner {
    machine: Arc<Machine>,
    id: String,
    session: String,
    registry: ActorRegistry,
    defer_events: bool,
    parent: Option<ParentHandle>,
    core: Mutex<Core>,
    subscribers: Mutex<Subscribers>,
    scheduler: Scheduler,
}

/// A running service around a machine. Clones share the same actor.
#[derive(Clone)]
pub struct Interpreter {
    inner: Arc<InterpreterInner>,
}

impl Interpreter {
    pub fn new(machine: Machine, options: InterpreterOptions) -> Interpreter {
        let id = options.id.unwrap_or_else(|| machine.id().to_string());
        Interpreter {
            inner: Arc::new(InterpreterInner {
                machine: Arc::new(machine),
                id,
                session: format!("session-{}", Uuid::new_v4()),
                registry: options.actors,
                defer_events: options.defer_events,
                parent: None,
                core: Mutex::new(Core::default()),
                subscribers: Mutex::new(Subscribers::default()),
                scheduler: Scheduler::default(),
            }),
        }
    }

    fn new_child(
        machine: Machine,
        registry: ActorRegistry,
        id: String,
        parent: ParentHandle,
    ) -> Interpreter {
        Interpreter {
            inner: Arc::new(InterpreterInner {
                machine: Arc::new(machine),
                id,
                session: format!("session-{}", Uuid::new_v4()),
                registry,
                defer_events: true,
                parent: Some(parent),
                core: Mutex::new(Core::default()),
                subscribers: Mutex::new(Subscribers::default()),
                scheduler: Scheduler::default(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<InterpreterInner>) -> Interpreter {
        Interpreter { inner }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Unique id of this interpreter instance.
    pub fn session_id(&self) -> &str {
        &self.inner.session
    }

    pub fn machine(&self) -> &Machine {
        &self.inner.machine
    }

    pub fn status(&self) -> Status {
        self.inner.core.lock().status
    }

    /// The latest post-macrostep state, if the interpreter has started.
    pub fn state(&self) -> Option<State> {
        self.inner.core.lock().state.clone()
    }

    pub fn child(&self, id: &str) -> Option<Arc<dyn ActorRef>> {
        self.inner.core.lock().children.get(id).cloned()
    }

    /// Starts the interpreter from the machine's initial state. Starting
    /// a running interpreter is a no-op; a stopped one is an error.
    pub fn start(&self) -> Result<(), InterpreterError> {
        if !self.claim_start()? {
            return Ok(());
        }

        let initial = match self.inner.machine.initial_state() {
            Ok(state) => state,
            Err(err) => {
                let err = InterpreterError::from(err);
                self.notify_error(&err);
                self.terminate();
                return Err(err);
            }
        };

        tracing::debug!(machine = %self.inner.id, session = %self.inner.session, "started");
        self.update(initial);
        self.drain();
        Ok(())
    }

    /// Starts from a rehydrated state, bypassing initial-state
    /// computation. Entry actions do not re-run; `after` timers of the
    /// active configuration are re-armed from now.
    pub fn start_with(&self, state: State) -> Result<(), InterpreterError> {
        if !self.claim_start()? {
            return Ok(());
        }

        self.inner.core.lock().state = Some(state.clone());

        match self.inner.machine.delayed_entry_sends(&state) {
            Ok(sends) => {
                for send in sends {
                    self.execute(&Action::Send(send), &state);
                }
            }
            Err(err) => {
                let err = InterpreterError::from(err);
                self.notify_error(&err);
                self.terminate();
                return Err(err);
            }
        }

        for subscriber in self.transition_subscribers() {
            subscriber(&state);
        }
        if state.done {
            self.finish(&state);
        }
        self.drain();
        Ok(())
    }

    /// Marks the interpreter running; false when already running.
    fn claim_start(&self) -> Result<bool, InterpreterError> {
        let mut core = self.inner.core.lock();
        match core.status {
            Status::Running => Ok(false),
            Status::Stopped => Err(InterpreterError::Stopped),
            Status::NotStarted => {
                core.status = Status::Running;
                core.draining = true;
                Ok(true)
            }
        }
    }

    /// Enqueues an external event and drains the queue unless a drain
    /// is already in progress on this interpreter.
    pub fn send(&self, event: impl Into<Event>) {
        self.send_object(EventObject::external(event.into()));
    }

    /// Enqueues all events, then drains; subscribers still observe one
    /// state per event.
    pub fn batch<E: Into<Event>>(&self, events: impl IntoIterator<Item = E>) {
        let should_drain = {
            let mut core = self.inner.core.lock();
            match core.status {
                Status::Stopped => {
                    tracing::warn!(machine = %self.inner.id, "batch after stop ignored");
                    return;
                }
                Status::NotStarted if !self.inner.defer_events => {
                    tracing::warn!(machine = %self.inner.id, "batch before start dropped");
                    return;
                }
                _ => {}
            }
            for event in events {
                core.queue.push_back(EventObject::external(event.into()));
            }
            if core.status == Status::Running && !core.draining {
                core.draining = true;
                true
            } else {
                false
            }
        };
        if should_drain {
            self.drain();
        }
    }

    pub(crate) fn send_object(&self, event: EventObject) {
        let should_drain = {
            let mut core = self.inner.core.lock();
            match core.status {
                Status::Stopped => {
                    tracing::warn!(
                        machine = %self.inner.id,
                        event = %event.name,
                        "event sent to stopped interpreter ignored"
                    );
                    return;
                }
                Status::NotStarted => {
                    if self.inner.defer_events {
                        core.queue.push_back(event);
                    } else {
                        tracing::warn!(
                            machine = %self.inner.id,
                            event = %event.name,
                            "event before start dropped"
                        );
                    }
                    return;
                }
                Status::Running => {
                    core.queue.push_back(event);
                    if core.draining {
                        false
                    } else {
                        core.draining = true;
                        true
                    }
                }
            }
        };
        if should_drain {
            self.drain();
        }
    }

    /// Processes queued events one macrostep at a time, FIFO. Events
    /// enqueued while draining are handled in the same loop.
    fn drain(&self) {
        loop {
            let event = {
                let mut core = self.inner.core.lock();
                match core.queue.pop_front() {
                    Some(event) => event,
                    None => {
                        core.draining = false;
                        return;
                    }
                }
            };
            self.process(event);
        }
    }

    fn process(&self, event: EventObject) {
        // auto-forwarded children observe the event before the parent
        let forwards: Vec<Arc<dyn ActorRef>> = {
            let core = self.inner.core.lock();
            core.children
                .iter()
                .filter(|(id, _)| core.auto_forward.contains(*id))
                .map(|(_, actor)| actor.clone())
                .collect()
        };
        for child in forwards {
            child.send(event.clone());
        }

        let current = self.inner.core.lock().state.clone();
        let Some(current) = current else { return };

        match self.inner.machine.transition_event(&current, event) {
            Ok(next) => self.update(next),
            Err(err) => self.fatal(InterpreterError::from(err)),
        }
    }

    /// Installs the new state, executes its actions in order, notifies
    /// subscribers, and finishes if the machine is done.
    fn update(&self, next: State) {
        self.inner.core.lock().state = Some(next.clone());

        for action in &next.actions {
            self.execute(action, &next);
        }

        for subscriber in self.transition_subscribers() {
            subscriber(&next);
        }

        if next.done {
            self.finish(&next);
        }
    }

    fn execute(&self, action: &Action, state: &State) {
        match action {
            Action::Send(send) => match &send.delay {
                Some(DelaySpec::Ms(ms)) => {
                    let weak = Arc::downgrade(&self.inner);
                    let pending = SendAction {
                        delay: None,
                        ..send.clone()
                    };
                    self.inner
                        .scheduler
                        .schedule(send.send_id().to_string(), *ms, move || {
                            if let Some(inner) = weak.upgrade() {
                                Interpreter::from_inner(inner).deliver_send(&pending);
                            }
                        });
                }
                Some(DelaySpec::Named(name)) => {
                    tracing::warn!(delay = %name, "unresolved named delay dropped");
                }
                None => self.deliver_send(send),
            },

            Action::Cancel { send_id } => self.inner.scheduler.cancel(send_id),

            Action::Log { message } => {
                tracing::info!(target: "rschart", machine = %self.inner.id, "{message}");
            }

            Action::Invoke(def) => self.start_invocation(def, state),

            Action::Stop { child } => self.stop_child(child),

            Action::Escalate { data } => match &self.inner.parent {
                Some(parent) => {
                    parent.send(EventObject::error(
                        error_platform(&parent.child_id),
                        data.clone(),
                    ));
                }
                None => {
                    let err = InterpreterError::Escalated { data: data.clone() };
                    self.notify_error(&err);
                    self.terminate();
                }
            },

            Action::Custom { name, params, ctx } => {
                let Some(exec) = self.inner.machine.options().actions.get(name).cloned()
                else {
                    tracing::warn!(action = %name, "unknown action");
                    return;
                };
                let context = ctx.as_ref().unwrap_or(&state.context);
                if let Err(reason) = exec(context, &state.event_object, params) {
                    self.send_object(EventObject::error(
                        rschart_core::event::ERROR_EXECUTION_EVENT,
                        json!({ "message": reason }),
                    ));
                }
            }

            // applied during resolution
            Action::Assign(_) | Action::Raise(_) | Action::Choose(_) | Action::Pure { .. } => {}
        }
    }

    fn deliver_send(&self, send: &SendAction) {
        let event = EventObject::external(Event::with_data(
            send.event.name.clone(),
            send.event.data.clone(),
        ))
        .with_sendid(send.send_id().to_string());

        match send.to.as_deref() {
            None | Some(SEND_TARGET_INTERNAL) => self.send_object(event),
            Some(SEND_TARGET_PARENT) => match &self.inner.parent {
                Some(parent) => parent.send(event),
                None => {
                    tracing::warn!(machine = %self.inner.id, "send to parent without a parent")
                }
            },
            Some(child) => {
                let target = self.inner.core.lock().children.get(child).cloned();
                match target {
                    Some(actor) => actor.send(event.with_origin(self.inner.id.clone())),
                    None => tracing::warn!(child = %child, "unknown send target"),
                }
            }
        }
    }

    /// Starts a child actor for an invocation at the macrostep
    /// boundary. An existing child under the same id is stopped first,
    /// so exit-and-re-enter within one macrostep restarts the actor.
    fn start_invocation(&self, def: &InvokeDef, state: &State) {
        self.stop_child(&def.id);

        let input = def
            .data
            .as_ref()
            .map(|template| resolve_template(template, &state.context, &state.event_object))
            .unwrap_or(Value::Null);

        let Some(source) = self.inner.registry.get(&def.src.kind).cloned() else {
            tracing::warn!(src = %def.src.kind, "unknown actor source");
            self.send_object(EventObject::error(
                error_platform(&def.id),
                json!({ "message": format!("unknown actor source '{}'", def.src.kind) }),
            ));
            return;
        };

        let parent = ParentHandle::new(Arc::downgrade(&self.inner), def.id.clone());

        let actor: Arc<dyn ActorRef> = match source {
            ActorSource::Machine(machine) => {
                let child_machine = if input.is_object() {
                    machine.with_context(merge_context(machine.initial_context(), &input))
                } else {
                    (*machine).clone()
                };
                let child = Interpreter::new_child(
                    child_machine,
                    self.inner.registry.clone(),
                    def.id.clone(),
                    parent.clone(),
                );
                if def.sync {
                    let sync = parent.clone();
                    child.subscribe(move |child_state| {
                        sync.send(EventObject::platform(
                            UPDATE_EVENT,
                            json!({ "state": child_state.to_json() }),
                        ));
                    });
                }
                if let Err(err) = child.start() {
                    self.send_object(EventObject::error(
                        error_platform(&def.id),
                        json!({ "message": err.to_string() }),
                    ));
                    return;
                }
                Arc::new(MachineActor {
                    id: def.id.clone(),
                    service: child,
                })
            }
            ActorSource::Promise(factory) => {
                spawn_promise(def.id.clone(), factory(input), parent)
            }
            ActorSource::Callback(factory) => spawn_callback(
                def.id.clone(),
                |send_back, receiver| factory(input, send_back, receiver),
                parent,
            ),
            ActorSource::Observable(factory) => {
                spawn_observable(def.id.clone(), factory(input), parent)
            }
            ActorSource::Behavior(behavior) => {
                Arc::new(BehaviorActor::new(def.id.clone(), behavior))
            }
        };

        let mut core = self.inner.core.lock();
        if def.auto_forward {
            core.auto_forward.insert(def.id.clone());
        }
        core.children.insert(def.id.clone(), actor);
    }

    /// Stops and releases a child by invocation id. No-op when absent.
    fn stop_child(&self, id: &str) {
        let actor = {
            let mut core = self.inner.core.lock();
            core.auto_forward.remove(id);
            core.children.remove(id)
        };
        if let Some(actor) = actor {
            actor.stop();
        }
    }

    /// The machine reached a final configuration: notify done
    /// subscribers and the parent, then stop.
    fn finish(&self, state: &State) {
        let data = self.done_data(state);
        let done_event = Event::with_data(done_state(self.inner.machine.id()), data.clone());

        let done_subs: Vec<DoneFn> = {
            let subs = self.inner.subscribers.lock();
            subs.done.iter().map(|(_, f)| f.clone()).collect()
        };
        for subscriber in done_subs {
            subscriber(&done_event);
        }

        if let Some(parent) = &self.inner.parent {
            parent.send(EventObject::platform(done_invoke(&parent.child_id), data));
        }

        self.terminate();
    }

    /// Done data from the root's active final child, template-resolved.
    fn done_data(&self, state: &State) -> Value {
        let tree = self.inner.machine.tree();
        for &node_id in &state.configuration {
            let node = tree.node(node_id);
            if node.is_final() && node.parent == Some(tree.root()) {
                if let Some(template) = &node.done_data {
                    return resolve_template(template, &state.context, &state.event_object);
                }
            }
        }
        Value::Null
    }

    /// Stops the interpreter: children are stopped depth-first
    /// (innermost first), pending timers are flushed, and further sends
    /// are ignored.
    pub fn stop(&self) {
        self.terminate();
    }

    fn terminate(&self) {
        let children = {
            let mut core = self.inner.core.lock();
            if core.status == Status::Stopped {
                return;
            }
            core.status = Status::Stopped;
            core.queue.clear();
            core.auto_forward.clear();
            std::mem::take(&mut core.children)
        };

        for (_, child) in children {
            child.stop();
        }
        self.inner.scheduler.clear();

        let stop_subs: Vec<StopFn> = {
            let subs = self.inner.subscribers.lock();
            subs.stop.iter().map(|(_, f)| f.clone()).collect()
        };
        for subscriber in stop_subs {
            subscriber();
        }
        tracing::debug!(machine = %self.inner.id, session = %self.inner.session, "stopped");
    }

    fn fatal(&self, err: InterpreterError) {
        tracing::error!(machine = %self.inner.id, error = %err, "interpreter error");
        self.notify_error(&err);
        self.terminate();
    }

    fn notify_error(&self, err: &InterpreterError) {
        let error_subs: Vec<ErrorFn> = {
            let subs = self.inner.subscribers.lock();
            subs.error.iter().map(|(_, f)| f.clone()).collect()
        };
        for subscriber in error_subs {
            subscriber(err);
        }
    }

    fn transition_subscribers(&self) -> Vec<TransitionFn> {
        let subs = self.inner.subscribers.lock();
        subs.transition.iter().map(|(_, f)| f.clone()).collect()
    }

    /// Subscribes to post-macrostep states, in subscription order.
    pub fn subscribe(&self, f: impl Fn(&State) + Send + Sync + 'static) -> Subscription {
        let mut subs = self.inner.subscribers.lock();
        subs.seq += 1;
        let id = subs.seq;
        subs.transition.push((id, Arc::new(f)));
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
            kind: SubscriptionKind::Transition,
        }
    }

    /// Alias for [`Interpreter::subscribe`].
    pub fn on_transition(&self, f: impl Fn(&State) + Send + Sync + 'static) -> Subscription {
        self.subscribe(f)
    }

    /// Called once with the machine's done event when the root reaches
    /// a final configuration.
    pub fn on_done(&self, f: impl Fn(&Event) + Send + Sync + 'static) -> Subscription {
        let mut subs = self.inner.subscribers.lock();
        subs.seq += 1;
        let id = subs.seq;
        subs.done.push((id, Arc::new(f)));
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
            kind: SubscriptionKind::Done,
        }
    }

    pub fn on_error(
        &self,
        f: impl Fn(&InterpreterError) + Send + Sync + 'static,
    ) -> Subscription {
        let mut subs = self.inner.subscribers.lock();
        subs.seq += 1;
        let id = subs.seq;
        subs.error.push((id, Arc::new(f)));
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
            kind: SubscriptionKind::Error,
        }
    }

    pub fn on_stop(&self, f: impl Fn() + Send + Sync + 'static) -> Subscription {
        let mut subs = self.inner.subscribers.lock();
        subs.seq += 1;
        let id = subs.seq;
        subs.stop.push((id, Arc::new(f)));
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
            kind: SubscriptionKind::Stop,
        }
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("id", &self.inner.id)
            .field("session", &self.inner.session)
            .field("status", &self.status())
            .finish()
    }
}

/// A nested machine running under its own interpreter.
struct MachineActor {
    id: String,
    service: Interpreter,
}

impl ActorRef for MachineActor {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, event: EventObject) {
        self.service.send_object(event);
    }

    fn stop(&self) {
        self.service.stop();
    }

    fn snapshot(&self) -> Option<Value> {
        self.service.state().map(|state| state.to_json())
    }
}

#[derive(Debug, Clone, Copy)]
enum SubscriptionKind {
    Transition,
    Done,
    Error,
    Stop,
}

/// Handle returned by the subscription methods; `unsubscribe` removes
/// the callback.
pub struct Subscription {
    inner: Weak<InterpreterInner>,
    id: u64,
    kind: SubscriptionKind,
}

impl Subscription {
    pub fn unsubscribe(self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut subs = inner.subscribers.lock();
        match self.kind {
            SubscriptionKind::Transition => subs.transition.retain(|(id, _)| *id != self.id),
            SubscriptionKind::Done => subs.done.retain(|(id, _)| *id != self.id),
            SubscriptionKind::Error => subs.error.retain(|(id, _)| *id != self.id),
            SubscriptionKind::Stop => subs.stop.retain(|(id, _)| *id != self.id),
        }
    }
}
