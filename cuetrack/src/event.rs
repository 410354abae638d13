use crate::{EventScheduler, PlaybackState, StateHandle};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub type CallbackError = Box<dyn std::error::Error>;
pub type CallbackResult = Result<(), CallbackError>;

type CallbackFn = dyn Fn(&mut EventContext<'_>) -> CallbackResult;

/// A shared event callback.
///
/// Callbacks are compared by identity: two `Callback`s are the same callback only when one was
/// cloned from the other.
#[derive(Clone)]
pub struct Callback(Rc<CallbackFn>);

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut EventContext<'_>) + 'static,
    {
        Self::fallible(move |context| {
            f(context);
            Ok(())
        })
    }

    /// A callback whose errors are logged by the scheduler without stopping the remaining events
    /// of the update.
    pub fn fallible<F>(f: F) -> Self
    where
        F: Fn(&mut EventContext<'_>) -> CallbackResult + 'static,
    {
        Self(Rc::new(f))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn call(&self, context: &mut EventContext<'_>) -> CallbackResult {
        (self.0)(context)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Multicast list of callbacks, invoked in insertion order.
#[derive(Clone, Debug, Default)]
pub struct Handler {
    callbacks: Vec<Callback>,
}

impl Handler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, callback: Callback) {
        if self.contains(&callback) {
            log::warn!(
                "callback {callback:?} is already registered on this handler and will be invoked more than once"
            );
        }
        self.callbacks.push(callback);
    }

    /// Removes the most recently added occurrence of `callback`.
    pub fn remove(&mut self, callback: &Callback) -> bool {
        match self.callbacks.iter().rposition(|c| c.ptr_eq(callback)) {
            Some(index) => {
                self.callbacks.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, callback: &Callback) -> bool {
        self.callbacks.iter().any(|c| c.ptr_eq(callback))
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Callback> {
        self.callbacks.iter()
    }

    /// True when both handlers hold the same callbacks in the same order.
    pub fn same_callbacks(&self, other: &Handler) -> bool {
        self.callbacks.len() == other.callbacks.len()
            && self
                .callbacks
                .iter()
                .zip(&other.callbacks)
                .all(|(a, b)| a.ptr_eq(b))
    }
}

impl From<Callback> for Handler {
    fn from(callback: Callback) -> Self {
        Self {
            callbacks: vec![callback],
        }
    }
}

/// A time-keyed event of a [`crate::Sequence`].
#[derive(Clone, Debug)]
pub struct Event {
    pub normalized_time: f32,
    pub handler: Handler,
}

impl Event {
    pub fn new(normalized_time: f32, callback: Callback) -> Self {
        Self {
            normalized_time,
            handler: Handler::from(callback),
        }
    }

    pub fn with_handler(normalized_time: f32, handler: Handler) -> Self {
        Self {
            normalized_time,
            handler,
        }
    }

    /// Identity used for removal: equal time and the same callbacks.
    pub fn matches(&self, other: &Event) -> bool {
        self.normalized_time == other.normalized_time && self.handler.same_callbacks(&other.handler)
    }
}

/// The event fired when a state passes the end of its playback.
///
/// A NaN time resolves to 1 when playing forwards and 0 when playing backwards.
#[derive(Clone, Debug)]
pub struct EndEvent {
    pub normalized_time: f32,
    pub handler: Handler,
}

impl Default for EndEvent {
    fn default() -> Self {
        Self {
            normalized_time: f32::NAN,
            handler: Handler::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Timed,
    End,
}

/// Describes the event being invoked.
#[derive(Clone, Debug, PartialEq)]
pub struct InvokedEvent {
    pub kind: EventKind,
    /// Index in the sequence at the time of invocation. `None` for the end event.
    pub index: Option<usize>,
    pub name: Option<String>,
    /// Time the event is keyed at (the resolved end time for the end event).
    pub normalized_time: f32,
    /// Normalized time of the state when the event fired.
    pub state_time: f32,
}

pub struct EventContext<'a> {
    scheduler: &'a mut EventScheduler,
    state: StateHandle,
    event: &'a InvokedEvent,
}

impl<'a> EventContext<'a> {
    pub(crate) fn new(
        scheduler: &'a mut EventScheduler,
        state: StateHandle,
        event: &'a InvokedEvent,
    ) -> Self {
        Self {
            scheduler,
            state,
            event,
        }
    }

    pub fn scheduler(&mut self) -> &mut EventScheduler {
        self.scheduler
    }

    pub fn state(&self) -> StateHandle {
        self.state
    }

    pub fn event(&self) -> &InvokedEvent {
        self.event
    }

    pub fn playback(&self) -> Option<&PlaybackState> {
        self.scheduler.playback(self.state)
    }
}

/// Name to callback bindings used to rebuild sequences from serialized data.
#[derive(Clone, Debug, Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, Callback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `key`, returning the callback previously bound to it.
    pub fn register(&mut self, key: impl Into<String>, callback: Callback) -> Option<Callback> {
        self.callbacks.insert(key.into(), callback)
    }

    pub fn unregister(&mut self, key: &str) -> Option<Callback> {
        self.callbacks.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Callback> {
        self.callbacks.get(key)
    }

    /// The key `callback` is registered under. A callback registered under several keys reports
    /// the smallest one.
    pub fn key_of(&self, callback: &Callback) -> Option<&str> {
        self.callbacks
            .iter()
            .filter(|(_, registered)| registered.ptr_eq(callback))
            .map(|(key, _)| key.as_str())
            .min()
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}
