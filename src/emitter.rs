//! Synchronous publish/subscribe bus, keyed by the kind of a sum type of events.
//!
//! An [`EventMap`](self::EventMap) implementation ties an event enum (one variant per event name,
//! carrying its payload) to a copyable discriminant used for subscriptions, so mismatched
//! `emit`/`on` pairs are ruled out by the type system.
//!
//! # Examples
//!
//! ```
//! use tirc::emitter::{listener, EventEmitter, EventMap, ListenerError};
//!
//! #[derive(Debug)]
//! enum Ev {
//!     Data(u32),
//!     Error(String),
//! }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Kind {
//!     Data,
//!     Error,
//! }
//!
//! impl std::fmt::Display for Kind {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl EventMap for Ev {
//!     type Kind = Kind;
//!     const ERROR: Kind = Kind::Error;
//!
//!     fn kind(&self) -> Kind {
//!         match self {
//!             Ev::Data(_) => Kind::Data,
//!             Ev::Error(_) => Kind::Error,
//!         }
//!     }
//!
//!     fn from_listener_error(error: ListenerError) -> Self {
//!         Ev::Error(error.to_string())
//!     }
//! }
//!
//! let bus = EventEmitter::<Ev>::new();
//! bus.on(Kind::Data, listener(|ev: &Ev| {
//!     println!("{:?}", ev);
//!     Ok(())
//! }));
//! assert!(bus.emit(&Ev::Data(5)).unwrap());
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use fnv::FnvHashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use thiserror::Error;

/// Default number of listeners per event before a leak warning is logged
pub const DEFAULT_MAX_LISTENERS: usize = 10;

/// Error a listener may return. It is routed to the error listeners, or returned from `emit`.
pub type ListenerError = Box<dyn StdError + Send + Sync + 'static>;

/// A registered callback. Identity (for `off`) is the identity of the `Arc`.
pub type Listener<E> = Arc<dyn Fn(&E) -> Result<(), ListenerError> + Send + Sync + 'static>;

/// Wrap a closure as a [`Listener`](self::Listener)
pub fn listener<E, F>(f: F) -> Listener<E>
where
    F: Fn(&E) -> Result<(), ListenerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Ties an event sum type to the discriminant listeners subscribe to.
pub trait EventMap: Sized {
    /// Discriminant of the event type, one per event name
    type Kind: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// The dedicated error event. Emitting it with no listeners fails.
    const ERROR: Self::Kind;

    /// Discriminant of this event
    fn kind(&self) -> Self::Kind;

    /// Build the error event delivered to error listeners when a listener fails
    fn from_listener_error(error: ListenerError) -> Self;
}

/// Failure of [`EventEmitter::emit`](self::EventEmitter::emit)
#[derive(Debug, Error)]
pub enum EmitError {
    /// The error event was emitted but nobody listens for it
    #[error("Unhandled error: {0}")]
    Unhandled(String),
    /// A listener failed and no error listener was registered
    #[error("Listener for \"{kind}\" failed: {source}")]
    Listener {
        /// Name of the event being emitted
        kind: String,
        /// Error returned by the listener
        source: ListenerError,
    },
}

/// A listener together with its registration metadata
pub struct RawListener<E> {
    /// The callback
    pub listener: Listener<E>,
    /// Whether it is removed after its first invocation
    pub once: bool,
}

struct Registration<E> {
    id: u64,
    callback: Listener<E>,
    once: bool,
}

impl<E> Clone for Registration<E> {
    fn clone(&self) -> Self {
        Registration {
            id: self.id,
            callback: self.callback.clone(),
            once: self.once,
        }
    }
}

type IdList = SmallVec<[u64; 4]>;

/// Event emitter with node-style semantics. All methods take `&self`; the internal lock is
/// released before any listener runs, so listeners may register or remove listeners.
pub struct EventEmitter<E: EventMap> {
    listeners: Mutex<FnvHashMap<E::Kind, Vec<Registration<E>>>>,
    max_listeners: AtomicUsize,
    next_id: AtomicU64,
}

impl<E: EventMap> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EventMap> fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<(E::Kind, usize)> = self
            .listeners
            .lock()
            .iter()
            .map(|(kind, regs)| (*kind, regs.len()))
            .collect();
        f.debug_struct("EventEmitter")
            .field("listeners", &counts)
            .field("max_listeners", &self.max_listeners())
            .finish()
    }
}

impl<E: EventMap> EventEmitter<E> {
    /// Create an emitter with the default listener threshold
    pub fn new() -> Self {
        Self::with_max_listeners(DEFAULT_MAX_LISTENERS)
    }

    /// Create an emitter that warns once more than `max` listeners are added for one event
    pub fn with_max_listeners(max: usize) -> Self {
        EventEmitter {
            listeners: Mutex::new(FnvHashMap::default()),
            max_listeners: AtomicUsize::new(max),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a persistent listener
    pub fn on(&self, kind: E::Kind, listener: Listener<E>) -> &Self {
        self.add(kind, listener, false, false);
        self
    }

    /// Register a listener that is removed after its first invocation
    pub fn once(&self, kind: E::Kind, listener: Listener<E>) -> &Self {
        self.add(kind, listener, true, false);
        self
    }

    /// Register a persistent listener ahead of all existing ones
    pub fn prepend_listener(&self, kind: E::Kind, listener: Listener<E>) -> &Self {
        self.add(kind, listener, false, true);
        self
    }

    /// Register a one-time listener ahead of all existing ones
    pub fn prepend_once_listener(&self, kind: E::Kind, listener: Listener<E>) -> &Self {
        self.add(kind, listener, true, true);
        self
    }

    fn add(&self, kind: E::Kind, callback: Listener<E>, once: bool, prepend: bool) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let max = self.max_listeners();
        let mut map = self.listeners.lock();
        let regs = map.entry(kind).or_default();
        if regs.len() >= max {
            warn!(
                "MaxListenersExceededWarning: Possible memory leak detected. {} {} listeners added.",
                regs.len(),
                kind
            );
        }
        let registration = Registration { id, callback, once };
        if prepend {
            regs.insert(0, registration);
        } else {
            regs.push(registration);
        }
    }

    /// Remove the first registration of `listener` for `kind`
    pub fn off(&self, kind: E::Kind, listener: &Listener<E>) -> &Self {
        let mut map = self.listeners.lock();
        if let Some(regs) = map.get_mut(&kind) {
            if let Some(idx) = regs
                .iter()
                .position(|reg| Arc::ptr_eq(&reg.callback, listener))
            {
                regs.remove(idx);
            }
            if regs.is_empty() {
                map.remove(&kind);
            }
        }
        self
    }

    /// Alias for [`off`](self::EventEmitter::off)
    pub fn remove_listener(&self, kind: E::Kind, listener: &Listener<E>) -> &Self {
        self.off(kind, listener)
    }

    /// Remove every listener of `kind`, or of all kinds when `None`
    pub fn remove_all_listeners(&self, kind: Option<E::Kind>) -> &Self {
        let mut map = self.listeners.lock();
        match kind {
            Some(kind) => {
                map.remove(&kind);
            }
            None => map.clear(),
        }
        self
    }

    /// Number of listeners registered for `kind`
    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.listeners.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Whether any listener is registered for `kind`
    pub fn has_listeners(&self, kind: E::Kind) -> bool {
        self.listener_count(kind) > 0
    }

    /// Copy of the listeners for `kind`, in invocation order
    pub fn listeners(&self, kind: E::Kind) -> Vec<Listener<E>> {
        self.snapshot(kind)
            .into_iter()
            .map(|reg| reg.callback)
            .collect()
    }

    /// Copy of the listeners for `kind` including their `once` flag
    pub fn raw_listeners(&self, kind: E::Kind) -> Vec<RawListener<E>> {
        self.snapshot(kind)
            .into_iter()
            .map(|reg| RawListener {
                listener: reg.callback,
                once: reg.once,
            })
            .collect()
    }

    /// Kinds that currently have listeners
    pub fn event_names(&self) -> Vec<E::Kind> {
        self.listeners.lock().keys().copied().collect()
    }

    /// Change the leak warning threshold
    pub fn set_max_listeners(&self, max: usize) -> &Self {
        self.max_listeners.store(max, Ordering::Relaxed);
        self
    }

    /// Current leak warning threshold
    pub fn max_listeners(&self) -> usize {
        self.max_listeners.load(Ordering::Relaxed)
    }

    fn snapshot(&self, kind: E::Kind) -> Vec<Registration<E>> {
        self.listeners
            .lock()
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    fn remove_ids(&self, kind: E::Kind, ids: &[u64]) {
        if ids.is_empty() {
            return;
        }
        let mut map = self.listeners.lock();
        if let Some(regs) = map.get_mut(&kind) {
            regs.retain(|reg| !ids.contains(&reg.id));
            if regs.is_empty() {
                map.remove(&kind);
            }
        }
    }
}

impl<E: EventMap + fmt::Debug> EventEmitter<E> {
    /// Invoke a snapshot of the listeners for the event's kind, in registration order.
    ///
    /// Returns whether any listener existed. A failing listener is reported to the error
    /// listeners; if there are none, the sweep stops and the failure is returned. One-time
    /// listeners that ran are removed once the sweep ends, whether or not they failed.
    /// Emitting the error event without error listeners always fails.
    pub fn emit(&self, event: &E) -> Result<bool, EmitError> {
        let kind = event.kind();
        let snapshot = self.snapshot(kind);

        if snapshot.is_empty() {
            if kind == E::ERROR {
                return Err(EmitError::Unhandled(format!("{:?}", event)));
            }
            return Ok(false);
        }

        let mut fired_once = IdList::new();
        let mut outcome = Ok(true);
        for reg in &snapshot {
            let result = (reg.callback)(event);
            if reg.once {
                fired_once.push(reg.id);
            }
            if let Err(error) = result {
                if let Err(unhandled) = self.handle_error(kind, error) {
                    outcome = Err(unhandled);
                    break;
                }
            }
        }

        self.remove_ids(kind, &fired_once);
        outcome
    }

    fn handle_error(&self, kind: E::Kind, error: ListenerError) -> Result<(), EmitError> {
        let handlers = self.snapshot(E::ERROR);
        if handlers.is_empty() {
            return Err(EmitError::Listener {
                kind: kind.to_string(),
                source: error,
            });
        }

        let error_event = E::from_listener_error(error);
        let mut fired_once = IdList::new();
        for reg in &handlers {
            if let Err(inner) = (reg.callback)(&error_event) {
                error!("Error in error event handler: {}", inner);
            }
            if reg.once {
                fired_once.push(reg.id);
            }
        }
        self.remove_ids(E::ERROR, &fired_once);
        Ok(())
    }
}
