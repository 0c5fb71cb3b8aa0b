//! Connection state-change notifications.
//!
//! Drivers raise a [`StateChangeEvent`] whenever a connection moves between
//! states. [`StateChangeHandlers`] is a small listener registry drivers and
//! decorators can both embed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::driver::connection::ConnectionState;

/// A change of connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChangeEvent {
    /// State before the change.
    pub original: ConnectionState,
    /// State after the change.
    pub current: ConnectionState,
}

impl StateChangeEvent {
    pub fn new(original: ConnectionState, current: ConnectionState) -> Self {
        Self { original, current }
    }
}

/// A registered state-change callback.
pub type StateChangeListener = Arc<dyn Fn(&StateChangeEvent) + Send + Sync>;

/// Handle returned on registration, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Registry of state-change listeners.
#[derive(Default)]
pub struct StateChangeHandlers {
    listeners: Mutex<Vec<(ListenerId, StateChangeListener)>>,
}

impl StateChangeHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn add(&self, listener: StateChangeListener) -> ListenerId {
        let id = ListenerId::next();
        self.listeners.lock().push((id, listener));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    /// Invoke every registered listener with `event`.
    ///
    /// Listeners are called outside the registry lock, so a listener may
    /// register or remove listeners itself.
    pub fn raise(&self, event: &StateChangeEvent) {
        let listeners: Vec<StateChangeListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(event);
        }
    }

    /// Get the number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A listener that re-raises every event it receives on `handlers`.
    pub(crate) fn forwarder(handlers: &Arc<Self>) -> StateChangeListener {
        let forward = Arc::clone(handlers);
        Arc::new(move |event: &StateChangeEvent| {
            trace!(
                original = %event.original,
                current = %event.current,
                "connection state changed"
            );
            forward.raise(event);
        })
    }
}

impl std::fmt::Debug for StateChangeHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateChangeHandlers")
            .field("listeners", &self.len())
            .finish()
    }
}
