//! Listener registries.
//!
//! [`ListenerRegistry`] maps listener identity (the `Arc` allocation) to its
//! current filter and dispatches each inbound message, in registration order,
//! on the reader task. [`StateListenerRegistry`] is the analogous observer
//! set for lifecycle transitions.
//!
//! Locking discipline: the entries lock is only held while reading or
//! mutating the entry list, never while invoking a listener — a listener may
//! re-enter `add`/`remove` without deadlocking. Dispatch therefore sees a
//! consistent snapshot of the registrations taken at the start of the pass.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::filter::MessageFilter;
use crate::message::Message;

use super::state::ConnectionState;

/// Observer of inbound messages.
///
/// Invoked synchronously on the connection's reader task for every message
/// accepted by the filter the listener was registered with. A panicking
/// listener is contained and logged; it does not disturb other listeners or
/// the connection.
pub trait MessageListener: Send + Sync {
    /// Called for each accepted message, in arrival order.
    fn on_message(&self, message: &Message);
}

impl<F> MessageListener for F
where
    F: Fn(&Message) + Send + Sync,
{
    fn on_message(&self, message: &Message) {
        self(message)
    }
}

/// Observer of connection lifecycle transitions.
pub trait ConnectionStateListener: Send + Sync {
    /// Called once per committed transition, on the task that performed it.
    fn on_state_change(&self, old: ConnectionState, new: ConnectionState);
}

impl<F> ConnectionStateListener for F
where
    F: Fn(ConnectionState, ConnectionState) + Send + Sync,
{
    fn on_state_change(&self, old: ConnectionState, new: ConnectionState) {
        self(old, new)
    }
}

/// Listener identity is the `Arc` allocation, not the value inside it.
fn same_allocation<T: ?Sized, U: ?Sized>(a: &Arc<T>, b: &Arc<U>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

struct ListenerEntry {
    filter: MessageFilter,
    listener: Arc<dyn MessageListener>,
}

/// Registry of message listeners and their filters.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    entries: Mutex<Vec<ListenerEntry>>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `listener` under `filter`. Re-registering an already-known
    /// listener replaces its filter in place (keeping its dispatch position)
    /// instead of creating a second entry.
    pub(crate) fn add(&self, filter: MessageFilter, listener: Arc<dyn MessageListener>) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries
            .iter_mut()
            .find(|e| same_allocation(&e.listener, &listener))
        {
            entry.filter = filter;
        } else {
            entries.push(ListenerEntry { filter, listener });
        }
    }

    /// Remove `listener` if registered; a no-op otherwise.
    pub(crate) fn remove(&self, listener: &Arc<dyn MessageListener>) {
        self.entries
            .lock()
            .retain(|e| !same_allocation(&e.listener, listener));
    }

    /// Dispatch `message` to every listener whose filter accepts it, in
    /// registration order, on the calling task.
    pub(crate) fn dispatch(&self, message: &Message) {
        let snapshot: Vec<(MessageFilter, Arc<dyn MessageListener>)> = self
            .entries
            .lock()
            .iter()
            .map(|e| (e.filter.clone(), Arc::clone(&e.listener)))
            .collect();

        for (filter, listener) in snapshot {
            if !filter.matches(message) {
                continue;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.on_message(message)));
            if outcome.is_err() {
                error!(command = %message.command, "message listener panicked during dispatch");
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Registry of connection-state observers.
#[derive(Default)]
pub(crate) struct StateListenerRegistry {
    entries: Mutex<Vec<Arc<dyn ConnectionStateListener>>>,
}

impl StateListenerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, listener: Arc<dyn ConnectionStateListener>) {
        let mut entries = self.entries.lock();
        if !entries.iter().any(|e| same_allocation(e, &listener)) {
            entries.push(listener);
        }
    }

    pub(crate) fn remove(&self, listener: &Arc<dyn ConnectionStateListener>) {
        self.entries.lock().retain(|e| !same_allocation(e, listener));
    }

    /// Notify every observer of a committed transition, in registration
    /// order.
    pub(crate) fn notify(&self, old: ConnectionState, new: ConnectionState) {
        let snapshot: Vec<Arc<dyn ConnectionStateListener>> =
            self.entries.lock().iter().map(Arc::clone).collect();

        for listener in snapshot {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| listener.on_state_change(old, new)));
            if outcome.is_err() {
                error!(%old, %new, "state listener panicked during notification");
            }
        }
    }
}
