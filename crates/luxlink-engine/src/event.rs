//! Change-notification signals.
//!
//! Integrations announce decoded state changes through [`Signal`]s: an
//! explicit observer list where subscribing returns a [`Subscription`]
//! handle that can later be passed back to unsubscribe. Emission takes a
//! snapshot of the observer list before invoking anything, so an observer
//! may subscribe, unsubscribe or send commands without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Handle identifying one observer of a [`Signal`].
///
/// Dropping the handle does not unsubscribe; pass it back to
/// [`Signal::unsubscribe`] (or let the signal itself be dropped).
#[derive(Debug)]
pub struct Subscription {
    id: u64,
}

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// An observable event carrying values of type `T`.
pub struct Signal<T> {
    observers: Mutex<Vec<(u64, Observer<T>)>>,
    next_id: AtomicU64,
}

impl<T> Signal<T> {
    /// Create a signal with no observers.
    pub fn new() -> Self {
        Signal {
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register an observer. The returned handle identifies it for
    /// [`Signal::unsubscribe`].
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(observer)));
        Subscription { id }
    }

    /// Remove a previously registered observer. No-op if it was already
    /// removed.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(id, _)| *id != subscription.id);
    }

    /// Invoke every current observer with `value`.
    pub fn emit(&self, value: &T) {
        // Snapshot first so observers can touch the signal re-entrantly.
        let snapshot: Vec<Observer<T>> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in snapshot {
            observer(value);
        }
    }

    /// Get the number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Signal::new()
    }
}
