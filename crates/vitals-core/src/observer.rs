//! Callback registry used for the vitals and status event streams.
//!
//! Subscribers are kept in registration order. [`Observers::emit`] copies the
//! list before invoking anything, so a callback may subscribe, unsubscribe
//! (itself included) or call back into the client without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// A subscriber callback.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

type Entries<T> = Mutex<Vec<(u64, Callback<T>)>>;

/// Ordered fan-out list of callbacks.
pub struct Observers<T> {
    entries: Arc<Entries<T>>,
    next_id: AtomicU64,
}

impl<T: 'static> std::fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("len", &self.len())
            .finish()
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T: 'static> Observers<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. It receives every event until the returned
    /// [`Subscription`] is unsubscribed.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, Arc::new(callback)));

        let weak: Weak<Entries<T>> = Arc::downgrade(&self.entries);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(entries) = weak.upgrade() {
                    entries
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .retain(|(entry_id, _)| *entry_id != id);
                }
            })),
        }
    }

    /// Deliver an event to every current subscriber, in registration order.
    pub fn emit(&self, event: &T) {
        let callbacks: Vec<Callback<T>> = self
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in callbacks {
            callback(event);
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Callback<T>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle returned by a subscribe call.
///
/// Dropping the handle does NOT unsubscribe; call
/// [`unsubscribe`](Self::unsubscribe) to stop receiving events.
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Remove the callback from its registry. Calling this more than once,
    /// or after the client was dropped, is a no-op.
    pub fn unsubscribe(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }

    /// Whether [`unsubscribe`](Self::unsubscribe) has been called.
    pub fn is_active(&self) -> bool {
        self.remove.is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_fan_out_in_order() {
        let observers = Observers::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b"] {
            let seen = Arc::clone(&seen);
            observers.subscribe(move |v: &u32| seen.lock().unwrap().push(format!("{tag}{v}")));
        }

        observers.emit(&1);
        observers.emit(&2);

        assert_eq!(*seen.lock().unwrap(), vec!["a1", "b1", "a2", "b2"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let observers = Observers::<u32>::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        let mut sub = observers.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        observers.emit(&1);
        sub.unsubscribe();
        observers.emit(&2);
        sub.unsubscribe();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!sub.is_active());
        assert!(observers.is_empty());
    }

    #[test]
    fn test_unsubscribe_during_emit_is_safe() {
        let observers = Arc::new(Observers::<u32>::new());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let count = Arc::new(AtomicUsize::new(0));

        let slot_inner = Arc::clone(&slot);
        let counter = Arc::clone(&count);
        let sub = observers.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(mut sub) = slot_inner.lock().unwrap().take() {
                sub.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(sub);

        let other = Arc::new(AtomicUsize::new(0));
        let other_counter = Arc::clone(&other);
        observers.subscribe(move |_| {
            other_counter.fetch_add(1, Ordering::SeqCst);
        });

        observers.emit(&1);
        observers.emit(&2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 2);
        assert_eq!(observers.len(), 1);
    }

    #[test]
    fn test_drop_keeps_subscription() {
        let observers = Observers::<u32>::new();
        drop(observers.subscribe(|_| {}));
        assert_eq!(observers.len(), 1);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let observers = Observers::<u32>::new();
        let mut sub = observers.subscribe(|_| {});
        drop(observers);
        sub.unsubscribe();
    }

    #[test]
    fn test_debug_reports_len() {
        let observers = Observers::<String>::new();
        observers.subscribe(|_| {});
        observers.subscribe(|_| {});
        assert_eq!(format!("{observers:?}"), "Observers { len: 2 }");
    }
}
