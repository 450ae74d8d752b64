//! Observer registry.
//!
//! Listeners are called synchronously, in registration order, on the thread
//! that triggers the notification. Dispatch iterates over a snapshot of the
//! list, so a callback may add or remove listeners while being called.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Callback stored in a [`ListenerRegistry`].
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned by [`ListenerRegistry::add`], used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered list of subscriber callbacks.
pub struct ListenerRegistry<T> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
}

impl<T> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl<T> std::fmt::Debug for ListenerRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

impl<T> ListenerRegistry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. It runs after every listener registered before it.
    pub fn add<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries().push((id, Arc::new(callback)));
        id
    }

    /// Deregister a callback. Returns false if the id was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.entries();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Call every registered listener with `value`.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = self.entries().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in snapshot {
            listener(value);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Listener<T>)>> {
        // A panicking listener runs outside the lock, so poisoning never
        // leaves the list half-updated.
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> Box<dyn Fn(&u32) + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = Arc::clone(&log);
            move |name: &'static str| {
                let log = Arc::clone(&log);
                Box::new(move |v: &u32| log.lock().unwrap().push(format!("{name}:{v}")))
                    as Box<dyn Fn(&u32) + Send + Sync>
            }
        };
        (log, make)
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = ListenerRegistry::<u32>::new();
        let (log, make) = recorder();

        registry.add(make("a"));
        registry.add(make("b"));
        registry.add(make("c"));
        registry.notify(&7);

        assert_eq!(*log.lock().unwrap(), vec!["a:7", "b:7", "c:7"]);
    }

    #[test]
    fn test_remove_listener() {
        let registry = ListenerRegistry::<u32>::new();
        let (log, make) = recorder();

        let a = registry.add(make("a"));
        registry.add(make("b"));
        assert!(registry.remove(a));
        assert!(!registry.remove(a));
        registry.notify(&1);

        assert_eq!(*log.lock().unwrap(), vec!["b:1"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_listener_can_deregister_itself() {
        let registry = Arc::new(ListenerRegistry::<u32>::new());
        let calls = Arc::new(AtomicU64::new(0));
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let id = {
            let inner = Arc::clone(&registry);
            let calls = Arc::clone(&calls);
            let slot = Arc::clone(&slot);
            registry.add(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *slot.lock().unwrap() {
                    inner.remove(id);
                }
            })
        };
        *slot.lock().unwrap() = Some(id);

        registry.notify(&1);
        registry.notify(&2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }
}
