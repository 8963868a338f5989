//! Change Notification Bus
//!
//! Three independent observer registries, one per kind of change:
//!
//! | Registry      | Callbacks                     |
//! |---------------|-------------------------------|
//! | favourites    | `added`, `removed`            |
//! | server list   | `on_success`, `on_error`      |
//! | server change | `on_server_changed`           |
//!
//! Listeners are notified synchronously, in registration order, on the
//! thread that made the change. The registry lock is released before any
//! callback runs, so a listener may add or remove listeners or query the
//! repository from inside its callback.

use crate::api::ServerListError;
use crate::model::Server;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Favourites were changed by the user
pub trait FavouriteServersListener: Send + Sync {
    fn added(&self, server: &Server);
    fn removed(&self, server: &Server);
}

/// Result of a server-list refresh
pub trait ServerListUpdatedListener: Send + Sync {
    /// `servers` is the list for the active protocol
    fn on_success(&self, servers: &[Server], is_forced: bool);
    fn on_error(&self, error: &ServerListError);
}

/// The selected server (or fastest-server mode) changed.
///
/// Carries no payload; listeners re-query the repository.
pub trait ServerChangedListener: Send + Sync {
    fn on_server_changed(&self);
}

/// Ordered list of subscribers
///
/// Duplicates are kept: a listener added twice is notified twice.
pub struct ListenerRegistry<L: ?Sized> {
    listeners: Mutex<Vec<Arc<L>>>,
}

impl<L: ?Sized> ListenerRegistry<L> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<L>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, listener: Arc<L>) {
        self.lock().push(listener);
    }

    /// Remove the first registration of `listener`.
    ///
    /// Returns `false` if it was not registered.
    pub fn remove(&self, listener: &Arc<L>) -> bool {
        let mut listeners = self.lock();
        match listeners
            .iter()
            .position(|l| std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)))
        {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Call `f` for every listener, outside the registry lock
    pub fn notify<F>(&self, f: F)
    where
        F: Fn(&L),
    {
        let snapshot: Vec<Arc<L>> = self.lock().clone();
        for listener in &snapshot {
            f(listener);
        }
    }
}

impl<L: ?Sized> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// The three registries owned by the repository
#[derive(Default)]
pub struct ChangeBus {
    pub favourites: ListenerRegistry<dyn FavouriteServersListener>,
    pub server_list: ListenerRegistry<dyn ServerListUpdatedListener>,
    pub server_changed: ListenerRegistry<dyn ServerChangedListener>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn favourite_added(&self, server: &Server) {
        self.favourites.notify(|l| l.added(server));
    }

    pub(crate) fn favourite_removed(&self, server: &Server) {
        self.favourites.notify(|l| l.removed(server));
    }

    pub(crate) fn server_list_updated(&self, servers: &[Server], is_forced: bool) {
        self.server_list.notify(|l| l.on_success(servers, is_forced));
    }

    pub(crate) fn server_list_failed(&self, error: &ServerListError) {
        self.server_list.notify(|l| l.on_error(error));
    }

    pub(crate) fn server_changed(&self) {
        self.server_changed.notify(|l| l.on_server_changed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        id: usize,
        log: Arc<Mutex<Vec<usize>>>,
    }

    impl ServerChangedListener for Counter {
        fn on_server_changed(&self) {
            self.log.lock().unwrap().push(self.id);
        }
    }

    #[test]
    fn test_notification_order_and_duplicates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = ChangeBus::new();

        let first: Arc<dyn ServerChangedListener> = Arc::new(Counter { id: 1, log: log.clone() });
        let second: Arc<dyn ServerChangedListener> = Arc::new(Counter { id: 2, log: log.clone() });

        bus.server_changed.add(first.clone());
        bus.server_changed.add(second.clone());
        bus.server_changed.add(first.clone());
        bus.server_changed();

        assert_eq!(*log.lock().unwrap(), vec![1, 2, 1]);
    }

    #[test]
    fn test_remove_first_registration() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry: ListenerRegistry<dyn ServerChangedListener> = ListenerRegistry::new();

        let first: Arc<dyn ServerChangedListener> = Arc::new(Counter { id: 1, log: log.clone() });
        let second: Arc<dyn ServerChangedListener> = Arc::new(Counter { id: 2, log: log.clone() });

        registry.add(first.clone());
        registry.add(second.clone());
        registry.add(first.clone());

        assert!(registry.remove(&first));
        assert_eq!(registry.len(), 2);
        registry.notify(|l| l.on_server_changed());
        assert_eq!(*log.lock().unwrap(), vec![2, 1]);

        assert!(registry.remove(&first));
        assert!(!registry.remove(&first));
    }

    struct SelfRemoving {
        registry: Arc<ListenerRegistry<dyn ServerChangedListener>>,
        me: Mutex<Option<Arc<dyn ServerChangedListener>>>,
        calls: AtomicUsize,
    }

    impl ServerChangedListener for SelfRemoving {
        fn on_server_changed(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(me) = self.me.lock().unwrap().take() {
                self.registry.remove(&me);
            }
        }
    }

    #[test]
    fn test_listener_can_mutate_registry() {
        let registry: Arc<ListenerRegistry<dyn ServerChangedListener>> =
            Arc::new(ListenerRegistry::new());
        let listener = Arc::new(SelfRemoving {
            registry: registry.clone(),
            me: Mutex::new(None),
            calls: AtomicUsize::new(0),
        });
        let handle: Arc<dyn ServerChangedListener> = listener.clone();
        *listener.me.lock().unwrap() = Some(handle.clone());
        registry.add(handle);

        registry.notify(|l| l.on_server_changed());
        registry.notify(|l| l.on_server_changed());

        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }
}
