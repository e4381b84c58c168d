//! # Listener Registry
//!
//! Event-type keyed handler lists for the `EventBus`. Order of registration is
//! preserved per key and duplicates are kept. Removal is by identity: only the
//! exact `Arc` allocation that was registered matches, two closures with the
//! same body do not.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::event::Event;

/// A subscriber callback. The returned future runs as its own task.
pub type BusHandler = Arc<dyn Fn(Arc<Event>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wraps an async closure into a `BusHandler`.
///
/// Keep the returned `Arc` if the handler may need to be unsubscribed later.
pub fn listener<F, Fut>(f: F) -> BusHandler
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |event| f(event).boxed())
}

/// Mapping of event type to its ordered subscribers.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: HashMap<String, Vec<BusHandler>>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the list for `event_type`.
    pub fn add(&mut self, event_type: &str, handler: BusHandler) {
        self.listeners
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
    }

    /// Removes the first entry that is the same allocation as `handler`.
    ///
    /// Drops the key once its list is empty. Returns `true` if an entry was removed.
    pub fn remove(&mut self, event_type: &str, handler: &BusHandler) -> bool {
        let Some(handlers) = self.listeners.get_mut(event_type) else {
            return false;
        };
        let removed = match handlers.iter().position(|h| Arc::ptr_eq(h, handler)) {
            Some(index) => {
                handlers.remove(index);
                true
            }
            None => false,
        };
        if handlers.is_empty() {
            self.listeners.remove(event_type);
        }
        removed
    }

    /// Cheap copy of the current handler list for `event_type`.
    pub fn snapshot(&self, event_type: &str) -> Vec<BusHandler> {
        self.listeners
            .get(event_type)
            .map(|handlers| handlers.to_vec())
            .unwrap_or_default()
    }

    /// Number of handlers registered under `event_type`.
    pub fn count(&self, event_type: &str) -> usize {
        self.listeners.get(event_type).map_or(0, Vec::len)
    }

    /// Whether any handler list exists for `event_type`.
    pub fn contains(&self, event_type: &str) -> bool {
        self.listeners.contains_key(event_type)
    }
}
