//! # In-process Event Bus
//!
//! Publish/subscribe keyed by event-type string. `publish` snapshots the
//! subscriber list under a read lock, releases the lock, then runs every
//! subscriber as an independent tokio task. There is no ordering between
//! subscribers, no completion join and no error path back to the publisher, so a
//! slow or failing subscriber never holds up the publisher or its peers.
//!
//! Fan-out is bounded by an `InflightGuard`: once `max_inflight` subscriber tasks
//! are running, further deliveries are dropped and counted.

use std::sync::{Arc, PoisonError, RwLock};
use tokio::runtime::Handle;

use super::event::Event;
use super::inflight_guard::InflightGuard;
use super::registry::{BusHandler, ListenerRegistry};

/// Default ceiling on concurrently running subscriber tasks.
pub const DEFAULT_MAX_INFLIGHT: u64 = 1024;

/// Event-type keyed publish/subscribe hub.
pub struct EventBus {
    registry: RwLock<ListenerRegistry>,
    guard: InflightGuard,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a bus with the default in-flight ceiling.
    pub fn new() -> Self {
        Self::with_max_inflight(DEFAULT_MAX_INFLIGHT)
    }

    /// Creates a bus allowing at most `max_inflight` running subscriber tasks.
    pub fn with_max_inflight(max_inflight: u64) -> Self {
        Self {
            registry: RwLock::new(ListenerRegistry::new()),
            guard: InflightGuard::new(max_inflight),
        }
    }

    /// Appends `handler` to the subscribers of `event_type`. Duplicates are kept.
    pub fn subscribe(&self, event_type: &str, handler: BusHandler) {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(event_type, handler);
        tracing::debug!(event_type, "bus subscriber added");
    }

    /// Removes one registration of this exact handler allocation.
    pub fn unsubscribe(&self, event_type: &str, handler: &BusHandler) -> bool {
        let removed = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(event_type, handler);
        tracing::debug!(event_type, removed, "bus subscriber removal");
        removed
    }

    /// Delivers `event` to every subscriber of `event_type`, each in its own task.
    ///
    /// Returns the number of deliveries started. Never blocks on subscribers.
    /// Called outside a Tokio runtime it starts nothing and returns 0.
    pub fn publish(&self, event_type: &str, event: Arc<Event>) -> usize {
        let handlers = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot(event_type);
        if handlers.is_empty() {
            return 0;
        }
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(event_type, "publish outside a tokio runtime, event dropped");
            return 0;
        };

        let mut started = 0;
        for handler in handlers {
            let Some(permit) = self.guard.try_acquire() else {
                tracing::warn!(
                    event_type,
                    device_id = %event.device_id,
                    in_flight = self.guard.in_flight(),
                    "bus fan-out at capacity, delivery dropped"
                );
                continue;
            };
            let event = Arc::clone(&event);
            runtime.spawn(async move {
                let _permit = permit;
                handler(event).await;
            });
            started += 1;
        }
        started
    }

    /// Number of subscribers for `event_type`.
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .count(event_type)
    }

    /// Subscriber tasks currently running.
    pub fn in_flight(&self) -> u64 {
        self.guard.in_flight()
    }

    /// Deliveries dropped because the fan-out ceiling was reached.
    pub fn dropped(&self) -> u64 {
        self.guard.rejected()
    }
}
