//! # Processing Pipeline
//!
//! Composes the event bus and an ordered processor chain. `receive_event` first
//! publishes the event on the bus (non-blocking fan-out), then runs every
//! registered processor in registration order, awaiting each one. A processor
//! failure is logged and the chain continues with the next processor.
//!
//! Processors observe a `HandlerContext` carrying the shutdown token; a
//! processor that sees cancellation stops early and returns
//! `HandlerError::Cancelled`.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::event::Event;
use super::event_bus::EventBus;
use super::registry::{listener, BusHandler};
use crate::handlers::HandlerError;

/// Per-invocation context handed to processors.
#[derive(Debug, Clone, Default)]
pub struct HandlerContext {
    cancel: CancellationToken,
}

impl HandlerContext {
    /// Context bound to `cancel`.
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Whether shutdown was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns `Err(HandlerError::Cancelled)` once shutdown was requested.
    pub fn check(&self) -> Result<(), HandlerError> {
        if self.cancel.is_cancelled() {
            Err(HandlerError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// The underlying token, for `select!` against long operations.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// A step of the processor chain.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Handles one event. Events the processor does not care about return `Ok(())`.
    async fn process(&self, ctx: &HandlerContext, event: &Event) -> Result<(), HandlerError>;
}

/// Bus plus ordered processors.
pub struct Pipeline {
    processors: Vec<Arc<dyn Processor>>,
    bus: Option<Arc<EventBus>>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Creates an empty pipeline. Without a bus only the processor chain runs.
    pub fn new(bus: Option<Arc<EventBus>>, cancel: CancellationToken) -> Self {
        Self {
            processors: Vec::new(),
            bus,
            cancel,
        }
    }

    /// Appends a processor. Registering the same processor twice runs it twice.
    pub fn register_processor(&mut self, processor: Arc<dyn Processor>) {
        tracing::debug!(processor = processor.name(), "processor registered");
        self.processors.push(processor);
    }

    /// Number of registered processors.
    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    /// The bus this pipeline publishes to, if any.
    pub fn bus(&self) -> Option<&Arc<EventBus>> {
        self.bus.as_ref()
    }

    /// Publishes `event` on the bus, then runs the processor chain sequentially.
    pub async fn receive_event(&self, event: Event) {
        let event = Arc::new(event);

        if let Some(bus) = &self.bus {
            bus.publish(&event.event_type, Arc::clone(&event));
        }

        let ctx = HandlerContext::new(self.cancel.clone());
        for processor in &self.processors {
            if let Err(e) = processor.process(&ctx, &event).await {
                match e {
                    HandlerError::Cancelled => tracing::debug!(
                        processor = processor.name(),
                        event_type = %event.event_type,
                        "processor stopped by shutdown"
                    ),
                    e => tracing::error!(
                        processor = processor.name(),
                        event_type = %event.event_type,
                        device_id = %event.device_id,
                        source = %event.source,
                        error = %e,
                        "processor failed"
                    ),
                }
            }
        }
    }
}

/// Adapts a processor into a bus subscriber.
///
/// Errors are logged since the bus has no path to report them.
pub fn processor_listener(processor: Arc<dyn Processor>, cancel: CancellationToken) -> BusHandler {
    listener(move |event: Arc<Event>| {
        let processor = Arc::clone(&processor);
        let ctx = HandlerContext::new(cancel.clone());
        async move {
            if let Err(e) = processor.process(&ctx, &event).await {
                tracing::warn!(
                    processor = processor.name(),
                    event_type = %event.event_type,
                    error = %e,
                    "bus processor failed"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::Source;
    use serde_json::Map;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Recorder {
        name: String,
        seen: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl Processor for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn process(&self, ctx: &HandlerContext, event: &Event) -> Result<(), HandlerError> {
            ctx.check()?;
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, event.event_type));
            if self.fail {
                return Err(HandlerError::Store(crate::connections::StoreError::Cache(
                    "boom".to_string(),
                )));
            }
            Ok(())
        }
    }

    fn recorder(name: &str, seen: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<dyn Processor> {
        Arc::new(Recorder {
            name: name.to_string(),
            seen: Arc::clone(seen),
            fail,
        })
    }

    fn event(event_type: &str) -> Event {
        Event::new("dev-1", event_type, Map::new(), Source::Mqtt)
    }

    #[tokio::test]
    async fn processors_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new(None, CancellationToken::new());
        pipeline.register_processor(recorder("first", &seen, false));
        pipeline.register_processor(recorder("second", &seen, false));

        pipeline.receive_event(event("spo2")).await;

        assert_eq!(*seen.lock().unwrap(), vec!["first:spo2", "second:spo2"]);
    }

    #[tokio::test]
    async fn failing_processor_does_not_stop_the_chain() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new(None, CancellationToken::new());
        pipeline.register_processor(recorder("bad", &seen, true));
        pipeline.register_processor(recorder("good", &seen, false));

        pipeline.receive_event(event("temperature")).await;

        assert_eq!(*seen.lock().unwrap(), vec!["bad:temperature", "good:temperature"]);
    }

    #[tokio::test]
    async fn duplicate_registration_runs_twice() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let processor = recorder("p", &seen, false);
        let mut pipeline = Pipeline::new(None, CancellationToken::new());
        pipeline.register_processor(Arc::clone(&processor));
        pipeline.register_processor(processor);

        pipeline.receive_event(event("heart_rate")).await;

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cancelled_context_skips_work() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let mut pipeline = Pipeline::new(None, cancel.clone());
        pipeline.register_processor(recorder("p", &seen, false));

        cancel.cancel();
        pipeline.receive_event(event("heart_rate")).await;

        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bus_subscribers_see_the_event() {
        let bus = Arc::new(EventBus::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe(
            "blood_pressure",
            listener(move |event: Arc<Event>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(event.device_id.clone());
                }
            }),
        );
        let pipeline = Pipeline::new(Some(bus), CancellationToken::new());

        pipeline.receive_event(event("blood_pressure")).await;

        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, "dev-1");
    }

    #[tokio::test]
    async fn processor_can_subscribe_to_the_bus() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::new();
        bus.subscribe(
            "spo2",
            processor_listener(recorder("sub", &seen, false), CancellationToken::new()),
        );

        bus.publish("spo2", Arc::new(event("spo2")));

        for _ in 0..50 {
            if !seen.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*seen.lock().unwrap(), vec!["sub:spo2"]);
    }
}
