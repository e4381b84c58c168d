//! # Bounded Event Dispatcher
//!
//! Sits between the transport adapters and the `Pipeline`. Adapters hand events
//! to `dispatch`, which enqueues them on a bounded channel. A single router task
//! drains the channel and runs `Pipeline::receive_event` for each event on its
//! own task, with at most `max_inflight` such tasks alive at once.
//!
//! ## Backpressure:
//!
//! - **`OverflowPolicy::Drop`**: a full queue drops the event, logs a warning
//!   and bumps the `dropped` counter. Adapters never stall.
//! - **`OverflowPolicy::Block`**: a full queue makes `dispatch` wait for space,
//!   which in turn slows the adapter reading from its socket or broker.
//!
//! Cancelling the token stops the router; queued events are discarded and
//! in-flight pipeline runs finish on their own.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use super::event::Event;
use super::pipeline::Pipeline;

/// What `dispatch` does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Drop the event and count it.
    #[default]
    Drop,
    /// Wait for queue space.
    Block,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(OverflowPolicy::Drop),
            "block" => Ok(OverflowPolicy::Block),
            other => Err(format!("unknown overflow policy '{other}', expected drop or block")),
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverflowPolicy::Drop => "drop",
            OverflowPolicy::Block => "block",
        })
    }
}

/// Queue and concurrency limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Events that may wait for a pipeline slot.
    pub queue_capacity: usize,
    /// Pipeline runs allowed at the same time.
    pub max_inflight: usize,
    /// Full-queue behaviour.
    pub overflow: OverflowPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_inflight: 256,
            overflow: OverflowPolicy::Drop,
        }
    }
}

/// Front door of the pipeline for all adapters.
pub struct Dispatcher {
    tx: mpsc::Sender<Event>,
    overflow: OverflowPolicy,
    dropped: AtomicU64,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Starts the router task and returns the shared handle.
    ///
    /// Zero limits are raised to one.
    pub fn spawn(
        pipeline: Arc<Pipeline>,
        config: DispatchConfig,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let slots = Arc::new(Semaphore::new(config.max_inflight.max(1)));

        tokio::spawn(route(rx, pipeline, slots, cancel.clone()));
        tracing::info!(
            queue_capacity = config.queue_capacity,
            max_inflight = config.max_inflight,
            overflow = %config.overflow,
            "dispatcher started"
        );

        Arc::new(Self {
            tx,
            overflow: config.overflow,
            dropped: AtomicU64::new(0),
            cancel,
        })
    }

    /// Enqueues `event`. Returns `false` if it was dropped or the dispatcher stopped.
    pub async fn dispatch(&self, event: Event) -> bool {
        match self.overflow {
            OverflowPolicy::Drop => match self.tx.try_send(event) {
                Ok(()) => true,
                Err(TrySendError::Full(event)) => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        event_type = %event.event_type,
                        device_id = %event.device_id,
                        source = %event.source,
                        dropped,
                        "dispatch queue full, event dropped"
                    );
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            },
            OverflowPolicy::Block => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => false,
                sent = self.tx.send(event) => sent.is_ok(),
            },
        }
    }

    /// Events dropped under `OverflowPolicy::Drop`.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn route(
    mut rx: mpsc::Receiver<Event>,
    pipeline: Arc<Pipeline>,
    slots: Arc<Semaphore>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(event) => event,
                None => break,
            },
        };

        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            let _permit = permit;
            pipeline.receive_event(event).await;
        });
    }
    tracing::info!("dispatcher router stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::Source;
    use crate::core::pipeline::{HandlerContext, Processor};
    use crate::handlers::HandlerError;
    use async_trait::async_trait;
    use serde_json::Map;
    use std::time::Duration;

    struct Forward(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl Processor for Forward {
        fn name(&self) -> &str {
            "forward"
        }

        async fn process(&self, _ctx: &HandlerContext, event: &Event) -> Result<(), HandlerError> {
            let _ = self.0.send(event.device_id.clone());
            Ok(())
        }
    }

    fn event(device_id: &str) -> Event {
        Event::new(device_id, "heart_rate", Map::new(), Source::Msgpack)
    }

    fn forwarding_pipeline() -> (Arc<Pipeline>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut pipeline = Pipeline::new(None, CancellationToken::new());
        pipeline.register_processor(Arc::new(Forward(tx)));
        (Arc::new(pipeline), rx)
    }

    #[test]
    fn overflow_policy_parses() {
        assert_eq!("drop".parse::<OverflowPolicy>(), Ok(OverflowPolicy::Drop));
        assert_eq!(" Block ".parse::<OverflowPolicy>(), Ok(OverflowPolicy::Block));
        assert!("spill".parse::<OverflowPolicy>().is_err());
    }

    #[tokio::test]
    async fn dispatched_events_reach_the_pipeline() {
        let (pipeline, mut rx) = forwarding_pipeline();
        let dispatcher = Dispatcher::spawn(pipeline, DispatchConfig::default(), CancellationToken::new());

        assert!(dispatcher.dispatch(event("a")).await);
        assert!(dispatcher.dispatch(event("b")).await);

        let mut got = Vec::new();
        for _ in 0..2 {
            got.push(tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap());
        }
        got.sort();
        assert_eq!(got, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn full_queue_drops_under_drop_policy() {
        let (pipeline, _rx) = forwarding_pipeline();
        let config = DispatchConfig {
            queue_capacity: 1,
            max_inflight: 1,
            overflow: OverflowPolicy::Drop,
        };
        let dispatcher = Dispatcher::spawn(pipeline, config, CancellationToken::new());

        // The current-thread test runtime does not run the router between these calls.
        assert!(dispatcher.dispatch(event("kept")).await);
        assert!(!dispatcher.dispatch(event("lost")).await);
        assert_eq!(dispatcher.dropped(), 1);
    }

    #[tokio::test]
    async fn block_policy_waits_for_space() {
        let (pipeline, mut rx) = forwarding_pipeline();
        let config = DispatchConfig {
            queue_capacity: 1,
            max_inflight: 1,
            overflow: OverflowPolicy::Block,
        };
        let dispatcher = Dispatcher::spawn(pipeline, config, CancellationToken::new());

        for id in ["1", "2", "3"] {
            assert!(dispatcher.dispatch(event(id)).await);
        }
        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        }
        assert_eq!(dispatcher.dropped(), 0);
    }

    #[tokio::test]
    async fn cancelled_dispatcher_refuses_blocking_sends() {
        let (pipeline, _rx) = forwarding_pipeline();
        let cancel = CancellationToken::new();
        let config = DispatchConfig {
            overflow: OverflowPolicy::Block,
            ..DispatchConfig::default()
        };
        let dispatcher = Dispatcher::spawn(pipeline, config, cancel.clone());

        cancel.cancel();
        assert!(!dispatcher.dispatch(event("late")).await);
    }
}
