//! Shared fixtures for the cross-crate integration tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vitals_common::connections::{MemoryCache, MemoryRecordStore};
use vitals_common::core::{
    DispatchConfig, Dispatcher, Event, EventBus, HandlerContext, Pipeline, Processor,
};
use vitals_common::framing::{Payload, encode_frame, encode_payload};
use vitals_common::handlers::{HandlerError, ReadingSink, standard_processors};

/// Processor remembering every event it saw.
#[derive(Default)]
pub struct RecordingProcessor {
    seen: Mutex<Vec<Event>>,
}

impl RecordingProcessor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.events().len()
    }
}

#[async_trait]
impl Processor for RecordingProcessor {
    fn name(&self) -> &str {
        "recording"
    }

    async fn process(&self, _ctx: &HandlerContext, event: &Event) -> Result<(), HandlerError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(event.clone());
        }
        Ok(())
    }
}

/// A full ingestion stack over in-memory stores.
pub struct Harness {
    pub cache: Arc<MemoryCache>,
    pub store: Arc<MemoryRecordStore>,
    pub sink: Arc<ReadingSink>,
    pub bus: Arc<EventBus>,
    pub recorder: Arc<RecordingProcessor>,
    pub dispatcher: Arc<Dispatcher>,
    pub cancel: CancellationToken,
}

impl Harness {
    /// Four metric handlers plus a recorder, fronted by a default dispatcher.
    pub fn new() -> Self {
        let cache = Arc::new(MemoryCache::new());
        let store = Arc::new(MemoryRecordStore::new());
        let sink = Arc::new(ReadingSink::new(cache.clone(), store.clone()));
        let bus = Arc::new(EventBus::new());
        let recorder = RecordingProcessor::new();
        let cancel = CancellationToken::new();

        let mut pipeline = Pipeline::new(Some(bus.clone()), cancel.clone());
        for processor in standard_processors(sink.clone()) {
            pipeline.register_processor(processor);
        }
        pipeline.register_processor(recorder.clone());

        let dispatcher = Dispatcher::spawn(Arc::new(pipeline), DispatchConfig::default(), cancel.clone());

        Self {
            cache,
            store,
            sink,
            bus,
            recorder,
            dispatcher,
            cancel,
        }
    }

    /// Waits until the recorder has seen `n` events, or gives up after two seconds.
    pub async fn wait_for_events(&self, n: usize) -> Vec<Event> {
        wait_until(|| self.recorder.count() >= n).await;
        self.recorder.events()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Polls `done` every 10 ms for up to two seconds.
pub async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..200 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// `json!` object literal as a payload map.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// A complete wire frame carrying `value` as MessagePack.
pub fn msgpack_frame(value: Value) -> Vec<u8> {
    let bytes = encode_payload(&payload(value)).expect("encodable payload");
    encode_frame(&bytes).expect("payload fits in a frame").to_vec()
}
