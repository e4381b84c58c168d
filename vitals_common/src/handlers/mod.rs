//! # Metric Handlers
//!
//! One handler per metric. Each validates its payload into a typed `Reading`
//! and passes it to the shared `ReadingSink`. Handlers also act as pipeline
//! processors: `process` ignores events of other types and runs `handle` for
//! its own.

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::{Event, HandlerContext, Processor};
use crate::framing::Payload;

pub mod blood_pressure;
pub mod error;
pub mod heart_rate;
pub mod reading;
pub mod sink;
pub mod spo2;
pub mod temperature;

pub use blood_pressure::BloodPressureHandler;
pub use error::{HandlerError, ValidationError};
pub use heart_rate::HeartRateHandler;
pub use reading::{Metric, Reading};
pub use sink::{cache_key, ReadingSink, CACHE_TTL};
pub use spo2::Spo2Handler;
pub use temperature::TemperatureHandler;

/// Validation and handling for a single metric.
#[async_trait]
pub trait MetricHandler: Send + Sync {
    /// The metric, which is also the event type this handler owns.
    fn metric(&self) -> Metric;

    /// Decodes and range-checks `payload`.
    fn validate(&self, payload: &Payload) -> Result<Reading, ValidationError>;

    /// Where validated readings go.
    fn sink(&self) -> &ReadingSink;

    /// Validates `event` and stores the reading.
    async fn handle(&self, ctx: &HandlerContext, event: &Event) -> Result<(), HandlerError> {
        let metric = self.metric();
        if event.event_type != metric.as_str() {
            return Err(HandlerError::WrongEventType {
                expected: metric.as_str(),
                actual: event.event_type.clone(),
            });
        }
        ctx.check()?;
        let reading = self.validate(&event.payload)?;
        self.sink().accept(ctx, event, &reading).await?;
        Ok(())
    }
}

/// Processor entry shared by all metric handlers.
pub(crate) async fn process_metric<H>(handler: &H, ctx: &HandlerContext, event: &Event) -> Result<(), HandlerError>
where
    H: MetricHandler + ?Sized,
{
    if event.event_type != handler.metric().as_str() {
        return Ok(());
    }
    handler.handle(ctx, event).await
}

/// The four metric handlers sharing one sink, ready for `register_processor`.
pub fn standard_processors(sink: Arc<ReadingSink>) -> Vec<Arc<dyn Processor>> {
    vec![
        Arc::new(HeartRateHandler::new(Arc::clone(&sink))),
        Arc::new(BloodPressureHandler::new(Arc::clone(&sink))),
        Arc::new(Spo2Handler::new(Arc::clone(&sink))),
        Arc::new(TemperatureHandler::new(sink)),
    ]
}
