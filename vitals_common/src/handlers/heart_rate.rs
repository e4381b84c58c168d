//! Heart rate in beats per minute, 30 to 220 inclusive.

use async_trait::async_trait;
use std::sync::Arc;

use super::reading::{check_range, integer_field, timestamp_field, user_id_field};
use super::{process_metric, HandlerError, Metric, MetricHandler, Reading, ReadingSink, ValidationError};
use crate::core::{Event, HandlerContext, Processor};
use crate::framing::Payload;

pub const MIN_BPM: i64 = 30;
pub const MAX_BPM: i64 = 220;

pub struct HeartRateHandler {
    sink: Arc<ReadingSink>,
}

impl HeartRateHandler {
    pub fn new(sink: Arc<ReadingSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl MetricHandler for HeartRateHandler {
    fn metric(&self) -> Metric {
        Metric::HeartRate
    }

    fn validate(&self, payload: &Payload) -> Result<Reading, ValidationError> {
        let heart_rate = integer_field(payload, "heart_rate")?;
        check_range("heart_rate", heart_rate as f64, MIN_BPM as f64, MAX_BPM as f64)?;
        let timestamp = timestamp_field(payload)?;
        let user_id = user_id_field(payload)?;
        Ok(Reading::HeartRate {
            user_id,
            heart_rate,
            timestamp,
        })
    }

    fn sink(&self) -> &ReadingSink {
        &self.sink
    }
}

#[async_trait]
impl Processor for HeartRateHandler {
    fn name(&self) -> &str {
        Metric::HeartRate.as_str()
    }

    async fn process(&self, ctx: &HandlerContext, event: &Event) -> Result<(), HandlerError> {
        process_metric(self, ctx, event).await
    }
}
