//! Blood oxygen saturation, 70 to 100 percent.

use async_trait::async_trait;
use std::sync::Arc;

use super::reading::{check_range, integer_field, timestamp_field, user_id_field};
use super::{process_metric, HandlerError, Metric, MetricHandler, Reading, ReadingSink, ValidationError};
use crate::core::{Event, HandlerContext, Processor};
use crate::framing::Payload;

pub const MIN_SPO2: i64 = 70;
pub const MAX_SPO2: i64 = 100;

pub struct Spo2Handler {
    sink: Arc<ReadingSink>,
}

impl Spo2Handler {
    pub fn new(sink: Arc<ReadingSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl MetricHandler for Spo2Handler {
    fn metric(&self) -> Metric {
        Metric::Spo2
    }

    fn validate(&self, payload: &Payload) -> Result<Reading, ValidationError> {
        let spo2 = integer_field(payload, "spo2")?;
        check_range("spo2", spo2 as f64, MIN_SPO2 as f64, MAX_SPO2 as f64)?;
        let timestamp = timestamp_field(payload)?;
        let user_id = user_id_field(payload)?;
        Ok(Reading::Spo2 {
            user_id,
            spo2,
            timestamp,
        })
    }

    fn sink(&self) -> &ReadingSink {
        &self.sink
    }
}

#[async_trait]
impl Processor for Spo2Handler {
    fn name(&self) -> &str {
        Metric::Spo2.as_str()
    }

    async fn process(&self, ctx: &HandlerContext, event: &Event) -> Result<(), HandlerError> {
        process_metric(self, ctx, event).await
    }
}
