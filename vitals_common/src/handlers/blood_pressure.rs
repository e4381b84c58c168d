//! Blood pressure in mmHg: systolic 60 to 250, diastolic 40 to 150.

use async_trait::async_trait;
use std::sync::Arc;

use super::reading::{check_range, integer_field, timestamp_field, user_id_field};
use super::{process_metric, HandlerError, Metric, MetricHandler, Reading, ReadingSink, ValidationError};
use crate::core::{Event, HandlerContext, Processor};
use crate::framing::Payload;

pub const SYSTOLIC_RANGE: (i64, i64) = (60, 250);
pub const DIASTOLIC_RANGE: (i64, i64) = (40, 150);

pub struct BloodPressureHandler {
    sink: Arc<ReadingSink>,
}

impl BloodPressureHandler {
    pub fn new(sink: Arc<ReadingSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl MetricHandler for BloodPressureHandler {
    fn metric(&self) -> Metric {
        Metric::BloodPressure
    }

    fn validate(&self, payload: &Payload) -> Result<Reading, ValidationError> {
        let systolic = integer_field(payload, "systolic")?;
        let diastolic = integer_field(payload, "diastolic")?;
        check_range(
            "systolic",
            systolic as f64,
            SYSTOLIC_RANGE.0 as f64,
            SYSTOLIC_RANGE.1 as f64,
        )?;
        check_range(
            "diastolic",
            diastolic as f64,
            DIASTOLIC_RANGE.0 as f64,
            DIASTOLIC_RANGE.1 as f64,
        )?;
        let timestamp = timestamp_field(payload)?;
        let user_id = user_id_field(payload)?;
        Ok(Reading::BloodPressure {
            user_id,
            systolic,
            diastolic,
            timestamp,
        })
    }

    fn sink(&self) -> &ReadingSink {
        &self.sink
    }
}

#[async_trait]
impl Processor for BloodPressureHandler {
    fn name(&self) -> &str {
        Metric::BloodPressure.as_str()
    }

    async fn process(&self, ctx: &HandlerContext, event: &Event) -> Result<(), HandlerError> {
        process_metric(self, ctx, event).await
    }
}
