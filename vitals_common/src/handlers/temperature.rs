//! Body temperature in degrees Celsius, 34.0 to 42.0.

use async_trait::async_trait;
use std::sync::Arc;

use super::reading::{check_range, number_field, timestamp_field, user_id_field};
use super::{process_metric, HandlerError, Metric, MetricHandler, Reading, ReadingSink, ValidationError};
use crate::core::{Event, HandlerContext, Processor};
use crate::framing::Payload;

pub const MIN_CELSIUS: f64 = 34.0;
pub const MAX_CELSIUS: f64 = 42.0;

pub struct TemperatureHandler {
    sink: Arc<ReadingSink>,
}

impl TemperatureHandler {
    pub fn new(sink: Arc<ReadingSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl MetricHandler for TemperatureHandler {
    fn metric(&self) -> Metric {
        Metric::Temperature
    }

    fn validate(&self, payload: &Payload) -> Result<Reading, ValidationError> {
        let temperature = number_field(payload, "temperature")?;
        check_range("temperature", temperature, MIN_CELSIUS, MAX_CELSIUS)?;
        let timestamp = timestamp_field(payload)?;
        let user_id = user_id_field(payload)?;
        Ok(Reading::Temperature {
            user_id,
            temperature,
            timestamp,
        })
    }

    fn sink(&self) -> &ReadingSink {
        &self.sink
    }
}

#[async_trait]
impl Processor for TemperatureHandler {
    fn name(&self) -> &str {
        Metric::Temperature.as_str()
    }

    async fn process(&self, ctx: &HandlerContext, event: &Event) -> Result<(), HandlerError> {
        process_metric(self, ctx, event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::{MemoryCache, MemoryRecordStore};
    use serde_json::{json, Value};

    fn validate(v: Value) -> Result<Reading, ValidationError> {
        let sink = ReadingSink::new(Arc::new(MemoryCache::new()), Arc::new(MemoryRecordStore::new()));
        let Value::Object(map) = v else { unreachable!() };
        TemperatureHandler::new(Arc::new(sink)).validate(&map)
    }

    #[test]
    fn fractional_and_integral_numbers_accepted() {
        assert!(validate(json!({"user_id": "u", "temperature": 36.6})).is_ok());
        assert!(validate(json!({"user_id": "u", "temperature": 37})).is_ok());
        assert!(validate(json!({"user_id": "u", "temperature": 34.0})).is_ok());
        assert!(validate(json!({"user_id": "u", "temperature": 42.0})).is_ok());
    }

    #[test]
    fn outside_band_rejected() {
        assert!(matches!(
            validate(json!({"user_id": "u", "temperature": 33.9})),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            validate(json!({"user_id": "u", "temperature": 42.1})),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn string_temperature_is_a_type_error() {
        assert!(matches!(
            validate(json!({"user_id": "u", "temperature": "36.6"})),
            Err(ValidationError::InvalidType { field: "temperature", .. })
        ));
    }
}
