//! # Typed Readings
//!
//! `Reading` is the decoded, validated form of a metric payload. The field
//! helpers here are shared by the per-metric validators: integer metrics accept
//! integral JSON numbers only, `temperature` accepts any number, `timestamp` is
//! optional and `user_id` must be a non-empty string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::error::ValidationError;
use crate::framing::Payload;

/// The four supported metrics, named by their event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    HeartRate,
    BloodPressure,
    Spo2,
    Temperature,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::HeartRate,
        Metric::BloodPressure,
        Metric::Spo2,
        Metric::Temperature,
    ];

    /// Event type string, also used as `schema_type` and in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::HeartRate => "heart_rate",
            Metric::BloodPressure => "blood_pressure",
            Metric::Spo2 => "spo2",
            Metric::Temperature => "temperature",
        }
    }

    pub fn from_event_type(event_type: &str) -> Option<Self> {
        Metric::ALL.into_iter().find(|m| m.as_str() == event_type)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum Reading {
    HeartRate {
        user_id: String,
        heart_rate: i64,
        timestamp: Option<i64>,
    },
    BloodPressure {
        user_id: String,
        systolic: i64,
        diastolic: i64,
        timestamp: Option<i64>,
    },
    Spo2 {
        user_id: String,
        spo2: i64,
        timestamp: Option<i64>,
    },
    Temperature {
        user_id: String,
        temperature: f64,
        timestamp: Option<i64>,
    },
}

impl Reading {
    pub fn metric(&self) -> Metric {
        match self {
            Reading::HeartRate { .. } => Metric::HeartRate,
            Reading::BloodPressure { .. } => Metric::BloodPressure,
            Reading::Spo2 { .. } => Metric::Spo2,
            Reading::Temperature { .. } => Metric::Temperature,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Reading::HeartRate { user_id, .. }
            | Reading::BloodPressure { user_id, .. }
            | Reading::Spo2 { user_id, .. }
            | Reading::Temperature { user_id, .. } => user_id,
        }
    }

    pub fn timestamp(&self) -> Option<i64> {
        match self {
            Reading::HeartRate { timestamp, .. }
            | Reading::BloodPressure { timestamp, .. }
            | Reading::Spo2 { timestamp, .. }
            | Reading::Temperature { timestamp, .. } => *timestamp,
        }
    }

    /// Reading time; absent, zero or unrepresentable timestamps fall back to now.
    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.timestamp()
            .filter(|&secs| secs != 0)
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now)
    }

    /// Measured values as `name=value` pairs, for logs.
    pub fn values(&self) -> String {
        match self {
            Reading::HeartRate { heart_rate, .. } => format!("heart_rate={heart_rate}"),
            Reading::BloodPressure {
                systolic,
                diastolic,
                ..
            } => format!("systolic={systolic} diastolic={diastolic}"),
            Reading::Spo2 { spo2, .. } => format!("spo2={spo2}"),
            Reading::Temperature { temperature, .. } => format!("temperature={temperature}"),
        }
    }
}

fn present<'a>(payload: &'a Payload, field: &'static str) -> Option<&'a Value> {
    payload.get(field).filter(|v| !v.is_null())
}

/// Reads an integral number. `72.0` passes, `72.5` does not.
pub fn integer_field(payload: &Payload, field: &'static str) -> Result<i64, ValidationError> {
    let value = present(payload, field).ok_or(ValidationError::MissingField(field))?;
    let invalid = ValidationError::InvalidType {
        field,
        expected: "an integer",
    };
    let Value::Number(n) = value else {
        return Err(invalid);
    };
    if let Some(i) = n.as_i64() {
        return Ok(i);
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        _ => Err(invalid),
    }
}

/// Reads any JSON number.
pub fn number_field(payload: &Payload, field: &'static str) -> Result<f64, ValidationError> {
    present(payload, field)
        .ok_or(ValidationError::MissingField(field))?
        .as_f64()
        .ok_or(ValidationError::InvalidType {
            field,
            expected: "a number",
        })
}

/// Optional Unix seconds.
pub fn timestamp_field(payload: &Payload) -> Result<Option<i64>, ValidationError> {
    match present(payload, "timestamp") {
        None => Ok(None),
        Some(_) => integer_field(payload, "timestamp").map(Some),
    }
}

/// Required non-empty `user_id`.
pub fn user_id_field(payload: &Payload) -> Result<String, ValidationError> {
    let value = present(payload, "user_id").ok_or(ValidationError::MissingField("user_id"))?;
    let user_id = value.as_str().ok_or(ValidationError::InvalidType {
        field: "user_id",
        expected: "a string",
    })?;
    if user_id.is_empty() {
        return Err(ValidationError::EmptyUserId);
    }
    Ok(user_id.to_string())
}

/// Inclusive range check.
pub fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(v: Value) -> Payload {
        match v {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn integral_floats_are_integers() {
        let p = payload(json!({"a": 72, "b": 72.0, "c": 72.5, "d": "72"}));
        assert_eq!(integer_field(&p, "a"), Ok(72));
        assert_eq!(integer_field(&p, "b"), Ok(72));
        assert!(matches!(
            integer_field(&p, "c"),
            Err(ValidationError::InvalidType { field: "c", .. })
        ));
        assert!(matches!(
            integer_field(&p, "d"),
            Err(ValidationError::InvalidType { .. })
        ));
        assert_eq!(integer_field(&p, "e"), Err(ValidationError::MissingField("e")));
    }

    #[test]
    fn null_timestamp_counts_as_absent() {
        assert_eq!(timestamp_field(&payload(json!({"timestamp": null}))), Ok(None));
        assert_eq!(timestamp_field(&payload(json!({"timestamp": 1690000000}))), Ok(Some(1690000000)));
    }

    #[test]
    fn user_id_rules() {
        assert_eq!(user_id_field(&payload(json!({"user_id": ""}))), Err(ValidationError::EmptyUserId));
        assert!(matches!(
            user_id_field(&payload(json!({"user_id": 5}))),
            Err(ValidationError::InvalidType { field: "user_id", .. })
        ));
        assert_eq!(user_id_field(&payload(json!({"user_id": "u1"}))), Ok("u1".to_string()));
    }

    #[test]
    fn recorded_at_falls_back_to_now() {
        let with_ts = Reading::Spo2 {
            user_id: "u".into(),
            spo2: 98,
            timestamp: Some(1690000000),
        };
        assert_eq!(with_ts.recorded_at().timestamp(), 1690000000);

        let zero = Reading::Spo2 {
            user_id: "u".into(),
            spo2: 98,
            timestamp: Some(0),
        };
        assert!(zero.recorded_at().timestamp() > 1690000000);
    }

    #[test]
    fn reading_json_is_tagged_by_metric() {
        let reading = Reading::HeartRate {
            user_id: "u1".into(),
            heart_rate: 72,
            timestamp: None,
        };
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["metric"], "heart_rate");
        assert_eq!(json["heart_rate"], 72);
    }

    #[test]
    fn metric_names_round_trip() {
        for metric in Metric::ALL {
            assert_eq!(Metric::from_event_type(metric.as_str()), Some(metric));
        }
        assert_eq!(Metric::from_event_type("mattress"), None);
    }
}
