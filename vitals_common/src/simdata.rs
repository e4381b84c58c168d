//! # Simulated Readings
//!
//! Plausible resting-adult readings for load tests and the device simulator.
//! Generated values always fall inside the handlers' accepted ranges.

use rand::Rng;
use serde_json::{json, Value};

use crate::framing::Payload;
use crate::handlers::{Metric, Reading};

/// A random reading of `metric` for `user_id`, stamped `timestamp`.
pub fn generate<R: Rng>(rng: &mut R, metric: Metric, user_id: &str, timestamp: i64) -> Reading {
    let user_id = user_id.to_string();
    let timestamp = Some(timestamp);
    match metric {
        Metric::HeartRate => Reading::HeartRate {
            user_id,
            heart_rate: rng.random_range(60..100),
            timestamp,
        },
        Metric::BloodPressure => Reading::BloodPressure {
            user_id,
            systolic: rng.random_range(90..150),
            diastolic: rng.random_range(60..100),
            timestamp,
        },
        Metric::Spo2 => Reading::Spo2 {
            user_id,
            spo2: rng.random_range(95..=100),
            timestamp,
        },
        Metric::Temperature => Reading::Temperature {
            user_id,
            // One decimal, as a thermometer reports it.
            temperature: (rng.random_range(36.0..38.0_f64) * 10.0).round() / 10.0,
            timestamp,
        },
    }
}

/// Handler payload for `reading`: the reading fields without the metric tag.
pub fn payload(reading: &Reading) -> Payload {
    let mut map = match serde_json::to_value(reading) {
        Ok(Value::Object(map)) => map,
        _ => Payload::new(),
    };
    map.remove("metric");
    map
}

/// Topic and JSON body for publishing `reading` from `device_id`.
pub fn mqtt_message(device_id: &str, reading: &Reading) -> (String, Vec<u8>) {
    let topic = format!("device/{device_id}/data/{}", reading.metric());
    let body = json!({ "data": Value::Object(payload(reading)) });
    (topic, body.to_string().into_bytes())
}

/// MessagePack frame payload for `reading`, tagged with the device serial number.
pub fn frame_payload(device_id: &str, reading: &Reading) -> Payload {
    let mut map = payload(reading);
    map.insert("sn".to_string(), Value::String(device_id.to_string()));
    map
}
