//! # MQTT Topic Adapter
//!
//! Devices publish JSON on `device/<deviceID>/data/<metricType>` with the
//! reading under a top-level `data` object. Anything else is dropped without
//! an error: a wrong segment count, a wrong literal segment, a body that is
//! not JSON or a missing or non-object `data`.

use serde_json::Value;

use crate::core::{Event, Source};

/// Topic filter the ingestor subscribes to.
pub const SUBSCRIPTION: &str = "device/+/data/+";

/// Maps one broker message to an event.
pub fn event_from_publish(topic: &str, body: &[u8]) -> Option<Event> {
    let segments: Vec<&str> = topic.split('/').collect();
    let [root, device_id, kind, metric] = segments.as_slice() else {
        return None;
    };
    if *root != "device" || *kind != "data" {
        return None;
    }

    let Ok(Value::Object(mut body)) = serde_json::from_slice::<Value>(body) else {
        return None;
    };
    let Some(Value::Object(data)) = body.remove("data") else {
        return None;
    };

    Some(Event::new(*device_id, *metric, data, Source::Mqtt))
}

/// Splits `tcp://host:port` (or `mqtt://`, or a bare `host:port`) into its parts.
///
/// The port defaults to 1883.
pub fn parse_broker(broker: &str) -> Result<(String, u16), super::IngestError> {
    let invalid = || super::IngestError::BrokerAddress(broker.to_string());
    let address = broker
        .strip_prefix("tcp://")
        .or_else(|| broker.strip_prefix("mqtt://"))
        .unwrap_or(broker)
        .trim_end_matches('/');

    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
        None => (address, 1883),
    };
    if host.is_empty() {
        return Err(invalid());
    }
    Ok((host.to_string(), port))
}

#[cfg(feature = "ingestors")]
pub use client::{MqttIngestor, MqttSettings};

#[cfg(feature = "ingestors")]
mod client {
    use rumqttc::{
        AsyncClient, Event as MqttEvent, EventLoop, MqttOptions, Packet, QoS, SubAck, SubscribeReasonCode,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    use super::{event_from_publish, parse_broker, SUBSCRIPTION};
    use crate::core::Dispatcher;
    use crate::ingestors::IngestError;

    /// Broker connection parameters.
    #[derive(Debug, Clone)]
    pub struct MqttSettings {
        /// e.g. `tcp://127.0.0.1:1883`.
        pub broker: String,
        pub client_id: String,
        pub username: Option<String>,
        pub password: Option<String>,
        /// Applies to the first connection only.
        pub connect_timeout: Duration,
    }

    /// Subscribes to device topics and dispatches decoded events.
    pub struct MqttIngestor {
        settings: MqttSettings,
        dispatcher: Arc<Dispatcher>,
    }

    impl MqttIngestor {
        pub fn new(settings: MqttSettings, dispatcher: Arc<Dispatcher>) -> Self {
            Self {
                settings,
                dispatcher,
            }
        }

        /// Connects, subscribes and pumps messages until `cancel` fires.
        ///
        /// Connect failures, a missing CONNACK or SUBACK within the connect
        /// timeout, and a rejected subscription are returned. Later poll errors
        /// are logged and the event loop keeps polling, which reconnects.
        pub async fn run(&self, cancel: CancellationToken) -> Result<(), IngestError> {
            let (host, port) = parse_broker(&self.settings.broker)?;
            let mut opts = MqttOptions::new(&self.settings.client_id, host, port);
            opts.set_keep_alive(Duration::from_secs(30));
            if let Some(username) = self.settings.username.as_deref().filter(|u| !u.is_empty()) {
                opts.set_credentials(username, self.settings.password.clone().unwrap_or_default());
            }

            let (client, mut event_loop) = AsyncClient::new(opts, 64);

            let timeout = self.settings.connect_timeout;
            match tokio::time::timeout(timeout, wait_for_connack(&mut event_loop)).await {
                Err(_) => return Err(IngestError::ConnectTimeout(timeout)),
                Ok(result) => result?,
            }
            client
                .subscribe(SUBSCRIPTION, QoS::AtMostOnce)
                .await
                .map_err(|e| IngestError::Client(e.to_string()))?;
            match tokio::time::timeout(timeout, self.wait_for_suback(&mut event_loop)).await {
                Err(_) => return Err(IngestError::ConnectTimeout(timeout)),
                Ok(result) => result?,
            }
            tracing::info!(broker = %self.settings.broker, topic = SUBSCRIPTION, "mqtt subscribed");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("mqtt loop cancelled");
                        let _ = client.try_disconnect();
                        break;
                    }
                    ev = event_loop.poll() => {
                        match ev {
                            Ok(MqttEvent::Incoming(Packet::Publish(p))) => {
                                match event_from_publish(&p.topic, &p.payload) {
                                    Some(event) => {
                                        self.dispatcher.dispatch(event).await;
                                    }
                                    None => tracing::debug!(topic = %p.topic, "mqtt message ignored"),
                                }
                            }
                            Ok(MqttEvent::Incoming(Packet::SubAck(ack))) => {
                                if let Err(e) = check_suback(&ack) {
                                    tracing::error!(error = %e, "mqtt resubscribe rejected");
                                }
                            }
                            Ok(MqttEvent::Incoming(Packet::ConnAck(_))) => {
                                tracing::info!("mqtt reconnected, resubscribing");
                                if let Err(e) = client.try_subscribe(SUBSCRIPTION, QoS::AtMostOnce) {
                                    tracing::warn!(error = %e, "mqtt resubscribe failed");
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::warn!(error = %e, "mqtt poll error");
                                tokio::time::sleep(Duration::from_millis(250)).await;
                            }
                        }
                    }
                }
            }
            Ok(())
        }
    }

    impl MqttIngestor {
        /// Polls until the broker answers the subscription. Publishes that
        /// arrive first are dispatched as usual.
        async fn wait_for_suback(&self, event_loop: &mut EventLoop) -> Result<(), IngestError> {
            loop {
                match event_loop.poll().await {
                    Ok(MqttEvent::Incoming(Packet::SubAck(ack))) => return check_suback(&ack),
                    Ok(MqttEvent::Incoming(Packet::Publish(p))) => {
                        if let Some(event) = event_from_publish(&p.topic, &p.payload) {
                            self.dispatcher.dispatch(event).await;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => return Err(IngestError::Connection(e.to_string())),
                }
            }
        }
    }

    fn check_suback(ack: &SubAck) -> Result<(), IngestError> {
        if ack
            .return_codes
            .iter()
            .any(|code| matches!(code, SubscribeReasonCode::Failure))
        {
            return Err(IngestError::SubscribeRejected(SUBSCRIPTION.to_string()));
        }
        Ok(())
    }

    async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), IngestError> {
        loop {
            match event_loop.poll().await {
                Ok(MqttEvent::Incoming(Packet::ConnAck(_))) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(IngestError::Connection(e.to_string())),
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn well_formed_topic_becomes_event() {
        let body = br#"{"data":{"user_id":"u1","heart_rate":72,"timestamp":1690000000}}"#;
        let event = event_from_publish("device/77/data/heart_rate", body).unwrap();

        assert_eq!(event.device_id, "77");
        assert_eq!(event.event_type, "heart_rate");
        assert_eq!(event.source, Source::Mqtt);
        assert_eq!(
            Value::Object(event.payload),
            json!({"user_id":"u1","heart_rate":72,"timestamp":1690000000})
        );
    }

    #[test]
    fn malformed_topics_are_dropped() {
        let body = br#"{"data":{}}"#;
        assert!(event_from_publish("device/77/data", body).is_none());
        assert!(event_from_publish("device/77/data/heart_rate/extra", body).is_none());
        assert!(event_from_publish("sensor/77/data/heart_rate", body).is_none());
        assert!(event_from_publish("device/77/status/heart_rate", body).is_none());
    }

    #[test]
    fn bodies_without_a_data_object_are_dropped() {
        let topic = "device/1/data/spo2";
        assert!(event_from_publish(topic, b"not json").is_none());
        assert!(event_from_publish(topic, b"[1,2]").is_none());
        assert!(event_from_publish(topic, br#"{"spo2":98}"#).is_none());
        assert!(event_from_publish(topic, br#"{"data":[98]}"#).is_none());
        assert!(event_from_publish(topic, br#"{"data":{}}"#).is_some());
    }

    #[test]
    fn broker_addresses() {
        assert_eq!(parse_broker("tcp://127.0.0.1:1883").unwrap(), ("127.0.0.1".to_string(), 1883));
        assert_eq!(parse_broker("mqtt://broker.local:8883/").unwrap(), ("broker.local".to_string(), 8883));
        assert_eq!(parse_broker("broker").unwrap(), ("broker".to_string(), 1883));
        assert!(parse_broker("tcp://host:notaport").is_err());
        assert!(parse_broker("tcp://:1883").is_err());
    }
}
