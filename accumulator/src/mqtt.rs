//! MQTT ingestion channel
//!
//! Subscribes to every topic under [`TOPIC_ROOT`] and feeds each publish
//! through the same processing path as the HTTP responders. Reconnection is
//! left to the rumqttc event loop, which reconnects on the next poll after an
//! error.

use crate::config::BrokerAddress;
use crate::error::TransportError;
use crate::processor::{NotificationProcessor, NotificationSource};
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubAck, SubscribeReasonCode,
};
use std::time::Duration;
use tracing::{debug, error, info};

/// Root of the subscribed topic tree
pub const TOPIC_ROOT: &str = "/orion";

/// Fixed subscription filter: everything under [`TOPIC_ROOT`]
pub const TOPIC_FILTER: &str = "/orion/#";

/// Pause between polls after a connection error
const RETRY_PAUSE: Duration = Duration::from_secs(1);

const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Outgoing request queue of the client; only subscribes are ever queued
const REQUEST_CAPACITY: usize = 10;

/// Connection options with a unique client id
pub fn mqtt_options(broker: &BrokerAddress) -> MqttOptions {
    let client_id = format!("accumulator-{}", uuid::Uuid::new_v4().simple());
    let mut options = MqttOptions::new(client_id, broker.host.clone(), broker.port);
    options.set_keep_alive(KEEP_ALIVE);
    options.set_clean_session(true);
    options
}

/// Counts and inspects one received message
pub fn handle_message(processor: &NotificationProcessor, topic: &str, payload: &[u8]) {
    processor.record();
    let source = NotificationSource::Mqtt {
        topic: topic.to_string(),
    };
    processor.inspect(payload, &source);
}

/// Fails when the broker refused the subscription to [`TOPIC_FILTER`]
pub fn check_suback(suback: &SubAck) -> Result<(), TransportError> {
    let rejected = suback.return_codes.is_empty()
        || suback
            .return_codes
            .iter()
            .any(|code| matches!(code, SubscribeReasonCode::Failure));
    if rejected {
        return Err(TransportError::SubscriptionRejected {
            filter: TOPIC_FILTER.to_string(),
        });
    }
    Ok(())
}

/// MQTT subscriber bound to one broker
pub struct MqttSubscriber {
    broker: BrokerAddress,
    client: AsyncClient,
    eventloop: EventLoop,
    processor: NotificationProcessor,
}

impl MqttSubscriber {
    /// Creates the client; nothing is sent until [`MqttSubscriber::run`] polls
    pub fn new(broker: &BrokerAddress, processor: NotificationProcessor) -> Self {
        let (client, eventloop) = AsyncClient::new(mqtt_options(broker), REQUEST_CAPACITY);
        Self {
            broker: broker.clone(),
            client,
            eventloop,
            processor,
        }
    }

    /// Drives the connection until the task is dropped
    pub async fn run(mut self) {
        info!("Connecting to MQTT broker {}", self.broker);
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to MQTT broker {}", self.broker);
                    // Subscribe on every CONNACK: clean sessions forget subscriptions
                    if let Err(e) = self.client.try_subscribe(TOPIC_FILTER, QoS::AtMostOnce) {
                        error!("{}", TransportError::from(e));
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(suback))) => match check_suback(&suback) {
                    Ok(()) => info!("Subscribed to {}", TOPIC_FILTER),
                    Err(e) => error!("{}", e),
                },
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    handle_message(&self.processor, &publish.topic, &publish.payload);
                }
                Ok(event) => {
                    debug!("MQTT event: {:?}", event);
                }
                Err(e) => {
                    error!("{}", TransportError::from(e));
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::RequestCounter;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Reads one MQTT control packet, returning its first header byte and body
    async fn read_packet(stream: &mut TcpStream) -> (u8, Vec<u8>) {
        let header = stream.read_u8().await.unwrap();
        let mut length = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await.unwrap();
            length |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0u8; length];
        stream.read_exact(&mut body).await.unwrap();
        (header, body)
    }

    fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
        let remaining = 2 + topic.len() + payload.len();
        assert!(remaining < 128);
        let mut packet = vec![0x30, remaining as u8];
        packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
        packet.extend_from_slice(topic.as_bytes());
        packet.extend_from_slice(payload);
        packet
    }

    fn broker(port: u16) -> BrokerAddress {
        BrokerAddress {
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    #[test]
    fn test_filter_covers_root() {
        assert_eq!(TOPIC_FILTER, format!("{}/#", TOPIC_ROOT));
    }

    #[test]
    fn test_options_use_unique_client_ids() {
        let first = mqtt_options(&broker(1883));
        let second = mqtt_options(&broker(1883));

        assert_eq!(first.broker_address(), ("127.0.0.1".to_string(), 1883));
        assert!(first.client_id().starts_with("accumulator-"));
        assert_ne!(first.client_id(), second.client_id());
        assert_eq!(first.keep_alive(), KEEP_ALIVE);
    }

    #[test]
    fn test_handle_message_counts_once() {
        let counter = Arc::new(RequestCounter::new(false));
        let processor = NotificationProcessor::new(counter.clone(), true, true);

        handle_message(&processor, "/orion/room1", b"{\"data\": []}");
        handle_message(&processor, "/orion/room2", b"garbage");

        assert_eq!(counter.current(), 2);
    }

    #[test]
    fn test_check_suback() {
        let granted = SubAck {
            pkid: 1,
            return_codes: vec![SubscribeReasonCode::Success(QoS::AtMostOnce)],
        };
        assert!(check_suback(&granted).is_ok());

        let refused = SubAck {
            pkid: 1,
            return_codes: vec![SubscribeReasonCode::Failure],
        };
        match check_suback(&refused) {
            Err(TransportError::SubscriptionRejected { filter }) => {
                assert_eq!(filter, TOPIC_FILTER)
            }
            other => panic!("Expected SubscriptionRejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscribes_and_counts_publishes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let counter = Arc::new(RequestCounter::new(false));
        let processor = NotificationProcessor::new(counter.clone(), true, true);
        let subscriber = tokio::spawn(MqttSubscriber::new(&broker(port), processor).run());

        let (mut stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .unwrap()
            .unwrap();

        // CONNECT, answered with an accepted CONNACK
        let (header, _) = read_packet(&mut stream).await;
        assert_eq!(header >> 4, 1);
        stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

        // SUBSCRIBE: packet id, then one filter with its requested QoS
        let (header, body) =
            tokio::time::timeout(Duration::from_secs(5), read_packet(&mut stream))
                .await
                .unwrap();
        assert_eq!(header, 0x82);
        let topic_len = u16::from_be_bytes([body[2], body[3]]) as usize;
        let topic = std::str::from_utf8(&body[4..4 + topic_len]).unwrap();
        assert_eq!(topic, TOPIC_FILTER);
        stream
            .write_all(&[0x90, 0x03, body[0], body[1], 0x00])
            .await
            .unwrap();

        let payload = br#"{"data":[{"TimeInstant":{"value":"2015-10-28T13:51:32+0100"}}]}"#;
        stream
            .write_all(&publish_packet("/orion/x", payload))
            .await
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while counter.current() < 1 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(counter.current(), 1);

        subscriber.abort();
    }

    #[tokio::test]
    async fn test_unreachable_broker_keeps_running() {
        let counter = Arc::new(RequestCounter::new(false));
        let processor = NotificationProcessor::new(counter.clone(), false, false);
        // Port 1 on loopback refuses connections
        let handle = tokio::spawn(MqttSubscriber::new(&broker(1), processor).run());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!handle.is_finished());
        assert_eq!(counter.current(), 0);
        handle.abort();
    }
}
