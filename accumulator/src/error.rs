//! Error types for the accumulator
//!
//! Only `ConfigError` stops the process. Every other error is logged where it
//! happens and the listener keeps observing.

use std::io;

/// Invalid startup configuration
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("port {port} is configured more than once")]
    DuplicatePort { port: u16 },

    #[error("{count} servers starting at port {first} exceed the highest port (65535)")]
    PortOutOfRange { first: u16, count: usize },

    #[error("invalid MQTT broker address '{address}': {reason}")]
    InvalidBrokerAddress { address: String, reason: String },

    #[error("report interval must be greater than zero")]
    ZeroReportInterval,
}

/// Failure of a single HTTP endpoint
#[derive(thiserror::Error, Debug)]
pub enum ListenerError {
    #[error("cannot bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("server on port {port} stopped: {source}")]
    Serve {
        port: u16,
        #[source]
        source: io::Error,
    },
}

/// Why a notification payload yielded no latency figure
#[derive(thiserror::Error, Debug)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("payload matches no known notification shape")]
    UnrecognizedShape,

    #[error("{shape} payload has no TimeInstant value")]
    MissingTimestampField { shape: &'static str },

    #[error("cannot parse TimeInstant '{value}'")]
    InvalidTimestamp { value: String },
}

/// MQTT connection or client failure
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("broker rejected subscription to {filter}")]
    SubscriptionRejected { filter: String },
}
