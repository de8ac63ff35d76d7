//! Accumulator - notification counting test double
//!
//! Listens for context broker notifications over HTTP or MQTT, counts them
//! per reporting interval and optionally measures how late they arrive.

pub mod app;
pub mod args;
pub mod config;
pub mod counter;
pub mod error;
pub mod http;
pub mod latency;
pub mod mqtt;
pub mod processor;
pub mod reporter;

// Re-export commonly used types
pub use config::ListenerConfig;
pub use counter::RequestCounter;
pub use error::{ConfigError, ListenerError, PayloadError, TransportError};
