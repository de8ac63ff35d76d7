//! The processing path shared by every ingestion channel

use crate::counter::RequestCounter;
use crate::latency::{self, LatencyResult};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Where a notification came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationSource {
    Http,
    DelayedHttp,
    Mqtt { topic: String },
}

impl NotificationSource {
    /// Delayed endpoints stand in for a slow consumer and never analyze payloads
    pub fn wants_diagnostics(&self) -> bool {
        !matches!(self, NotificationSource::DelayedHttp)
    }
}

impl fmt::Display for NotificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationSource::Http => write!(f, "Notification Data"),
            NotificationSource::DelayedHttp => write!(f, "Notification Delayed server"),
            NotificationSource::Mqtt { topic } => write!(f, "Notification MQTT [{}]", topic),
        }
    }
}

/// Counts notifications and runs the optional diagnostics on their payloads
#[derive(Debug, Clone)]
pub struct NotificationProcessor {
    counter: Arc<RequestCounter>,
    verbose: bool,
    timestamp_diagnostics: bool,
}

impl NotificationProcessor {
    pub fn new(counter: Arc<RequestCounter>, verbose: bool, timestamp_diagnostics: bool) -> Self {
        Self {
            counter,
            verbose,
            timestamp_diagnostics,
        }
    }

    /// Counts one notification
    pub fn record(&self) {
        self.counter.increment();
    }

    /// Runs latency analysis and verbose logging on a complete payload
    ///
    /// Analysis failures are logged and swallowed; the caller's
    /// acknowledgment never depends on the result.
    pub fn inspect(&self, payload: &[u8], source: &NotificationSource) -> Option<LatencyResult> {
        let latency = if self.timestamp_diagnostics && source.wants_diagnostics() {
            latency::analyze_and_log(payload)
        } else {
            None
        };
        if self.verbose {
            info!("# {}: {}", source, String::from_utf8_lossy(payload));
        }
        latency
    }
}
