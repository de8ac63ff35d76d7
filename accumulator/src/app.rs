//! Startup of the listener core from a resolved configuration

use crate::config::{IngestMode, ListenerConfig};
use crate::counter::RequestCounter;
use crate::http::{start_pool, ResponderKind, RunningEndpoint};
use crate::mqtt::MqttSubscriber;
use crate::processor::NotificationProcessor;
use crate::reporter::Reporter;
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Handles of every task started for one run
pub struct Running {
    pub counter: Arc<RequestCounter>,
    pub reporter: JoinHandle<()>,
    pub endpoints: Vec<RunningEndpoint>,
    pub mqtt: Option<JoinHandle<()>>,
}

impl Running {
    /// Waits for every task; in practice they only end when aborted
    pub async fn join(self) {
        let mut handles: Vec<JoinHandle<()>> = self
            .endpoints
            .into_iter()
            .map(|endpoint| endpoint.handle)
            .collect();
        handles.extend(self.mqtt);
        handles.push(self.reporter);
        join_all(handles).await;
    }

    /// Stops every task
    pub fn shutdown(&self) {
        for endpoint in &self.endpoints {
            endpoint.handle.abort();
        }
        if let Some(mqtt) = &self.mqtt {
            mqtt.abort();
        }
        self.reporter.abort();
    }
}

/// Starts the reporter and either the HTTP pools or the MQTT subscriber
pub async fn start(config: &ListenerConfig) -> Running {
    let counter = Arc::new(RequestCounter::new(config.accumulator_mode));
    let processor = NotificationProcessor::new(
        counter.clone(),
        config.verbose,
        config.timestamp_diagnostics,
    );

    let (endpoints, mqtt) = match config.mode() {
        IngestMode::Http {
            plain_ports,
            delayed_ports,
        } => {
            let mut endpoints =
                start_pool(ResponderKind::Plain, plain_ports, &processor, config.silent).await;
            endpoints.extend(
                start_pool(
                    ResponderKind::Delayed(config.delay),
                    delayed_ports,
                    &processor,
                    config.silent,
                )
                .await,
            );
            let configured = plain_ports.len() + delayed_ports.len();
            if endpoints.len() < configured {
                warn!(
                    "{} of {} HTTP servers started",
                    endpoints.len(),
                    configured
                );
            }
            (endpoints, None)
        }
        IngestMode::Mqtt(broker) => {
            info!("MQTT mode: HTTP servers disabled");
            let subscriber = MqttSubscriber::new(broker, processor);
            (Vec::new(), Some(tokio::spawn(subscriber.run())))
        }
    };

    let reporter = Reporter::new(counter.clone(), config.report_interval, config.silent);
    let reporter = tokio::spawn(reporter.run());

    Running {
        counter,
        reporter,
        endpoints,
        mqtt,
    }
}
