//! Resolved listener configuration
//!
//! Built once at startup from the command line and read-only afterwards.

use crate::args::Args;
use crate::error::ConfigError;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Period of the reporter loop
pub const REPORT_INTERVAL: Duration = Duration::from_millis(1000);

/// Default hold time of the delayed responders
pub const DEFAULT_DELAY: Duration = Duration::from_millis(2000);

/// Port used when the broker address has none
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// MQTT broker location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    /// Parses `host[:port]`, optionally prefixed with `mqtt://` or `tcp://`
    pub fn parse(address: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidBrokerAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = address.trim();
        let without_scheme = trimmed
            .strip_prefix("mqtt://")
            .or_else(|| trimmed.strip_prefix("tcp://"))
            .unwrap_or(trimmed)
            .trim_end_matches('/');

        let (host, port) = match without_scheme.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| invalid("port must be a number between 1 and 65535"))?;
                if port == 0 {
                    return Err(invalid("port must be a number between 1 and 65535"));
                }
                (host, port)
            }
            None => (without_scheme, DEFAULT_MQTT_PORT),
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Which ingestion channel a run uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestMode<'a> {
    Http {
        plain_ports: &'a [u16],
        delayed_ports: &'a [u16],
    },
    Mqtt(&'a BrokerAddress),
}

/// Everything the listener core needs, resolved once at startup
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub plain_ports: Vec<u16>,
    pub delayed_ports: Vec<u16>,
    pub delay: Duration,
    pub verbose: bool,
    pub silent: bool,
    pub timestamp_diagnostics: bool,
    pub accumulator_mode: bool,
    pub report_interval: Duration,
    pub mqtt_broker: Option<BrokerAddress>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            plain_ports: vec![1028, 1029, 1030],
            delayed_ports: vec![1031],
            delay: DEFAULT_DELAY,
            verbose: false,
            silent: false,
            timestamp_diagnostics: false,
            accumulator_mode: false,
            report_interval: REPORT_INTERVAL,
            mqtt_broker: None,
        }
    }
}

impl ListenerConfig {
    /// Resolves the command line into a validated configuration
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let mqtt_broker = args
            .mqtt
            .as_deref()
            .map(BrokerAddress::parse)
            .transpose()?;

        let config = Self {
            plain_ports: port_range(args.port, args.servers)?,
            delayed_ports: port_range(args.delayed_port, args.delayed_servers)?,
            delay: Duration::from_millis(args.delay_ms),
            verbose: args.verbose,
            silent: args.silence,
            timestamp_diagnostics: args.timestamp,
            accumulator_mode: args.accumulator,
            report_interval: REPORT_INTERVAL,
            mqtt_broker,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the cross-field invariants
    ///
    /// Port 0 asks the OS for a free port and may repeat.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.report_interval.is_zero() {
            return Err(ConfigError::ZeroReportInterval);
        }
        let mut seen = HashSet::new();
        for &port in self.plain_ports.iter().chain(&self.delayed_ports) {
            if port != 0 && !seen.insert(port) {
                return Err(ConfigError::DuplicatePort { port });
            }
        }
        Ok(())
    }

    /// MQTT replaces both HTTP pools when a broker is configured
    pub fn mode(&self) -> IngestMode<'_> {
        match &self.mqtt_broker {
            Some(broker) => IngestMode::Mqtt(broker),
            None => IngestMode::Http {
                plain_ports: &self.plain_ports,
                delayed_ports: &self.delayed_ports,
            },
        }
    }
}

/// `count` consecutive ports starting at `first`
pub fn port_range(first: u16, count: usize) -> Result<Vec<u16>, ConfigError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let last = u16::try_from(count - 1)
        .ok()
        .and_then(|offset| first.checked_add(offset))
        .ok_or(ConfigError::PortOutOfRange { first, count })?;
    Ok((first..=last).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("accumulator").chain(argv.iter().copied()))
    }

    #[test]
    fn test_defaults_match_legacy_layout() {
        let config = ListenerConfig::from_args(&args(&[])).unwrap();
        assert_eq!(config.plain_ports, vec![1028, 1029, 1030]);
        assert_eq!(config.delayed_ports, vec![1031]);
        assert_eq!(config.delay, Duration::from_millis(2000));
        assert_eq!(config.report_interval, Duration::from_millis(1000));
        assert!(config.mqtt_broker.is_none());
        assert!(!config.verbose && !config.silent);
        assert!(!config.timestamp_diagnostics && !config.accumulator_mode);
    }

    #[test]
    fn test_port_range() {
        assert_eq!(port_range(2000, 3).unwrap(), vec![2000, 2001, 2002]);
        assert!(port_range(2000, 0).unwrap().is_empty());
        assert_eq!(port_range(65535, 1).unwrap(), vec![65535]);
        assert!(matches!(
            port_range(65534, 3),
            Err(ConfigError::PortOutOfRange { first: 65534, count: 3 })
        ));
        assert!(port_range(1, 100_000).is_err());
    }

    #[test]
    fn test_overlapping_pools_rejected() {
        // Five plain servers from 1028 run into the delayed port 1031
        let result = ListenerConfig::from_args(&args(&["-s5"]));
        assert!(matches!(result, Err(ConfigError::DuplicatePort { port: 1031 })));
    }

    #[test]
    fn test_ephemeral_ports_may_repeat() {
        let config = ListenerConfig {
            plain_ports: vec![0, 0],
            delayed_ports: vec![0],
            ..ListenerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_report_interval_rejected() {
        let config = ListenerConfig {
            report_interval: Duration::ZERO,
            ..ListenerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroReportInterval)));
    }

    #[test]
    fn test_broker_address_parse() {
        assert_eq!(
            BrokerAddress::parse("localhost").unwrap(),
            BrokerAddress {
                host: "localhost".to_string(),
                port: 1883
            }
        );
        assert_eq!(BrokerAddress::parse("mqtt://10.0.0.5:1884").unwrap().port, 1884);
        assert_eq!(BrokerAddress::parse("tcp://broker/").unwrap().host, "broker");
        assert!(BrokerAddress::parse("broker:abc").is_err());
        assert!(BrokerAddress::parse("broker:0").is_err());
        assert!(BrokerAddress::parse(":1883").is_err());
        assert!(BrokerAddress::parse("").is_err());
    }

    #[test]
    fn test_mode_is_exclusive() {
        let http = ListenerConfig::default();
        assert!(matches!(http.mode(), IngestMode::Http { .. }));

        let mqtt = ListenerConfig::from_args(&args(&["--mqtt", "localhost:1883"])).unwrap();
        match mqtt.mode() {
            IngestMode::Mqtt(broker) => assert_eq!(broker.to_string(), "localhost:1883"),
            other => panic!("Expected MQTT mode, got {:?}", other),
        }
    }
}
