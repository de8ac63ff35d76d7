//! Command-line argument types for the accumulator
//!
//! Besides the clap definition this module accepts the flag spellings of the
//! original accumulator server (`-ds3`, `-dp2000`, `-u`) by rewriting them
//! before clap parses the command line.

use clap::Parser;
use std::ffi::OsString;

/// Command-line arguments for the notification accumulator
#[derive(Parser, Debug)]
#[command(name = "accumulator", version)]
#[command(about = "Accumulator server: counts and inspects context broker notifications")]
#[command(
    long_about = "Accumulator server: counts and inspects context broker notifications.\n\n\
                  The default configuration launches 3 servers on ports 1028, 1029 and 1030 \
                  and 1 server on port 1031 whose response is delayed by 2 seconds."
)]
pub struct Args {
    /// Number of servers to run without delay
    #[arg(short, long, default_value = "3")]
    pub servers: usize,

    /// First port of the servers without delay; the rest use the following ports
    #[arg(short, long, default_value = "1028")]
    pub port: u16,

    /// Number of servers that delay their response (legacy: -dsN)
    #[arg(long, default_value = "1")]
    pub delayed_servers: usize,

    /// First port of the delayed servers; the rest use the following ports (legacy: -dpN)
    #[arg(long, default_value = "1031")]
    pub delayed_port: u16,

    /// Response delay of the delayed servers in milliseconds
    #[arg(long, default_value = "2000", hide = true)]
    pub delay_ms: u64,

    /// Log every notification body
    #[arg(short, long, default_value = "false")]
    pub verbose: bool,

    /// No startup or report lines in the log
    #[arg(long, default_value = "false")]
    pub silence: bool,

    /// Log the difference between the TimeInstant of each notification and now
    #[arg(short, long, default_value = "false")]
    pub timestamp: bool,

    /// Keep a running total of requests across report intervals
    #[arg(short, long, default_value = "false")]
    pub accumulator: bool,

    /// MQTT broker address (host[:port]); replaces the HTTP servers
    #[arg(long)]
    pub mqtt: Option<String>,
}

/// Rewrites legacy flag spellings into their clap equivalents
///
/// `-dsN` becomes `--delayed-servers N`, `-dpN` becomes `--delayed-port N`
/// and `-u` becomes `--help`. Everything else passes through unchanged.
pub fn normalize_legacy_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator,
    I::Item: Into<OsString>,
{
    let mut normalized = Vec::new();
    for arg in args.into_iter().map(Into::into) {
        let Some(text) = arg.to_str() else {
            normalized.push(arg);
            continue;
        };
        if text == "-u" {
            normalized.push("--help".into());
        } else if let Some(value) = text.strip_prefix("-ds") {
            normalized.push("--delayed-servers".into());
            normalized.push(value.into());
        } else if let Some(value) = text.strip_prefix("-dp") {
            normalized.push("--delayed-port".into());
            normalized.push(value.into());
        } else {
            normalized.push(arg);
        }
    }
    normalized
}

impl Args {
    /// Parses the process arguments, accepting legacy spellings
    pub fn parse_with_legacy() -> Self {
        Self::parse_from(normalize_legacy_args(std::env::args_os()))
    }

    /// Fallible variant of [`Args::parse_with_legacy`] for arbitrary input
    pub fn try_parse_with_legacy<I>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator,
        I::Item: Into<OsString>,
    {
        Self::try_parse_from(normalize_legacy_args(args))
    }
}
