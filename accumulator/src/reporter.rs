//! Periodic request reporting.
//!
//! The `Reporter` wakes up once per interval, drains the shared counters and
//! logs how many notifications arrived since the previous tick.

use crate::counter::{Drain, RequestCounter};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

/// Drains the request counters on a fixed period
#[derive(Debug, Clone)]
pub struct Reporter {
    counter: Arc<RequestCounter>,
    period: Duration,
    silent: bool,
}

impl Reporter {
    pub fn new(counter: Arc<RequestCounter>, period: Duration, silent: bool) -> Self {
        Self {
            counter,
            period,
            silent,
        }
    }

    /// Runs until the task is dropped
    ///
    /// The first tick happens one full period after start, so the first line
    /// covers a complete interval.
    pub async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        // No catch-up bursts after a stall
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(line) = self.tick() {
                info!("{}", line);
            }
        }
    }

    /// Ends one interval and returns the line to log, if any
    pub fn tick(&self) -> Option<String> {
        let drain = self.counter.drain();
        if self.silent {
            None
        } else {
            Some(format_report(drain, self.counter.accumulates()))
        }
    }
}

/// `Req: <current>`, or `Req: <current> [<cumulative>]` in accumulator mode
pub fn format_report(drain: Drain, accumulator_mode: bool) -> String {
    if accumulator_mode {
        format!("Req: {} [{}]", drain.current, drain.cumulative)
    } else {
        format!("Req: {}", drain.current)
    }
}
