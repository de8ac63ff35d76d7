//! Shared request accounting.
//!
//! `RequestCounter` is the only state shared between the responders, the MQTT
//! subscriber and the reporter. All mutation goes through `increment` and
//! `drain`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters snapshot returned by [`RequestCounter::drain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drain {
    /// Notifications received during the interval that just ended
    pub current: u64,
    /// Running total including `current` (always 0 outside accumulator mode)
    pub cumulative: u64,
}

/// Per-interval and per-session notification counters
#[derive(Debug, Default)]
pub struct RequestCounter {
    current: AtomicU64,
    cumulative: AtomicU64,
    accumulate: bool,
}

impl RequestCounter {
    /// Creates zeroed counters. With `accumulate` off the session total is
    /// never updated.
    pub fn new(accumulate: bool) -> Self {
        Self {
            current: AtomicU64::new(0),
            cumulative: AtomicU64::new(0),
            accumulate,
        }
    }

    /// Records one received notification
    pub fn increment(&self) {
        self.current.fetch_add(1, Ordering::Relaxed);
    }

    /// Ends the current interval
    ///
    /// Takes the interval count and resets it to zero in one atomic step, so
    /// an increment racing with the drain is counted in exactly one interval.
    /// Must only be called from the reporter loop.
    pub fn drain(&self) -> Drain {
        let current = self.current.swap(0, Ordering::AcqRel);
        let cumulative = if self.accumulate && current != 0 {
            self.cumulative.fetch_add(current, Ordering::AcqRel) + current
        } else {
            self.cumulative.load(Ordering::Acquire)
        };
        Drain {
            current,
            cumulative,
        }
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn cumulative(&self) -> u64 {
        self.cumulative.load(Ordering::Relaxed)
    }

    pub fn accumulates(&self) -> bool {
        self.accumulate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_drain_resets_interval() {
        let counter = RequestCounter::new(false);
        counter.increment();
        counter.increment();
        counter.increment();

        assert_eq!(
            counter.drain(),
            Drain {
                current: 3,
                cumulative: 0
            }
        );
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.drain().current, 0);
    }

    #[test]
    fn test_cumulative_is_sum_of_intervals() {
        let counter = RequestCounter::new(true);
        let intervals = [4u64, 0, 7, 1];
        let mut expected = 0;

        for count in intervals {
            for _ in 0..count {
                counter.increment();
            }
            expected += count;
            let drain = counter.drain();
            assert_eq!(drain.current, count);
            assert_eq!(drain.cumulative, expected);
        }
        assert_eq!(counter.cumulative(), 12);
    }

    #[test]
    fn test_cumulative_untouched_without_accumulator() {
        let counter = RequestCounter::new(false);
        for _ in 0..5 {
            counter.increment();
        }
        counter.drain();
        assert_eq!(counter.cumulative(), 0);
        assert!(!counter.accumulates());
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let counter = Arc::new(RequestCounter::new(true));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.increment();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let drain = counter.drain();
        assert_eq!(drain.current, 8000);
        assert_eq!(drain.cumulative, 8000);
    }

    #[test]
    fn test_increments_during_drains_land_in_one_interval() {
        let counter = Arc::new(RequestCounter::new(true));
        let writer = {
            let counter = counter.clone();
            std::thread::spawn(move || {
                for _ in 0..50_000 {
                    counter.increment();
                }
            })
        };

        let mut drained = 0;
        while !writer.is_finished() {
            drained += counter.drain().current;
        }
        writer.join().unwrap();
        drained += counter.drain().current;

        assert_eq!(drained, 50_000);
        assert_eq!(counter.cumulative(), 50_000);
    }
}
