//! Rolling throughput measurement.
//!
//! A small ring of per-second buckets. Recording is O(1); reading evicts
//! anything older than the span. A per-millisecond leaky bucket would be
//! overkill and inflates per-session memory under many sessions.

use std::{collections::VecDeque, time::Instant};

/// Sliding per-second event counter over a fixed span.
#[derive(Debug)]
pub struct RateWindow {
    started: Instant,
    span_secs: u64,
    buckets: VecDeque<(u64, u64)>,
}

impl RateWindow {
    /// New window covering the last `span_secs` seconds.
    #[must_use]
    pub fn new(span_secs: u64, now: Instant) -> Self {
        Self { started: now, span_secs, buckets: VecDeque::new() }
    }

    fn second(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.started).as_secs()
    }

    fn evict(&mut self, current: u64) {
        let horizon = current.saturating_sub(self.span_secs);
        while let Some(&(sec, _)) = self.buckets.front() {
            if sec >= horizon {
                break;
            }
            self.buckets.pop_front();
        }
    }

    /// Count one event at `now`.
    pub fn record(&mut self, now: Instant) {
        self.record_many(1, now);
    }

    /// Count `n` events at `now`.
    pub fn record_many(&mut self, n: u64, now: Instant) {
        let sec = self.second(now);
        self.evict(sec);

        match self.buckets.back_mut() {
            Some((last, count)) if *last == sec => *count += n,
            _ => self.buckets.push_back((sec, n)),
        }
    }

    /// Events within the span ending at `now`.
    pub fn count(&mut self, now: Instant) -> u64 {
        let sec = self.second(now);
        self.evict(sec);
        self.buckets.iter().map(|&(_, count)| count).sum()
    }

    /// Average events per second over the span ending at `now`.
    pub fn rate_per_sec(&mut self, now: Instant) -> f64 {
        let total = self.count(now);
        total as f64 / self.span_secs as f64
    }
}
