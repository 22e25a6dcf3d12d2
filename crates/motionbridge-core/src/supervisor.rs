//! Streaming-overload detection and load-shedding policy.
//!
//! A sampling loop feeds the supervisor the streaming domain's *processed*
//! counter once per second — processed, not intake, so dropped messages do
//! not feed back into the signal and mask the overload. The supervisor
//! classifies the load state and rations `STREAMING_OVERLOAD` notifications
//! to one per cooldown window.
//!
//! # State machine
//!
//! ```text
//!            throughput > threshold or queue > cap/2
//!          ┌────────────────────────────────────────┐
//!          │                                        ↓
//!     ┌────────┐                             ┌────────────┐
//!     │ Normal │                             │ Overloaded │
//!     └────────┘                             └────────────┘
//!          ↑                                        │
//!          └────────────────────────────────────────┘
//!            both throughput and queue back below
//! ```

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use motionbridge_proto::OverloadInfo;

/// Windows kept for the rolling throughput average.
const ROLLING_WINDOWS: usize = 10;

/// Streaming load state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Throughput and queue depth within bounds
    Normal,
    /// Shedding non-critical messages
    Overloaded,
}

/// Supervisor tunables, lifted from [`crate::BridgeConfig`].
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Messages per second above which load is declared
    pub threshold: u64,
    /// Minimum spacing between notifications
    pub cooldown: Duration,
    /// Percentage of non-critical messages shed under overload
    pub drop_percent: u8,
    /// Streaming queue capacity (overload above half of it)
    pub queue_cap: usize,
}

/// Sliding-window throughput meter and load-shedding policy.
///
/// Pure state machine: the caller samples once per second and passes time
/// in, which keeps cadence behavior testable without a clock.
#[derive(Debug)]
pub struct OverloadSupervisor {
    config: SupervisorConfig,
    samples: VecDeque<u64>,
    last_total: u64,
    state: LoadState,
    last_notice: Option<Instant>,
}

impl OverloadSupervisor {
    /// New supervisor in the `Normal` state.
    #[must_use]
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            samples: VecDeque::with_capacity(ROLLING_WINDOWS),
            last_total: 0,
            state: LoadState::Normal,
            last_notice: None,
        }
    }

    /// Current load state.
    #[must_use]
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Whether non-critical messages are being shed.
    #[must_use]
    pub fn is_overloaded(&self) -> bool {
        self.state == LoadState::Overloaded
    }

    /// Fraction of non-critical messages to shed right now.
    #[must_use]
    pub fn drop_ratio(&self) -> f64 {
        if self.is_overloaded() { f64::from(self.config.drop_percent) / 100.0 } else { 0.0 }
    }

    /// Rolling average over the kept windows, messages per second.
    #[must_use]
    pub fn rolling_average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: u64 = self.samples.iter().sum();
        total as f64 / self.samples.len() as f64
    }

    /// Whether a non-critical message should be dropped, given a uniform
    /// random roll in `[0, 1)`. Critical messages are never shed.
    #[must_use]
    pub fn should_shed(&self, critical: bool, roll: f64) -> bool {
        !critical && self.is_overloaded() && roll < self.drop_ratio()
    }

    /// Ingest one sampling tick.
    ///
    /// `processed_total` is the streaming domain's monotone processed
    /// counter; the supervisor differentiates it into per-window throughput.
    /// Returns `Some` when a `STREAMING_OVERLOAD` notification should be
    /// broadcast — at most once per cooldown window.
    pub fn sample(
        &mut self,
        processed_total: u64,
        queue_depth: usize,
        now: Instant,
    ) -> Option<OverloadInfo> {
        let current = processed_total.saturating_sub(self.last_total);
        self.last_total = processed_total;

        if self.samples.len() == ROLLING_WINDOWS {
            self.samples.pop_front();
        }
        self.samples.push_back(current);

        let over_throughput = current > self.config.threshold;
        let over_queue = queue_depth > self.config.queue_cap / 2;

        self.state = if over_throughput || over_queue {
            LoadState::Overloaded
        } else {
            LoadState::Normal
        };

        if !self.is_overloaded() {
            return None;
        }

        let cooled_down = match self.last_notice {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.config.cooldown,
        };
        if !cooled_down {
            return None;
        }

        self.last_notice = Some(now);
        Some(OverloadInfo {
            throughput: current,
            queue_depth,
            drop_ratio: self.drop_ratio(),
        })
    }
}
