//! Bridge configuration.
//!
//! A single config object covers every tunable the bridge recognizes.
//! Performance modes are presets over the streaming and overload knobs;
//! explicit fields always win over the preset.

use std::time::Duration;

/// Workload preset adjusting streaming and overload behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PerformanceMode {
    /// Larger queues and higher shedding thresholds; favors delivery volume
    HighThroughput,
    /// Small queues, aggressive drop-oldest; favors freshness
    LowLatency,
    /// The defaults
    #[default]
    Balanced,
}

impl PerformanceMode {
    /// Parse a mode from its CLI spelling.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "high_throughput" => Some(Self::HighThroughput),
            "low_latency" => Some(Self::LowLatency),
            "balanced" => Some(Self::Balanced),
            _ => None,
        }
    }
}

/// All recognized bridge options.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Explicit listen port; `None` scans from [`crate::DEFAULT_PORT_BASE`]
    pub port: Option<u16>,
    /// Maximum simultaneous sessions
    pub max_connections: usize,
    /// Cadence of liveness pings
    pub heartbeat_interval: Duration,
    /// Idle time after which a session is terminated
    pub connection_timeout: Duration,
    /// Per-attempt wait for a reliable response
    pub reliable_timeout: Duration,
    /// Retries after the first reliable attempt
    pub reliable_max_retries: u32,
    /// First retry backoff; doubles per attempt
    pub reliable_backoff_base: Duration,
    /// Backoff ceiling
    pub reliable_backoff_cap: Duration,
    /// Whether per-session streaming rate limiting is active
    pub streaming_rate_limit_enabled: bool,
    /// Streaming sends allowed per session per second
    pub streaming_messages_per_second: u32,
    /// Shared streaming queue capacity
    pub streaming_queue_cap: usize,
    /// On queue overflow, drop the oldest entry (else the incoming one)
    pub streaming_drop_old_messages: bool,
    /// Messages per second above which the supervisor declares overload
    pub overload_threshold: u64,
    /// Minimum spacing between overload notifications
    pub overload_cooldown: Duration,
    /// Percentage of non-critical messages shed under overload
    pub overload_drop_percent: u8,
    /// Workload preset
    pub performance_mode: PerformanceMode,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: None,
            max_connections: 10,
            heartbeat_interval: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(60),
            reliable_timeout: Duration::from_secs(5),
            reliable_max_retries: 3,
            reliable_backoff_base: Duration::from_secs(1),
            reliable_backoff_cap: Duration::from_secs(10),
            streaming_rate_limit_enabled: true,
            streaming_messages_per_second: 1_000,
            streaming_queue_cap: 100,
            streaming_drop_old_messages: true,
            overload_threshold: 1_000,
            overload_cooldown: Duration::from_secs(5),
            overload_drop_percent: 50,
            performance_mode: PerformanceMode::Balanced,
        }
    }
}

impl BridgeConfig {
    /// Defaults adjusted by a performance-mode preset.
    #[must_use]
    pub fn for_mode(mode: PerformanceMode) -> Self {
        let mut config = Self { performance_mode: mode, ..Self::default() };

        match mode {
            PerformanceMode::HighThroughput => {
                config.streaming_messages_per_second = 2_000;
                config.streaming_queue_cap = 200;
                config.overload_threshold = 2_000;
            },
            PerformanceMode::LowLatency => {
                config.streaming_messages_per_second = 500;
                config.streaming_queue_cap = 50;
                config.streaming_drop_old_messages = true;
            },
            PerformanceMode::Balanced => {},
        }

        config
    }

    /// Per-session writer queue capacity for the current mode.
    #[must_use]
    pub fn writer_queue_capacity(&self) -> usize {
        match self.performance_mode {
            PerformanceMode::HighThroughput => 256,
            PerformanceMode::LowLatency => 32,
            PerformanceMode::Balanced => 128,
        }
    }

    /// Upper bound on how long a pending reliable entry may live before the
    /// cleanup sweep rejects it: the full retry schedule with a 2x margin.
    #[must_use]
    pub fn reliable_max_pending_age(&self) -> Duration {
        self.reliable_timeout * (self.reliable_max_retries + 1) * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = BridgeConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.connection_timeout, Duration::from_secs(60));
        assert_eq!(config.reliable_timeout, Duration::from_secs(5));
        assert_eq!(config.reliable_max_retries, 3);
        assert_eq!(config.streaming_messages_per_second, 1_000);
        assert_eq!(config.streaming_queue_cap, 100);
        assert!(config.streaming_drop_old_messages);
        assert_eq!(config.overload_threshold, 1_000);
        assert_eq!(config.overload_drop_percent, 50);
    }

    #[test]
    fn pending_age_has_safety_margin() {
        let config = BridgeConfig::default();
        // 5s timeout, 3 retries: (3 + 1) * 5s * 2 = 40s
        assert_eq!(config.reliable_max_pending_age(), Duration::from_secs(40));
    }

    #[test]
    fn mode_parsing() {
        assert_eq!(PerformanceMode::parse("balanced"), Some(PerformanceMode::Balanced));
        assert_eq!(
            PerformanceMode::parse("high_throughput"),
            Some(PerformanceMode::HighThroughput)
        );
        assert_eq!(PerformanceMode::parse("low_latency"), Some(PerformanceMode::LowLatency));
        assert_eq!(PerformanceMode::parse("turbo"), None);
    }

    #[test]
    fn presets_adjust_streaming_knobs() {
        let high = BridgeConfig::for_mode(PerformanceMode::HighThroughput);
        assert_eq!(high.streaming_queue_cap, 200);

        let low = BridgeConfig::for_mode(PerformanceMode::LowLatency);
        assert!(low.writer_queue_capacity() < high.writer_queue_capacity());
    }
}
