//! System status payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// System status snapshot, assembled on demand for `StatusRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    /// Whether the listener is accepting sessions
    pub running: bool,
    /// Milliseconds since the bridge started
    pub uptime_ms: u64,
    /// Currently connected sessions
    pub session_count: usize,
    /// Messages processed since start
    pub messages_processed: u64,
    /// Processing errors since start
    pub errors: u64,
    /// Rolling one-minute throughput, messages per second
    pub throughput_per_sec: f64,
    /// Errors per processed message over the same window
    pub error_rate: f64,
    /// Occurrences per error class
    #[serde(default)]
    pub error_counts: BTreeMap<String, u64>,
    /// Extra fields contributed by the host system, forwarded verbatim
    #[serde(flatten, default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}
