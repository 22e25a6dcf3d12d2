//! Core logic for the motionbridge message bridge.
//!
//! Everything between the wire format ([`motionbridge_proto`]) and the
//! socket: per-session state machines, the reliable and streaming
//! transports, the range router with its domain processors, throughput
//! metering, and the overload supervisor. The crate opens no sockets — the
//! production server injects a [`FrameSink`] and a [`SessionDirectory`] and
//! drives the periodic hooks ([`ReliableTransport::sweep`],
//! [`StreamingTransport::process_queue`], [`OverloadSupervisor::sample`],
//! [`Session::tick`]) from its own loops.
//!
//! # Components
//!
//! - [`BridgeConfig`]: every recognized tunable, with performance presets
//! - [`Session`]: lifecycle, liveness, counters, ping/pong latency
//! - [`ReliableTransport`]: request correlation, retries, dedup
//! - [`StreamingTransport`]: rate-limited fire-and-forget fan-out
//! - [`Router`] + [`DomainProcessor`]: range classification and dispatch
//! - [`OverloadSupervisor`]: sliding-window overload detection and shedding
//! - [`ports`]: the injected device/processing/system service interfaces

mod config;
mod error;
mod meter;
pub mod ports;
mod processors;
mod registry;
mod reliable;
mod router;
mod session;
mod sink;
mod streaming;
mod supervisor;

pub use config::{BridgeConfig, PerformanceMode};
pub use error::BridgeError;
pub use meter::RateWindow;
pub use processors::{
    BleProcessor, ClientMetaProcessor, RetryPolicy, StatusSource, StreamingProcessor,
    SystemProcessor,
};
pub use registry::ClientRegistry;
pub use reliable::{InboundDisposition, ReliableConfig, ReliableStats, ReliableTransport};
pub use router::{DomainProcessor, Router, RouterStats, operation_timeout};
pub use session::{Session, SessionHealth, SessionId, SessionState, SessionTick};
pub use sink::{BridgeEvent, FrameSink, SessionDirectory};
pub use streaming::{BATCH_INTERVAL, StreamingConfig, StreamingStats, StreamingTransport};
pub use supervisor::{LoadState, OverloadSupervisor, SupervisorConfig};

/// First port tried when no explicit port is configured.
pub const DEFAULT_PORT_BASE: u16 = 8080;

/// How many consecutive ports the startup scan tries.
pub const PORT_SCAN_RANGE: u16 = 50;
