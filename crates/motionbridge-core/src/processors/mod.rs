//! Domain processors: adapters between routed messages and external ports.

mod ble;
mod client_meta;
mod streaming;
mod system;

pub use ble::{BleProcessor, RetryPolicy};
pub use client_meta::ClientMetaProcessor;
pub use streaming::StreamingProcessor;
pub use system::{StatusSource, SystemProcessor};
