//! Wire protocol for the motionbridge message bridge.
//!
//! Defines the transport framing shared by the bridge and its clients:
//!
//! - [`FrameHeader`]: fixed 16-byte little-endian header, parsed zero-copy
//! - [`Frame`]: header plus raw payload bytes (transport layer)
//! - [`Message`]: the logical record — correlation id, timestamp, typed
//!   payload (application layer)
//! - [`MessageType`] / [`Domain`]: the partitioned 8-bit type space and the
//!   range-to-domain mapping the router relies on
//! - [`payloads`]: typed payload structs, the motion fast path, and the
//!   error taxonomy
//! - [`validate`]: structural and semantic checks on decoded messages
//!
//! The crate is I/O-free; sockets, sessions, and routing live above it.

mod errors;
mod frame;
mod header;
mod message;
pub mod payloads;
mod types;
mod validate;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use message::{Message, now_ms};
pub use payloads::{ErrorCode, ErrorPayload, OverloadInfo, Payload};
pub use types::{Domain, MessageType};
pub use validate::{ValidationError, validate};
