//! Error types for the production server.

use motionbridge_core::{BridgeError, SessionId};
use motionbridge_proto::ProtocolError;
use thiserror::Error;

/// Errors raised by the listener, session I/O, and runtime glue.
#[derive(Error, Debug)]
pub enum ServerError {
    /// An explicitly configured port could not be bound. Fail fast — an
    /// explicit port is a contract, not a suggestion.
    #[error("failed to bind configured port {port}: {source}")]
    Bind {
        /// The configured port
        port: u16,
        /// The underlying bind failure
        source: std::io::Error,
    },

    /// The startup scan found no free port in its range.
    #[error("no free port in {base}..{end}")]
    NoFreePort {
        /// First port tried
        base: u16,
        /// One past the last port tried
        end: u16,
    },

    /// WebSocket handshake with a new client failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    /// A session id that is no longer (or never was) registered.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Bridge-level failure.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Wire-format failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Listener or socket I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
