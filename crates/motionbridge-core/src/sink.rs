//! Seams between the transports and the session I/O layer.
//!
//! The transports and processors never touch sockets; they hand frames to a
//! [`FrameSink`] and ask a [`SessionDirectory`] who is eligible for
//! broadcasts. The production server implements both on top of its session
//! registry; tests implement them with channels and vectors.

use motionbridge_proto::{Frame, OverloadInfo, payloads::client::ClientList};

use crate::session::SessionId;

/// Hands encoded frames to a session's writer queue.
pub trait FrameSink: Send + Sync + 'static {
    /// Try to enqueue a frame for the session. `false` means the writer is
    /// full, closed, or the session is unknown — retryable conditions, never
    /// panics.
    fn try_send(&self, session: &SessionId, frame: Frame) -> bool;
}

/// Names the sessions broadcasts go to.
pub trait SessionDirectory: Send + Sync + 'static {
    /// Sessions currently eligible for broadcasts (Active state only, so a
    /// new client's first delivered message stays the snapshot).
    fn broadcast_targets(&self) -> Vec<SessionId>;
}

/// Notifications core components raise for the embedding application.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// The client-metadata registry changed
    ClientListChanged(ClientList),
    /// The streaming domain entered (or re-reported) overload
    Overload(OverloadInfo),
}
