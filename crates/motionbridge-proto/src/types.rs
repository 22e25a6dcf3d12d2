//! Message-type space and domain classification.
//!
//! Types occupy a flat 8-bit space partitioned into fixed ranges; range
//! membership alone determines which domain a message is routed to. The
//! numeric ranges are contractual — adding a type means slotting it into the
//! range that owns its domain, never inventing a new range.

use serde::{Deserialize, Serialize};

/// All message types the bridge recognizes.
///
/// | range | domain |
/// |---|---|
/// | `0x01–0x0F` | system (heartbeat, status, error) |
/// | `0x10–0x1F` | device-control request/response |
/// | `0x20–0x2F` | recording request/response |
/// | `0x30–0x3F` | streaming broadcasts |
/// | `0x40` | full-state snapshot broadcast |
/// | `0x50–0x5F` | state-query request/response |
/// | `0x60–0x6F` | client-metadata/action protocol |
/// | `0xF0–0xFF` | internal (ack, ping, pong) |
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Keep-alive; echoed back unchanged
    Heartbeat = 0x01,
    /// Request a system status snapshot
    StatusRequest = 0x02,
    /// System status snapshot
    StatusResponse = 0x03,
    /// Bearer of an error code and message
    Error = 0x04,

    /// Trigger device discovery
    ScanRequest = 0x10,
    /// Device discovery result
    ScanResponse = 0x11,
    /// Connect to a device by id and name
    ConnectRequest = 0x12,
    /// Connect outcome
    ConnectResponse = 0x13,
    /// Disconnect a device by id
    DisconnectRequest = 0x14,
    /// Disconnect outcome
    DisconnectResponse = 0x15,
    /// Synchronize all connected devices
    SyncRequest = 0x16,
    /// Synchronization outcome
    SyncResponse = 0x17,
    /// Begin device-locate mode
    LocateStartRequest = 0x18,
    /// Locate-mode start outcome
    LocateStartResponse = 0x19,
    /// End device-locate mode
    LocateStopRequest = 0x1A,
    /// Locate-mode stop outcome
    LocateStopResponse = 0x1B,
    /// Temporarily elevate scan activity
    BurstStartRequest = 0x1C,
    /// End elevated scan activity
    BurstStopRequest = 0x1D,
    /// Cancel reconnect and forget a device
    RemoveRequest = 0x1E,
    /// Remove outcome
    RemoveResponse = 0x1F,

    /// Begin a recording session
    RecordStartRequest = 0x20,
    /// Recording-start outcome
    RecordStartResponse = 0x21,
    /// End the recording session
    RecordStopRequest = 0x22,
    /// Recording-stop outcome
    RecordStopResponse = 0x23,

    /// Device name plus fixed-size float vector (fast path)
    MotionData = 0x30,
    /// Per-device connected/streaming flags
    DeviceStatus = 0x31,
    /// Per-device battery level
    BatteryUpdate = 0x32,
    /// Device sync began
    SyncStarted = 0x33,
    /// Device sync progress
    SyncProgress = 0x34,
    /// Device sync finished
    SyncComplete = 0x35,
    /// Locate-mode shake-detection set
    DeviceVibrating = 0x36,

    /// Full device snapshot after new-client connect
    StateUpdate = 0x40,

    /// Fetch the device snapshot on demand
    DevicesStateRequest = 0x50,
    /// Device snapshot response
    DevicesStateResponse = 0x51,

    /// Declare client metadata
    ClientRegister = 0x60,
    /// Update client metadata
    ClientMetadataUpdate = 0x61,
    /// Expose an invocable action
    ClientActionRegister = 0x62,
    /// Invoke an action on a target client
    ClientActionTrigger = 0x63,
    /// Action invocation outcome
    ClientActionResult = 0x64,
    /// Updated client list broadcast
    ClientListUpdate = 0x65,

    /// Internal acknowledgement
    Ack = 0xF0,
    /// Internal liveness probe
    Ping = 0xF1,
    /// Internal liveness reply
    Pong = 0xF2,
}

impl MessageType {
    /// Convert from a wire byte. `None` if unrecognized.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x01 => Self::Heartbeat,
            0x02 => Self::StatusRequest,
            0x03 => Self::StatusResponse,
            0x04 => Self::Error,
            0x10 => Self::ScanRequest,
            0x11 => Self::ScanResponse,
            0x12 => Self::ConnectRequest,
            0x13 => Self::ConnectResponse,
            0x14 => Self::DisconnectRequest,
            0x15 => Self::DisconnectResponse,
            0x16 => Self::SyncRequest,
            0x17 => Self::SyncResponse,
            0x18 => Self::LocateStartRequest,
            0x19 => Self::LocateStartResponse,
            0x1A => Self::LocateStopRequest,
            0x1B => Self::LocateStopResponse,
            0x1C => Self::BurstStartRequest,
            0x1D => Self::BurstStopRequest,
            0x1E => Self::RemoveRequest,
            0x1F => Self::RemoveResponse,
            0x20 => Self::RecordStartRequest,
            0x21 => Self::RecordStartResponse,
            0x22 => Self::RecordStopRequest,
            0x23 => Self::RecordStopResponse,
            0x30 => Self::MotionData,
            0x31 => Self::DeviceStatus,
            0x32 => Self::BatteryUpdate,
            0x33 => Self::SyncStarted,
            0x34 => Self::SyncProgress,
            0x35 => Self::SyncComplete,
            0x36 => Self::DeviceVibrating,
            0x40 => Self::StateUpdate,
            0x50 => Self::DevicesStateRequest,
            0x51 => Self::DevicesStateResponse,
            0x60 => Self::ClientRegister,
            0x61 => Self::ClientMetadataUpdate,
            0x62 => Self::ClientActionRegister,
            0x63 => Self::ClientActionTrigger,
            0x64 => Self::ClientActionResult,
            0x65 => Self::ClientListUpdate,
            0xF0 => Self::Ack,
            0xF1 => Self::Ping,
            0xF2 => Self::Pong,
            _ => return None,
        })
    }

    /// Convert to the wire byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Whether this type answers a correlated request. Response types with
    /// a request id can resolve a pending reliable-transport entry; request
    /// types never do, even when a request id collides.
    #[must_use]
    pub fn is_response(self) -> bool {
        matches!(
            self,
            Self::StatusResponse
                | Self::Error
                | Self::ScanResponse
                | Self::ConnectResponse
                | Self::DisconnectResponse
                | Self::SyncResponse
                | Self::LocateStartResponse
                | Self::LocateStopResponse
                | Self::RemoveResponse
                | Self::RecordStartResponse
                | Self::RecordStopResponse
                | Self::DevicesStateResponse
                | Self::ClientActionResult
                | Self::Ack
                | Self::Pong
        )
    }

    /// Whether this type is a streaming broadcast that must survive load
    /// shedding. Motion data is the only non-critical streaming type.
    #[must_use]
    pub fn is_critical_stream(self) -> bool {
        matches!(
            self,
            Self::DeviceStatus
                | Self::BatteryUpdate
                | Self::SyncStarted
                | Self::SyncProgress
                | Self::SyncComplete
                | Self::DeviceVibrating
                | Self::StateUpdate
        )
    }
}

/// Functional domain a message type routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Heartbeat, status, error, and internal liveness types
    System,
    /// Device control, recording, and state queries
    Ble,
    /// High-rate broadcasts and the state snapshot
    Streaming,
    /// Client-metadata and action protocol
    ClientMeta,
}

impl Domain {
    /// Classify a raw message-type byte into a domain by range membership.
    ///
    /// `None` means the byte falls outside every contractual range; the
    /// router answers such messages with an error frame.
    #[must_use]
    pub fn classify(msg_type: u8) -> Option<Self> {
        match msg_type {
            0x01..=0x0F => Some(Self::System),
            0x10..=0x2F => Some(Self::Ble),
            0x30..=0x40 => Some(Self::Streaming),
            0x50..=0x5F => Some(Self::Ble),
            0x60..=0x6F => Some(Self::ClientMeta),
            0xF0..=0xFF => Some(Self::System),
            _ => None,
        }
    }

    /// Short lowercase tag, used in logs and stats.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Ble => "ble",
            Self::Streaming => "streaming",
            Self::ClientMeta => "client-meta",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}
