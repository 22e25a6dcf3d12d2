//! Typed payloads for every message the bridge recognizes.
//!
//! Frame headers are raw binary for cheap routing; payloads take one of two
//! paths chosen purely by message type. Motion samples use a hand-rolled
//! binary fast path (see [`streaming::MotionPayload`]), everything else uses
//! JSON — self-describing, trivially inspectable, and identical to what the
//! user-interface clients already speak.
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one message type (enforced by match
//! exhaustiveness). Round-trip encoding must produce an equivalent value.

pub mod ble;
pub mod client;
pub mod streaming;
pub mod system;

use bytes::{BufMut, Bytes};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    errors::{ProtocolError, Result},
    types::MessageType,
};

/// All possible frame payloads.
///
/// The payload type is determined by the message type in the frame header,
/// so serialization covers only the inner struct content — no variant tag on
/// the wire. Unknown message types keep their raw bytes so the router (not
/// the codec) can answer them with an error frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Keep-alive; echoed
    Heartbeat,
    /// Request a status snapshot
    StatusRequest,
    /// Status snapshot
    StatusResponse(system::StatusPayload),
    /// Error code and message
    Error(ErrorPayload),

    /// Trigger device discovery
    ScanRequest,
    /// Discovery result
    ScanResponse(ble::ScanResult),
    /// Connect by id and name
    ConnectRequest(ble::ConnectRequest),
    /// Connect outcome
    ConnectResponse(ble::CommandResult),
    /// Disconnect by id
    DisconnectRequest(ble::DeviceRequest),
    /// Disconnect outcome
    DisconnectResponse(ble::CommandResult),
    /// Synchronize all connected devices
    SyncRequest,
    /// Synchronization outcome
    SyncResponse(ble::CommandResult),
    /// Begin locate mode
    LocateStartRequest,
    /// Locate start outcome
    LocateStartResponse(ble::CommandResult),
    /// End locate mode
    LocateStopRequest,
    /// Locate stop outcome
    LocateStopResponse(ble::CommandResult),
    /// Elevate scan activity
    BurstStartRequest(ble::BurstStartRequest),
    /// End elevated scan activity
    BurstStopRequest,
    /// Forget a device
    RemoveRequest(ble::DeviceRequest),
    /// Remove outcome
    RemoveResponse(ble::CommandResult),

    /// Begin a recording session
    RecordStartRequest(ble::RecordStartRequest),
    /// Recording start outcome
    RecordStartResponse(ble::RecordResult),
    /// End the recording session
    RecordStopRequest,
    /// Recording stop outcome
    RecordStopResponse(ble::RecordResult),

    /// Motion sample (fast path)
    MotionData(streaming::MotionPayload),
    /// Device flags broadcast
    DeviceStatus(streaming::DeviceStatusPayload),
    /// Battery levels broadcast
    BatteryUpdate(streaming::BatteryPayload),
    /// Sync began
    SyncStarted(streaming::SyncStartedPayload),
    /// Sync progress
    SyncProgress(streaming::SyncProgressPayload),
    /// Sync finished
    SyncComplete(streaming::SyncCompletePayload),
    /// Shake-detection set
    DeviceVibrating(streaming::DeviceVibratingPayload),

    /// Full snapshot broadcast
    StateUpdate(ble::StateSnapshot),

    /// Fetch the snapshot on demand
    DevicesStateRequest,
    /// Snapshot response
    DevicesStateResponse(ble::StateSnapshot),

    /// Declare client metadata
    ClientRegister(client::ClientRegistration),
    /// Update client metadata
    ClientMetadataUpdate(client::ClientRegistration),
    /// Expose an invocable action
    ClientActionRegister(client::ActionSpec),
    /// Invoke an action on a target client
    ClientActionTrigger(client::ActionTrigger),
    /// Action invocation outcome
    ClientActionResult(client::ActionResult),
    /// Updated client list broadcast
    ClientListUpdate(client::ClientList),

    /// Internal acknowledgement
    Ack,
    /// Internal liveness probe
    Ping,
    /// Internal liveness reply
    Pong,

    /// Message type the codec does not recognize. Raw bytes are preserved
    /// so routing-level errors can quote the offending type.
    Unknown {
        /// Raw message-type byte
        msg_type: u8,
        /// Undecoded payload bytes
        bytes: Bytes,
    },
}

/// Domain-neutral error codes carried by error frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Header or validator rejection
    InvalidMessage,
    /// Reliable request exhausted its retries
    Timeout,
    /// Device port not injected or refused the operation
    DeviceUnavailable,
    /// Device id unknown
    DeviceNotFound,
    /// Connect attempt failed after retries
    ConnectionFailed,
    /// Idempotent connect (reported as ok)
    AlreadyConnected,
    /// Operation requires a connected device
    NotConnected,
    /// Idempotent recording start (reported as ok)
    RecordingActive,
    /// Recording stop without an active recording
    NoRecording,
    /// Supervisor-emitted load-shedding notification
    StreamingOverload,
}

impl ErrorCode {
    /// Wire string for this code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidMessage => "INVALID_MESSAGE",
            Self::Timeout => "TIMEOUT",
            Self::DeviceUnavailable => "DEVICE_UNAVAILABLE",
            Self::DeviceNotFound => "DEVICE_NOT_FOUND",
            Self::ConnectionFailed => "CONNECTION_FAILED",
            Self::AlreadyConnected => "ALREADY_CONNECTED",
            Self::NotConnected => "NOT_CONNECTED",
            Self::RecordingActive => "RECORDING_ACTIVE",
            Self::NoRecording => "NO_RECORDING",
            Self::StreamingOverload => "STREAMING_OVERLOAD",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overload details attached to `STREAMING_OVERLOAD` notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverloadInfo {
    /// Messages per second at the time of sampling
    pub throughput: u64,
    /// Streaming queue depth at the time of sampling
    pub queue_depth: usize,
    /// Fraction of non-critical messages being dropped
    pub drop_ratio: f64,
}

/// Error payload for error frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Error class
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Present only on overload notifications
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub overload: Option<OverloadInfo>,
}

impl ErrorPayload {
    /// Plain error with a code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), overload: None }
    }

    /// Overload notification with sampling details.
    pub fn overload(message: impl Into<String>, info: OverloadInfo) -> Self {
        Self { code: ErrorCode::StreamingOverload, message: message.into(), overload: Some(info) }
    }
}

fn to_json<T: Serialize>(value: &T, dst: &mut impl BufMut) -> Result<()> {
    let bytes = serde_json::to_vec(value).map_err(|e| ProtocolError::JsonEncode(e.to_string()))?;
    dst.put_slice(&bytes);
    Ok(())
}

fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::JsonDecode(e.to_string()))
}

impl Payload {
    /// Wire message-type byte this payload serializes under.
    #[must_use]
    pub fn msg_type(&self) -> u8 {
        match self {
            Self::Heartbeat => MessageType::Heartbeat.to_u8(),
            Self::StatusRequest => MessageType::StatusRequest.to_u8(),
            Self::StatusResponse(_) => MessageType::StatusResponse.to_u8(),
            Self::Error(_) => MessageType::Error.to_u8(),
            Self::ScanRequest => MessageType::ScanRequest.to_u8(),
            Self::ScanResponse(_) => MessageType::ScanResponse.to_u8(),
            Self::ConnectRequest(_) => MessageType::ConnectRequest.to_u8(),
            Self::ConnectResponse(_) => MessageType::ConnectResponse.to_u8(),
            Self::DisconnectRequest(_) => MessageType::DisconnectRequest.to_u8(),
            Self::DisconnectResponse(_) => MessageType::DisconnectResponse.to_u8(),
            Self::SyncRequest => MessageType::SyncRequest.to_u8(),
            Self::SyncResponse(_) => MessageType::SyncResponse.to_u8(),
            Self::LocateStartRequest => MessageType::LocateStartRequest.to_u8(),
            Self::LocateStartResponse(_) => MessageType::LocateStartResponse.to_u8(),
            Self::LocateStopRequest => MessageType::LocateStopRequest.to_u8(),
            Self::LocateStopResponse(_) => MessageType::LocateStopResponse.to_u8(),
            Self::BurstStartRequest(_) => MessageType::BurstStartRequest.to_u8(),
            Self::BurstStopRequest => MessageType::BurstStopRequest.to_u8(),
            Self::RemoveRequest(_) => MessageType::RemoveRequest.to_u8(),
            Self::RemoveResponse(_) => MessageType::RemoveResponse.to_u8(),
            Self::RecordStartRequest(_) => MessageType::RecordStartRequest.to_u8(),
            Self::RecordStartResponse(_) => MessageType::RecordStartResponse.to_u8(),
            Self::RecordStopRequest => MessageType::RecordStopRequest.to_u8(),
            Self::RecordStopResponse(_) => MessageType::RecordStopResponse.to_u8(),
            Self::MotionData(_) => MessageType::MotionData.to_u8(),
            Self::DeviceStatus(_) => MessageType::DeviceStatus.to_u8(),
            Self::BatteryUpdate(_) => MessageType::BatteryUpdate.to_u8(),
            Self::SyncStarted(_) => MessageType::SyncStarted.to_u8(),
            Self::SyncProgress(_) => MessageType::SyncProgress.to_u8(),
            Self::SyncComplete(_) => MessageType::SyncComplete.to_u8(),
            Self::DeviceVibrating(_) => MessageType::DeviceVibrating.to_u8(),
            Self::StateUpdate(_) => MessageType::StateUpdate.to_u8(),
            Self::DevicesStateRequest => MessageType::DevicesStateRequest.to_u8(),
            Self::DevicesStateResponse(_) => MessageType::DevicesStateResponse.to_u8(),
            Self::ClientRegister(_) => MessageType::ClientRegister.to_u8(),
            Self::ClientMetadataUpdate(_) => MessageType::ClientMetadataUpdate.to_u8(),
            Self::ClientActionRegister(_) => MessageType::ClientActionRegister.to_u8(),
            Self::ClientActionTrigger(_) => MessageType::ClientActionTrigger.to_u8(),
            Self::ClientActionResult(_) => MessageType::ClientActionResult.to_u8(),
            Self::ClientListUpdate(_) => MessageType::ClientListUpdate.to_u8(),
            Self::Ack => MessageType::Ack.to_u8(),
            Self::Ping => MessageType::Ping.to_u8(),
            Self::Pong => MessageType::Pong.to_u8(),
            Self::Unknown { msg_type, .. } => *msg_type,
        }
    }

    /// Message type as an enum. `None` for [`Payload::Unknown`].
    #[must_use]
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_u8(self.msg_type())
    }

    /// Encode the payload into a buffer.
    ///
    /// Zero-byte payloads (heartbeat, ping, bare requests) write nothing;
    /// motion takes the fast path; everything else serializes as JSON.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        match self {
            Self::Heartbeat
            | Self::StatusRequest
            | Self::ScanRequest
            | Self::SyncRequest
            | Self::LocateStartRequest
            | Self::LocateStopRequest
            | Self::BurstStopRequest
            | Self::RecordStopRequest
            | Self::DevicesStateRequest
            | Self::Ack
            | Self::Ping
            | Self::Pong => Ok(()),

            Self::MotionData(inner) => inner.encode(dst),

            Self::StatusResponse(inner) => to_json(inner, dst),
            Self::Error(inner) => to_json(inner, dst),
            Self::ScanResponse(inner) => to_json(inner, dst),
            Self::ConnectRequest(inner) => to_json(inner, dst),
            Self::ConnectResponse(inner) => to_json(inner, dst),
            Self::DisconnectRequest(inner) => to_json(inner, dst),
            Self::DisconnectResponse(inner) => to_json(inner, dst),
            Self::SyncResponse(inner) => to_json(inner, dst),
            Self::LocateStartResponse(inner) => to_json(inner, dst),
            Self::LocateStopResponse(inner) => to_json(inner, dst),
            Self::BurstStartRequest(inner) => to_json(inner, dst),
            Self::RemoveRequest(inner) => to_json(inner, dst),
            Self::RemoveResponse(inner) => to_json(inner, dst),
            Self::RecordStartRequest(inner) => to_json(inner, dst),
            Self::RecordStartResponse(inner) => to_json(inner, dst),
            Self::RecordStopResponse(inner) => to_json(inner, dst),
            Self::DeviceStatus(inner) => to_json(inner, dst),
            Self::BatteryUpdate(inner) => to_json(inner, dst),
            Self::SyncStarted(inner) => to_json(inner, dst),
            Self::SyncProgress(inner) => to_json(inner, dst),
            Self::SyncComplete(inner) => to_json(inner, dst),
            Self::DeviceVibrating(inner) => to_json(inner, dst),
            Self::StateUpdate(inner) => to_json(inner, dst),
            Self::DevicesStateResponse(inner) => to_json(inner, dst),
            Self::ClientRegister(inner) => to_json(inner, dst),
            Self::ClientMetadataUpdate(inner) => to_json(inner, dst),
            Self::ClientActionRegister(inner) => to_json(inner, dst),
            Self::ClientActionTrigger(inner) => to_json(inner, dst),
            Self::ClientActionResult(inner) => to_json(inner, dst),
            Self::ClientListUpdate(inner) => to_json(inner, dst),

            Self::Unknown { bytes, .. } => {
                dst.put_slice(bytes);
                Ok(())
            },
        }
    }

    /// Decode a payload from bytes, given the message-type byte.
    ///
    /// Unrecognized types decode successfully into [`Payload::Unknown`] —
    /// rejecting them is the router's job, so the sender gets a routing
    /// error instead of a silent drop.
    pub fn decode(msg_type: u8, bytes: &[u8]) -> Result<Self> {
        let Some(kind) = MessageType::from_u8(msg_type) else {
            return Ok(Self::Unknown { msg_type, bytes: Bytes::copy_from_slice(bytes) });
        };

        let payload = match kind {
            MessageType::Heartbeat => Self::Heartbeat,
            MessageType::StatusRequest => Self::StatusRequest,
            MessageType::StatusResponse => Self::StatusResponse(from_json(bytes)?),
            MessageType::Error => Self::Error(from_json(bytes)?),
            MessageType::ScanRequest => Self::ScanRequest,
            MessageType::ScanResponse => Self::ScanResponse(from_json(bytes)?),
            MessageType::ConnectRequest => Self::ConnectRequest(from_json(bytes)?),
            MessageType::ConnectResponse => Self::ConnectResponse(from_json(bytes)?),
            MessageType::DisconnectRequest => Self::DisconnectRequest(from_json(bytes)?),
            MessageType::DisconnectResponse => Self::DisconnectResponse(from_json(bytes)?),
            MessageType::SyncRequest => Self::SyncRequest,
            MessageType::SyncResponse => Self::SyncResponse(from_json(bytes)?),
            MessageType::LocateStartRequest => Self::LocateStartRequest,
            MessageType::LocateStartResponse => Self::LocateStartResponse(from_json(bytes)?),
            MessageType::LocateStopRequest => Self::LocateStopRequest,
            MessageType::LocateStopResponse => Self::LocateStopResponse(from_json(bytes)?),
            MessageType::BurstStartRequest => Self::BurstStartRequest(from_json(bytes)?),
            MessageType::BurstStopRequest => Self::BurstStopRequest,
            MessageType::RemoveRequest => Self::RemoveRequest(from_json(bytes)?),
            MessageType::RemoveResponse => Self::RemoveResponse(from_json(bytes)?),
            MessageType::RecordStartRequest => Self::RecordStartRequest(from_json(bytes)?),
            MessageType::RecordStartResponse => Self::RecordStartResponse(from_json(bytes)?),
            MessageType::RecordStopRequest => Self::RecordStopRequest,
            MessageType::RecordStopResponse => Self::RecordStopResponse(from_json(bytes)?),
            MessageType::MotionData => Self::MotionData(streaming::MotionPayload::decode(bytes)?),
            MessageType::DeviceStatus => Self::DeviceStatus(from_json(bytes)?),
            MessageType::BatteryUpdate => Self::BatteryUpdate(from_json(bytes)?),
            MessageType::SyncStarted => Self::SyncStarted(from_json(bytes)?),
            MessageType::SyncProgress => Self::SyncProgress(from_json(bytes)?),
            MessageType::SyncComplete => Self::SyncComplete(from_json(bytes)?),
            MessageType::DeviceVibrating => Self::DeviceVibrating(from_json(bytes)?),
            MessageType::StateUpdate => Self::StateUpdate(from_json(bytes)?),
            MessageType::DevicesStateRequest => Self::DevicesStateRequest,
            MessageType::DevicesStateResponse => Self::DevicesStateResponse(from_json(bytes)?),
            MessageType::ClientRegister => Self::ClientRegister(from_json(bytes)?),
            MessageType::ClientMetadataUpdate => Self::ClientMetadataUpdate(from_json(bytes)?),
            MessageType::ClientActionRegister => Self::ClientActionRegister(from_json(bytes)?),
            MessageType::ClientActionTrigger => Self::ClientActionTrigger(from_json(bytes)?),
            MessageType::ClientActionResult => Self::ClientActionResult(from_json(bytes)?),
            MessageType::ClientListUpdate => Self::ClientListUpdate(from_json(bytes)?),
            MessageType::Ack => Self::Ack,
            MessageType::Ping => Self::Ping,
            MessageType::Pong => Self::Pong,
        };

        Ok(payload)
    }
}
