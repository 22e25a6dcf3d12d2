//! Structural and semantic checks on decoded messages.
//!
//! One `validate` entry point keyed on message type. Validation failures are
//! answered with an error frame bearing the original request id; they never
//! terminate the session. Version and framing problems are caught earlier,
//! at decode.

use crate::{
    message::Message,
    payloads::{ErrorCode, Payload, streaming::MOTION_FLOAT_COUNT},
};

/// A failed validation: the error code to answer with and the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Error class for the response frame (always `INVALID_MESSAGE` today)
    pub code: ErrorCode,
    /// Human-readable rejection reason
    pub reason: String,
}

impl ValidationError {
    fn new(reason: impl Into<String>) -> Self {
        Self { code: ErrorCode::InvalidMessage, reason: reason.into() }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.reason)
    }
}

fn require(condition: bool, reason: &str) -> Result<(), ValidationError> {
    if condition { Ok(()) } else { Err(ValidationError::new(reason)) }
}

/// Validate a decoded message.
///
/// Common checks first (timestamp present and finite), then type-specific
/// field checks. Unknown types pass — the router owns their rejection.
pub fn validate(message: &Message) -> Result<(), ValidationError> {
    require(
        message.timestamp_ms > 0.0 && message.timestamp_ms.is_finite(),
        "timestamp must be a positive finite value",
    )?;

    match &message.payload {
        Payload::ConnectRequest(req) => {
            require(!req.device_id.is_empty(), "connect request requires a device id")?;
            require(!req.name.is_empty(), "connect request requires a device name")?;
        },

        Payload::DisconnectRequest(req) | Payload::RemoveRequest(req) => {
            require(!req.device_id.is_empty(), "request requires a device id")?;
        },

        Payload::BurstStartRequest(req) => {
            require(req.duration_ms > 0, "burst scan duration must be positive")?;
        },

        Payload::RecordStartRequest(req) => {
            require(!req.session_id.is_empty(), "record start requires a session id")?;
            require(!req.exercise_id.is_empty(), "record start requires an exercise id")?;
            require(req.set_number >= 1, "set number must be at least 1")?;
        },

        Payload::MotionData(motion) => {
            require(!motion.device_name.is_empty(), "motion sample requires a device name")?;
            // Width is a type-level constant; the finite check is the real work.
            require(motion.values.len() == MOTION_FLOAT_COUNT, "motion sample width mismatch")?;
            require(
                motion.values.iter().all(|v| v.is_finite()),
                "motion sample values must be finite",
            )?;
        },

        Payload::Error(err) => {
            require(!err.message.is_empty(), "error frame requires a message")?;
        },

        Payload::SyncProgress(progress) => {
            require(!progress.device_id.is_empty(), "sync progress requires a device id")?;
            require(progress.progress <= 100, "sync progress is a percentage")?;
        },

        Payload::ClientRegister(reg) | Payload::ClientMetadataUpdate(reg) => {
            require(!reg.name.is_empty(), "client registration requires a name")?;
        },

        Payload::ClientActionRegister(action) => {
            require(!action.id.is_empty(), "action registration requires an id")?;
        },

        Payload::ClientActionTrigger(trigger) => {
            require(!trigger.target.is_empty(), "action trigger requires a target session")?;
            require(!trigger.action_id.is_empty(), "action trigger requires an action id")?;
        },

        _ => {},
    }

    Ok(())
}
