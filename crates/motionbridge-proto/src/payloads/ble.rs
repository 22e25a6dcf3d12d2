//! Device-control, recording, and state-query payloads.
//!
//! Field names serialize in camelCase to match the wire format the
//! user-interface clients speak.

use serde::{Deserialize, Serialize};

/// One discovered or known device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Stable device identifier
    pub id: String,
    /// Human-readable device name
    pub name: String,
    /// Battery percentage, if known
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub battery_level: Option<u8>,
    /// Whether the device is currently connected
    #[serde(default)]
    pub connected: bool,
    /// Whether the device is currently streaming samples
    #[serde(default)]
    pub streaming: bool,
}

/// Generic success/failure outcome for a device-control operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Whether the operation succeeded
    pub success: bool,
    /// Human-readable outcome description
    pub message: String,
}

impl CommandResult {
    /// Successful outcome with a message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    /// Failed outcome with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// Device discovery result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    /// Whether the scan completed
    pub success: bool,
    /// Devices found
    #[serde(default)]
    pub devices: Vec<DeviceInfo>,
    /// Optional outcome description
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

/// Connect to a device by id and advertised name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    /// Target device id
    pub device_id: String,
    /// Advertised device name
    pub name: String,
}

/// Operations addressing a single known device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRequest {
    /// Target device id
    pub device_id: String,
}

/// Temporarily elevate scan activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurstStartRequest {
    /// How long the elevated scan should run, in milliseconds
    pub duration_ms: u64,
}

/// Begin a recording session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStartRequest {
    /// Recording session identifier
    pub session_id: String,
    /// Exercise identifier
    pub exercise_id: String,
    /// Set number within the session, 1-based
    pub set_number: u32,
}

/// Outcome of a recording start/stop operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResult {
    /// Whether the operation succeeded
    pub success: bool,
    /// Optional outcome description
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    /// Identifier of the active recording, when one exists
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub recording_id: Option<String>,
}

/// Full device-plane snapshot, pushed to new clients and served on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    /// All known devices with their current flags
    pub devices: Vec<DeviceInfo>,
    /// Whether a recording session is active
    pub recording: bool,
}
