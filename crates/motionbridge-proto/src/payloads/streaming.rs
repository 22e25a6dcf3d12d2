//! Streaming broadcast payloads, including the motion fast path.
//!
//! Motion frames dominate traffic by two orders of magnitude, so they skip
//! structured-text entirely: `[u16 name_len][name bytes][f32 × N]`, all
//! little-endian, with N fixed at [`MOTION_FLOAT_COUNT`]. Every other
//! streaming type takes the generic JSON path.

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Number of floats in a motion payload — left and right current angles.
///
/// A protocol constant: codec, validator, and all producers agree on it, and
/// payloads of any other width are rejected.
pub const MOTION_FLOAT_COUNT: usize = 2;

/// One motion sample from a device.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionPayload {
    /// Name of the device that produced the sample
    pub device_name: String,
    /// Sample values, exactly [`MOTION_FLOAT_COUNT`] of them
    pub values: [f32; MOTION_FLOAT_COUNT],
}

impl MotionPayload {
    /// Encode to the fast-path wire form.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::PayloadTooLarge`] if the device name exceeds the
    ///   u16 length prefix
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let name = self.device_name.as_bytes();
        let name_len = u16::try_from(name.len()).map_err(|_| ProtocolError::PayloadTooLarge {
            size: name.len(),
            max: u16::MAX as usize,
        })?;

        dst.put_u16_le(name_len);
        dst.put_slice(name);
        for value in self.values {
            dst.put_f32_le(value);
        }

        Ok(())
    }

    /// Decode from the fast-path wire form.
    ///
    /// The float count must be exactly [`MOTION_FLOAT_COUNT`]; a payload
    /// with trailing bytes decodes as the wrong width, not as extra data.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::MotionTruncated`] if the buffer is shorter than
    ///   its own length prefix implies
    /// - [`ProtocolError::MotionWidth`] if the float count is off
    /// - [`ProtocolError::MotionDeviceName`] if the name is not UTF-8
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(ProtocolError::MotionTruncated { expected: 2, actual: bytes.len() });
        }

        let name_len = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        let floats_at = 2 + name_len;

        if bytes.len() < floats_at {
            return Err(ProtocolError::MotionTruncated {
                expected: floats_at,
                actual: bytes.len(),
            });
        }

        let device_name = std::str::from_utf8(&bytes[2..floats_at])
            .map_err(|_| ProtocolError::MotionDeviceName)?
            .to_owned();

        let float_bytes = bytes.len() - floats_at;
        if float_bytes != MOTION_FLOAT_COUNT * 4 {
            return Err(ProtocolError::MotionWidth {
                expected: MOTION_FLOAT_COUNT,
                actual: float_bytes / 4,
            });
        }

        let mut values = [0f32; MOTION_FLOAT_COUNT];
        for (i, value) in values.iter_mut().enumerate() {
            let at = floats_at + i * 4;
            *value = f32::from_le_bytes([
                bytes[at],
                bytes[at + 1],
                bytes[at + 2],
                bytes[at + 3],
            ]);
        }

        Ok(Self { device_name, values })
    }
}

/// Connected/streaming flags for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusEntry {
    /// Device id
    pub id: String,
    /// Device name
    pub name: String,
    /// Whether the device is connected
    pub connected: bool,
    /// Whether the device is streaming samples
    pub streaming: bool,
}

/// Per-device connected/streaming flags broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusPayload {
    /// Flags for every known device
    pub devices: Vec<DeviceStatusEntry>,
}

/// Battery level for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryEntry {
    /// Device id
    pub device_id: String,
    /// Battery percentage
    pub level: u8,
}

/// Per-device battery levels broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryPayload {
    /// Levels for every reporting device
    pub levels: Vec<BatteryEntry>,
}

/// Device sync began.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStartedPayload {
    /// How many devices are being synchronized
    pub device_count: u32,
}

/// Device sync progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgressPayload {
    /// Device currently synchronizing
    pub device_id: String,
    /// Progress percentage, 0–100
    pub progress: u8,
}

/// Device sync finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCompletePayload {
    /// Whether every device synchronized
    pub success: bool,
    /// Optional outcome description
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

/// Locate-mode shake-detection set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceVibratingPayload {
    /// Ids of devices currently detected as shaking
    pub device_ids: Vec<String>,
}
