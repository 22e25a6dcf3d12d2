//! Injected service interfaces the bridge depends on.
//!
//! The device driver, the motion-processing pipeline, and the host system
//! live outside this crate; the bridge reaches them only through these
//! traits. Everything device-facing is async and fallible at the transport
//! level; a definitive success/failure travels inside [`PortReply`] and is
//! never retried.

use async_trait::async_trait;

use crate::error::BridgeError;
use motionbridge_proto::payloads::{
    ble::DeviceInfo,
    streaming::{BatteryPayload, DeviceStatusPayload, MotionPayload},
};

/// Outcome of a device-port operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PortReply {
    /// Whether the operation succeeded
    pub success: bool,
    /// Human-readable outcome description
    pub message: String,
    /// Devices, for operations that return them
    pub devices: Vec<DeviceInfo>,
    /// Active recording id, for recording operations
    pub recording_id: Option<String>,
}

impl PortReply {
    /// Successful reply with a message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into(), ..Self::default() }
    }

    /// Failed reply with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), ..Self::default() }
    }

    /// Attach a device list.
    #[must_use]
    pub fn with_devices(mut self, devices: Vec<DeviceInfo>) -> Self {
        self.devices = devices;
        self
    }

    /// Attach a recording id.
    #[must_use]
    pub fn with_recording_id(mut self, recording_id: impl Into<String>) -> Self {
        self.recording_id = Some(recording_id.into());
        self
    }
}

/// Result alias for port operations. `Err` is a transport-level failure and
/// is retryable; `Ok` carries the definitive outcome.
pub type PortResult = Result<PortReply, BridgeError>;

/// The physical device plane (BLE driver).
#[async_trait]
pub trait DevicePort: Send + Sync {
    /// Discover nearby devices.
    async fn scan(&self) -> PortResult;

    /// Connect to a device by id and advertised name.
    async fn connect(&self, id: &str, name: &str) -> PortResult;

    /// Disconnect a device.
    async fn disconnect(&self, id: &str) -> PortResult;

    /// Cancel reconnect attempts and forget a device.
    async fn remove(&self, id: &str) -> PortResult;

    /// Synchronize all connected devices.
    async fn sync_all(&self) -> PortResult;

    /// Begin device-locate mode.
    async fn start_locate(&self) -> PortResult;

    /// End device-locate mode.
    async fn stop_locate(&self) -> PortResult;

    /// Temporarily elevate scan activity.
    async fn enable_burst_scan(&self, duration_ms: u64) -> PortResult;

    /// End elevated scan activity.
    async fn disable_burst_scan(&self) -> PortResult;

    /// Begin a recording session. Starting while one is active succeeds and
    /// returns the existing recording id.
    async fn start_recording(
        &self,
        session_id: &str,
        exercise_id: &str,
        set_number: u32,
    ) -> PortResult;

    /// End the recording session.
    async fn stop_recording(&self) -> PortResult;

    /// Devices currently connected.
    async fn connected_devices(&self) -> Vec<DeviceInfo>;

    /// Every device the driver knows about.
    async fn all_devices(&self) -> Vec<DeviceInfo>;

    /// Whether a recording session is active.
    async fn is_recording(&self) -> bool;
}

/// Callback invoked with each motion sample the pipeline produces.
pub type MotionCallback = Box<dyn Fn(MotionPayload) + Send + Sync>;

/// Callback invoked when device flags change.
pub type DeviceStatusCallback = Box<dyn Fn(DeviceStatusPayload) + Send + Sync>;

/// Callback invoked when battery levels change.
pub type BatteryCallback = Box<dyn Fn(BatteryPayload) + Send + Sync>;

/// Live subscription to a processing-port feed; unsubscribes on drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap an unsubscribe callback.
    #[must_use]
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    /// A subscription with nothing to cancel.
    #[must_use]
    pub fn noop() -> Self {
        Self { cancel: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("active", &self.cancel.is_some()).finish()
    }
}

/// The motion-processing plane.
#[async_trait]
pub trait ProcessingPort: Send + Sync {
    /// Latest motion sample per streaming device.
    async fn current_motion(&self) -> Vec<MotionPayload>;

    /// Current device flags.
    async fn device_status(&self) -> DeviceStatusPayload;

    /// Current battery levels.
    async fn battery_levels(&self) -> BatteryPayload;

    /// Subscribe to motion samples.
    fn subscribe_motion(&self, callback: MotionCallback) -> Subscription;

    /// Subscribe to device-flag changes.
    fn subscribe_device_status(&self, callback: DeviceStatusCallback) -> Subscription;

    /// Subscribe to battery-level changes.
    fn subscribe_battery(&self, callback: BatteryCallback) -> Subscription;
}

/// Optional host-system plane.
#[async_trait]
pub trait SystemPort: Send + Sync {
    /// Extra status fields merged into the status snapshot.
    async fn system_status(&self) -> std::collections::BTreeMap<String, serde_json::Value>;

    /// Point-in-time performance metrics.
    async fn performance_metrics(&self) -> std::collections::BTreeMap<String, serde_json::Value>;

    /// Reclaim host resources.
    async fn perform_cleanup(&self) -> PortResult;

    /// Restart collaborating services.
    async fn restart_services(&self) -> PortResult;
}
