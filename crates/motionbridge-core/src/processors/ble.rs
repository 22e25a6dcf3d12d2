//! Ble domain: device control, recording, and state queries.
//!
//! Every operation delegates to the injected [`DevicePort`] under the
//! router's per-type timeout, with its own retry loop for transport-level
//! port failures. A definitive reply from the port — success or failure —
//! is never retried.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use motionbridge_proto::{
    Domain, ErrorCode, Message, Payload,
    payloads::ble::{CommandResult, RecordResult, ScanResult, StateSnapshot},
};
use parking_lot::Mutex;

use crate::{
    error::BridgeError,
    ports::{DevicePort, PortReply, PortResult},
    router::DomainProcessor,
    session::SessionId,
};

/// Retry schedule for transient port failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// First delay; doubles per attempt
    pub base: Duration,
    /// Delay ceiling
    pub cap: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { base: Duration::from_secs(1), cap: Duration::from_secs(10), max_retries: 3 }
    }
}

/// Processor for the device-control, recording, and state-query ranges.
pub struct BleProcessor {
    port: Option<Arc<dyn DevicePort>>,
    retry: RetryPolicy,
    /// Active recording id, cached so concurrent idempotent starts agree.
    recording_id: Mutex<Option<String>>,
}

impl BleProcessor {
    /// New processor over an optional device port.
    #[must_use]
    pub fn new(port: Option<Arc<dyn DevicePort>>) -> Self {
        Self::with_retry_policy(port, RetryPolicy::default())
    }

    /// New processor with an explicit retry schedule.
    #[must_use]
    pub fn with_retry_policy(port: Option<Arc<dyn DevicePort>>, retry: RetryPolicy) -> Self {
        Self { port, retry, recording_id: Mutex::new(None) }
    }

    /// Run a port operation, retrying transient failures with exponential
    /// backoff. Definitive replies pass through untouched.
    async fn with_retry<F, Fut>(&self, mut op: F) -> PortResult
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = PortResult> + Send,
    {
        let mut delay = self.retry.base;
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(reply) => return Ok(reply),
                Err(err) if err.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    tracing::debug!(attempt, error = %err, "port operation failed; retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.retry.cap);
                },
                Err(err) => return Err(err),
            }
        }
    }

    fn command_result(reply: &PortReply) -> CommandResult {
        CommandResult { success: reply.success, message: reply.message.clone() }
    }

    async fn handle_record_start(
        &self,
        port: &Arc<dyn DevicePort>,
        message: &Message,
        session_id: &str,
        exercise_id: &str,
        set_number: u32,
    ) -> Result<Option<Message>, BridgeError> {
        if port.connected_devices().await.is_empty() {
            return Ok(Some(Message::error(
                ErrorCode::NotConnected,
                "cannot start recording with no connected devices",
                message.request_id,
            )));
        }

        // Idempotent: a start while recording succeeds with the same id.
        if port.is_recording().await {
            if let Some(id) = self.recording_id.lock().clone() {
                return Ok(Some(message.reply(Payload::RecordStartResponse(RecordResult {
                    success: true,
                    message: Some("recording already active".to_owned()),
                    recording_id: Some(id),
                }))));
            }
        }

        let reply = self
            .with_retry(|| {
                let port = Arc::clone(port);
                let session_id = session_id.to_owned();
                let exercise_id = exercise_id.to_owned();
                async move {
                    port.start_recording(&session_id, &exercise_id, set_number).await
                }
            })
            .await?;

        if reply.success {
            *self.recording_id.lock() = reply.recording_id.clone();
        }

        Ok(Some(message.reply(Payload::RecordStartResponse(RecordResult {
            success: reply.success,
            message: Some(reply.message),
            recording_id: reply.recording_id,
        }))))
    }

    async fn handle_record_stop(
        &self,
        port: &Arc<dyn DevicePort>,
        message: &Message,
    ) -> Result<Option<Message>, BridgeError> {
        if !port.is_recording().await {
            return Ok(Some(Message::error(
                ErrorCode::NoRecording,
                "no recording is active",
                message.request_id,
            )));
        }

        let reply = self
            .with_retry(|| {
                let port = Arc::clone(port);
                async move { port.stop_recording().await }
            })
            .await?;

        let stopped_id = self.recording_id.lock().take();

        Ok(Some(message.reply(Payload::RecordStopResponse(RecordResult {
            success: reply.success,
            message: Some(reply.message),
            recording_id: reply.recording_id.or(stopped_id),
        }))))
    }
}

#[async_trait]
impl DomainProcessor for BleProcessor {
    fn domain(&self) -> Domain {
        Domain::Ble
    }

    async fn process(
        &self,
        message: Message,
        _session: &SessionId,
    ) -> Result<Option<Message>, BridgeError> {
        let Some(port) = self.port.as_ref().map(Arc::clone) else {
            return Ok(Some(Message::error(
                ErrorCode::DeviceUnavailable,
                "device port not available",
                message.request_id,
            )));
        };

        match &message.payload {
            Payload::ScanRequest => {
                let reply = self
                    .with_retry(|| {
                        let port = Arc::clone(&port);
                        async move { port.scan().await }
                    })
                    .await?;

                Ok(Some(message.reply(Payload::ScanResponse(ScanResult {
                    success: reply.success,
                    devices: reply.devices,
                    message: Some(reply.message),
                }))))
            },

            Payload::ConnectRequest(req) => {
                let result = self
                    .with_retry(|| {
                        let port = Arc::clone(&port);
                        let id = req.device_id.clone();
                        let name = req.name.clone();
                        async move { port.connect(&id, &name).await }
                    })
                    .await;

                match result {
                    Ok(reply) => Ok(Some(
                        message.reply(Payload::ConnectResponse(Self::command_result(&reply))),
                    )),
                    // Exhausted retries on a connect is its own error class.
                    Err(err) if err.is_transient() => Ok(Some(Message::error(
                        ErrorCode::ConnectionFailed,
                        format!("connect failed after retries: {err}"),
                        message.request_id,
                    ))),
                    Err(err) => Err(err),
                }
            },

            Payload::DisconnectRequest(req) => {
                let reply = self
                    .with_retry(|| {
                        let port = Arc::clone(&port);
                        let id = req.device_id.clone();
                        async move { port.disconnect(&id).await }
                    })
                    .await?;
                Ok(Some(
                    message.reply(Payload::DisconnectResponse(Self::command_result(&reply))),
                ))
            },

            Payload::RemoveRequest(req) => {
                let reply = self
                    .with_retry(|| {
                        let port = Arc::clone(&port);
                        let id = req.device_id.clone();
                        async move { port.remove(&id).await }
                    })
                    .await?;
                Ok(Some(message.reply(Payload::RemoveResponse(Self::command_result(&reply)))))
            },

            Payload::SyncRequest => {
                let reply = self
                    .with_retry(|| {
                        let port = Arc::clone(&port);
                        async move { port.sync_all().await }
                    })
                    .await?;
                Ok(Some(message.reply(Payload::SyncResponse(Self::command_result(&reply)))))
            },

            Payload::LocateStartRequest => {
                let reply = self
                    .with_retry(|| {
                        let port = Arc::clone(&port);
                        async move { port.start_locate().await }
                    })
                    .await?;
                Ok(Some(
                    message.reply(Payload::LocateStartResponse(Self::command_result(&reply))),
                ))
            },

            Payload::LocateStopRequest => {
                let reply = self
                    .with_retry(|| {
                        let port = Arc::clone(&port);
                        async move { port.stop_locate().await }
                    })
                    .await?;
                Ok(Some(
                    message.reply(Payload::LocateStopResponse(Self::command_result(&reply))),
                ))
            },

            // Burst scan is fire-and-forget: requests only, no response type.
            Payload::BurstStartRequest(req) => {
                let duration_ms = req.duration_ms;
                self.with_retry(|| {
                    let port = Arc::clone(&port);
                    async move { port.enable_burst_scan(duration_ms).await }
                })
                .await?;
                Ok(None)
            },

            Payload::BurstStopRequest => {
                self.with_retry(|| {
                    let port = Arc::clone(&port);
                    async move { port.disable_burst_scan().await }
                })
                .await?;
                Ok(None)
            },

            Payload::RecordStartRequest(req) => {
                self.handle_record_start(
                    &port,
                    &message,
                    &req.session_id,
                    &req.exercise_id,
                    req.set_number,
                )
                .await
            },

            Payload::RecordStopRequest => self.handle_record_stop(&port, &message).await,

            Payload::DevicesStateRequest => {
                let devices = port.all_devices().await;
                let recording = port.is_recording().await;
                Ok(Some(message.reply(Payload::DevicesStateResponse(StateSnapshot {
                    devices,
                    recording,
                }))))
            },

            _ => Ok(Some(Message::error(
                ErrorCode::InvalidMessage,
                "unsupported device operation",
                message.request_id,
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use motionbridge_proto::payloads::ble::{ConnectRequest, DeviceInfo, RecordStartRequest};

    use super::*;

    #[derive(Default)]
    struct FakeDevicePort {
        devices: Mutex<Vec<DeviceInfo>>,
        recording: AtomicBool,
        scan_failures_left: AtomicU64,
        scan_calls: AtomicU64,
    }

    impl FakeDevicePort {
        fn with_device() -> Self {
            let port = Self::default();
            port.devices.lock().push(DeviceInfo {
                id: "A1".to_owned(),
                name: "dev-A".to_owned(),
                battery_level: Some(78),
                connected: true,
                streaming: false,
            });
            port
        }
    }

    #[async_trait]
    impl DevicePort for FakeDevicePort {
        async fn scan(&self) -> PortResult {
            self.scan_calls.fetch_add(1, Ordering::SeqCst);
            let failures = self.scan_failures_left.load(Ordering::SeqCst);
            if failures > 0 {
                self.scan_failures_left.store(failures - 1, Ordering::SeqCst);
                return Err(BridgeError::Port("adapter busy".to_owned()));
            }
            Ok(PortReply::ok("scan complete").with_devices(self.devices.lock().clone()))
        }

        async fn connect(&self, id: &str, _name: &str) -> PortResult {
            if self.devices.lock().iter().any(|d| d.id == id) {
                Ok(PortReply::ok("connected"))
            } else {
                Err(BridgeError::DeviceNotFound { id: id.to_owned() })
            }
        }

        async fn disconnect(&self, _id: &str) -> PortResult {
            Ok(PortReply::ok("disconnected"))
        }

        async fn remove(&self, _id: &str) -> PortResult {
            Ok(PortReply::ok("removed"))
        }

        async fn sync_all(&self) -> PortResult {
            Ok(PortReply::ok("synced"))
        }

        async fn start_locate(&self) -> PortResult {
            Ok(PortReply::ok("locating"))
        }

        async fn stop_locate(&self) -> PortResult {
            Ok(PortReply::ok("stopped"))
        }

        async fn enable_burst_scan(&self, _duration_ms: u64) -> PortResult {
            Ok(PortReply::ok("burst on"))
        }

        async fn disable_burst_scan(&self) -> PortResult {
            Ok(PortReply::ok("burst off"))
        }

        async fn start_recording(
            &self,
            _session_id: &str,
            _exercise_id: &str,
            _set_number: u32,
        ) -> PortResult {
            self.recording.store(true, Ordering::SeqCst);
            Ok(PortReply::ok("recording").with_recording_id("rec-1"))
        }

        async fn stop_recording(&self) -> PortResult {
            self.recording.store(false, Ordering::SeqCst);
            Ok(PortReply::ok("stopped").with_recording_id("rec-1"))
        }

        async fn connected_devices(&self) -> Vec<DeviceInfo> {
            self.devices.lock().iter().filter(|d| d.connected).cloned().collect()
        }

        async fn all_devices(&self) -> Vec<DeviceInfo> {
            self.devices.lock().clone()
        }

        async fn is_recording(&self) -> bool {
            self.recording.load(Ordering::SeqCst)
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(4),
            max_retries: 3,
        }
    }

    fn processor(port: Arc<FakeDevicePort>) -> BleProcessor {
        BleProcessor::with_retry_policy(Some(port), fast_retry())
    }

    fn session() -> SessionId {
        SessionId::from("client_1_a")
    }

    #[tokio::test]
    async fn scan_round_trip() {
        let port = Arc::new(FakeDevicePort::with_device());
        let processor = processor(Arc::clone(&port));

        let request = Message::with_request_id(Payload::ScanRequest, 1);
        let response = processor.process(request, &session()).await.unwrap().unwrap();

        assert_eq!(response.request_id, 1);
        match response.payload {
            Payload::ScanResponse(result) => {
                assert!(result.success);
                assert_eq!(result.devices.len(), 1);
                assert_eq!(result.devices[0].id, "A1");
                assert_eq!(result.devices[0].battery_level, Some(78));
            },
            other => panic!("expected scan response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_port_failures_are_retried() {
        let port = Arc::new(FakeDevicePort::with_device());
        port.scan_failures_left.store(2, Ordering::SeqCst);
        let processor = processor(Arc::clone(&port));

        let response = processor
            .process(Message::with_request_id(Payload::ScanRequest, 1), &session())
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(response.payload, Payload::ScanResponse(ref r) if r.success));
        assert_eq!(port.scan_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unknown_device_surfaces_not_found() {
        let port = Arc::new(FakeDevicePort::with_device());
        let processor = processor(port);

        let request = Message::with_request_id(
            Payload::ConnectRequest(ConnectRequest {
                device_id: "nope".to_owned(),
                name: "ghost".to_owned(),
            }),
            2,
        );
        let err = processor.process(request, &session()).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::DeviceNotFound);
    }

    #[tokio::test]
    async fn record_start_requires_a_connected_device() {
        let port = Arc::new(FakeDevicePort::default());
        let processor = processor(port);

        let request = Message::with_request_id(
            Payload::RecordStartRequest(RecordStartRequest {
                session_id: "s1".to_owned(),
                exercise_id: "e1".to_owned(),
                set_number: 1,
            }),
            3,
        );
        let response = processor.process(request, &session()).await.unwrap().unwrap();

        match response.payload {
            Payload::Error(err) => assert_eq!(err.code, ErrorCode::NotConnected),
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn record_start_is_idempotent() {
        let port = Arc::new(FakeDevicePort::with_device());
        let processor = processor(port);

        let start = |id| {
            Message::with_request_id(
                Payload::RecordStartRequest(RecordStartRequest {
                    session_id: "s1".to_owned(),
                    exercise_id: "e1".to_owned(),
                    set_number: 1,
                }),
                id,
            )
        };

        let first = processor.process(start(2), &session()).await.unwrap().unwrap();
        let second = processor.process(start(3), &session()).await.unwrap().unwrap();

        let id_of = |message: &Message| match &message.payload {
            Payload::RecordStartResponse(r) => {
                assert!(r.success);
                r.recording_id.clone().unwrap()
            },
            other => panic!("expected record start response, got {other:?}"),
        };

        assert_eq!(id_of(&first), id_of(&second));
    }

    #[tokio::test]
    async fn record_stop_without_recording_errors() {
        let port = Arc::new(FakeDevicePort::with_device());
        let processor = processor(port);

        let request = Message::with_request_id(Payload::RecordStopRequest, 4);
        let response = processor.process(request, &session()).await.unwrap().unwrap();

        match response.payload {
            Payload::Error(err) => assert_eq!(err.code, ErrorCode::NoRecording),
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_port_yields_device_unavailable() {
        let processor = BleProcessor::new(None);

        let request = Message::with_request_id(Payload::ScanRequest, 5);
        let response = processor.process(request, &session()).await.unwrap().unwrap();

        match response.payload {
            Payload::Error(err) => assert_eq!(err.code, ErrorCode::DeviceUnavailable),
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn devices_state_snapshot() {
        let port = Arc::new(FakeDevicePort::with_device());
        let processor = processor(port);

        let request = Message::with_request_id(Payload::DevicesStateRequest, 6);
        let response = processor.process(request, &session()).await.unwrap().unwrap();

        match response.payload {
            Payload::DevicesStateResponse(snapshot) => {
                assert_eq!(snapshot.devices.len(), 1);
                assert!(!snapshot.recording);
            },
            other => panic!("expected snapshot, got {other:?}"),
        }
    }
}
