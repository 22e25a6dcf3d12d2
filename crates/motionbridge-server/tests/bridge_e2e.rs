//! End-to-end tests over real WebSocket sessions.
//!
//! Each test starts a bridge on an ephemeral port, connects one or more
//! binary WebSocket clients, and drives the full pipeline: decode,
//! validation, routing, domain processing, and fan-out.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use motionbridge_core::{
    BridgeConfig,
    ports::{
        BatteryCallback, DevicePort, DeviceStatusCallback, MotionCallback, PortReply, PortResult,
        ProcessingPort, Subscription,
    },
};
use motionbridge_proto::{
    ErrorCode, FrameHeader, Message, MessageType, Payload,
    payloads::{
        ble::{ConnectRequest, DeviceInfo, RecordStartRequest},
        client::{ActionSpec, ActionTrigger, ClientRegistration, ClientRole},
        streaming::{
            BatteryPayload, DeviceStatusEntry, DeviceStatusPayload, MotionPayload,
        },
    },
};
use motionbridge_server::{Bridge, BridgePorts};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message as WsMessage};

#[derive(Default)]
struct MockDevicePort {
    devices: Mutex<Vec<DeviceInfo>>,
    recording: AtomicBool,
    scan_calls: AtomicU64,
}

impl MockDevicePort {
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
impl DevicePort for MockDevicePort {
    async fn scan(&self) -> PortResult {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        Ok(PortReply::ok("scan complete").with_devices(self.devices.lock().clone()))
    }

    async fn connect(&self, _id: &str, _name: &str) -> PortResult {
        Ok(PortReply::ok("connected"))
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

#[derive(Default)]
struct MockProcessingPort {
    motion: Mutex<Vec<MotionCallback>>,
    status: Mutex<Vec<DeviceStatusCallback>>,
    battery: Mutex<Vec<BatteryCallback>>,
}

impl MockProcessingPort {
    fn emit_motion(&self, payload: &MotionPayload) {
        for callback in self.motion.lock().iter() {
            callback(payload.clone());
        }
    }
}

#[async_trait]
impl ProcessingPort for MockProcessingPort {
    async fn current_motion(&self) -> Vec<MotionPayload> {
        Vec::new()
    }

    async fn device_status(&self) -> DeviceStatusPayload {
        DeviceStatusPayload { devices: Vec::new() }
    }

    async fn battery_levels(&self) -> BatteryPayload {
        BatteryPayload { levels: Vec::new() }
    }

    fn subscribe_motion(&self, callback: MotionCallback) -> Subscription {
        self.motion.lock().push(callback);
        Subscription::noop()
    }

    fn subscribe_device_status(&self, callback: DeviceStatusCallback) -> Subscription {
        self.status.lock().push(callback);
        Subscription::noop()
    }

    fn subscribe_battery(&self, callback: BatteryCallback) -> Subscription {
        self.battery.lock().push(callback);
        Subscription::noop()
    }
}

struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    async fn connect(url: &str) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(url).await.expect("client connect");
        Self { ws }
    }

    async fn send(&mut self, message: &Message) {
        let bytes = message.encode_to_vec().expect("encode");
        self.ws.send(WsMessage::Binary(bytes)).await.expect("send");
    }

    async fn send_raw(&mut self, bytes: Vec<u8>) {
        self.ws.send(WsMessage::Binary(bytes)).await.expect("send raw");
    }

    /// Next decodable binary frame, or `None` on close/timeout.
    async fn recv(&mut self) -> Option<Message> {
        loop {
            let next = tokio::time::timeout(Duration::from_secs(5), self.ws.next())
                .await
                .ok()??;
            let message = next.ok()?;
            if message.is_binary() {
                return Message::decode(&message.into_data()).ok();
            }
            if message.is_close() {
                return None;
            }
        }
    }

    /// Skip frames until one of the given type arrives.
    async fn recv_kind(&mut self, kind: MessageType) -> Message {
        loop {
            let message = self.recv().await.unwrap_or_else(|| panic!("waiting for {kind:?}"));
            if message.kind() == Some(kind) {
                return message;
            }
        }
    }

    /// Collect every frame that arrives within the window.
    async fn drain_for(&mut self, window: Duration) -> Vec<Message> {
        let mut collected = Vec::new();
        let deadline = Instant::now() + window;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return collected;
            }
            match tokio::time::timeout(remaining, self.ws.next()).await {
                Ok(Some(Ok(message))) if message.is_binary() => {
                    if let Ok(decoded) = Message::decode(&message.into_data()) {
                        collected.push(decoded);
                    }
                },
                Ok(Some(Ok(_))) => {},
                Ok(Some(Err(_)) | None) | Err(_) => return collected,
            }
        }
    }
}

fn test_config() -> BridgeConfig {
    BridgeConfig { port: Some(0), ..BridgeConfig::default() }
}

async fn start_bridge(ports: BridgePorts) -> Bridge {
    Bridge::start(test_config(), ports).await.expect("bridge start")
}

#[tokio::test]
async fn snapshot_is_the_first_message_after_connect() {
    let device = Arc::new(MockDevicePort::with_device());
    let bridge =
        start_bridge(BridgePorts { device: Some(device), ..BridgePorts::default() }).await;

    let started = Instant::now();
    let mut client = TestClient::connect(&bridge.url()).await;
    let first = client.recv().await.expect("first frame");

    assert_eq!(first.kind(), Some(MessageType::StateUpdate), "snapshot must arrive first");
    assert!(started.elapsed() < Duration::from_secs(1));

    match first.payload {
        Payload::StateUpdate(snapshot) => {
            assert_eq!(snapshot.devices.len(), 1);
            assert_eq!(snapshot.devices[0].id, "A1");
            assert!(!snapshot.recording);
        },
        other => panic!("expected snapshot payload, got {other:?}"),
    }

    bridge.shutdown().await;
}

#[tokio::test]
async fn scan_round_trip_returns_the_device_list() {
    let device = Arc::new(MockDevicePort::with_device());
    let bridge =
        start_bridge(BridgePorts { device: Some(device), ..BridgePorts::default() }).await;

    let mut client = TestClient::connect(&bridge.url()).await;
    client.recv_kind(MessageType::StateUpdate).await;

    client.send(&Message::with_request_id(Payload::ScanRequest, 1)).await;
    let response = client.recv_kind(MessageType::ScanResponse).await;

    assert_eq!(response.request_id, 1);
    match response.payload {
        Payload::ScanResponse(result) => {
            assert!(result.success);
            assert_eq!(result.devices.len(), 1);
            assert_eq!(result.devices[0].id, "A1");
            assert_eq!(result.devices[0].name, "dev-A");
            assert_eq!(result.devices[0].battery_level, Some(78));
        },
        other => panic!("expected scan response, got {other:?}"),
    }

    bridge.shutdown().await;
}

#[tokio::test]
async fn wrong_version_byte_is_rejected() {
    let bridge = start_bridge(BridgePorts::default()).await;

    let mut client = TestClient::connect(&bridge.url()).await;
    client.recv_kind(MessageType::StateUpdate).await;

    let mut bytes =
        Message::with_request_id(Payload::ScanRequest, 5).encode_to_vec().expect("encode");
    bytes[0] = FrameHeader::VERSION + 1;
    client.send_raw(bytes).await;

    let error = client.recv_kind(MessageType::Error).await;
    assert_eq!(error.request_id, 5, "error frame keeps the original request id");
    match error.payload {
        Payload::Error(payload) => assert_eq!(payload.code, ErrorCode::InvalidMessage),
        other => panic!("expected error payload, got {other:?}"),
    }

    bridge.shutdown().await;
}

#[tokio::test]
async fn validator_rejection_carries_the_request_id() {
    let device = Arc::new(MockDevicePort::with_device());
    let bridge =
        start_bridge(BridgePorts { device: Some(device), ..BridgePorts::default() }).await;

    let mut client = TestClient::connect(&bridge.url()).await;
    client.recv_kind(MessageType::StateUpdate).await;

    client
        .send(&Message::with_request_id(
            Payload::ConnectRequest(ConnectRequest {
                device_id: String::new(),
                name: "dev-A".to_owned(),
            }),
            7,
        ))
        .await;

    let error = client.recv_kind(MessageType::Error).await;
    assert_eq!(error.request_id, 7);
    match error.payload {
        Payload::Error(payload) => assert_eq!(payload.code, ErrorCode::InvalidMessage),
        other => panic!("expected error payload, got {other:?}"),
    }

    bridge.shutdown().await;
}

#[tokio::test]
async fn concurrent_record_starts_agree_on_the_recording_id() {
    let device = Arc::new(MockDevicePort::with_device());
    let bridge =
        start_bridge(BridgePorts { device: Some(device), ..BridgePorts::default() }).await;

    let mut client = TestClient::connect(&bridge.url()).await;
    client.recv_kind(MessageType::StateUpdate).await;

    let start = |id| {
        Message::with_request_id(
            Payload::RecordStartRequest(RecordStartRequest {
                session_id: "s1".to_owned(),
                exercise_id: "squat".to_owned(),
                set_number: 1,
            }),
            id,
        )
    };
    client.send(&start(2)).await;
    client.send(&start(3)).await;

    let first = client.recv_kind(MessageType::RecordStartResponse).await;
    let second = client.recv_kind(MessageType::RecordStartResponse).await;

    let id_of = |message: &Message| match &message.payload {
        Payload::RecordStartResponse(result) => {
            assert!(result.success);
            result.recording_id.clone().expect("recording id")
        },
        other => panic!("expected record start response, got {other:?}"),
    };

    assert_eq!(id_of(&first), id_of(&second));
    assert_eq!(
        [first.request_id, second.request_id].into_iter().collect::<std::collections::BTreeSet<_>>(),
        [2, 3].into_iter().collect()
    );

    bridge.shutdown().await;
}

#[tokio::test]
async fn motion_broadcast_reaches_every_client_once() {
    let processing = Arc::new(MockProcessingPort::default());
    let processing_port: Arc<dyn ProcessingPort> = Arc::clone(&processing) as Arc<dyn ProcessingPort>;
    let bridge = start_bridge(BridgePorts {
        processing: Some(processing_port),
        ..BridgePorts::default()
    })
    .await;

    let mut first = TestClient::connect(&bridge.url()).await;
    let mut second = TestClient::connect(&bridge.url()).await;
    first.recv_kind(MessageType::StateUpdate).await;
    second.recv_kind(MessageType::StateUpdate).await;

    processing.emit_motion(&MotionPayload {
        device_name: "dev-A".to_owned(),
        values: [12.5, -7.25],
    });

    for client in [&mut first, &mut second] {
        let received = client.drain_for(Duration::from_millis(500)).await;
        let motion: Vec<_> = received
            .iter()
            .filter(|m| m.kind() == Some(MessageType::MotionData))
            .collect();
        assert_eq!(motion.len(), 1, "exactly one motion frame per client");

        match &motion[0].payload {
            Payload::MotionData(payload) => {
                assert_eq!(payload.device_name, "dev-A");
                assert_eq!(payload.values, [12.5, -7.25]);
            },
            other => panic!("expected motion payload, got {other:?}"),
        }
    }

    bridge.shutdown().await;
}

#[tokio::test]
async fn action_trigger_routes_to_the_owner_and_acks_the_sender() {
    let bridge = start_bridge(BridgePorts::default()).await;

    let mut owner = TestClient::connect(&bridge.url()).await;
    owner.recv_kind(MessageType::StateUpdate).await;
    let mut caller = TestClient::connect(&bridge.url()).await;
    caller.recv_kind(MessageType::StateUpdate).await;

    owner
        .send(&Message::with_request_id(
            Payload::ClientRegister(ClientRegistration {
                name: "owner window".to_owned(),
                role: ClientRole::Main,
                capabilities: vec![],
            }),
            1,
        ))
        .await;
    owner.recv_kind(MessageType::Ack).await;

    owner
        .send(&Message::with_request_id(
            Payload::ClientActionRegister(ActionSpec {
                id: "beep".to_owned(),
                label: "Beep".to_owned(),
            }),
            2,
        ))
        .await;
    owner.recv_kind(MessageType::Ack).await;

    // The caller learns the owner's session id from the list broadcast.
    let list = caller.recv_kind(MessageType::ClientListUpdate).await;
    let owner_session = match &list.payload {
        Payload::ClientListUpdate(list) => list.clients[0].session_id.clone(),
        other => panic!("expected client list, got {other:?}"),
    };

    caller
        .send(&Message::with_request_id(
            Payload::ClientActionTrigger(ActionTrigger {
                target: owner_session,
                action_id: "beep".to_owned(),
                args: None,
            }),
            9,
        ))
        .await;

    let ack = caller.recv_kind(MessageType::Ack).await;
    assert_eq!(ack.request_id, 9);

    let forwarded = owner.recv_kind(MessageType::ClientActionTrigger).await;
    match forwarded.payload {
        Payload::ClientActionTrigger(trigger) => assert_eq!(trigger.action_id, "beep"),
        other => panic!("expected forwarded trigger, got {other:?}"),
    }

    bridge.shutdown().await;
}

#[tokio::test]
async fn duplicate_requests_are_acked_without_redispatch() {
    let device = Arc::new(MockDevicePort::with_device());
    let device_port: Arc<dyn DevicePort> = Arc::clone(&device) as Arc<dyn DevicePort>;
    let bridge = start_bridge(BridgePorts {
        device: Some(device_port),
        ..BridgePorts::default()
    })
    .await;

    let mut client = TestClient::connect(&bridge.url()).await;
    client.recv_kind(MessageType::StateUpdate).await;

    let request = Message::with_request_id(Payload::ScanRequest, 9);
    client.send(&request).await;
    client.recv_kind(MessageType::ScanResponse).await;

    client.send(&request).await;
    let ack = client.recv_kind(MessageType::Ack).await;
    assert_eq!(ack.request_id, 9);

    assert_eq!(device.scan_calls.load(Ordering::SeqCst), 1, "duplicate never re-dispatched");
    assert_eq!(bridge.reliable_stats().duplicates, 1);

    bridge.shutdown().await;
}

#[tokio::test]
async fn connections_over_capacity_are_refused() {
    let config = BridgeConfig { port: Some(0), max_connections: 1, ..BridgeConfig::default() };
    let bridge = Bridge::start(config, BridgePorts::default()).await.expect("bridge start");

    let mut first = TestClient::connect(&bridge.url()).await;
    first.recv_kind(MessageType::StateUpdate).await;

    let mut second = TestClient::connect(&bridge.url()).await;
    assert!(second.recv().await.is_none(), "over-capacity session is closed politely");

    assert_eq!(bridge.system_health().session_count, 1);

    bridge.shutdown().await;
}

#[tokio::test]
async fn status_reports_sessions_and_counters() {
    let bridge = start_bridge(BridgePorts::default()).await;

    let mut client = TestClient::connect(&bridge.url()).await;
    client.recv_kind(MessageType::StateUpdate).await;

    client.send(&Message::with_request_id(Payload::StatusRequest, 4)).await;
    let response = client.recv_kind(MessageType::StatusResponse).await;

    assert_eq!(response.request_id, 4);
    match response.payload {
        Payload::StatusResponse(status) => {
            assert!(status.running);
            assert_eq!(status.session_count, 1);
        },
        other => panic!("expected status response, got {other:?}"),
    }

    bridge.shutdown().await;
}

#[tokio::test]
async fn overload_sheds_motion_but_spares_critical_broadcasts() {
    let bridge = start_bridge(BridgePorts::default()).await;
    let handle = bridge.handle();

    let mut client = TestClient::connect(&bridge.url()).await;
    client.recv_kind(MessageType::StateUpdate).await;

    let motion = Message::new(Payload::MotionData(MotionPayload {
        device_name: "dev-A".to_owned(),
        values: [1.0, 2.0],
    }));
    let status = Message::new(Payload::DeviceStatus(DeviceStatusPayload {
        devices: vec![DeviceStatusEntry {
            id: "A1".to_owned(),
            name: "dev-A".to_owned(),
            connected: true,
            streaming: true,
        }],
    }));

    // 5,000 motion frames in short bursts, ten critical status frames
    // interleaved. The sleeps let the writer and the streaming queue drain
    // between bursts while the flood stays far above the overload threshold.
    for _ in 0..10 {
        let _ = handle.broadcast(&status);
        for _ in 0..500 {
            let _ = handle.broadcast(&motion);
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    let received = client.drain_for(Duration::from_millis(2_500)).await;

    let motion_count =
        received.iter().filter(|m| m.kind() == Some(MessageType::MotionData)).count();
    let status_count =
        received.iter().filter(|m| m.kind() == Some(MessageType::DeviceStatus)).count();
    let overload_count = received
        .iter()
        .filter(|m| {
            matches!(&m.payload, Payload::Error(err) if err.code == ErrorCode::StreamingOverload)
        })
        .count();

    assert!(motion_count < 5_000, "rate limiting and shedding must drop motion frames");
    assert_eq!(status_count, 10, "critical broadcasts are delivered in full");
    assert!(overload_count >= 1, "sustained overload must be announced");

    let overload = received
        .iter()
        .find_map(|m| match &m.payload {
            Payload::Error(err) if err.code == ErrorCode::StreamingOverload => {
                err.overload.as_ref()
            },
            _ => None,
        })
        .expect("overload details");
    assert!(overload.drop_ratio > 0.0);

    bridge.shutdown().await;
}
