//! Production motionbridge server.
//!
//! Wires the socket-free core ([`motionbridge_core`]) to real I/O: a
//! WebSocket listener, one reader and one writer task per session, and the
//! background loops the core's periodic hooks expect (heartbeat, streaming
//! batch drain, cleanup sweeps, overload sampling).
//!
//! # Architecture
//!
//! - [`WsListener`]: localhost WebSocket listener with port discovery
//! - [`ConnectionManager`]: session registry, health, handler dispatch
//! - [`Bridge`]: the assembled runtime — transports, router, processors,
//!   background loops, and the public embedding surface
//! - [`BridgeHandle`]: cloneable handle offered to the device plane so it
//!   can push broadcasts from its own event loop

mod error;
mod manager;
mod transport;

use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use futures_util::{SinkExt, StreamExt};
use motionbridge_core::{
    BATCH_INTERVAL, BleProcessor, BridgeConfig, BridgeError, BridgeEvent, ClientMetaProcessor,
    ClientRegistry, DomainProcessor, FrameSink, InboundDisposition, OverloadSupervisor, ReliableConfig,
    ReliableStats, ReliableTransport, Router, RouterStats, Session, SessionDirectory,
    SessionHealth, SessionId, SessionTick, StatusSource, StreamingConfig, StreamingProcessor,
    StreamingStats, StreamingTransport, SupervisorConfig, SystemProcessor,
    ports::{DevicePort, ProcessingPort, Subscription, SystemPort},
};
use motionbridge_proto::{
    ErrorCode, Message, MessageType, Payload, validate,
    payloads::{ErrorPayload, ble::StateSnapshot},
};
use parking_lot::Mutex;
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::tungstenite::Message as WsMessage;

pub use error::ServerError;
pub use manager::{
    ClientListHandler, ConnectionManager, HealthHandler, MessageHandler, NewClientHandler,
    SystemHealth,
};
pub use transport::WsListener;

/// Delay between accept and the new-client snapshot hook.
const NEW_CLIENT_SNAPSHOT_DELAY: Duration = Duration::from_millis(100);

/// Spacing of the cleanup sweeps (reliable pending table, streaming state).
const CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

/// Spacing of overload supervisor samples.
const SUPERVISOR_INTERVAL: Duration = Duration::from_secs(1);

/// The injected external collaborators.
#[derive(Clone, Default)]
pub struct BridgePorts {
    /// Physical device plane (BLE driver)
    pub device: Option<Arc<dyn DevicePort>>,
    /// Motion-processing plane
    pub processing: Option<Arc<dyn ProcessingPort>>,
    /// Host-system plane
    pub system: Option<Arc<dyn SystemPort>>,
}

/// Everything the session tasks and background loops share.
struct Shared {
    config: BridgeConfig,
    manager: Arc<ConnectionManager>,
    router: Arc<Router>,
    reliable: Arc<ReliableTransport>,
    streaming: Arc<StreamingTransport>,
    streaming_processor: Arc<StreamingProcessor>,
    client_meta: Arc<ClientMetaProcessor>,
    supervisor: Arc<Mutex<OverloadSupervisor>>,
    events: mpsc::UnboundedSender<BridgeEvent>,
    device: Option<Arc<dyn DevicePort>>,
}

/// The assembled bridge runtime.
pub struct Bridge {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    _subscriptions: Mutex<Vec<Subscription>>,
}

impl Bridge {
    /// Bind the listener, assemble the components, and start every loop.
    pub async fn start(config: BridgeConfig, ports: BridgePorts) -> Result<Self, ServerError> {
        let listener = WsListener::bind(config.port).await?;
        let local_addr = listener.local_addr();

        let manager = Arc::new(ConnectionManager::new(config.clone()));
        let sink: Arc<dyn FrameSink> = Arc::clone(&manager) as Arc<dyn FrameSink>;
        let directory: Arc<dyn SessionDirectory> = Arc::clone(&manager) as Arc<dyn SessionDirectory>;
        let status: Arc<dyn StatusSource> = Arc::clone(&manager) as Arc<dyn StatusSource>;

        let reliable =
            Arc::new(ReliableTransport::new(Arc::clone(&sink), ReliableConfig::from(&config)));
        let streaming =
            Arc::new(StreamingTransport::new(Arc::clone(&sink), StreamingConfig::from(&config)));
        let supervisor = Arc::new(Mutex::new(OverloadSupervisor::new(SupervisorConfig {
            threshold: config.overload_threshold,
            cooldown: config.overload_cooldown,
            drop_percent: config.overload_drop_percent,
            queue_cap: config.streaming_queue_cap,
        })));
        let streaming_processor = Arc::new(StreamingProcessor::new(
            Arc::clone(&streaming),
            Arc::clone(&directory),
            Arc::clone(&supervisor),
        ));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let client_meta = Arc::new(ClientMetaProcessor::new(
            Arc::new(Mutex::new(ClientRegistry::new())),
            Arc::clone(&sink),
            Arc::clone(&directory),
            events_tx.clone(),
        ));

        let router = Arc::new(Router::new());
        router.register(Arc::new(SystemProcessor::new(status, ports.system.clone())));
        router.register(Arc::new(BleProcessor::new(ports.device.clone())));
        router.register(Arc::clone(&streaming_processor) as Arc<dyn DomainProcessor>);
        router.register(Arc::clone(&client_meta) as Arc<dyn DomainProcessor>);

        let shared = Arc::new(Shared {
            config,
            manager: Arc::clone(&manager),
            router,
            reliable,
            streaming,
            streaming_processor: Arc::clone(&streaming_processor),
            client_meta,
            supervisor,
            events: events_tx,
            device: ports.device.clone(),
        });

        let (shutdown, _) = watch::channel(false);
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(accept_loop(
            listener,
            Arc::clone(&shared),
            shutdown.subscribe(),
        )));
        tasks.push(tokio::spawn(heartbeat_loop(Arc::clone(&shared), shutdown.subscribe())));
        tasks.push(tokio::spawn(batch_loop(Arc::clone(&shared), shutdown.subscribe())));
        tasks.push(tokio::spawn(cleanup_loop(Arc::clone(&shared), shutdown.subscribe())));
        tasks.push(tokio::spawn(supervisor_loop(Arc::clone(&shared), shutdown.subscribe())));
        tasks.push(tokio::spawn(event_loop(events_rx, Arc::clone(&manager))));

        let mut subscriptions = Vec::new();
        if let Some(processing) = &ports.processing {
            let sp = Arc::clone(&streaming_processor);
            subscriptions.push(processing.subscribe_motion(Box::new(move |motion| {
                let message = Message::new(Payload::MotionData(motion));
                if let Err(err) = sp.broadcast(&message) {
                    tracing::debug!(error = %err, "motion broadcast failed");
                }
            })));

            let sp = Arc::clone(&streaming_processor);
            subscriptions.push(processing.subscribe_device_status(Box::new(move |devices| {
                let message = Message::new(Payload::DeviceStatus(devices));
                if let Err(err) = sp.broadcast(&message) {
                    tracing::debug!(error = %err, "device-status broadcast failed");
                }
            })));

            let sp = Arc::clone(&streaming_processor);
            subscriptions.push(processing.subscribe_battery(Box::new(move |levels| {
                let message = Message::new(Payload::BatteryUpdate(levels));
                if let Err(err) = sp.broadcast(&message) {
                    tracing::debug!(error = %err, "battery broadcast failed");
                }
            })));
        }

        tracing::info!(%local_addr, "bridge listening");

        Ok(Self {
            shared,
            local_addr,
            shutdown,
            tasks: Mutex::new(tasks),
            _subscriptions: Mutex::new(subscriptions),
        })
    }

    /// Address the bridge is listening on.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Listening port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// `ws://` URL clients should connect to.
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Cloneable handle for the device plane and the embedding application.
    #[must_use]
    pub fn handle(&self) -> BridgeHandle {
        BridgeHandle { shared: Arc::clone(&self.shared) }
    }

    /// Register an inbound-message observer.
    pub fn on_message(&self, handler: MessageHandler) {
        self.shared.manager.on_message(handler);
    }

    /// Register a system-health observer.
    pub fn on_health_change(&self, handler: HealthHandler) {
        self.shared.manager.on_health_change(handler);
    }

    /// Register a client-list observer.
    pub fn on_client_list_change(&self, handler: ClientListHandler) {
        self.shared.manager.on_client_list_change(handler);
    }

    /// Register a new-client observer; it runs before the session sees any
    /// broadcast, so pushed state lands first.
    pub fn on_new_client(&self, handler: NewClientHandler) {
        self.shared.manager.on_new_client(handler);
    }

    /// Aggregate health snapshot.
    #[must_use]
    pub fn system_health(&self) -> SystemHealth {
        self.shared.manager.system_health()
    }

    /// Per-session health snapshots.
    #[must_use]
    pub fn session_health(&self) -> Vec<SessionHealth> {
        self.shared.manager.all_session_health()
    }

    /// Router statistics.
    #[must_use]
    pub fn router_stats(&self) -> RouterStats {
        self.shared.router.stats()
    }

    /// Reliable-transport statistics.
    #[must_use]
    pub fn reliable_stats(&self) -> ReliableStats {
        self.shared.reliable.stats()
    }

    /// Streaming-transport statistics.
    #[must_use]
    pub fn streaming_stats(&self) -> StreamingStats {
        self.shared.streaming.stats()
    }

    /// Stop the listener, cancel the loops, and drain every session.
    ///
    /// Outstanding reliable requests are rejected with a shutdown error
    /// before the sessions are released.
    pub async fn shutdown(&self) {
        tracing::info!("bridge shutting down");
        let _ = self.shutdown.send(true);

        self.shared.manager.mark_stopped();
        self.shared.reliable.reject_all();

        for id in self.shared.manager.session_ids() {
            teardown_session(&self.shared, &id);
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Cloneable handle into the running bridge.
#[derive(Clone)]
pub struct BridgeHandle {
    shared: Arc<Shared>,
}

impl BridgeHandle {
    /// Broadcast a streaming message to every active session. This is the
    /// `broadcast` port offered to the device plane.
    pub fn broadcast(&self, message: &Message) -> Result<usize, BridgeError> {
        self.shared.streaming_processor.broadcast(message)
    }

    /// Send a message reliably to one session and await its response.
    pub async fn send_reliable(
        &self,
        message: Message,
        session: &SessionId,
    ) -> Result<Message, BridgeError> {
        self.shared.reliable.send_reliable(message, session).await
    }

    /// Reliable fan-out to every active session; returns how many
    /// acknowledged.
    pub async fn broadcast_reliable(&self, message: &Message) -> usize {
        let targets = self.shared.manager.broadcast_targets();
        self.shared.reliable.broadcast_reliable(message, &targets).await
    }

    /// Enqueue a message straight onto one session's writer.
    pub fn send_to(&self, session: &SessionId, message: &Message) -> bool {
        send_to_session(&self.shared, session, message)
    }
}

fn send_to_session(shared: &Shared, session: &SessionId, message: &Message) -> bool {
    match message.to_frame() {
        Ok(frame) => {
            let delivered = shared.manager.try_send(session, frame);
            if !delivered {
                tracing::debug!(%session, msg_type = message.msg_type(), "write refused");
            }
            delivered
        },
        Err(err) => {
            tracing::warn!(%session, error = %err, "failed to encode outbound message");
            false
        },
    }
}

/// Best-effort request id out of an undecodable frame, so the error frame
/// still correlates when the header bytes were intact.
fn recovered_request_id(bytes: &[u8]) -> u32 {
    match bytes.get(4..8) {
        Some(b) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        None => 0,
    }
}

async fn accept_loop(
    listener: WsListener,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let shared = Arc::clone(&shared);
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, addr, shared).await {
                            tracing::debug!(%addr, "session ended: {}", err);
                        }
                    });
                },
                Err(err) => {
                    tracing::warn!("accept failed: {}", err);
                },
            },
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    shared: Arc<Shared>,
) -> Result<(), ServerError> {
    let ws = transport::upgrade(stream).await?;

    let id = SessionId::generate();
    let (writer_tx, writer_rx) = mpsc::channel(shared.config.writer_queue_capacity());

    if shared.manager.insert_session(id.clone(), writer_tx).is_none() {
        tracing::info!(%addr, "connection refused: at capacity");
        let mut ws = ws;
        let _ = ws.close(None).await;
        return Ok(());
    }

    tracing::debug!(%id, %addr, "session accepted");

    let (ws_sink, mut ws_stream) = ws.split();
    let writer = tokio::spawn(writer_loop(ws_sink, writer_rx));

    // The read loop starts only after the snapshot hook has run, so the
    // snapshot is the first message the session sees even when the client
    // fires requests the instant it connects.
    tokio::time::sleep(NEW_CLIENT_SNAPSHOT_DELAY).await;
    deliver_initial_snapshot(&shared, &id).await;

    while let Some(next) = ws_stream.next().await {
        match next {
            Ok(message) if message.is_binary() => {
                let data = message.into_data();
                process_inbound(&shared, &id, &data).await;
            },
            Ok(message) if message.is_close() => break,
            Ok(_) => {},
            Err(err) => {
                tracing::debug!(%id, "session read error: {}", err);
                break;
            },
        }
    }

    teardown_session(&shared, &id);
    writer.abort();
    Ok(())
}

async fn writer_loop(
    mut sink: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<TcpStream>,
        WsMessage,
    >,
    mut rx: mpsc::Receiver<motionbridge_proto::Frame>,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(err) = sink.send(WsMessage::Binary(frame.encode_to_vec())).await {
            tracing::debug!("writer failed: {}", err);
            break;
        }
    }
    let _ = sink.close().await;
}

/// New-client hook: user observers first, then the state snapshot, then the
/// session opens for broadcasts — so the snapshot is the first delivered
/// message even if the streaming plane is busy.
async fn deliver_initial_snapshot(shared: &Arc<Shared>, id: &SessionId) {
    shared.manager.fire_new_client(id);

    let snapshot = assemble_snapshot(shared).await;
    let message = Message::new(Payload::StateUpdate(snapshot));
    if !send_to_session(shared, id, &message) {
        tracing::debug!(%id, "initial snapshot refused by writer");
    }

    shared.manager.activate_session(id);
}

async fn assemble_snapshot(shared: &Arc<Shared>) -> StateSnapshot {
    match &shared.device {
        Some(port) => StateSnapshot {
            devices: port.all_devices().await,
            recording: port.is_recording().await,
        },
        None => StateSnapshot { devices: Vec::new(), recording: false },
    }
}

async fn process_inbound(shared: &Arc<Shared>, id: &SessionId, bytes: &[u8]) {
    let message = match Message::decode(bytes) {
        Ok(message) => message,
        Err(err) => {
            tracing::debug!(%id, error = %err, "rejected inbound frame");
            shared.manager.record_error(id, ErrorCode::InvalidMessage);
            let reply = Message::error(
                ErrorCode::InvalidMessage,
                err.to_string(),
                recovered_request_id(bytes),
            );
            send_to_session(shared, id, &reply);
            return;
        },
    };

    shared.manager.record_received(id, &message);

    if let Err(rejection) = validate(&message) {
        tracing::debug!(%id, reason = %rejection.reason, "message failed validation");
        shared.manager.record_error(id, rejection.code);
        let reply = Message::error(rejection.code, rejection.reason, message.request_id);
        send_to_session(shared, id, &reply);
        return;
    }

    if message.kind() == Some(MessageType::Pong) {
        shared.manager.record_pong(id);
    }

    if message.request_id != 0 {
        if shared.reliable.register_inbound(id, &message) == InboundDisposition::Duplicate {
            send_to_session(shared, id, &message.reply(Payload::Ack));
            return;
        }

        if message.kind().is_some_and(MessageType::is_response)
            && shared.reliable.resolve(id, &message)
        {
            return;
        }
    }

    let response = shared.router.dispatch(message, id).await;
    shared.manager.record_processed();

    if let Some(response) = response {
        if let Payload::Error(err) = &response.payload {
            shared.manager.record_error(id, err.code);
        }
        send_to_session(shared, id, &response);
    }
}

/// Session close: drain pending requests, release transport state, remove
/// from the registry. Safe to call twice; the second call is a no-op.
fn teardown_session(shared: &Shared, id: &SessionId) {
    let Some(handle) = shared.manager.remove_session(id) else {
        return;
    };

    handle.with_session(Session::begin_drain);
    shared.reliable.reject_session(id);
    shared.streaming.forget_session(id);
    shared.client_meta.handle_disconnect(id);
    handle.with_session(Session::close);

    tracing::debug!(%id, "session closed");
}

async fn heartbeat_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let tick = shared.config.heartbeat_interval.min(Duration::from_secs(1));
    let mut interval = tokio::time::interval(tick);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                for (id, action) in shared.manager.heartbeat_tick() {
                    match action {
                        SessionTick::SendPing => {
                            send_to_session(&shared, &id, &Message::new(Payload::Ping));
                        },
                        SessionTick::Terminate => {
                            tracing::info!(%id, "terminating idle session");
                            teardown_session(&shared, &id);
                        },
                    }
                }
            },
        }
    }
}

async fn batch_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(BATCH_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => shared.streaming.process_queue(),
        }
    }
}

async fn cleanup_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                shared.reliable.sweep();
                shared.streaming.cleanup();
            },
        }
    }
}

async fn supervisor_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(SUPERVISOR_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                let notice = shared.supervisor.lock().sample(
                    shared.streaming_processor.processed_total(),
                    shared.streaming.queue_depth(),
                    Instant::now(),
                );

                if let Some(info) = notice {
                    tracing::warn!(
                        throughput = info.throughput,
                        queue_depth = info.queue_depth,
                        drop_ratio = info.drop_ratio,
                        "streaming overload; shedding non-critical messages"
                    );
                    let _ = shared.events.send(BridgeEvent::Overload(info.clone()));

                    let message = Message::new(Payload::Error(ErrorPayload::overload(
                        "streaming overloaded; shedding non-critical messages",
                        info,
                    )));
                    match message.to_frame() {
                        Ok(frame) => {
                            for target in shared.manager.broadcast_targets() {
                                shared.manager.try_send(&target, frame.clone());
                            }
                        },
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to encode overload notice");
                        },
                    }
                }
            },
        }
    }
}

async fn event_loop(
    mut events: mpsc::UnboundedReceiver<BridgeEvent>,
    manager: Arc<ConnectionManager>,
) {
    while let Some(event) = events.recv().await {
        match event {
            BridgeEvent::ClientListChanged(list) => manager.fire_client_list_change(&list),
            BridgeEvent::Overload(info) => {
                tracing::debug!(throughput = info.throughput, "overload event dispatched");
            },
        }
    }
}
