//! Connection manager: session registry, health, and handler dispatch.
//!
//! Owns every live session's writer handle and state machine, derives the
//! per-session and system health observables, and fans registered handlers
//! out to the embedding application. Implements the core seams
//! ([`FrameSink`], [`SessionDirectory`], [`StatusSource`]) on top of the
//! registry so the transports and processors stay socket-free.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use motionbridge_core::{
    BridgeConfig, FrameSink, RateWindow, Session, SessionDirectory, SessionHealth, SessionId,
    SessionState, SessionTick, StatusSource,
};
use motionbridge_proto::{
    ErrorCode, Frame, Message,
    payloads::{client::ClientList, system::StatusPayload},
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

/// Span of the aggregate throughput window, seconds.
const THROUGHPUT_WINDOW_SECS: u64 = 60;

/// Observer of inbound messages.
pub type MessageHandler = Arc<dyn Fn(&SessionId, &Message) + Send + Sync>;

/// Observer of system-health changes.
pub type HealthHandler = Arc<dyn Fn(&SystemHealth) + Send + Sync>;

/// Observer of client-list changes.
pub type ClientListHandler = Arc<dyn Fn(&ClientList) + Send + Sync>;

/// Observer of newly accepted sessions.
pub type NewClientHandler = Arc<dyn Fn(&SessionId) + Send + Sync>;

/// Aggregate bridge health.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemHealth {
    /// Whether the listener is accepting sessions
    pub running: bool,
    /// Time since the bridge started
    pub uptime: Duration,
    /// Currently registered sessions
    pub session_count: usize,
    /// Rolling one-minute throughput, messages per second
    pub throughput_per_sec: f64,
    /// Errors per processed message since start
    pub error_rate: f64,
}

/// One live session: its writer queue and state machine.
pub struct SessionHandle {
    writer: mpsc::Sender<Frame>,
    session: Mutex<Session>,
}

impl SessionHandle {
    /// Run a closure against the session state machine.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        f(&mut self.session.lock())
    }
}

/// Session registry plus derived observables.
pub struct ConnectionManager {
    config: BridgeConfig,
    started: Instant,
    running: AtomicBool,
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
    throughput: Mutex<RateWindow>,
    messages_processed: AtomicU64,
    errors_total: AtomicU64,
    error_counts: Mutex<BTreeMap<String, u64>>,
    on_message: RwLock<Vec<MessageHandler>>,
    on_health_change: RwLock<Vec<HealthHandler>>,
    on_client_list_change: RwLock<Vec<ClientListHandler>>,
    on_new_client: RwLock<Vec<NewClientHandler>>,
}

impl ConnectionManager {
    /// New manager for a freshly started bridge.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        let started = Instant::now();
        Self {
            config,
            started,
            running: AtomicBool::new(true),
            sessions: RwLock::new(HashMap::new()),
            throughput: Mutex::new(RateWindow::new(THROUGHPUT_WINDOW_SECS, started)),
            messages_processed: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            error_counts: Mutex::new(BTreeMap::new()),
            on_message: RwLock::new(Vec::new()),
            on_health_change: RwLock::new(Vec::new()),
            on_client_list_change: RwLock::new(Vec::new()),
            on_new_client: RwLock::new(Vec::new()),
        }
    }

    /// Register a new session. `None` if the bridge is at capacity.
    pub fn insert_session(
        &self,
        id: SessionId,
        writer: mpsc::Sender<Frame>,
    ) -> Option<Arc<SessionHandle>> {
        let handle = {
            let mut sessions = self.sessions.write();
            if sessions.len() >= self.config.max_connections {
                return None;
            }

            let handle = Arc::new(SessionHandle {
                writer,
                session: Mutex::new(Session::new(id.clone(), Instant::now())),
            });
            sessions.insert(id, Arc::clone(&handle));
            handle
        };

        self.fire_health_change();
        Some(handle)
    }

    /// Remove a session from the registry. The caller owns the rest of the
    /// teardown (pending-request rejection, transport cleanup).
    pub fn remove_session(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        let handle = self.sessions.write().remove(id);
        if handle.is_some() {
            self.fire_health_change();
        }
        handle
    }

    /// Look up a live session.
    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.read().get(id).cloned()
    }

    /// Mark a session Active (snapshot delivered, broadcasts may flow).
    pub fn activate_session(&self, id: &SessionId) {
        if let Some(handle) = self.session(id) {
            handle.with_session(Session::activate);
        }
    }

    /// Registered session count.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Ids of every registered session, in no particular order.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Count one inbound frame and notify message observers.
    pub fn record_received(&self, id: &SessionId, message: &Message) {
        if let Some(handle) = self.session(id) {
            handle.with_session(|session| session.record_received(Instant::now()));
        }
        for handler in self.on_message.read().iter() {
            handler(id, message);
        }
    }

    /// Count one processed message into the aggregate throughput window.
    pub fn record_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        self.throughput.lock().record(Instant::now());
    }

    /// Count one error, attributed to a session and an error class.
    pub fn record_error(&self, id: &SessionId, code: ErrorCode) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
        *self.error_counts.lock().entry(code.as_str().to_owned()).or_insert(0) += 1;
        if let Some(handle) = self.session(id) {
            handle.with_session(Session::record_error);
        }
    }

    /// Note a pong from a session; updates measured latency.
    pub fn record_pong(&self, id: &SessionId) {
        if let Some(handle) = self.session(id) {
            if let Some(latency) = handle.with_session(|s| s.record_pong(Instant::now())) {
                tracing::trace!(%id, ?latency, "measured session latency");
            }
        }
    }

    /// Run one heartbeat tick over every session.
    ///
    /// Returns the actions the caller must execute: pings to write and
    /// sessions to terminate.
    #[must_use]
    pub fn heartbeat_tick(&self) -> Vec<(SessionId, SessionTick)> {
        let now = Instant::now();
        let sessions = self.sessions.read();

        sessions
            .iter()
            .filter_map(|(id, handle)| {
                handle
                    .with_session(|session| {
                        session.tick(
                            now,
                            self.config.heartbeat_interval,
                            self.config.connection_timeout,
                        )
                    })
                    .map(|tick| (id.clone(), tick))
            })
            .collect()
    }

    /// Health snapshot for one session.
    #[must_use]
    pub fn session_health(&self, id: &SessionId) -> Option<SessionHealth> {
        self.session(id).map(|handle| handle.with_session(|s| s.health(Instant::now())))
    }

    /// Health snapshots for every session.
    #[must_use]
    pub fn all_session_health(&self) -> Vec<SessionHealth> {
        let now = Instant::now();
        self.sessions
            .read()
            .values()
            .map(|handle| handle.with_session(|s| s.health(now)))
            .collect()
    }

    /// Aggregate health snapshot.
    #[must_use]
    pub fn system_health(&self) -> SystemHealth {
        let processed = self.messages_processed.load(Ordering::Relaxed);
        let errors = self.errors_total.load(Ordering::Relaxed);

        SystemHealth {
            running: self.running.load(Ordering::Relaxed),
            uptime: self.started.elapsed(),
            session_count: self.session_count(),
            throughput_per_sec: self.throughput.lock().rate_per_sec(Instant::now()),
            error_rate: if processed == 0 { 0.0 } else { errors as f64 / processed as f64 },
        }
    }

    /// Flip the running flag (listener stopped).
    pub fn mark_stopped(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.fire_health_change();
    }

    /// Register an inbound-message observer.
    pub fn on_message(&self, handler: MessageHandler) {
        self.on_message.write().push(handler);
    }

    /// Register a system-health observer.
    pub fn on_health_change(&self, handler: HealthHandler) {
        self.on_health_change.write().push(handler);
    }

    /// Register a client-list observer.
    pub fn on_client_list_change(&self, handler: ClientListHandler) {
        self.on_client_list_change.write().push(handler);
    }

    /// Register a new-client observer, called shortly after accept and
    /// before any broadcast reaches the session.
    pub fn on_new_client(&self, handler: NewClientHandler) {
        self.on_new_client.write().push(handler);
    }

    /// Invoke the new-client observers for a session.
    pub fn fire_new_client(&self, id: &SessionId) {
        for handler in self.on_new_client.read().iter() {
            handler(id);
        }
    }

    /// Invoke the client-list observers.
    pub fn fire_client_list_change(&self, list: &ClientList) {
        for handler in self.on_client_list_change.read().iter() {
            handler(list);
        }
    }

    fn fire_health_change(&self) {
        let handlers = self.on_health_change.read();
        if handlers.is_empty() {
            return;
        }
        let health = self.system_health();
        for handler in handlers.iter() {
            handler(&health);
        }
    }
}

impl FrameSink for ConnectionManager {
    fn try_send(&self, session: &SessionId, frame: Frame) -> bool {
        let Some(handle) = self.session(session) else {
            return false;
        };

        match handle.writer.try_send(frame) {
            Ok(()) => {
                handle.with_session(Session::record_sent);
                true
            },
            Err(err) => {
                tracing::trace!(%session, "writer refused frame: {}", err);
                false
            },
        }
    }
}

impl SessionDirectory for ConnectionManager {
    fn broadcast_targets(&self) -> Vec<SessionId> {
        self.sessions
            .read()
            .iter()
            .filter(|(_, handle)| {
                handle.with_session(|session| session.state() == SessionState::Active)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl StatusSource for ConnectionManager {
    fn status(&self) -> StatusPayload {
        let health = self.system_health();

        StatusPayload {
            running: health.running,
            uptime_ms: health.uptime.as_millis() as u64,
            session_count: health.session_count,
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            errors: self.errors_total.load(Ordering::Relaxed),
            throughput_per_sec: health.throughput_per_sec,
            error_rate: health.error_rate,
            error_counts: self.error_counts.lock().clone(),
            extra: BTreeMap::new(),
        }
    }
}
