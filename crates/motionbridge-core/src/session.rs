//! Per-session state machine.
//!
//! One `Session` per connected client: lifecycle state, liveness, counters,
//! and ping/pong latency. Pure state — no I/O, time passed in as parameters
//! — so the heartbeat policy is testable without a socket.
//!
//! # State machine
//!
//! ```text
//! ┌───────────┐ snapshot hook ┌────────┐ close / timeout ┌──────────┐
//! │ Accepting │──────────────>│ Active │────────────────>│ Draining │
//! └───────────┘               └────────┘                 └──────────┘
//!       │                                                      │
//!       │ close                   pending requests rejected,   │
//!       └────────────────┐        resources released           │
//!                        ↓                                     ↓
//!                   ┌────────┐                            ┌────────┐
//!                   │ Closed │<───────────────────────────│ Closed │
//!                   └────────┘                            └────────┘
//! ```

use std::{
    sync::Arc,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

/// Stable session identifier of the form `client_<epoch-ms>_<random>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Arc<str>);

impl SessionId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let suffix: u32 = rand::random();
        Self(Arc::from(format!("client_{epoch_ms}_{suffix:08x}").as_str()))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted; the new-client snapshot hook has not run yet
    Accepting,
    /// Fully connected and eligible for broadcasts
    Active,
    /// Close initiated; pending requests being rejected
    Draining,
    /// Terminal
    Closed,
}

/// Action the heartbeat loop should take for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTick {
    /// Send a liveness ping
    SendPing,
    /// Liveness timestamp is too old; terminate the session
    Terminate,
}

/// Observable health of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionHealth {
    /// Session identifier
    pub session_id: SessionId,
    /// Whether the session is in the `Active` state
    pub connected: bool,
    /// Milliseconds since the last inbound frame
    pub idle_ms: u64,
    /// Frames written to this session
    pub sent: u64,
    /// Frames received from this session
    pub received: u64,
    /// Errors attributed to this session
    pub errors: u64,
    /// Last measured ping/pong round trip, if any
    pub latency: Option<Duration>,
}

/// Per-session state: lifecycle, liveness, counters, latency.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    state: SessionState,
    created: Instant,
    last_activity: Instant,
    last_ping: Option<Instant>,
    latency: Option<Duration>,
    sent: u64,
    received: u64,
    errors: u64,
}

impl Session {
    /// Create a session in the `Accepting` state.
    #[must_use]
    pub fn new(id: SessionId, now: Instant) -> Self {
        Self {
            id,
            state: SessionState::Accepting,
            created: now,
            last_activity: now,
            last_ping: None,
            latency: None,
            sent: 0,
            received: 0,
            errors: 0,
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// When the session was accepted.
    #[must_use]
    pub fn created(&self) -> Instant {
        self.created
    }

    /// Accepting → Active, once the snapshot hook has run.
    pub fn activate(&mut self) {
        if self.state == SessionState::Accepting {
            self.state = SessionState::Active;
        }
    }

    /// Active/Accepting → Draining on close initiation or timeout.
    pub fn begin_drain(&mut self) {
        if matches!(self.state, SessionState::Accepting | SessionState::Active) {
            self.state = SessionState::Draining;
        }
    }

    /// Draining → Closed after pending-request rejection.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Refresh the liveness timestamp. Any inbound frame counts.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Count one outbound frame.
    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    /// Count one inbound frame and refresh liveness.
    pub fn record_received(&mut self, now: Instant) {
        self.received += 1;
        self.touch(now);
    }

    /// Count one error attributed to this session.
    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Note an outbound ping for latency measurement.
    pub fn record_ping(&mut self, now: Instant) {
        self.last_ping = Some(now);
    }

    /// Note an inbound pong; returns the measured round trip.
    pub fn record_pong(&mut self, now: Instant) -> Option<Duration> {
        let latency = now.saturating_duration_since(self.last_ping?);
        self.latency = Some(latency);
        self.touch(now);
        Some(latency)
    }

    /// Periodic maintenance decision for the heartbeat loop.
    ///
    /// Termination takes priority over pinging; a session that times out on
    /// the same tick its ping falls due is torn down, not pinged.
    #[must_use]
    pub fn tick(
        &mut self,
        now: Instant,
        heartbeat_interval: Duration,
        connection_timeout: Duration,
    ) -> Option<SessionTick> {
        if !matches!(self.state, SessionState::Accepting | SessionState::Active) {
            return None;
        }

        if now.saturating_duration_since(self.last_activity) > connection_timeout {
            self.begin_drain();
            return Some(SessionTick::Terminate);
        }

        if self.state == SessionState::Active {
            let due = match self.last_ping {
                None => true,
                Some(last) => now.saturating_duration_since(last) >= heartbeat_interval,
            };
            if due {
                self.record_ping(now);
                return Some(SessionTick::SendPing);
            }
        }

        None
    }

    /// Health snapshot for the connection manager.
    #[must_use]
    pub fn health(&self, now: Instant) -> SessionHealth {
        SessionHealth {
            session_id: self.id.clone(),
            connected: self.state == SessionState::Active,
            idle_ms: now.saturating_duration_since(self.last_activity).as_millis() as u64,
            sent: self.sent,
            received: self.received,
            errors: self.errors,
            latency: self.latency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEARTBEAT: Duration = Duration::from_secs(30);
    const TIMEOUT: Duration = Duration::from_secs(60);

    #[test]
    fn generated_ids_have_client_prefix() {
        let id = SessionId::generate();
        assert!(id.as_str().starts_with("client_"));
        assert_ne!(id, SessionId::generate());
    }

    #[test]
    fn lifecycle_transitions() {
        let now = Instant::now();
        let mut session = Session::new(SessionId::generate(), now);

        assert_eq!(session.state(), SessionState::Accepting);
        session.activate();
        assert_eq!(session.state(), SessionState::Active);
        session.begin_drain();
        assert_eq!(session.state(), SessionState::Draining);
        session.close();
        assert_eq!(session.state(), SessionState::Closed);

        // Terminal: no transition out of Closed.
        session.activate();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn first_tick_sends_ping() {
        let now = Instant::now();
        let mut session = Session::new(SessionId::generate(), now);
        session.activate();

        assert_eq!(session.tick(now, HEARTBEAT, TIMEOUT), Some(SessionTick::SendPing));
        // Not due again until the interval elapses.
        assert_eq!(session.tick(now + Duration::from_secs(1), HEARTBEAT, TIMEOUT), None);
        assert_eq!(
            session.tick(now + Duration::from_secs(31), HEARTBEAT, TIMEOUT),
            Some(SessionTick::SendPing)
        );
    }

    #[test]
    fn idle_session_is_terminated() {
        let now = Instant::now();
        let mut session = Session::new(SessionId::generate(), now);
        session.activate();

        let late = now + TIMEOUT + Duration::from_secs(1);
        assert_eq!(session.tick(late, HEARTBEAT, TIMEOUT), Some(SessionTick::Terminate));
        assert_eq!(session.state(), SessionState::Draining);
    }

    #[test]
    fn activity_defers_termination() {
        let now = Instant::now();
        let mut session = Session::new(SessionId::generate(), now);
        session.activate();

        session.record_received(now + Duration::from_secs(50));

        let later = now + Duration::from_secs(70);
        // 20s since last activity: alive, ping due.
        assert_eq!(session.tick(later, HEARTBEAT, TIMEOUT), Some(SessionTick::SendPing));
    }

    #[test]
    fn pong_measures_latency() {
        let now = Instant::now();
        let mut session = Session::new(SessionId::generate(), now);
        session.activate();

        assert_eq!(session.record_pong(now), None, "pong before ping is not a measurement");

        session.record_ping(now);
        let latency = session.record_pong(now + Duration::from_millis(25));
        assert_eq!(latency, Some(Duration::from_millis(25)));
        assert_eq!(session.health(now).latency, Some(Duration::from_millis(25)));
    }

    #[test]
    fn accepting_sessions_time_out_but_never_ping() {
        let now = Instant::now();
        let mut session = Session::new(SessionId::generate(), now);

        // Still Accepting: no pings, but the liveness timeout applies.
        assert_eq!(session.tick(now + Duration::from_secs(31), HEARTBEAT, TIMEOUT), None);
        assert_eq!(
            session.tick(now + Duration::from_secs(61), HEARTBEAT, TIMEOUT),
            Some(SessionTick::Terminate)
        );
    }

    #[test]
    fn health_reports_counters() {
        let now = Instant::now();
        let mut session = Session::new(SessionId::generate(), now);
        session.activate();
        session.record_sent();
        session.record_sent();
        session.record_received(now);
        session.record_error();

        let health = session.health(now);
        assert!(health.connected);
        assert_eq!(health.sent, 2);
        assert_eq!(health.received, 1);
        assert_eq!(health.errors, 1);
    }
}
