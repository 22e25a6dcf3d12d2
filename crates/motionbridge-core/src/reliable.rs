//! Reliable transport: request correlation, retries, duplicate suppression.
//!
//! At-least-once delivery for request/response pairs. Every send records a
//! pending entry keyed `(session, request_id)` and retries with exponential
//! backoff until a correlated response arrives or the schedule is exhausted.
//! Because peers may also retry, a bounded recent-set of
//! `(session, request_id, type)` triples suppresses duplicate dispatch on
//! the receive side.
//!
//! The pending table is wiped on session close, not just on response, so a
//! misbehaving peer cannot grow it without bound; a periodic sweep catches
//! anything that slips past both paths.
//!
//! # Request state machine
//!
//! ```text
//! ┌─────────┐ response  ┌──────────┐
//! │ Pending │──────────>│ Resolved │
//! └─────────┘           └──────────┘
//!    │    ↑ backoff
//!    │    └──────────┐
//!    │ timeout,      │
//!    │ attempts left │
//!    ↓               │
//! ┌────────────────┐ │   final timeout / session closed
//! │ AwaitingRetry  │─┘  ┌──────────┐
//! └────────────────┘ ──>│ Rejected │
//!                       └──────────┘
//! ```

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use futures_util::future::join_all;
use motionbridge_proto::Message;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{
    config::BridgeConfig,
    error::BridgeError,
    session::SessionId,
    sink::FrameSink,
};

/// Bound on the duplicate-suppression set.
const DUPLICATE_WINDOW_CAP: usize = 1_000;

/// Entries kept after an overflow eviction.
const DUPLICATE_WINDOW_EVICT_TO: usize = 500;

/// Reliable-transport tunables, lifted from [`BridgeConfig`].
#[derive(Debug, Clone)]
pub struct ReliableConfig {
    /// Per-attempt wait for a response
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff; doubles per retry
    pub backoff_base: Duration,
    /// Backoff ceiling
    pub backoff_cap: Duration,
    /// Age at which the sweep rejects a pending entry
    pub max_pending_age: Duration,
}

impl From<&BridgeConfig> for ReliableConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            timeout: config.reliable_timeout,
            max_retries: config.reliable_max_retries,
            backoff_base: config.reliable_backoff_base,
            backoff_cap: config.reliable_backoff_cap,
            max_pending_age: config.reliable_max_pending_age(),
        }
    }
}

/// Disposition of an inbound correlated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundDisposition {
    /// First sighting of this `(session, request_id, type)` triple
    Fresh,
    /// Seen recently; acknowledge but do not re-dispatch
    Duplicate,
}

/// Counters kept by the reliable transport. Eventually consistent.
#[derive(Debug, Default)]
struct ReliableCounters {
    sent: AtomicU64,
    resolved: AtomicU64,
    retries: AtomicU64,
    timeouts: AtomicU64,
    duplicates: AtomicU64,
    expired: AtomicU64,
    send_failures: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time view of the transport counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReliableStats {
    /// Requests sent
    pub sent: u64,
    /// Requests resolved by a response
    pub resolved: u64,
    /// Retry attempts
    pub retries: u64,
    /// Requests that exhausted every attempt
    pub timeouts: u64,
    /// Duplicate inbound messages suppressed
    pub duplicates: u64,
    /// Pending entries rejected by the sweep
    pub expired: u64,
    /// Writer handoffs that returned `false`
    pub send_failures: u64,
    /// Pending entries rejected by session close or shutdown
    pub rejected: u64,
}

/// Bounded recent-set of `(session, request_id, type)` triples.
#[derive(Debug, Default)]
struct DuplicateWindow {
    order: VecDeque<(SessionId, u32, u8)>,
    seen: HashSet<(SessionId, u32, u8)>,
}

impl DuplicateWindow {
    /// Insert a triple; `false` if it was already present.
    fn insert(&mut self, key: (SessionId, u32, u8)) -> bool {
        if !self.seen.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);

        if self.order.len() > DUPLICATE_WINDOW_CAP {
            while self.order.len() > DUPLICATE_WINDOW_EVICT_TO {
                if let Some(old) = self.order.pop_front() {
                    self.seen.remove(&old);
                }
            }
        }
        true
    }
}

struct PendingEntry {
    resolver: oneshot::Sender<Result<Message, BridgeError>>,
    created: Instant,
}

/// Request/response correlation with timeout, retry, and dedup.
pub struct ReliableTransport {
    sink: Arc<dyn FrameSink>,
    config: ReliableConfig,
    pending: Mutex<HashMap<(SessionId, u32), PendingEntry>>,
    next_ids: Mutex<HashMap<SessionId, u32>>,
    window: Mutex<DuplicateWindow>,
    counters: ReliableCounters,
}

impl ReliableTransport {
    /// New transport writing through the given sink.
    #[must_use]
    pub fn new(sink: Arc<dyn FrameSink>, config: ReliableConfig) -> Self {
        Self {
            sink,
            config,
            pending: Mutex::new(HashMap::new()),
            next_ids: Mutex::new(HashMap::new()),
            window: Mutex::new(DuplicateWindow::default()),
            counters: ReliableCounters::default(),
        }
    }

    /// Next request id for a session: monotone, wrapping at 2^32, never 0.
    fn next_request_id(&self, session: &SessionId) -> u32 {
        let mut ids = self.next_ids.lock();
        let slot = ids.entry(session.clone()).or_insert(0);
        *slot = slot.wrapping_add(1);
        if *slot == 0 {
            *slot = 1;
        }
        *slot
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let doubled = self.config.backoff_base.saturating_mul(1u32 << attempt.min(16));
        doubled.min(self.config.backoff_cap)
    }

    /// Send a message and wait for its correlated response.
    ///
    /// Assigns a fresh per-session request id, records the pending entry,
    /// and writes through the session's writer. A failed write is retryable:
    /// the attempt still waits its timeout, then the schedule continues with
    /// exponential backoff up to `max_retries` extra attempts.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Timeout`] after the final attempt
    /// - [`BridgeError::SessionClosed`] / [`BridgeError::Shutdown`] /
    ///   [`BridgeError::Expired`] when the entry is rejected out from under
    ///   the sender
    pub async fn send_reliable(
        &self,
        mut message: Message,
        session: &SessionId,
    ) -> Result<Message, BridgeError> {
        let request_id = self.next_request_id(session);
        message.request_id = request_id;
        let frame = message.to_frame()?;

        let (tx, mut rx) = oneshot::channel();
        let key = (session.clone(), request_id);
        self.pending
            .lock()
            .insert(key.clone(), PendingEntry { resolver: tx, created: Instant::now() });
        self.counters.sent.fetch_add(1, Ordering::Relaxed);

        let attempts = self.config.max_retries + 1;
        let mut outcome: Option<Result<Message, BridgeError>> = None;

        'attempts: for attempt in 0..attempts {
            if attempt > 0 {
                self.counters.retries.fetch_add(1, Ordering::Relaxed);
            }

            if !self.sink.try_send(session, frame.clone()) {
                self.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%session, request_id, attempt, "reliable write refused; will retry");
            }

            match tokio::time::timeout(self.config.timeout, &mut rx).await {
                Ok(Ok(result)) => {
                    outcome = Some(result);
                    break 'attempts;
                },
                Ok(Err(_)) => {
                    outcome = Some(Err(BridgeError::SessionClosed));
                    break 'attempts;
                },
                Err(_) => {},
            }

            if attempt + 1 < attempts {
                // Keep listening during the backoff; a late response must
                // still resolve the request.
                match tokio::time::timeout(self.backoff_delay(attempt), &mut rx).await {
                    Ok(Ok(result)) => {
                        outcome = Some(result);
                        break 'attempts;
                    },
                    Ok(Err(_)) => {
                        outcome = Some(Err(BridgeError::SessionClosed));
                        break 'attempts;
                    },
                    Err(_) => {},
                }
            }
        }

        self.pending.lock().remove(&key);

        match outcome {
            Some(Ok(response)) => Ok(response),
            Some(Err(err)) => Err(err),
            None => {
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                Err(BridgeError::Timeout { attempts })
            },
        }
    }

    /// Reliable fan-out: independent sends settled in parallel.
    ///
    /// Returns how many sessions acknowledged. Failures are logged, counted,
    /// and otherwise ignored — one dead session must not stall the rest.
    pub async fn broadcast_reliable(&self, message: &Message, sessions: &[SessionId]) -> usize {
        let sends = sessions
            .iter()
            .map(|session| self.send_reliable(message.clone(), session));

        join_all(sends)
            .await
            .into_iter()
            .filter(std::result::Result::is_ok)
            .count()
    }

    /// Record an inbound correlated message in the duplicate window.
    ///
    /// Duplicates are counted and reported so the caller can acknowledge
    /// without re-dispatching.
    pub fn register_inbound(&self, session: &SessionId, message: &Message) -> InboundDisposition {
        let key = (session.clone(), message.request_id, message.msg_type());
        if self.window.lock().insert(key) {
            InboundDisposition::Fresh
        } else {
            self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            InboundDisposition::Duplicate
        }
    }

    /// Try to resolve a pending request with an inbound response.
    ///
    /// `true` if a pending entry consumed the message. Responses with an
    /// unknown request id are ignored, never fatal.
    pub fn resolve(&self, session: &SessionId, response: &Message) -> bool {
        let key = (session.clone(), response.request_id);
        let Some(entry) = self.pending.lock().remove(&key) else {
            return false;
        };

        self.counters.resolved.fetch_add(1, Ordering::Relaxed);
        let _ = entry.resolver.send(Ok(response.clone()));
        true
    }

    /// Reject every pending request for a closing session.
    ///
    /// Each outstanding entry resolves exactly once with a session-closed
    /// error; the session's request-id counter is released with it.
    pub fn reject_session(&self, session: &SessionId) {
        let drained: Vec<PendingEntry> = {
            let mut pending = self.pending.lock();
            let keys: Vec<_> =
                pending.keys().filter(|(s, _)| s == session).cloned().collect();
            keys.into_iter().filter_map(|key| pending.remove(&key)).collect()
        };

        self.next_ids.lock().remove(session);

        for entry in drained {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            let _ = entry.resolver.send(Err(BridgeError::SessionClosed));
        }
    }

    /// Reject everything outstanding; used on bridge shutdown.
    pub fn reject_all(&self) {
        let drained: Vec<PendingEntry> = {
            let mut pending = self.pending.lock();
            let keys: Vec<_> = pending.keys().cloned().collect();
            keys.into_iter().filter_map(|key| pending.remove(&key)).collect()
        };
        self.next_ids.lock().clear();

        for entry in drained {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            let _ = entry.resolver.send(Err(BridgeError::Shutdown));
        }
    }

    /// One cleanup pass: reject entries older than the pending-age bound.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    pub(crate) fn sweep_at(&self, now: Instant) {
        let expired: Vec<PendingEntry> = {
            let mut pending = self.pending.lock();
            let keys: Vec<_> = pending
                .iter()
                .filter(|(_, entry)| {
                    now.saturating_duration_since(entry.created) > self.config.max_pending_age
                })
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter().filter_map(|key| pending.remove(&key)).collect()
        };

        for entry in expired {
            self.counters.expired.fetch_add(1, Ordering::Relaxed);
            let _ = entry.resolver.send(Err(BridgeError::Expired));
        }
    }

    /// Outstanding pending entries.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> ReliableStats {
        ReliableStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            resolved: self.counters.resolved.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            duplicates: self.counters.duplicates.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            send_failures: self.counters.send_failures.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }
}
