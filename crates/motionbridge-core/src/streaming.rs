//! Streaming transport: fire-and-forget fan-out with backpressure.
//!
//! At-most-once delivery for high-rate data. Sends are checked against a
//! per-session sliding one-second rate window, then handed straight to the
//! session writer; refused writes are queued with their creation timestamp
//! and drained by a small batch loop. Everything here degrades by dropping —
//! the transport never blocks a producer.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use motionbridge_proto::{Frame, Message, MessageType};
use parking_lot::Mutex;

use crate::{config::BridgeConfig, error::BridgeError, session::SessionId, sink::FrameSink};

/// Queued messages older than this are dropped unsent.
const DROP_TTL: Duration = Duration::from_millis(1_000);

/// A failed send is requeued only while younger than this.
const REQUEUE_FRESH: Duration = Duration::from_millis(500);

/// Queue entries processed per batch tick.
const BATCH_SIZE: usize = 10;

/// Spacing of batch ticks.
pub const BATCH_INTERVAL: Duration = Duration::from_millis(10);

/// Rate-window timestamps older than this are evicted by cleanup.
const WINDOW_TTL: Duration = Duration::from_secs(5);

/// Queued messages older than this are evicted by cleanup.
const QUEUE_TTL: Duration = Duration::from_secs(2);

/// Width of the rate-limit window.
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Streaming tunables, lifted from [`BridgeConfig`].
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Whether the per-session rate limit applies
    pub rate_limit_enabled: bool,
    /// Sends allowed per session per sliding second
    pub messages_per_second: u32,
    /// Shared queue capacity
    pub queue_cap: usize,
    /// Overflow policy: drop the oldest entry (else the incoming one)
    pub drop_old_messages: bool,
}

impl From<&BridgeConfig> for StreamingConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            rate_limit_enabled: config.streaming_rate_limit_enabled,
            messages_per_second: config.streaming_messages_per_second,
            queue_cap: config.streaming_queue_cap,
            drop_old_messages: config.streaming_drop_old_messages,
        }
    }
}

#[derive(Debug, Default)]
struct StreamingCounters {
    sent: AtomicU64,
    queued: AtomicU64,
    rate_limited: AtomicU64,
    dropped_ttl: AtomicU64,
    dropped_overflow: AtomicU64,
    dropped_failed: AtomicU64,
}

/// Point-in-time view of the streaming counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingStats {
    /// Frames handed to a writer
    pub sent: u64,
    /// Frames parked in the queue at least once
    pub queued: u64,
    /// Sends dropped by the rate limiter
    pub rate_limited: u64,
    /// Queued frames dropped for exceeding the drop TTL
    pub dropped_ttl: u64,
    /// Frames dropped by queue overflow
    pub dropped_overflow: u64,
    /// Frames dropped after a failed send with no requeue budget
    pub dropped_failed: u64,
}

struct QueuedFrame {
    session: SessionId,
    frame: Frame,
    created: Instant,
    requeued: bool,
}

/// Fire-and-forget fan-out with rate limiting and drop-on-overflow.
pub struct StreamingTransport {
    sink: Arc<dyn FrameSink>,
    config: StreamingConfig,
    windows: Mutex<HashMap<SessionId, VecDeque<Instant>>>,
    queue: Mutex<VecDeque<QueuedFrame>>,
    counters: StreamingCounters,
}

impl StreamingTransport {
    /// New transport writing through the given sink.
    #[must_use]
    pub fn new(sink: Arc<dyn FrameSink>, config: StreamingConfig) -> Self {
        Self {
            sink,
            config,
            windows: Mutex::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            counters: StreamingCounters::default(),
        }
    }

    /// Send one message to one session. `Ok(true)` if it was written or
    /// queued, `Ok(false)` if it was dropped by policy.
    pub fn send_unreliable(
        &self,
        message: &Message,
        session: &SessionId,
    ) -> Result<bool, BridgeError> {
        let frame = message.to_frame()?;
        Ok(self.send_frame_at(frame, session, Instant::now(), Self::is_critical(message)))
    }

    /// Fan a message out to many sessions; encodes once, never waits.
    ///
    /// Returns how many sessions the frame was written or queued for.
    pub fn broadcast_unreliable(
        &self,
        message: &Message,
        sessions: &[SessionId],
    ) -> Result<usize, BridgeError> {
        let frame = message.to_frame()?;
        let now = Instant::now();
        let critical = Self::is_critical(message);

        Ok(sessions
            .iter()
            .filter(|session| self.send_frame_at(frame.clone(), session, now, critical))
            .count())
    }

    /// Critical streaming types skip the rate limiter: the window exists to
    /// tame the motion flood, and a full window must not starve the low-rate
    /// control broadcasts riding alongside it.
    fn is_critical(message: &Message) -> bool {
        message.kind().is_some_and(MessageType::is_critical_stream)
    }

    fn send_frame_at(&self, frame: Frame, session: &SessionId, now: Instant, critical: bool) -> bool {
        if !critical && self.rate_limited(session, now) {
            self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        if self.sink.try_send(session, frame.clone()) {
            self.counters.sent.fetch_add(1, Ordering::Relaxed);
            return true;
        }

        self.enqueue(QueuedFrame { session: session.clone(), frame, created: now, requeued: false })
    }

    /// Check and update the session's sliding one-second window.
    fn rate_limited(&self, session: &SessionId, now: Instant) -> bool {
        if !self.config.rate_limit_enabled {
            return false;
        }

        let mut windows = self.windows.lock();
        let window = windows.entry(session.clone()).or_default();

        while let Some(&oldest) = window.front() {
            if now.saturating_duration_since(oldest) < RATE_WINDOW {
                break;
            }
            window.pop_front();
        }

        if window.len() >= self.config.messages_per_second as usize {
            return true;
        }

        window.push_back(now);
        false
    }

    fn enqueue(&self, entry: QueuedFrame) -> bool {
        let mut queue = self.queue.lock();

        if queue.len() >= self.config.queue_cap {
            self.counters.dropped_overflow.fetch_add(1, Ordering::Relaxed);
            if self.config.drop_old_messages {
                queue.pop_front();
            } else {
                return false;
            }
        }

        queue.push_back(entry);
        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Drain one batch from the queue.
    ///
    /// Stale entries are dropped; fresh entries that still fail to send get
    /// exactly one more trip through the queue.
    pub fn process_queue(&self) {
        self.process_queue_at(Instant::now());
    }

    pub(crate) fn process_queue_at(&self, now: Instant) {
        let batch: Vec<QueuedFrame> = {
            let mut queue = self.queue.lock();
            let take = queue.len().min(BATCH_SIZE);
            queue.drain(..take).collect()
        };

        for entry in batch {
            let age = now.saturating_duration_since(entry.created);

            if age > DROP_TTL {
                self.counters.dropped_ttl.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            if self.sink.try_send(&entry.session, entry.frame.clone()) {
                self.counters.sent.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            if !entry.requeued && age < REQUEUE_FRESH {
                self.queue.lock().push_back(QueuedFrame { requeued: true, ..entry });
            } else {
                self.counters.dropped_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Periodic cleanup: evict stale rate-window timestamps and queued
    /// messages old enough that the batch loop would only drop them anyway.
    pub fn cleanup(&self) {
        self.cleanup_at(Instant::now());
    }

    pub(crate) fn cleanup_at(&self, now: Instant) {
        {
            let mut windows = self.windows.lock();
            for window in windows.values_mut() {
                while let Some(&oldest) = window.front() {
                    if now.saturating_duration_since(oldest) < WINDOW_TTL {
                        break;
                    }
                    window.pop_front();
                }
            }
            windows.retain(|_, window| !window.is_empty());
        }

        let mut queue = self.queue.lock();
        let before = queue.len();
        queue.retain(|entry| now.saturating_duration_since(entry.created) < QUEUE_TTL);
        let evicted = (before - queue.len()) as u64;
        if evicted > 0 {
            self.counters.dropped_ttl.fetch_add(evicted, Ordering::Relaxed);
        }
    }

    /// Forget a closed session's rate window.
    pub fn forget_session(&self, session: &SessionId) {
        self.windows.lock().remove(session);
        self.queue.lock().retain(|entry| &entry.session != session);
    }

    /// Current queue depth, for the overload supervisor.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> StreamingStats {
        StreamingStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            queued: self.counters.queued.load(Ordering::Relaxed),
            rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
            dropped_ttl: self.counters.dropped_ttl.load(Ordering::Relaxed),
            dropped_overflow: self.counters.dropped_overflow.load(Ordering::Relaxed),
            dropped_failed: self.counters.dropped_failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use motionbridge_proto::Payload;

    use super::*;

    /// Sink whose acceptance is toggled by a switch.
    struct SwitchSink {
        accept: AtomicBool,
        delivered: Mutex<Vec<SessionId>>,
    }

    impl SwitchSink {
        fn new(accept: bool) -> Self {
            Self { accept: AtomicBool::new(accept), delivered: Mutex::new(Vec::new()) }
        }

        fn delivered_count(&self) -> usize {
            self.delivered.lock().len()
        }
    }

    impl FrameSink for SwitchSink {
        fn try_send(&self, session: &SessionId, _frame: Frame) -> bool {
            if self.accept.load(Ordering::SeqCst) {
                self.delivered.lock().push(session.clone());
                true
            } else {
                false
            }
        }
    }

    fn config(limit: u32) -> StreamingConfig {
        StreamingConfig {
            rate_limit_enabled: true,
            messages_per_second: limit,
            queue_cap: 100,
            drop_old_messages: true,
        }
    }

    fn heartbeat() -> Message {
        Message::new(Payload::Heartbeat)
    }

    #[test]
    fn direct_send_is_counted() {
        let sink = Arc::new(SwitchSink::new(true));
        let transport = StreamingTransport::new(Arc::clone(&sink) as Arc<dyn FrameSink>, config(1_000));
        let session = SessionId::from("client_1_a");

        assert!(transport.send_unreliable(&heartbeat(), &session).unwrap());
        assert_eq!(sink.delivered_count(), 1);
        assert_eq!(transport.stats().sent, 1);
    }

    #[test]
    fn rate_limit_caps_a_sliding_second() {
        let sink = Arc::new(SwitchSink::new(true));
        let transport = StreamingTransport::new(Arc::clone(&sink) as Arc<dyn FrameSink>, config(5));
        let session = SessionId::from("client_1_a");
        let now = Instant::now();
        let frame = heartbeat().to_frame().unwrap();

        let mut sent = 0;
        for _ in 0..8 {
            if transport.send_frame_at(frame.clone(), &session, now, false) {
                sent += 1;
            }
        }

        assert_eq!(sent, 5);
        assert_eq!(transport.stats().rate_limited, 3);

        // A second later the window has slid clear.
        assert!(transport.send_frame_at(frame, &session, now + Duration::from_millis(1_001), false));
    }

    #[test]
    fn rate_limit_is_per_session() {
        let sink = Arc::new(SwitchSink::new(true));
        let transport = StreamingTransport::new(Arc::clone(&sink) as Arc<dyn FrameSink>, config(1));
        let now = Instant::now();
        let frame = heartbeat().to_frame().unwrap();

        assert!(transport.send_frame_at(frame.clone(), &SessionId::from("client_1_a"), now, false));
        assert!(transport.send_frame_at(frame.clone(), &SessionId::from("client_1_b"), now, false));
        assert!(!transport.send_frame_at(frame, &SessionId::from("client_1_a"), now, false));
    }

    #[test]
    fn refused_writes_are_queued_and_drained() {
        let sink = Arc::new(SwitchSink::new(false));
        let transport = StreamingTransport::new(Arc::clone(&sink) as Arc<dyn FrameSink>, config(1_000));
        let session = SessionId::from("client_1_a");

        assert!(transport.send_unreliable(&heartbeat(), &session).unwrap());
        assert_eq!(transport.queue_depth(), 1);
        assert_eq!(sink.delivered_count(), 0);

        sink.accept.store(true, Ordering::SeqCst);
        transport.process_queue();

        assert_eq!(transport.queue_depth(), 0);
        assert_eq!(sink.delivered_count(), 1);
    }

    #[test]
    fn stale_queued_messages_are_dropped() {
        let sink = Arc::new(SwitchSink::new(false));
        let transport = StreamingTransport::new(Arc::clone(&sink) as Arc<dyn FrameSink>, config(1_000));
        let session = SessionId::from("client_1_a");

        transport.send_unreliable(&heartbeat(), &session).unwrap();

        sink.accept.store(true, Ordering::SeqCst);
        transport.process_queue_at(Instant::now() + Duration::from_millis(1_500));

        assert_eq!(sink.delivered_count(), 0, "stale message must not be sent");
        assert_eq!(transport.stats().dropped_ttl, 1);
    }

    #[test]
    fn failed_fresh_sends_get_one_requeue() {
        let sink = Arc::new(SwitchSink::new(false));
        let transport = StreamingTransport::new(Arc::clone(&sink) as Arc<dyn FrameSink>, config(1_000));
        let session = SessionId::from("client_1_a");
        let now = Instant::now();

        let frame = heartbeat().to_frame().unwrap();
        transport.send_frame_at(frame, &session, now, false);

        // Still fresh, still failing: back on the queue once.
        transport.process_queue_at(now + Duration::from_millis(100));
        assert_eq!(transport.queue_depth(), 1);

        // Second failure exhausts the requeue budget.
        transport.process_queue_at(now + Duration::from_millis(200));
        assert_eq!(transport.queue_depth(), 0);
        assert_eq!(transport.stats().dropped_failed, 1);
    }

    #[test]
    fn overflow_drops_oldest_by_default() {
        let sink = Arc::new(SwitchSink::new(false));
        let mut cfg = config(1_000);
        cfg.queue_cap = 3;
        let transport = StreamingTransport::new(Arc::clone(&sink) as Arc<dyn FrameSink>, cfg);
        let session = SessionId::from("client_1_a");

        for _ in 0..5 {
            transport.send_unreliable(&heartbeat(), &session).unwrap();
        }

        assert_eq!(transport.queue_depth(), 3);
        assert_eq!(transport.stats().dropped_overflow, 2);
    }

    #[test]
    fn overflow_can_drop_incoming_instead() {
        let sink = Arc::new(SwitchSink::new(false));
        let mut cfg = config(1_000);
        cfg.queue_cap = 2;
        cfg.drop_old_messages = false;
        let transport = StreamingTransport::new(Arc::clone(&sink) as Arc<dyn FrameSink>, cfg);
        let session = SessionId::from("client_1_a");

        transport.send_unreliable(&heartbeat(), &session).unwrap();
        transport.send_unreliable(&heartbeat(), &session).unwrap();
        assert!(!transport.send_unreliable(&heartbeat(), &session).unwrap());

        assert_eq!(transport.queue_depth(), 2);
    }

    #[test]
    fn broadcast_fans_out_independently() {
        let sink = Arc::new(SwitchSink::new(true));
        let transport = StreamingTransport::new(Arc::clone(&sink) as Arc<dyn FrameSink>, config(1_000));

        let sessions =
            vec![SessionId::from("client_1_a"), SessionId::from("client_1_b")];
        let delivered = transport.broadcast_unreliable(&heartbeat(), &sessions).unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(sink.delivered_count(), 2);
    }

    #[test]
    fn cleanup_evicts_stale_state() {
        let sink = Arc::new(SwitchSink::new(false));
        let transport = StreamingTransport::new(Arc::clone(&sink) as Arc<dyn FrameSink>, config(1_000));
        let session = SessionId::from("client_1_a");
        let now = Instant::now();

        let frame = heartbeat().to_frame().unwrap();
        transport.send_frame_at(frame, &session, now, false);
        assert_eq!(transport.queue_depth(), 1);

        transport.cleanup_at(now + Duration::from_secs(6));

        assert_eq!(transport.queue_depth(), 0);
        assert!(transport.windows.lock().is_empty());
    }
}
