//! Message router: range classification and processor dispatch.
//!
//! A lookup table keyed by message-type range decides the domain; the
//! registered processor for that domain runs under a per-type soft timeout.
//! Routing failures — unknown range, missing processor, processor error or
//! timeout — are answered with an error frame to the sender and never
//! terminate the session.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use motionbridge_proto::{Domain, ErrorCode, Message, MessageType};
use parking_lot::RwLock;

use crate::{error::BridgeError, session::SessionId};

/// A domain processor: the adapter between routed messages and an external
/// port. Implementations are stateless with respect to sessions; everything
/// session-scoped stays in the connection manager.
#[async_trait]
pub trait DomainProcessor: Send + Sync {
    /// The domain this processor serves.
    fn domain(&self) -> Domain;

    /// Process one message. `Ok(Some)` is a response for the sender;
    /// `Ok(None)` means nothing to send back. `Err` is an unexpected
    /// processing failure, surfaced as an error frame by the router.
    async fn process(
        &self,
        message: Message,
        session: &SessionId,
    ) -> Result<Option<Message>, BridgeError>;
}

/// Per-type soft timeout for processor invocations.
#[must_use]
pub fn operation_timeout(msg_type: u8) -> Duration {
    match MessageType::from_u8(msg_type) {
        Some(MessageType::ScanRequest | MessageType::ConnectRequest) => Duration::from_secs(15),
        Some(MessageType::RecordStartRequest) => Duration::from_secs(30),
        Some(MessageType::RecordStopRequest) => Duration::from_secs(10),
        _ => Duration::from_secs(5),
    }
}

#[derive(Debug, Default)]
struct DomainCounters {
    processed: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time router statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouterStats {
    /// Messages successfully dispatched
    pub processed: u64,
    /// Routing and processing failures
    pub errors: u64,
    /// Per-domain (processed, errors) counts
    pub per_domain: HashMap<&'static str, (u64, u64)>,
}

/// Classifies messages by type range and dispatches to domain processors.
pub struct Router {
    processors: RwLock<HashMap<Domain, Arc<dyn DomainProcessor>>>,
    counters: RwLock<HashMap<Domain, Arc<DomainCounters>>>,
    processed: AtomicU64,
    errors: AtomicU64,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a router with no processors registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            processors: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
            processed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Register a processor under its declared domain, replacing any
    /// previous registration.
    pub fn register(&self, processor: Arc<dyn DomainProcessor>) {
        let domain = processor.domain();
        self.processors.write().insert(domain, processor);
        self.counters.write().entry(domain).or_default();
    }

    fn domain_counters(&self, domain: Domain) -> Arc<DomainCounters> {
        Arc::clone(self.counters.write().entry(domain).or_default())
    }

    /// Route one inbound message.
    ///
    /// Returns the frame to write back to the sender, if any. All failure
    /// modes produce an error frame carrying the original request id.
    pub async fn dispatch(&self, message: Message, session: &SessionId) -> Option<Message> {
        let msg_type = message.msg_type();
        let request_id = message.request_id;

        let Some(domain) = Domain::classify(msg_type) else {
            self.errors.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(msg_type, %session, "message type outside every domain range");
            return Some(Message::error(
                ErrorCode::InvalidMessage,
                format!("unroutable message type {msg_type:#04x}"),
                request_id,
            ));
        };

        let processor = self.processors.read().get(&domain).cloned();
        let Some(processor) = processor else {
            self.errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(%domain, "no processor registered");
            return Some(Message::error(
                ErrorCode::InvalidMessage,
                format!("no processor for domain {domain}"),
                request_id,
            ));
        };

        let counters = self.domain_counters(domain);
        let limit = operation_timeout(msg_type);

        match tokio::time::timeout(limit, processor.process(message, session)).await {
            Ok(Ok(response)) => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                counters.processed.fetch_add(1, Ordering::Relaxed);
                response
            },
            Ok(Err(err)) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%domain, %session, error = %err, "processor failed");
                Some(Message::error(err.error_code(), err.to_string(), request_id))
            },
            Err(_) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%domain, %session, ?limit, "processor timed out");
                Some(Message::error(
                    ErrorCode::Timeout,
                    format!("{domain} operation timed out after {}s", limit.as_secs()),
                    request_id,
                ))
            },
        }
    }

    /// Statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        let per_domain = self
            .counters
            .read()
            .iter()
            .map(|(domain, counters)| {
                (
                    domain.tag(),
                    (
                        counters.processed.load(Ordering::Relaxed),
                        counters.errors.load(Ordering::Relaxed),
                    ),
                )
            })
            .collect();

        RouterStats {
            processed: self.processed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            per_domain,
        }
    }

    /// Reset all counters to zero.
    pub fn reset_stats(&self) {
        self.processed.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        for counters in self.counters.read().values() {
            counters.processed.store(0, Ordering::Relaxed);
            counters.errors.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use motionbridge_proto::{Payload, payloads::ErrorPayload};

    use super::*;

    struct EchoProcessor {
        domain: Domain,
    }

    #[async_trait]
    impl DomainProcessor for EchoProcessor {
        fn domain(&self) -> Domain {
            self.domain
        }

        async fn process(
            &self,
            message: Message,
            _session: &SessionId,
        ) -> Result<Option<Message>, BridgeError> {
            Ok(Some(message.reply(Payload::Ack)))
        }
    }

    struct FailingProcessor;

    #[async_trait]
    impl DomainProcessor for FailingProcessor {
        fn domain(&self) -> Domain {
            Domain::Ble
        }

        async fn process(
            &self,
            _message: Message,
            _session: &SessionId,
        ) -> Result<Option<Message>, BridgeError> {
            Err(BridgeError::DeviceUnavailable)
        }
    }

    struct StuckProcessor;

    #[async_trait]
    impl DomainProcessor for StuckProcessor {
        fn domain(&self) -> Domain {
            Domain::System
        }

        async fn process(
            &self,
            _message: Message,
            _session: &SessionId,
        ) -> Result<Option<Message>, BridgeError> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(None)
        }
    }

    fn session() -> SessionId {
        SessionId::from("client_1_a")
    }

    fn error_payload(message: &Message) -> &ErrorPayload {
        match &message.payload {
            Payload::Error(payload) => payload,
            other => panic!("expected error payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatch_reaches_the_domain_processor() {
        let router = Router::new();
        router.register(Arc::new(EchoProcessor { domain: Domain::System }));

        let request = Message::with_request_id(Payload::Heartbeat, 3);
        let response = router.dispatch(request, &session()).await.unwrap();

        assert_eq!(response.request_id, 3);
        assert_eq!(response.kind(), Some(MessageType::Ack));
        assert_eq!(router.stats().processed, 1);
    }

    #[tokio::test]
    async fn unroutable_type_yields_invalid_message() {
        let router = Router::new();

        let bogus = Message {
            request_id: 9,
            timestamp_ms: 1.0,
            payload: Payload::Unknown { msg_type: 0x77, bytes: bytes::Bytes::new() },
        };
        let response = router.dispatch(bogus, &session()).await.unwrap();

        let payload = error_payload(&response);
        assert_eq!(payload.code, ErrorCode::InvalidMessage);
        assert_eq!(response.request_id, 9);
        assert_eq!(router.stats().errors, 1);
    }

    #[tokio::test]
    async fn missing_processor_yields_invalid_message() {
        let router = Router::new();

        let request = Message::with_request_id(Payload::ScanRequest, 1);
        let response = router.dispatch(request, &session()).await.unwrap();

        assert_eq!(error_payload(&response).code, ErrorCode::InvalidMessage);
    }

    #[tokio::test]
    async fn processor_error_becomes_error_frame() {
        let router = Router::new();
        router.register(Arc::new(FailingProcessor));

        let request = Message::with_request_id(Payload::ScanRequest, 4);
        let response = router.dispatch(request, &session()).await.unwrap();

        assert_eq!(error_payload(&response).code, ErrorCode::DeviceUnavailable);
        assert_eq!(response.request_id, 4);

        let stats = router.stats();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.per_domain["ble"], (0, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_processor_times_out() {
        let router = Router::new();
        router.register(Arc::new(StuckProcessor));

        let request = Message::with_request_id(Payload::StatusRequest, 5);
        let response = router.dispatch(request, &session()).await.unwrap();

        assert_eq!(error_payload(&response).code, ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn operation_timeouts_scale_with_type() {
        assert_eq!(operation_timeout(MessageType::ScanRequest.to_u8()), Duration::from_secs(15));
        assert_eq!(
            operation_timeout(MessageType::RecordStartRequest.to_u8()),
            Duration::from_secs(30)
        );
        assert_eq!(
            operation_timeout(MessageType::RecordStopRequest.to_u8()),
            Duration::from_secs(10)
        );
        assert_eq!(operation_timeout(MessageType::Heartbeat.to_u8()), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn stats_reset() {
        let router = Router::new();
        router.register(Arc::new(EchoProcessor { domain: Domain::System }));

        router.dispatch(Message::new(Payload::Heartbeat), &session()).await;
        assert_eq!(router.stats().processed, 1);

        router.reset_stats();
        let stats = router.stats();
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.per_domain["system"], (0, 0));
    }
}
