//! Streaming domain: high-rate broadcast with load shedding.
//!
//! Consumes what the processing plane produces — motion samples, device
//! flags, battery levels, sync phases — and fans it out to every active
//! session through the streaming transport. The processor owns the
//! throughput counter the overload supervisor samples, and applies the
//! shedding policy: under overload a configured fraction of motion frames
//! is dropped probabilistically while critical types always go through.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use motionbridge_proto::{Domain, Message, MessageType};
use parking_lot::Mutex;

use crate::{
    error::BridgeError,
    router::DomainProcessor,
    session::SessionId,
    sink::SessionDirectory,
    streaming::StreamingTransport,
    supervisor::OverloadSupervisor,
};

/// Processor for the streaming broadcast range.
pub struct StreamingProcessor {
    transport: Arc<StreamingTransport>,
    directory: Arc<dyn SessionDirectory>,
    supervisor: Arc<Mutex<OverloadSupervisor>>,
    processed: AtomicU64,
    shed: AtomicU64,
}

impl StreamingProcessor {
    /// New processor broadcasting through the given transport.
    #[must_use]
    pub fn new(
        transport: Arc<StreamingTransport>,
        directory: Arc<dyn SessionDirectory>,
        supervisor: Arc<Mutex<OverloadSupervisor>>,
    ) -> Self {
        Self { transport, directory, supervisor, processed: AtomicU64::new(0), shed: AtomicU64::new(0) }
    }

    /// Broadcast one streaming message to every active session.
    ///
    /// Applies the shedding policy first; critical types are never shed.
    pub fn broadcast(&self, message: &Message) -> Result<usize, BridgeError> {
        let critical = message.kind().is_some_and(MessageType::is_critical_stream);

        let drop_it = self.supervisor.lock().should_shed(critical, rand::random::<f64>());
        if drop_it {
            self.shed.fetch_add(1, Ordering::Relaxed);
            return Ok(0);
        }

        self.processed.fetch_add(1, Ordering::Relaxed);

        let targets = self.directory.broadcast_targets();
        self.transport.broadcast_unreliable(message, &targets)
    }

    /// Messages broadcast since start, after shedding. This is the counter
    /// the overload supervisor samples — shed messages must not feed back
    /// into the throughput signal.
    #[must_use]
    pub fn processed_total(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Messages dropped by the shedding policy since start.
    #[must_use]
    pub fn shed_total(&self) -> u64 {
        self.shed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DomainProcessor for StreamingProcessor {
    fn domain(&self) -> Domain {
        Domain::Streaming
    }

    async fn process(
        &self,
        message: Message,
        _session: &SessionId,
    ) -> Result<Option<Message>, BridgeError> {
        // Inbound streaming frames (a collaborator pushing through a client
        // connection) are fanned out exactly like port-produced ones.
        self.broadcast(&message)?;
        Ok(None)
    }
}
