//! System domain: heartbeat, status, liveness, internal acks.

use std::sync::Arc;

use async_trait::async_trait;
use motionbridge_proto::{Domain, ErrorCode, Message, Payload, payloads::system::StatusPayload};

use crate::{error::BridgeError, ports::SystemPort, router::DomainProcessor, session::SessionId};

/// Supplies the bridge-level part of the status snapshot.
///
/// Implemented by the connection manager, which owns uptime, session counts,
/// and the aggregate counters.
pub trait StatusSource: Send + Sync {
    /// Assemble the current status snapshot.
    fn status(&self) -> StatusPayload;
}

/// Processor for the system range: heartbeat echo, status assembly, and the
/// internal ack/ping/pong types. No retries anywhere — every operation is
/// local.
pub struct SystemProcessor {
    status: Arc<dyn StatusSource>,
    system_port: Option<Arc<dyn SystemPort>>,
}

impl SystemProcessor {
    /// New processor over a status source and an optional host-system port.
    #[must_use]
    pub fn new(status: Arc<dyn StatusSource>, system_port: Option<Arc<dyn SystemPort>>) -> Self {
        Self { status, system_port }
    }

    async fn assemble_status(&self) -> StatusPayload {
        let mut status = self.status.status();

        if let Some(port) = &self.system_port {
            status.extra.extend(port.system_status().await);

            let metrics = port.performance_metrics().await;
            if !metrics.is_empty() {
                status.extra.insert(
                    "performanceMetrics".to_owned(),
                    serde_json::Value::Object(metrics.into_iter().collect()),
                );
            }
        }

        status
    }
}

#[async_trait]
impl DomainProcessor for SystemProcessor {
    fn domain(&self) -> Domain {
        Domain::System
    }

    async fn process(
        &self,
        message: Message,
        session: &SessionId,
    ) -> Result<Option<Message>, BridgeError> {
        let response = match &message.payload {
            Payload::Heartbeat => Some(message.reply(Payload::Heartbeat)),

            Payload::StatusRequest => {
                Some(message.reply(Payload::StatusResponse(self.assemble_status().await)))
            },

            Payload::Ping => Some(message.reply(Payload::Pong)),

            // Pongs refresh liveness in the session layer before routing;
            // nothing left to do here.
            Payload::Pong => None,

            Payload::Ack => Some(message.reply(Payload::Ack)),

            Payload::Error(err) => {
                tracing::warn!(%session, code = %err.code, "client reported error: {}", err.message);
                None
            },

            _ => Some(Message::error(
                ErrorCode::InvalidMessage,
                "unsupported system operation",
                message.request_id,
            )),
        };

        Ok(response)
    }
}
