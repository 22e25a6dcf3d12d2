//! Client-metadata domain: registration, metadata, and cross-client actions.
//!
//! Clients declare who they are and what actions they expose; other clients
//! invoke those actions through the bridge. Every metadata mutation
//! broadcasts the updated client list to all active sessions and raises a
//! [`BridgeEvent::ClientListChanged`] for the embedding application.

use std::sync::Arc;

use async_trait::async_trait;
use motionbridge_proto::{Domain, ErrorCode, Message, Payload};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{
    error::BridgeError,
    registry::ClientRegistry,
    router::DomainProcessor,
    session::SessionId,
    sink::{BridgeEvent, FrameSink, SessionDirectory},
};

/// Processor for the client-metadata/action range.
pub struct ClientMetaProcessor {
    registry: Arc<Mutex<ClientRegistry>>,
    sink: Arc<dyn FrameSink>,
    directory: Arc<dyn SessionDirectory>,
    events: mpsc::UnboundedSender<BridgeEvent>,
}

impl ClientMetaProcessor {
    /// New processor over a shared registry.
    #[must_use]
    pub fn new(
        registry: Arc<Mutex<ClientRegistry>>,
        sink: Arc<dyn FrameSink>,
        directory: Arc<dyn SessionDirectory>,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> Self {
        Self { registry, sink, directory, events }
    }

    /// Push the current client list to every active session and notify the
    /// embedding application.
    fn broadcast_list(&self) -> Result<(), BridgeError> {
        let list = self.registry.lock().list();
        let _ = self.events.send(BridgeEvent::ClientListChanged(list.clone()));

        let frame = Message::new(Payload::ClientListUpdate(list)).to_frame()?;
        for target in self.directory.broadcast_targets() {
            if !self.sink.try_send(&target, frame.clone()) {
                tracing::debug!(%target, "client-list update refused by writer");
            }
        }
        Ok(())
    }

    /// Drop a disconnected session's metadata; broadcasts if anything was
    /// registered. Called by the connection manager on session close.
    pub fn handle_disconnect(&self, session: &SessionId) {
        let removed = self.registry.lock().remove(session).is_some();
        if removed {
            if let Err(err) = self.broadcast_list() {
                tracing::warn!(error = %err, "failed to broadcast client list after disconnect");
            }
        }
    }
}

#[async_trait]
impl DomainProcessor for ClientMetaProcessor {
    fn domain(&self) -> Domain {
        Domain::ClientMeta
    }

    async fn process(
        &self,
        message: Message,
        session: &SessionId,
    ) -> Result<Option<Message>, BridgeError> {
        match &message.payload {
            Payload::ClientRegister(registration) => {
                self.registry.lock().register(session, registration.clone());
                self.broadcast_list()?;
                Ok(Some(message.reply(Payload::Ack)))
            },

            Payload::ClientMetadataUpdate(registration) => {
                if !self.registry.lock().update(session, registration.clone()) {
                    return Ok(Some(Message::error(
                        ErrorCode::InvalidMessage,
                        "client must register before updating metadata",
                        message.request_id,
                    )));
                }
                self.broadcast_list()?;
                Ok(Some(message.reply(Payload::Ack)))
            },

            Payload::ClientActionRegister(action) => {
                if !self.registry.lock().add_action(session, action.clone()) {
                    return Ok(Some(Message::error(
                        ErrorCode::InvalidMessage,
                        "client must register before exposing actions",
                        message.request_id,
                    )));
                }
                self.broadcast_list()?;
                Ok(Some(message.reply(Payload::Ack)))
            },

            Payload::ClientActionTrigger(trigger) => {
                let target = SessionId::from(trigger.target.as_str());

                if !self.registry.lock().has_action(&target, &trigger.action_id) {
                    return Ok(Some(Message::error(
                        ErrorCode::InvalidMessage,
                        format!(
                            "target {} has not registered action '{}'",
                            trigger.target, trigger.action_id
                        ),
                        message.request_id,
                    )));
                }

                // Forward a fresh, uncorrelated trigger to the owner; the
                // sender gets an ack on its own request id.
                let forward =
                    Message::new(Payload::ClientActionTrigger(trigger.clone())).to_frame()?;
                if !self.sink.try_send(&target, forward) {
                    return Ok(Some(Message::error(
                        ErrorCode::InvalidMessage,
                        format!("target {} is not reachable", trigger.target),
                        message.request_id,
                    )));
                }

                Ok(Some(message.reply(Payload::Ack)))
            },

            Payload::ClientActionResult(_) => {
                // Fan the outcome out to everyone but the reporter.
                let frame = message.to_frame()?;
                for target in self.directory.broadcast_targets() {
                    if &target != session {
                        let _ = self.sink.try_send(&target, frame.clone());
                    }
                }
                Ok(None)
            },

            _ => Ok(Some(Message::error(
                ErrorCode::InvalidMessage,
                "unsupported client-metadata operation",
                message.request_id,
            ))),
        }
    }
}
