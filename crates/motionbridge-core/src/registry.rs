//! Client-metadata registry.
//!
//! Tracks what each session has declared about itself: name, role,
//! capabilities, and exposed actions. The registry is the source of truth
//! for the client-list broadcast and for action-trigger target checks.
//! Sessions register explicitly; unregistering a session removes its
//! actions with it.

use std::collections::HashMap;

use motionbridge_proto::payloads::client::{
    ActionSpec, ClientEntry, ClientList, ClientRegistration,
};

use crate::session::SessionId;

/// Registry of self-declared client metadata, keyed by session.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<SessionId, ClientEntry>,
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session's metadata. Re-registering replaces the metadata
    /// but keeps any actions already registered.
    pub fn register(&mut self, session: &SessionId, registration: ClientRegistration) {
        let actions = self
            .clients
            .get(session)
            .map(|entry| entry.actions.clone())
            .unwrap_or_default();

        self.clients.insert(
            session.clone(),
            ClientEntry {
                session_id: session.as_str().to_owned(),
                name: registration.name,
                role: registration.role,
                capabilities: registration.capabilities,
                actions,
            },
        );
    }

    /// Update a registered session's metadata. `false` if unknown.
    pub fn update(&mut self, session: &SessionId, registration: ClientRegistration) -> bool {
        if !self.clients.contains_key(session) {
            return false;
        }
        self.register(session, registration);
        true
    }

    /// Add (or replace, by id) an action a session exposes. `false` if the
    /// session never registered.
    pub fn add_action(&mut self, session: &SessionId, action: ActionSpec) -> bool {
        let Some(entry) = self.clients.get_mut(session) else {
            return false;
        };

        entry.actions.retain(|existing| existing.id != action.id);
        entry.actions.push(action);
        true
    }

    /// Whether a session has registered the given action id.
    #[must_use]
    pub fn has_action(&self, session: &SessionId, action_id: &str) -> bool {
        self.clients
            .get(session)
            .is_some_and(|entry| entry.actions.iter().any(|action| action.id == action_id))
    }

    /// Whether a session has registered metadata.
    #[must_use]
    pub fn contains(&self, session: &SessionId) -> bool {
        self.clients.contains_key(session)
    }

    /// Remove a session's metadata. Returns the entry if it existed.
    pub fn remove(&mut self, session: &SessionId) -> Option<ClientEntry> {
        self.clients.remove(session)
    }

    /// Snapshot of the registry as a broadcastable client list, ordered by
    /// session id so repeated snapshots compare equal.
    #[must_use]
    pub fn list(&self) -> ClientList {
        let mut clients: Vec<ClientEntry> = self.clients.values().cloned().collect();
        clients.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        ClientList { clients }
    }

    /// Registered client count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
