//! Client-metadata and action protocol payloads.
//!
//! Clients may self-declare a name, a role, capabilities, and a set of
//! invocable actions. Other clients trigger those actions through the
//! bridge, which forwards the trigger to the owning session.

use serde::{Deserialize, Serialize};

/// Role tag a client declares on registration. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    /// Primary user-interface window
    Main,
    /// Recording-control surface
    Recording,
    /// Read-only monitor
    Monitor,
    /// Anything else
    Custom,
}

/// One invocable action a client exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    /// Action identifier, unique per client
    pub id: String,
    /// Human-readable label
    pub label: String,
}

/// Metadata a client declares about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRegistration {
    /// Human-readable client name
    pub name: String,
    /// Role tag
    pub role: ClientRole,
    /// Declared capabilities
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Invoke an action exposed by another client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTrigger {
    /// Session id of the client that owns the action
    pub target: String,
    /// Action to invoke
    pub action_id: String,
    /// Free-form arguments forwarded verbatim
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub args: Option<serde_json::Value>,
}

/// Outcome of an action invocation, sent back by the owning client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    /// Action that was invoked
    pub action_id: String,
    /// Whether the action succeeded
    pub success: bool,
    /// Optional outcome description
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

/// One entry in the broadcast client list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEntry {
    /// Session id of the client
    pub session_id: String,
    /// Declared name
    pub name: String,
    /// Declared role
    pub role: ClientRole,
    /// Declared capabilities
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Actions the client exposes
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

/// Updated client list, broadcast after any metadata mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientList {
    /// All currently registered clients
    pub clients: Vec<ClientEntry>,
}
