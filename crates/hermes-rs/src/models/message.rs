//! Wire envelope exchanged between hub clients, SSE subscribers, and peer
//! nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a [`HubMessage`] should be routed, derived from its addressing fields.
///
/// A non-empty `to` always wins; a non-empty `ticket_id` without a recipient
/// selects ticket-group dispatch; with neither, the message is a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchMode {
    /// Deliver to every connection of a single user.
    ToUser(String),
    /// Deliver to every client attached to a ticket.
    ToTicket(String),
    /// Deliver to every client and SSE subscriber.
    Broadcast,
}

/// Message envelope carried over WebSocket frames, SSE `data:` lines, and the
/// cluster bus.
///
/// `node_id` is stamped by the hub before a message leaves the node; peers
/// use it to skip envelopes they published themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubMessage {
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Stamped by the sender; inbound frames without one get receive time.
    #[serde(default = "Utc::now")]
    pub create_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_id: String,
}

fn default_kind() -> String {
    "text".to_string()
}

impl HubMessage {
    /// Creates a broadcast-addressed message; callers narrow the addressing
    /// via [`to_user`](Self::to_user) / [`to_ticket`](Self::to_ticket).
    pub fn new(kind: impl Into<String>, from: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            from: from.into(),
            to: None,
            ticket_id: None,
            content: content.into(),
            data: None,
            create_at: Utc::now(),
            priority: None,
            correlation_id: None,
            node_id: String::new(),
        }
    }

    pub fn to_user(mut self, user_id: impl Into<String>) -> Self {
        self.to = Some(user_id.into());
        self
    }

    pub fn to_ticket(mut self, ticket_id: impl Into<String>) -> Self {
        self.ticket_id = Some(ticket_id.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Routing mode implied by the addressing fields.
    pub fn dispatch_mode(&self) -> DispatchMode {
        if let Some(to) = self.to.as_deref() {
            if !to.is_empty() {
                return DispatchMode::ToUser(to.to_string());
            }
        }
        if let Some(ticket) = self.ticket_id.as_deref() {
            if !ticket.is_empty() {
                return DispatchMode::ToTicket(ticket.to_string());
            }
        }
        DispatchMode::Broadcast
    }
}
