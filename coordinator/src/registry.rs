//! Live connection registry.
//!
//! Each accepted WebSocket gets a `ConnectionId` and an outbound
//! channel; the socket task owns the sink and drains the channel. The
//! registry only knows about connections — participants are owned by
//! the session's `ParticipantStore`, which refers to connections by id.

use std::collections::HashMap;

use axum::extract::ws::Message;
use tokio::sync::mpsc::UnboundedSender;

/// Identifier for one live WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, UnboundedSender<Message>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn register(&mut self, id: ConnectionId, sender: UnboundedSender<Message>) {
        self.connections.insert(id, sender);
    }

    pub fn unregister(&mut self, id: &ConnectionId) {
        self.connections.remove(id);
    }

    /// Queue a text frame for one connection. Returns false when the
    /// connection is gone; the caller keeps going either way.
    pub fn send(&self, id: &ConnectionId, text: String) -> bool {
        match self.connections.get(id) {
            Some(sender) => sender.send(Message::Text(text.into())).is_ok(),
            None => false,
        }
    }

    /// Queue a text frame for every live connection.
    pub fn broadcast(&self, text: &str) {
        for (id, sender) in &self.connections {
            if sender.send(Message::Text(text.to_string().into())).is_err() {
                tracing::debug!(connection = %id, "broadcast to closed connection skipped");
            }
        }
    }
}
