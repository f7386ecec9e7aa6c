//! Per-participant session records.

use std::collections::HashMap;

use shared_types::ParticipantId;

use crate::registry::ConnectionId;
use crate::session::roles::RoleKey;

/// One registered participant. Created on first accepted connect and
/// kept for the whole session; only the connection handle and the
/// cached payload change afterwards.
#[derive(Debug)]
pub struct Participant {
    pub id: ParticipantId,
    pub role: RoleKey,
    /// Current live connection, `None` while disconnected.
    pub connection: Option<ConnectionId>,
    /// Exact last frame sent to this participant, replayed verbatim on
    /// reconnect.
    pub last_payload: Option<String>,
}

/// Owns every `Participant`. The connection registry only ever refers
/// to connections, never to these records.
#[derive(Debug, Default)]
pub struct ParticipantStore {
    by_id: HashMap<ParticipantId, Participant>,
}

impl ParticipantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn insert(&mut self, participant: Participant) {
        self.by_id.insert(participant.id.clone(), participant);
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&Participant> {
        self.by_id.get(id)
    }

    pub fn get_mut(&mut self, id: &ParticipantId) -> Option<&mut Participant> {
        self.by_id.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.by_id.values()
    }

    /// Reattach a live connection after a reconnect.
    pub fn attach(&mut self, id: &ParticipantId, connection: ConnectionId) {
        if let Some(participant) = self.by_id.get_mut(id) {
            participant.connection = Some(connection);
        }
    }

    /// Clear whichever participant currently holds this connection.
    /// Returns the detached participant's id, if any.
    pub fn detach_connection(&mut self, connection: &ConnectionId) -> Option<ParticipantId> {
        for participant in self.by_id.values_mut() {
            if participant.connection.as_ref() == Some(connection) {
                participant.connection = None;
                return Some(participant.id.clone());
            }
        }
        None
    }

    /// Read-only id -> role directory handed to scoring algorithms so
    /// they can compute group aggregates.
    pub fn directory(&self) -> HashMap<ParticipantId, RoleKey> {
        self.by_id
            .iter()
            .map(|(id, p)| (id.clone(), p.role.clone()))
            .collect()
    }
}
