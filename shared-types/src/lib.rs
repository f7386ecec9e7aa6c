//! Wire protocol shared between the coordinator and its clients.
//!
//! Every frame on the experiment WebSocket is one JSON object with a
//! `cmd` tag and a `data` payload. Serializable with serde for JSON
//! over WebSocket.

use serde::{Deserialize, Serialize};

// ============================================================================
// Core Types
// ============================================================================

/// Opaque, stable identifier for one experiment participant.
///
/// Generated server-side on first connect and echoed back by the
/// client on every subsequent message, including reconnects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Client -> Server
// ============================================================================

/// Frames a client may send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "cmd", content = "data")]
pub enum ClientMessage {
    /// Join (or rejoin) the experiment. The payload is the participant
    /// id from a previous `ServerMessage::Connect`, or empty on the
    /// very first connect.
    #[serde(rename = "CONNECT")]
    Connect(String),

    /// Submit the decision for the current sub-round.
    #[serde(rename = "SUBMIT_DECISION")]
    SubmitDecision(DecisionMessage),
}

/// A single decision submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionMessage {
    #[serde(rename = "participantId")]
    pub participant_id: ParticipantId,
    pub decision: String,
}

// ============================================================================
// Server -> Client
// ============================================================================

/// Frames the coordinator sends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "cmd", content = "data")]
pub enum ServerMessage {
    /// Acknowledges a first connect with the assigned participant id.
    #[serde(rename = "CONNECT")]
    Connect(ParticipantId),

    /// Replaces the client's experiment screen.
    #[serde(rename = "UPDATE_EXPERIMENT_INFO")]
    UpdateExperimentInfo(ExperimentInfo),
}

/// One label/value row on the experiment screen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Info {
    pub label: String,
    pub value: String,
}

impl Info {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Lifecycle of the experiment as seen by one client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentStatus {
    /// A round is open and this client may act on it.
    Running,
    /// Waiting: either on other participants to join, or on other
    /// required participants to submit.
    Pending,
    /// The experiment is over; no further rounds will be presented.
    End,
}

/// Full screen content for one participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentInfo {
    pub infos: Vec<Info>,
    pub images: Vec<String>,
    pub options: Vec<String>,
    pub status: ExperimentStatus,
}

impl ExperimentInfo {
    /// "Submitted / waiting on others" screen: no content, no options.
    pub fn pending() -> Self {
        Self {
            infos: Vec::new(),
            images: Vec::new(),
            options: Vec::new(),
            status: ExperimentStatus::Pending,
        }
    }

    /// Terminal screen after the last round has completed.
    pub fn end() -> Self {
        Self {
            infos: Vec::new(),
            images: Vec::new(),
            options: Vec::new(),
            status: ExperimentStatus::End,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_frame_round_trips_with_cmd_tag() {
        let json = r#"{"cmd":"CONNECT","data":""}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg, ClientMessage::Connect(String::new()));
        assert_eq!(serde_json::to_string(&msg).unwrap(), json);
    }

    #[test]
    fn submit_frame_uses_camel_case_participant_id() {
        let json = r#"{"cmd":"SUBMIT_DECISION","data":{"participantId":"p-1","decision":"go"}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        let ClientMessage::SubmitDecision(decision) = msg else {
            panic!("expected SUBMIT_DECISION");
        };
        assert_eq!(decision.participant_id, ParticipantId("p-1".into()));
        assert_eq!(decision.decision, "go");
    }

    #[test]
    fn status_serializes_screaming_snake_case() {
        let info = ExperimentInfo::end();
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["status"], "END");
        assert!(json["infos"].as_array().unwrap().is_empty());
        assert!(json["options"].as_array().unwrap().is_empty());
    }
}
