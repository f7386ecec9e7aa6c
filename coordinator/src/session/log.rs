//! Append-only history of completed sub-rounds.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared_types::ParticipantId;

/// One submitted decision together with the submitter's placement.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DecisionRecord {
    pub group: String,
    pub role: String,
    pub decision: String,
}

/// All decisions of one completed sub-round, keyed by participant.
pub type RoundLog = BTreeMap<ParticipantId, DecisionRecord>;

/// One completed sub-round with the instant the barrier released it.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedRound {
    pub completed_at: DateTime<Utc>,
    pub decisions: RoundLog,
}

/// Ordered history of completed rounds, flattened across main-round
/// boundaries. Rounds can only be appended; nothing public mutates an
/// entry once it is in.
#[derive(Debug, Default)]
pub struct DecisionLog {
    rounds: Vec<CompletedRound>,
}

impl DecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, decisions: RoundLog) {
        self.rounds.push(CompletedRound {
            completed_at: Utc::now(),
            decisions,
        });
    }

    /// Number of fully completed sub-rounds so far.
    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn rounds(&self) -> &[CompletedRound] {
        &self.rounds
    }

    pub fn get(&self, round: usize) -> Option<&RoundLog> {
        self.rounds.get(round).map(|r| &r.decisions)
    }

    /// Serialize the whole history as JSON Lines, one completed round
    /// per line.
    pub fn to_jsonl(&self) -> String {
        let mut out = String::new();
        for (round, completed) in self.rounds.iter().enumerate() {
            let line = serde_json::json!({
                "round": round,
                "completed_at": completed.completed_at.to_rfc3339(),
                "decisions": completed.decisions,
            });
            out.push_str(&line.to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(decision: &str) -> DecisionRecord {
        DecisionRecord {
            group: "A".into(),
            role: "player".into(),
            decision: decision.into(),
        }
    }

    #[test]
    fn length_tracks_completed_rounds() {
        let mut log = DecisionLog::new();
        assert!(log.is_empty());

        for k in 1..=3 {
            let mut round = RoundLog::new();
            round.insert(ParticipantId(format!("p{k}")), record("x"));
            log.append(round);
            assert_eq!(log.len(), k);
        }
        assert_eq!(log.get(1).unwrap().len(), 1);
        assert!(log.get(3).is_none());
    }

    #[test]
    fn jsonl_has_one_line_per_round() {
        let mut log = DecisionLog::new();
        let mut round = RoundLog::new();
        round.insert(ParticipantId("p1".into()), record("go"));
        log.append(round.clone());
        log.append(round);

        let out = log.to_jsonl();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["round"], 0);
        assert_eq!(first["decisions"]["p1"]["decision"], "go");
    }
}
