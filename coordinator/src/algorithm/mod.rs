//! Pluggable scoring/feedback algorithms.
//!
//! The coordinator is generic over what happens *between* rounds: an
//! algorithm turns the accumulated decision history into per-participant
//! feedback rows and image references. Implementations are pure with
//! respect to coordinator state — they get read-only views and must
//! never block a round on their own failure.
//!
//! Algorithms are selected by a config key through [`build`]; there is
//! no dynamic loading.

use std::collections::HashMap;

use shared_types::{Info, ParticipantId};

use crate::session::log::DecisionLog;
use crate::session::roles::RoleKey;

pub mod demo;

/// Per-participant output of one algorithm invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feedback {
    /// Rows appended after the coordinator's own round-header rows.
    pub infos: Vec<Info>,
    /// Image names, resolved by the coordinator to /images URLs.
    pub images: Vec<String>,
}

/// Read-only view handed to an algorithm for one participant of the
/// round about to be presented.
pub struct ProcessContext<'a> {
    pub participant: &'a ParticipantId,
    /// The participant's own placement.
    pub role: &'a RoleKey,
    /// Full participant-role directory, for group aggregates.
    pub directory: &'a HashMap<ParticipantId, RoleKey>,
    pub log: &'a DecisionLog,
    pub main_round: usize,
    pub sub_round: usize,
    /// Sub-round count of the current main round's expanded timeline.
    pub sub_round_total: usize,
    /// The sub-round's configured display hint.
    pub hint: &'a str,
    /// True only for the closing invocation after the final round
    /// completed; the feedback is a summary, not a prompt.
    pub is_last_round: bool,
}

pub trait ScoringAlgorithm: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compute feedback for one participant. Errors are logged by the
    /// caller and degrade to an empty payload for that participant
    /// only.
    fn process(&self, ctx: &ProcessContext<'_>) -> anyhow::Result<Feedback>;
}

/// No feedback beyond the coordinator's round headers.
pub struct NoopAlgorithm;

impl ScoringAlgorithm for NoopAlgorithm {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn process(&self, _ctx: &ProcessContext<'_>) -> anyhow::Result<Feedback> {
        Ok(Feedback::default())
    }
}

/// Map a config key to a concrete algorithm. Unknown keys are a fatal
/// startup error for the caller.
pub fn build(key: &str) -> Option<Box<dyn ScoringAlgorithm>> {
    match key {
        "noop" => Some(Box::new(NoopAlgorithm)),
        "demo" => Some(Box::new(demo::DemoAlgorithm)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_knows_its_algorithms() {
        assert_eq!(build("noop").unwrap().name(), "noop");
        assert_eq!(build("demo").unwrap().name(), "demo");
        assert!(build("does-not-exist").is_none());
    }
}
