//! Submission barrier: who must decide in the current sub-round, and
//! when the round is allowed to close.

use std::collections::BTreeSet;

use shared_types::ParticipantId;

use crate::config::{DecisionConfig, MakerConfig};
use crate::session::log::{DecisionRecord, RoundLog};
use crate::session::participants::ParticipantStore;
use crate::session::roles::RoleKey;

/// Filter along one axis (group names or role names).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisFilter {
    Any,
    OneOf(BTreeSet<String>),
}

impl AxisFilter {
    fn from_config(names: &Option<Vec<String>>) -> Self {
        match names {
            None => Self::Any,
            Some(names) => Self::OneOf(names.iter().cloned().collect()),
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Any => true,
            Self::OneOf(names) => names.contains(name),
        }
    }
}

/// A maker entry resolved into explicit per-axis filters. A
/// participant must decide when any maker matches both axes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakerFilter {
    pub groups: AxisFilter,
    pub roles: AxisFilter,
}

impl MakerFilter {
    pub fn from_config(maker: &MakerConfig) -> Self {
        Self {
            groups: AxisFilter::from_config(&maker.groups),
            roles: AxisFilter::from_config(&maker.roles),
        }
    }

    pub fn matches(&self, key: &RoleKey) -> bool {
        self.groups.matches(&key.group) && self.roles.matches(&key.role)
    }
}

/// Resolve the set of participants that must submit for this decision:
/// the union over makers of matching participants, or everyone when no
/// makers are configured.
pub fn required_set(
    decision: &DecisionConfig,
    participants: &ParticipantStore,
) -> BTreeSet<ParticipantId> {
    match &decision.makers {
        None => participants.iter().map(|p| p.id.clone()).collect(),
        Some(makers) => {
            let filters: Vec<MakerFilter> = makers.iter().map(MakerFilter::from_config).collect();
            participants
                .iter()
                .filter(|p| filters.iter().any(|f| f.matches(&p.role)))
                .map(|p| p.id.clone())
                .collect()
        }
    }
}

/// Outcome of recording one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The submitter is not required this sub-round; nothing stored.
    NotRequired,
    /// Stored; still waiting on other required participants.
    Pending,
    /// Every required participant has now submitted.
    RoundComplete,
}

/// Holds one sub-round open until the pending submissions exactly
/// cover the required set. Resubmissions before release overwrite
/// (last write wins); submissions from outside the required set are
/// dropped.
#[derive(Debug)]
pub struct SubmissionBarrier {
    required: BTreeSet<ParticipantId>,
    pending: RoundLog,
}

impl SubmissionBarrier {
    pub fn new(required: BTreeSet<ParticipantId>) -> Self {
        Self {
            required,
            pending: RoundLog::new(),
        }
    }

    pub fn required(&self) -> &BTreeSet<ParticipantId> {
        &self.required
    }

    pub fn is_required(&self, id: &ParticipantId) -> bool {
        self.required.contains(id)
    }

    pub fn record(&mut self, id: ParticipantId, record: DecisionRecord) -> Submission {
        if !self.required.contains(&id) {
            return Submission::NotRequired;
        }
        self.pending.insert(id, record);
        // Keys are a subset of `required`, so equal cardinality means
        // equal membership.
        if self.pending.len() == self.required.len() {
            Submission::RoundComplete
        } else {
            Submission::Pending
        }
    }

    /// Drain the pending submissions for appending to the decision
    /// log. Only meaningful right after `RoundComplete`.
    pub fn take_round(&mut self) -> RoundLog {
        std::mem::take(&mut self.pending)
    }
}
