//! Demo feedback: decision tallies per group.
//!
//! Shows the full plugin contract without any lab-specific scoring:
//! the participant sees their previous decision, how the last
//! completed round split per option inside their own group, and a
//! cumulative option tally. The closing invocation summarizes the
//! whole history instead of prompting for the next round.

use std::collections::BTreeMap;

use shared_types::Info;

use crate::session::log::RoundLog;

use super::{Feedback, ProcessContext, ScoringAlgorithm};

pub struct DemoAlgorithm;

impl DemoAlgorithm {
    /// Option -> submission count within one group for one round.
    fn group_tally(round: &RoundLog, group: &str) -> BTreeMap<String, usize> {
        let mut tally = BTreeMap::new();
        for record in round.values() {
            if record.group == group {
                *tally.entry(record.decision.clone()).or_insert(0) += 1;
            }
        }
        tally
    }

    fn format_tally(tally: &BTreeMap<String, usize>) -> String {
        if tally.is_empty() {
            return "no submissions".to_string();
        }
        tally
            .iter()
            .map(|(option, count)| format!("{option} x{count}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl ScoringAlgorithm for DemoAlgorithm {
    fn name(&self) -> &'static str {
        "demo"
    }

    fn process(&self, ctx: &ProcessContext<'_>) -> anyhow::Result<Feedback> {
        let mut infos = Vec::new();

        // The participant's most recent recorded decision, if any.
        let last_own = ctx
            .log
            .rounds()
            .iter()
            .rev()
            .find_map(|round| round.decisions.get(ctx.participant));
        if let Some(record) = last_own {
            infos.push(Info::new("Your last decision", &record.decision));
        }

        if let Some(previous) = ctx.log.rounds().last() {
            let tally = Self::group_tally(&previous.decisions, &ctx.role.group);
            infos.push(Info::new(
                format!("Group {} last round", ctx.role.group),
                Self::format_tally(&tally),
            ));
        }

        // Cumulative option tally for the participant's group.
        let mut cumulative = BTreeMap::new();
        for completed in ctx.log.rounds() {
            for record in completed.decisions.values() {
                if record.group == ctx.role.group {
                    *cumulative.entry(record.decision.clone()).or_insert(0) += 1;
                }
            }
        }
        if !cumulative.is_empty() {
            infos.push(Info::new(
                format!("Group {} overall", ctx.role.group),
                Self::format_tally(&cumulative),
            ));
        }

        if ctx.is_last_round {
            infos.push(Info::new(
                "Rounds completed",
                ctx.log.len().to_string(),
            ));
        } else if !ctx.hint.is_empty() {
            infos.push(Info::new("Hint", ctx.hint));
        }

        Ok(Feedback {
            infos,
            images: Vec::new(),
        })
    }
}
