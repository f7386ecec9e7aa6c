//! Round timeline: main rounds expanded by `repeat`, sub-rounds of the
//! current main round expanded lazily on entry.

use std::sync::Arc;

use crate::config::{ExperimentConfig, SubRoundConfig};

/// Result of a round transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Continue,
    ExperimentComplete,
}

/// Walks the main-round x sub-round grid. The main-round order is
/// expanded up front (it is just indices); the sub-round order is
/// recomputed each time a new main round is entered, so only one main
/// round's expansion is held at a time.
#[derive(Debug)]
pub struct RoundScheduler {
    config: Arc<ExperimentConfig>,
    /// Repeat-expanded indices into `config.main_rounds`.
    main_order: Vec<usize>,
    /// Repeat-expanded indices into the current main round's sub_rounds.
    sub_order: Vec<usize>,
    main_round: usize,
    sub_round: usize,
    complete: bool,
}

impl RoundScheduler {
    pub fn new(config: Arc<ExperimentConfig>) -> Self {
        let main_order = config
            .main_rounds
            .iter()
            .enumerate()
            .flat_map(|(i, m)| std::iter::repeat(i).take(m.repeat as usize))
            .collect();
        let mut scheduler = Self {
            config,
            main_order,
            sub_order: Vec::new(),
            main_round: 0,
            sub_round: 0,
            complete: false,
        };
        scheduler.refresh_sub_order();
        scheduler
    }

    fn refresh_sub_order(&mut self) {
        let main = &self.config.main_rounds[self.main_order[self.main_round]];
        self.sub_order = main
            .sub_rounds
            .iter()
            .enumerate()
            .flat_map(|(i, s)| std::iter::repeat(i).take(s.repeat as usize))
            .collect();
    }

    pub fn main_round(&self) -> usize {
        self.main_round
    }

    pub fn sub_round(&self) -> usize {
        self.sub_round
    }

    pub fn main_round_total(&self) -> usize {
        self.main_order.len()
    }

    /// Length of the current main round's expanded sub-round timeline.
    pub fn sub_round_total(&self) -> usize {
        self.sub_order.len()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn current_sub_round(&self) -> &SubRoundConfig {
        let main = &self.config.main_rounds[self.main_order[self.main_round]];
        &main.sub_rounds[self.sub_order[self.sub_round]]
    }

    /// Move to the next sub-round, rolling over into the next main
    /// round when the current one is exhausted. Once the timeline is
    /// exhausted the scheduler stays on the last valid indices and
    /// every further call returns `ExperimentComplete`.
    pub fn advance(&mut self) -> Advance {
        if self.complete {
            return Advance::ExperimentComplete;
        }

        self.sub_round += 1;
        if self.sub_round >= self.sub_order.len() {
            if self.main_round + 1 >= self.main_order.len() {
                // Roll back so the indices keep pointing at the last
                // valid round.
                self.sub_round -= 1;
                self.complete = true;
                return Advance::ExperimentComplete;
            }
            self.sub_round = 0;
            self.main_round += 1;
            self.refresh_sub_order();
        }
        Advance::Continue
    }
}
