//! Selection mechanisms
//!
//! A mechanism sees the filtered candidates of a turn and picks one. The
//! orchestrator calls `prepare` once per turn, then `select_best` until the
//! chosen candidate survives timing negotiation, then `commit`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sharespace_core::{CandidateTransition, LocalMove};
use tracing::trace;

use crate::{ChoreographySelection, FairnessHistory, MaximumAverageSelection, RotatingDictatorSelection};

pub trait SelectionMechanism: Send {
    fn name(&self) -> &'static str;

    fn add_participant(&mut self);

    fn remove_participant(&mut self, participant: usize);

    /// Relative weight of each participant, by participant number
    fn set_priorities(&mut self, priorities: &[f64]);

    /// Compute per-slot normalized values for this turn
    fn prepare(&mut self, candidates: &mut [CandidateTransition]) {
        normalize(candidates);
    }

    /// Index of the winning candidate
    fn select_best(&mut self, candidates: &[CandidateTransition]) -> Option<usize>;

    /// Record the realized outcome of the selected candidate
    fn commit(&mut self, selected: &CandidateTransition);

    fn reset(&mut self);

    /// Whether scores depend on negotiated time quality
    fn uses_time_quality(&self) -> bool {
        false
    }
}

/// Divide every slot's desirability by the maximum desirability that
/// participant expressed across all candidates. Participants whose maximum
/// is not positive keep a normalized value of zero.
pub fn normalize(candidates: &mut [CandidateTransition]) {
    let participants = candidates.iter().map(|c| c.votes.len()).max().unwrap_or(0);
    for p in 0..participants {
        let max = candidates
            .iter()
            .filter_map(|c| c.votes.get(p)?.as_ref())
            .map(|v| v.desirability)
            .fold(f64::NEG_INFINITY, f64::max);
        for vote in candidates.iter_mut().filter_map(|c| c.votes.get_mut(p)?.as_mut()) {
            vote.normalized = if max > 0.0 { vote.desirability / max } else { 0.0 };
        }
    }
}

/// Which mechanism the orchestrator is built with
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionStrategy {
    #[default]
    Fairness,
    MaximumAverage,
    Choreography,
    RotatingDictator,
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectionStrategy::Fairness => "fairness",
            SelectionStrategy::MaximumAverage => "maximum-average",
            SelectionStrategy::Choreography => "choreography",
            SelectionStrategy::RotatingDictator => "rotating-dictator",
        };
        f.write_str(name)
    }
}

impl FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fairness" => Ok(SelectionStrategy::Fairness),
            "maximum-average" | "max-average" => Ok(SelectionStrategy::MaximumAverage),
            "choreography" => Ok(SelectionStrategy::Choreography),
            "rotating-dictator" | "dictator" => Ok(SelectionStrategy::RotatingDictator),
            other => Err(format!("unknown selection strategy: {other}")),
        }
    }
}

/// Fairness selection configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FairnessConfig {
    /// Length of each participant's rolling window
    pub history_len: usize,
    /// Value every window is seeded with
    pub seed_value: f64,
    /// Multiply values by the candidate's time quality
    pub use_time_quality: bool,
    /// Factor for participants that only grow back after a focus
    pub undefocus_factor: f64,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        FairnessConfig {
            history_len: 5,
            seed_value: 0.5,
            use_time_quality: false,
            undefocus_factor: 0.5,
        }
    }
}

/// Build the selection mechanism for a strategy
pub fn build_selection(strategy: SelectionStrategy, config: &FairnessConfig) -> Box<dyn SelectionMechanism> {
    match strategy {
        SelectionStrategy::Fairness => Box::new(FairnessSelection::new(config.clone())),
        SelectionStrategy::MaximumAverage => Box::new(MaximumAverageSelection::default()),
        SelectionStrategy::Choreography => Box::new(ChoreographySelection::default()),
        SelectionStrategy::RotatingDictator => Box::new(RotatingDictatorSelection::default()),
    }
}

/// Picks the candidate that keeps everyone's long-run satisfaction high
/// and close together.
///
/// Each candidate is scored by pushing its expected values into the rolling
/// history and evaluating `avg² + 1.3·(1 - std)² + avg·(1 - std)` over the
/// priority-weighted rolling averages.
#[derive(Clone, Debug)]
pub struct FairnessSelection {
    config: FairnessConfig,
    history: FairnessHistory,
    priorities: Vec<f64>,
}

impl FairnessSelection {
    pub fn new(config: FairnessConfig) -> Self {
        let history = FairnessHistory::new(config.history_len, config.seed_value);
        FairnessSelection { config, history, priorities: Vec::new() }
    }

    pub fn history(&self) -> &FairnessHistory {
        &self.history
    }

    /// Value a participant realizes if the candidate is executed
    pub fn participant_value(&self, candidate: &CandidateTransition, participant: usize) -> f64 {
        let Some(Some(vote)) = candidate.votes.get(participant) else {
            return 0.0;
        };
        let mut value = vote.normalized;
        if self.config.use_time_quality {
            value *= candidate.time_quality;
        }
        if vote.local_transition == LocalMove::Undefocus {
            value *= self.config.undefocus_factor;
        }
        value
    }

    fn expected_values(&self, candidate: &CandidateTransition) -> Vec<f64> {
        (0..candidate.votes.len()).map(|p| self.participant_value(candidate, p)).collect()
    }

    /// Score of a candidate against the current history
    pub fn score(&mut self, candidate: &CandidateTransition) -> f64 {
        let values = self.expected_values(candidate);
        self.history.push_trial(&values);
        let (avg, std) = self.history.weighted_spread(&self.priorities);
        self.history.undo_trial();
        avg * avg + 1.3 * (1.0 - std) * (1.0 - std) + avg * (1.0 - std)
    }
}

impl Default for FairnessSelection {
    fn default() -> Self {
        FairnessSelection::new(FairnessConfig::default())
    }
}

impl SelectionMechanism for FairnessSelection {
    fn name(&self) -> &'static str {
        "fairness"
    }

    fn add_participant(&mut self) {
        self.history.add_participant();
        self.priorities.push(1.0);
    }

    fn remove_participant(&mut self, participant: usize) {
        self.history.remove_participant(participant);
        if participant < self.priorities.len() {
            self.priorities.remove(participant);
        }
    }

    fn set_priorities(&mut self, priorities: &[f64]) {
        self.priorities = priorities.to_vec();
    }

    fn select_best(&mut self, candidates: &[CandidateTransition]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, candidate) in candidates.iter().enumerate() {
            if !candidate.is_complete() {
                continue;
            }
            let score = self.score(candidate);
            trace!(transition = %candidate.transition, score, "fairness score");
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }
        best.map(|(i, _)| i)
    }

    fn commit(&mut self, selected: &CandidateTransition) {
        let values = self.expected_values(selected);
        self.history.push(&values);
    }

    fn reset(&mut self) {
        self.history.reset();
    }

    fn uses_time_quality(&self) -> bool {
        self.config.use_time_quality
    }
}
