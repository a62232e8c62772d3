//! Votes and candidate transitions

use serde::{Deserialize, Serialize};

use crate::{LocalMove, SystemTransition, TimeCondition, Value};

/// One participant's proposal for one local move
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantVote {
    pub local_transition: LocalMove,
    pub desirability: f64,
    #[serde(default)]
    pub planning_times_ms: Vec<f64>,
    #[serde(default)]
    pub execution_times_ms: Vec<f64>,
    #[serde(default)]
    pub timing_conditions: Vec<TimeCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_function: Option<Value>,
    #[serde(default)]
    pub required: bool,
    /// Seconds since the orchestrator epoch at which the vote was received
    #[serde(skip)]
    pub arrival_seconds: f64,
    /// Desirability normalized by the participant's own maximum
    #[serde(skip)]
    pub normalized: f64,
}

impl ParticipantVote {
    pub fn new(local_transition: LocalMove, desirability: f64) -> Self {
        ParticipantVote {
            local_transition,
            desirability,
            planning_times_ms: Vec::new(),
            execution_times_ms: Vec::new(),
            timing_conditions: Vec::new(),
            value_function: None,
            required: false,
            arrival_seconds: 0.0,
            normalized: 0.0,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_condition(mut self, condition: TimeCondition) -> Self {
        self.timing_conditions.push(condition);
        self
    }

    pub fn with_value_function(mut self, value: Value) -> Self {
        self.value_function = Some(value);
        self
    }

    /// Add one discrete (planning, execution) option
    pub fn with_option(mut self, planning_ms: f64, execution_ms: f64) -> Self {
        self.planning_times_ms.push(planning_ms);
        self.execution_times_ms.push(execution_ms);
        self
    }

    /// Discrete timing options as (planning, execution) pairs
    pub fn timing_options(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.planning_times_ms.iter().copied().zip(self.execution_times_ms.iter().copied())
    }
}

/// One system transition under consideration for the current turn
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateTransition {
    pub transition: SystemTransition,
    /// One slot per active participant, by participant number
    pub votes: Vec<Option<ParticipantVote>>,
    /// OR of the required flags of all filled slots
    pub required: bool,
    /// Whether the vote in each slot actively drives the transition
    pub actors: Vec<bool>,
    pub planning_ms: f64,
    pub execution_ms: f64,
    /// Timing agreement in [0.25, 1]
    pub time_quality: f64,
}

impl CandidateTransition {
    pub fn new(transition: SystemTransition, participants: usize) -> Self {
        CandidateTransition {
            transition,
            votes: vec![None; participants],
            required: false,
            actors: vec![false; participants],
            planning_ms: 0.0,
            execution_ms: 0.0,
            time_quality: 1.0,
        }
    }

    /// Fill a slot. A slot keeps its first vote unless an actor vote
    /// arrives for a slot filled by a supporter.
    pub fn add_vote(&mut self, participant: usize, vote: &ParticipantVote, actor: bool) -> bool {
        let Some(slot) = self.votes.get_mut(participant) else {
            return false;
        };
        let replace = slot.is_none() || (actor && !self.actors[participant]);
        if replace {
            *slot = Some(vote.clone());
            self.actors[participant] = actor;
            self.required = self.votes.iter().flatten().any(|v| v.required);
        }
        replace
    }

    /// Number of slots whose vote actively drives the transition
    pub fn num_actors(&self) -> usize {
        self.actors.iter().filter(|a| **a).count()
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.votes.iter().all(Option::is_some)
    }

    pub fn filled(&self) -> impl Iterator<Item = (usize, &ParticipantVote)> {
        self.votes.iter().enumerate().filter_map(|(i, v)| v.as_ref().map(|v| (i, v)))
    }

    /// Local moves of every slot, `Stay` for empty ones
    pub fn local_moves(&self) -> Vec<LocalMove> {
        self.votes
            .iter()
            .map(|v| v.as_ref().map_or(LocalMove::Stay, |v| v.local_transition))
            .collect()
    }

    pub fn local_move(&self, participant: usize) -> Option<LocalMove> {
        self.votes.get(participant)?.as_ref().map(|v| v.local_transition)
    }
}
