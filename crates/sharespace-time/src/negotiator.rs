//! Timing negotiation interface

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sharespace_core::CandidateTransition;
use sharespace_solver::{BranchAndBound, SolverConfig};

use crate::{BucketConfig, BucketNegotiator, ConditionNegotiator};

/// Reconciles the participants' timing wishes for one candidate.
///
/// A successful `resolve` writes `planning_ms`, `execution_ms` and
/// `time_quality` into the candidate. A failed one leaves it untouched.
pub trait TimingNegotiator: Send {
    fn name(&self) -> &'static str;

    /// Per-participant weights, indexed by participant number
    fn set_priorities(&mut self, priorities: &[f64]);

    fn resolve(&mut self, candidate: &mut CandidateTransition) -> bool;

    /// Resolve every candidate and keep the feasible ones, in order
    fn resolve_all(&mut self, candidates: Vec<CandidateTransition>) -> Vec<CandidateTransition> {
        candidates
            .into_iter()
            .filter_map(|mut candidate| self.resolve(&mut candidate).then_some(candidate))
            .collect()
    }

    fn reset(&mut self) {}
}

/// Which negotiator the orchestrator is built with
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingStrategy {
    #[default]
    Conditions,
    Buckets,
}

impl fmt::Display for TimingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingStrategy::Conditions => f.write_str("conditions"),
            TimingStrategy::Buckets => f.write_str("buckets"),
        }
    }
}

impl FromStr for TimingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conditions" | "condition" | "solver" => Ok(TimingStrategy::Conditions),
            "buckets" | "bucket" => Ok(TimingStrategy::Buckets),
            other => Err(format!("unknown timing strategy: {other}")),
        }
    }
}

/// Build the negotiator for a strategy
pub fn build_negotiator(
    strategy: TimingStrategy,
    solver: &SolverConfig,
    buckets: &BucketConfig,
) -> Box<dyn TimingNegotiator> {
    match strategy {
        TimingStrategy::Conditions => Box::new(ConditionNegotiator::new(BranchAndBound::new(solver.clone()))),
        TimingStrategy::Buckets => Box::new(BucketNegotiator::new(buckets.clone())),
    }
}
