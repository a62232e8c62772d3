//! Timing negotiation by matching discrete options into buckets

use serde::{Deserialize, Serialize};
use sharespace_core::CandidateTransition;
use tracing::{debug, warn};

use crate::{TimingError, TimingNegotiator, TimingResult};

/// Bucket matching tolerances and weights
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Maximum distance of a planning time from every bucketed one
    pub planning_tolerance_ms: f64,
    /// Maximum distance of an execution time from every bucketed one
    pub execution_tolerance_ms: f64,
    pub planning_weight: f64,
    pub execution_weight: f64,
    /// Spread at which the time quality bottoms out, per weight
    pub worst_spread_ms: f64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        BucketConfig {
            planning_tolerance_ms: 500.0,
            execution_tolerance_ms: 500.0,
            planning_weight: 1.0,
            execution_weight: 1.0,
            worst_spread_ms: 5_000.0,
        }
    }
}

/// Options within tolerance of each other, one per participant
#[derive(Clone, Debug)]
struct Bucket {
    planning: (f64, f64),
    execution: (f64, f64),
    /// Chosen (planning, execution) per participant number
    chosen: Vec<Option<(f64, f64)>>,
}

impl Bucket {
    fn new(participants: usize) -> Self {
        Bucket {
            planning: (f64::NEG_INFINITY, f64::INFINITY),
            execution: (f64::NEG_INFINITY, f64::INFINITY),
            chosen: vec![None; participants],
        }
    }

    fn fits(&self, (planning, execution): (f64, f64)) -> bool {
        self.planning.0 <= planning
            && planning <= self.planning.1
            && self.execution.0 <= execution
            && execution <= self.execution.1
    }

    fn insert(&mut self, participant: usize, option: (f64, f64), config: &BucketConfig) {
        let (planning, execution) = option;
        self.planning.0 = self.planning.0.max(planning - config.planning_tolerance_ms);
        self.planning.1 = self.planning.1.min(planning + config.planning_tolerance_ms);
        self.execution.0 = self.execution.0.max(execution - config.execution_tolerance_ms);
        self.execution.1 = self.execution.1.min(execution + config.execution_tolerance_ms);
        self.chosen[participant] = Some(option);
    }

    fn holds(&self, participant: usize) -> bool {
        self.chosen[participant].is_some()
    }

    /// (planning spread, execution spread)
    fn spreads(&self) -> (f64, f64) {
        let spread = |field: fn(&(f64, f64)) -> f64| {
            let values = self.chosen.iter().flatten().map(field);
            let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
            if hi < lo { 0.0 } else { hi - lo }
        };
        (spread(|o: &(f64, f64)| o.0), spread(|o: &(f64, f64)| o.1))
    }

    /// Per-field maximum of the chosen options
    fn latest(&self) -> (f64, f64) {
        self.chosen
            .iter()
            .flatten()
            .fold((0.0_f64, 0.0_f64), |(p, e), (op, oe)| (p.max(*op), e.max(*oe)))
    }
}

/// Matches each participant's (planning, execution) options into buckets
/// of mutually compatible choices and takes the tightest one.
///
/// The resolved times are the latest of the bucketed options, so nobody is
/// asked to be faster than they offered.
#[derive(Clone, Debug, Default)]
pub struct BucketNegotiator {
    config: BucketConfig,
}

impl BucketNegotiator {
    pub fn new(config: BucketConfig) -> Self {
        BucketNegotiator { config }
    }

    pub fn config(&self) -> &BucketConfig {
        &self.config
    }

    fn buckets(&self, candidate: &CandidateTransition) -> TimingResult<Vec<Bucket>> {
        let participants = candidate.votes.len();
        let mut buckets: Vec<Bucket> = Vec::new();
        let mut seeded = false;

        for (participant, vote) in candidate.filled() {
            let options: Vec<(f64, f64)> = vote.timing_options().collect();
            if options.is_empty() {
                return Err(TimingError::NoOptions);
            }

            if !seeded {
                for option in &options {
                    let mut bucket = Bucket::new(participants);
                    bucket.insert(participant, *option, &self.config);
                    buckets.push(bucket);
                }
                seeded = true;
                continue;
            }

            let mut branched = Vec::new();
            for bucket in buckets.iter_mut() {
                let fitting: Vec<(f64, f64)> = options.iter().copied().filter(|o| bucket.fits(*o)).collect();
                let Some((last, rest)) = fitting.split_last() else {
                    continue;
                };
                for option in rest {
                    let mut clone = bucket.clone();
                    clone.insert(participant, *option, &self.config);
                    branched.push(clone);
                }
                bucket.insert(participant, *last, &self.config);
            }
            buckets.extend(branched);
        }

        Ok(buckets)
    }

    /// Resolved (planning ms, execution ms, time quality)
    pub fn negotiate(&self, candidate: &CandidateTransition) -> TimingResult<(f64, f64, f64)> {
        let buckets = self.buckets(candidate)?;
        let members: Vec<usize> = candidate.filled().map(|(p, _)| p).collect();

        let mut best: Option<(&Bucket, f64)> = None;
        for bucket in buckets.iter().filter(|b| members.iter().all(|p| b.holds(*p))) {
            let (planning, execution) = bucket.spreads();
            let delta = self.config.planning_weight * planning + self.config.execution_weight * execution;
            if best.map_or(true, |(_, d)| delta < d) {
                best = Some((bucket, delta));
            }
        }

        let (bucket, delta) = best.ok_or(TimingError::NoCommonBucket)?;
        let worst = (self.config.planning_weight + self.config.execution_weight) * self.config.worst_spread_ms;
        let ratio = if worst > 0.0 { (delta / worst).min(1.0) } else { 1.0 };
        let (planning, execution) = bucket.latest();
        Ok((planning, execution, 0.25 + 0.75 * (1.0 - ratio)))
    }
}

impl TimingNegotiator for BucketNegotiator {
    fn name(&self) -> &'static str {
        "buckets"
    }

    fn set_priorities(&mut self, _priorities: &[f64]) {}

    fn resolve(&mut self, candidate: &mut CandidateTransition) -> bool {
        match self.negotiate(candidate) {
            Ok((planning, execution, quality)) => {
                candidate.planning_ms = planning;
                candidate.execution_ms = execution;
                candidate.time_quality = quality;
                debug!(transition = %candidate.transition, planning, execution, quality, "bucket timing resolved");
                true
            }
            Err(e) => {
                warn!(transition = %candidate.transition, error = %e, "no common timing bucket");
                false
            }
        }
    }
}
