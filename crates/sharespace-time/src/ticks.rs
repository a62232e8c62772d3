//! Tick synchronization
//!
//! Participants report the ticks of their local cadence (e.g. steps or
//! beats). From the recent interval statistics a common cadence is derived,
//! and each participant gets a few upcoming tick offsets that keep its own
//! rhythm while converging on a shared horizon.

use serde::{Deserialize, Serialize};
use sharespace_solver::{BranchAndBound, LinearModel, LinearSolver, Relation, Sense, VarId, VarKind};
use tracing::{debug, warn};

use crate::{TimingError, TimingResult};

/// Tick synchronization parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TickConfig {
    /// Complete intervals required per participant
    pub min_intervals: usize,
    /// Age in seconds after which ticks are forgotten
    pub window_seconds: f64,
    /// Recommended intervals stay within this many std of the mean
    pub std_factor: f64,
    /// Interval difference between participants that costs nothing
    pub cadence_tolerance: f64,
    /// Upper bound on recommended ticks per participant
    pub max_ticks: usize,
}

impl Default for TickConfig {
    fn default() -> Self {
        TickConfig {
            min_intervals: 5,
            window_seconds: 10.0,
            std_factor: 0.5,
            cadence_tolerance: 0.1,
            max_ticks: 3,
        }
    }
}

/// Interval starting at a tick; `second` is set once the next tick of the
/// same chain arrives
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickInterval {
    pub first: f64,
    pub second: Option<f64>,
}

impl TickInterval {
    pub fn delta(&self) -> Option<f64> {
        self.second.map(|second| second - self.first)
    }
}

/// Reported ticks of one participant
#[derive(Clone, Debug, Default)]
pub struct TickHistory {
    intervals: Vec<TickInterval>,
}

impl TickHistory {
    pub fn new() -> Self {
        TickHistory::default()
    }

    /// Record a tick; a tick related to the previous one closes its interval
    pub fn add_tick(&mut self, seconds: f64, in_relation_to_previous: bool) {
        if in_relation_to_previous {
            if let Some(previous) = self.intervals.last_mut() {
                previous.second = Some(seconds);
            }
        }
        self.intervals.push(TickInterval { first: seconds, second: None });
    }

    pub fn intervals(&self) -> &[TickInterval] {
        &self.intervals
    }

    pub fn last_tick(&self) -> Option<f64> {
        self.intervals.last().map(|i| i.first)
    }

    pub fn valid_count(&self) -> usize {
        self.intervals.iter().filter(|i| i.second.is_some()).count()
    }

    /// Mean and standard deviation of the complete intervals
    pub fn statistics(&self) -> Option<(f64, f64)> {
        let deltas: Vec<f64> = self.intervals.iter().filter_map(TickInterval::delta).collect();
        if deltas.is_empty() {
            return None;
        }
        let n = deltas.len() as f64;
        let mean = deltas.iter().sum::<f64>() / n;
        let variance = deltas.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
        Some((mean, variance.sqrt()))
    }

    /// Forget intervals starting before `seconds`
    pub fn clear_until(&mut self, seconds: f64) {
        self.intervals.retain(|i| i.first >= seconds);
    }

    pub fn reset(&mut self) {
        self.intervals.clear();
    }
}

#[derive(Clone, Copy, Debug)]
struct Cadence {
    last: f64,
    mean: f64,
    std: f64,
    recommended: f64,
}

/// Recommends upcoming ticks that bring all participants to a common
/// horizon.
pub struct TickSynchronizer<S: LinearSolver = BranchAndBound> {
    config: TickConfig,
    histories: Vec<TickHistory>,
    solver: S,
    last_horizon: f64,
}

impl TickSynchronizer {
    pub fn new(config: TickConfig) -> Self {
        TickSynchronizer::with_solver(config, BranchAndBound::default())
    }
}

impl Default for TickSynchronizer {
    fn default() -> Self {
        TickSynchronizer::new(TickConfig::default())
    }
}

impl<S: LinearSolver> TickSynchronizer<S> {
    pub fn with_solver(config: TickConfig, solver: S) -> Self {
        TickSynchronizer {
            config,
            histories: Vec::new(),
            solver,
            last_horizon: f64::NEG_INFINITY,
        }
    }

    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    pub fn num_participants(&self) -> usize {
        self.histories.len()
    }

    pub fn add_participant(&mut self) {
        self.histories.push(TickHistory::new());
    }

    pub fn remove_participant(&mut self, participant: usize) {
        if participant < self.histories.len() {
            self.histories.remove(participant);
        }
    }

    pub fn history(&self, participant: usize) -> Option<&TickHistory> {
        self.histories.get(participant)
    }

    /// Returns false for an unknown participant number
    pub fn add_tick(&mut self, participant: usize, seconds: f64, in_relation_to_previous: bool) -> bool {
        match self.histories.get_mut(participant) {
            Some(history) => {
                history.add_tick(seconds, in_relation_to_previous);
                true
            }
            None => false,
        }
    }

    pub fn clear_until(&mut self, seconds: f64) {
        for history in &mut self.histories {
            history.clear_until(seconds);
        }
    }

    /// Drop ticks older than the configured window
    pub fn forget_before(&mut self, now: f64) {
        self.clear_until(now - self.config.window_seconds);
    }

    pub fn last_horizon(&self) -> f64 {
        self.last_horizon
    }

    /// Whether the previous horizon has passed
    pub fn is_due(&self, now: f64) -> bool {
        self.last_horizon < now
    }

    pub fn reset(&mut self) {
        for history in &mut self.histories {
            history.reset();
        }
        self.last_horizon = f64::NEG_INFINITY;
    }

    /// Seconds from `now` to each participant's recommended ticks, or
    /// `None` when any participant is under-sampled or infeasible.
    pub fn recommend(&mut self, now: f64) -> Option<Vec<Vec<f64>>> {
        match self.try_recommend(now) {
            Ok((horizon, ticks)) => {
                self.last_horizon = horizon;
                debug!(horizon, participants = ticks.len(), "tick recommendation ready");
                Some(ticks.into_iter().map(|t| t.into_iter().map(|s| s - now).collect()).collect())
            }
            Err(e) => {
                warn!(error = %e, "no tick recommendation");
                None
            }
        }
    }

    fn try_recommend(&self, now: f64) -> TimingResult<(f64, Vec<Vec<f64>>)> {
        if self.histories.is_empty() {
            return Err(TimingError::NotEnoughTicks { participant: 0, have: 0, need: self.config.min_intervals });
        }

        let mut cadences = Vec::with_capacity(self.histories.len());
        for (participant, history) in self.histories.iter().enumerate() {
            let have = history.valid_count();
            let stats = history.statistics().zip(history.last_tick());
            let Some(((mean, std), last)) = stats.filter(|_| have >= self.config.min_intervals) else {
                return Err(TimingError::NotEnoughTicks { participant, have, need: self.config.min_intervals });
            };
            cadences.push(Cadence { last, mean, std, recommended: mean });
        }

        self.common_cadence(&mut cadences)?;

        let longest = cadences.iter().map(|c| c.recommended).fold(0.0, f64::max);
        let span = 2.0 * longest;
        let horizon = now + span;

        let ticks = cadences
            .iter()
            .map(|cadence| self.ticks_towards(cadence, now, span, horizon))
            .collect::<TimingResult<Vec<_>>>()?;
        Ok((horizon, ticks))
    }

    /// Pull the recommended intervals together, each within its own spread
    fn common_cadence(&self, cadences: &mut [Cadence]) -> TimingResult<()> {
        let f = self.config.std_factor;
        let eps = self.config.cadence_tolerance;
        let mut model = LinearModel::new(Sense::Minimize);

        let rates: Vec<VarId> = cadences
            .iter()
            .map(|c| model.add_var(VarKind::Continuous, (c.mean - f * c.std).max(0.0), c.mean + f * c.std))
            .collect();

        for (c, r) in cadences.iter().zip(&rates) {
            let d = model.add_nonnegative();
            model.add_constraint(vec![(d, 1.0), (*r, -1.0)], Relation::Ge, -c.mean);
            model.add_constraint(vec![(d, 1.0), (*r, 1.0)], Relation::Ge, c.mean);
            model.add_objective_term(d, 1.0);
        }

        for i in 0..rates.len() {
            for j in (i + 1)..rates.len() {
                let e = model.add_nonnegative();
                model.add_constraint(vec![(e, 1.0), (rates[i], -1.0), (rates[j], 1.0)], Relation::Ge, -eps);
                model.add_constraint(vec![(e, 1.0), (rates[i], 1.0), (rates[j], -1.0)], Relation::Ge, -eps);
                model.add_objective_term(e, 1.0);
            }
        }

        let assignment = self.solver.solve(&model)?;
        for (c, r) in cadences.iter_mut().zip(&rates) {
            c.recommended = assignment.value(*r);
        }
        Ok(())
    }

    /// Absolute upcoming ticks for one participant
    fn ticks_towards(&self, cadence: &Cadence, now: f64, span: f64, horizon: f64) -> TimingResult<Vec<f64>> {
        let r = cadence.recommended;
        if r <= 0.0 {
            return Err(sharespace_solver::SolveError::Infeasible.into());
        }
        let slack = self.config.std_factor * cadence.std;
        let count = ((span / r).round() as usize).clamp(1, self.config.max_ticks.max(1));

        let mut model = LinearModel::new(Sense::Minimize);
        let ticks: Vec<VarId> = (0..count).map(|_| model.add_var(VarKind::Continuous, now, f64::INFINITY)).collect();

        // first tick continues the participant's chain after k intervals
        let k = model.add_var(VarKind::Integer, 1.0, f64::INFINITY);
        model.add_constraint(vec![(ticks[0], 1.0), (k, -(r + slack))], Relation::Le, cadence.last);
        model.add_constraint(vec![(ticks[0], 1.0), (k, -(r - slack))], Relation::Ge, cadence.last);

        for pair in ticks.windows(2) {
            model.add_constraint(vec![(pair[1], 1.0), (pair[0], -1.0)], Relation::Le, r + slack);
            model.add_constraint(vec![(pair[1], 1.0), (pair[0], -1.0)], Relation::Ge, r - slack);
        }

        for tick in &ticks {
            let distance = model.add_nonnegative();
            model.add_constraint(vec![(distance, 1.0), (*tick, -1.0)], Relation::Ge, -horizon);
            model.add_constraint(vec![(distance, 1.0), (*tick, 1.0)], Relation::Ge, horizon);
            model.add_objective_term(distance, 1.0);
        }

        let assignment = self.solver.solve(&model)?;
        Ok(ticks.iter().map(|t| assignment.value(*t)).collect())
    }
}
