//! Timing negotiation over linear conditions

use std::collections::BTreeMap;

use sharespace_core::{BoundKind, CandidateTransition, LinearForm, Variable, VariableKind};
use sharespace_solver::{Assignment, BranchAndBound, LinearModel, LinearSolver, Relation, Sense, VarId, VarKind};
use tracing::{debug, warn};

use crate::{TimingNegotiator, TimingResult};

/// Owner of a model variable: shared, or local to one participant
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Scope {
    Shared,
    Participant(usize),
}

/// One candidate's conditions as a solver model
struct TimingModel {
    model: LinearModel,
    prep: VarId,
    exec: VarId,
    vars: BTreeMap<(Scope, Variable), VarId>,
}

impl TimingModel {
    fn new() -> Self {
        let mut model = LinearModel::new(Sense::Maximize);
        let prep = model.add_nonnegative();
        let exec = model.add_nonnegative();
        let mut vars = BTreeMap::new();
        vars.insert((Scope::Shared, Variable::PREPARATION), prep);
        vars.insert((Scope::Shared, Variable::EXECUTION), exec);
        TimingModel { model, prep, exec, vars }
    }

    /// Build the model for every filled slot; the value functions are
    /// only added when `priorities` is given.
    fn build(candidate: &CandidateTransition, priorities: Option<&[f64]>) -> TimingResult<Self> {
        let mut timing = TimingModel::new();
        for (participant, vote) in candidate.filled() {
            let arrival = timing.var(participant, Variable::ARRIVAL);
            timing.model.fix(arrival, vote.arrival_seconds);

            for condition in &vote.timing_conditions {
                let form = condition.difference()?;
                let relation = match condition.kind {
                    BoundKind::Equal => Relation::Eq,
                    BoundKind::SmallerEqual => Relation::Le,
                    BoundKind::NotEqual => Relation::Ne,
                };
                let terms = timing.terms(participant, &form);
                timing.model.add_constraint(terms, relation, -form.constant);
            }

            if let (Some(priorities), Some(value)) = (priorities, &vote.value_function) {
                let priority = priorities.get(participant).copied().unwrap_or(1.0);
                let form = value.linearize()?;
                for (var, coef) in timing.terms(participant, &form) {
                    timing.model.add_objective_term(var, priority * coef);
                }
            }
        }
        Ok(timing)
    }

    fn var(&mut self, participant: usize, variable: Variable) -> VarId {
        let key = match variable.kind {
            VariableKind::PreparationTime => (Scope::Shared, Variable::PREPARATION),
            VariableKind::ExecutionTime => (Scope::Shared, Variable::EXECUTION),
            VariableKind::ArrivalTime => (Scope::Participant(participant), Variable::ARRIVAL),
            VariableKind::Continuous | VariableKind::Integer => (Scope::Participant(participant), variable),
        };
        if let Some(var) = self.vars.get(&key) {
            return *var;
        }
        let kind = match variable.kind {
            VariableKind::Integer => VarKind::Integer,
            _ => VarKind::Continuous,
        };
        let var = self.model.add_var(kind, f64::NEG_INFINITY, f64::INFINITY);
        self.vars.insert(key, var);
        var
    }

    fn terms(&mut self, participant: usize, form: &LinearForm) -> Vec<(VarId, f64)> {
        form.terms
            .iter()
            .filter(|(_, coef)| *coef != 0.0)
            .map(|(variable, coef)| (self.var(participant, *variable), *coef))
            .collect()
    }

    /// Solved (preparation, execution) in seconds
    fn read(&self, assignment: &Assignment) -> (f64, f64) {
        (assignment.value(self.prep), assignment.value(self.exec))
    }
}

/// Solves each candidate's timing conditions as one linear model.
///
/// The preparation and execution times are shared between the
/// participants. Arrival and auxiliary variables are per participant. The
/// priority-weighted value functions are maximized; if that fails, the
/// model is solved again for feasibility alone.
pub struct ConditionNegotiator<S: LinearSolver = BranchAndBound> {
    solver: S,
    priorities: Vec<f64>,
}

impl<S: LinearSolver> ConditionNegotiator<S> {
    pub fn new(solver: S) -> Self {
        ConditionNegotiator { solver, priorities: Vec::new() }
    }

    /// Solved (preparation, execution) in seconds
    pub fn negotiate(&self, candidate: &CandidateTransition) -> TimingResult<(f64, f64)> {
        let timing = TimingModel::build(candidate, Some(&self.priorities))?;
        match self.solver.solve(&timing.model) {
            Ok(assignment) => Ok(timing.read(&assignment)),
            Err(e) if timing.model.has_objective() => {
                debug!(transition = %candidate.transition, error = %e, "retrying timing without value functions");
                let timing = TimingModel::build(candidate, None)?;
                let assignment = self.solver.solve(&timing.model)?;
                Ok(timing.read(&assignment))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for ConditionNegotiator {
    fn default() -> Self {
        Self::new(BranchAndBound::default())
    }
}

impl<S: LinearSolver> TimingNegotiator for ConditionNegotiator<S> {
    fn name(&self) -> &'static str {
        "conditions"
    }

    fn set_priorities(&mut self, priorities: &[f64]) {
        self.priorities = priorities.to_vec();
    }

    fn resolve(&mut self, candidate: &mut CandidateTransition) -> bool {
        match self.negotiate(candidate) {
            Ok((prep, exec)) => {
                candidate.planning_ms = prep * 1000.0;
                candidate.execution_ms = exec * 1000.0;
                candidate.time_quality = 1.0;
                debug!(transition = %candidate.transition, prep, exec, "timing resolved");
                true
            }
            Err(e) => {
                warn!(transition = %candidate.transition, error = %e, "no timing satisfies all conditions");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharespace_core::{LocalMove, ParticipantVote, SystemTransition, TimeCondition, Value};

    fn exec() -> Value {
        Value::var(Variable::EXECUTION)
    }

    fn prep() -> Value {
        Value::var(Variable::PREPARATION)
    }

    fn c(v: f64) -> Value {
        Value::constant(v)
    }

    fn candidate(votes: Vec<ParticipantVote>) -> CandidateTransition {
        let mut candidate = CandidateTransition::new(SystemTransition::RotateLeft, votes.len());
        for (p, vote) in votes.iter().enumerate() {
            candidate.add_vote(p, vote, false);
        }
        candidate
    }

    fn negotiator() -> ConditionNegotiator {
        ConditionNegotiator::default()
    }

    fn vote() -> ParticipantVote {
        ParticipantVote::new(LocalMove::RotateLeft, 1.0)
    }

    #[test]
    fn test_value_function_picks_bound() {
        let v = vote()
            .with_condition(TimeCondition::at_least(exec(), c(2.0)))
            .with_condition(TimeCondition::at_most(exec(), c(3.0)))
            .with_value_function(exec());
        let mut cand = candidate(vec![v]);
        let mut negotiator = negotiator();

        assert!(negotiator.resolve(&mut cand));
        assert!((cand.execution_ms - 3000.0).abs() < 1e-6);
        assert_eq!(cand.time_quality, 1.0);
    }

    #[test]
    fn test_contradicting_participants() {
        let a = vote().with_condition(TimeCondition::at_least(exec(), c(2.0)));
        let b = vote().with_condition(TimeCondition::at_most(exec(), c(1.0)));
        let mut cand = candidate(vec![a, b]);
        let before = cand.clone();
        let mut negotiator = negotiator();

        assert!(!negotiator.resolve(&mut cand));
        assert_eq!(cand, before);
    }

    #[test]
    fn test_unbounded_value_falls_back_to_feasibility() {
        let v = vote()
            .with_condition(TimeCondition::at_least(prep(), c(1.0)))
            .with_value_function(prep());
        let mut cand = candidate(vec![v]);
        let mut negotiator = negotiator();

        assert!(negotiator.resolve(&mut cand));
        assert!(cand.planning_ms >= 1000.0 - 1e-6);
    }

    #[test]
    fn test_nonlinear_condition_is_infeasible() {
        let v = vote().with_condition(TimeCondition::equal(exec().times(prep()), c(4.0)));
        let mut cand = candidate(vec![v]);
        assert!(!negotiator().resolve(&mut cand));
    }

    #[test]
    fn test_arrival_time_is_bound() {
        let mut v = vote().with_condition(TimeCondition::equal(prep(), Value::var(Variable::ARRIVAL).plus(c(2.0))));
        v.arrival_seconds = 10.0;
        let mut cand = candidate(vec![v]);

        assert!(negotiator().resolve(&mut cand));
        assert!((cand.planning_ms - 12_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_auxiliary_variables_are_per_participant() {
        let x = Value::var(Variable::continuous(0));
        let a = vote()
            .with_condition(TimeCondition::at_least(x.clone(), c(5.0)))
            .with_condition(TimeCondition::equal(exec(), x.clone().minus(c(4.0))));
        let b = vote()
            .with_condition(TimeCondition::at_most(x.clone(), c(1.0)))
            .with_condition(TimeCondition::at_most(exec(), x.plus(c(10.0))));
        let mut cand = candidate(vec![a, b]);

        assert!(negotiator().resolve(&mut cand));
        assert!(cand.execution_ms >= 1000.0 - 1e-6);
    }

    #[test]
    fn test_integer_steps() {
        let k = Value::var(Variable::integer(0));
        let v = vote()
            .with_condition(TimeCondition::equal(exec(), c(0.5).times(k)))
            .with_condition(TimeCondition::at_least(exec(), c(1.2)))
            .with_condition(TimeCondition::at_most(exec(), c(1.6)));
        let mut cand = candidate(vec![v]);

        assert!(negotiator().resolve(&mut cand));
        assert!((cand.execution_ms - 1500.0).abs() < 1e-6);
    }

    #[test]
    fn test_not_equal_excludes_value() {
        let v = vote()
            .with_condition(TimeCondition::not_equal(exec(), c(2.0)))
            .with_condition(TimeCondition::at_least(exec(), c(1.0)))
            .with_condition(TimeCondition::at_most(exec(), c(2.0)))
            .with_value_function(exec());
        let mut cand = candidate(vec![v]);

        assert!(negotiator().resolve(&mut cand));
        assert!(cand.execution_ms < 2000.0);
        assert!(cand.execution_ms > 1900.0);
    }

    #[test]
    fn test_priorities_weight_value_functions() {
        let long = vote()
            .with_condition(TimeCondition::at_least(exec(), c(1.0)))
            .with_condition(TimeCondition::at_most(exec(), c(3.0)))
            .with_value_function(exec());
        let short = vote().with_value_function(c(0.0).minus(exec()));

        let mut negotiator = negotiator();
        negotiator.set_priorities(&[1.0, 2.0]);
        let mut cand = candidate(vec![long.clone(), short.clone()]);
        assert!(negotiator.resolve(&mut cand));
        assert!((cand.execution_ms - 1000.0).abs() < 1e-6);

        negotiator.set_priorities(&[2.0, 1.0]);
        let mut cand = candidate(vec![long, short]);
        assert!(negotiator.resolve(&mut cand));
        assert!((cand.execution_ms - 3000.0).abs() < 1e-6);
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let v = vote()
            .with_condition(TimeCondition::at_least(exec(), c(0.5)))
            .with_condition(TimeCondition::at_most(exec(), c(4.0)))
            .with_value_function(exec());
        let mut negotiator = negotiator();
        let mut first = candidate(vec![v.clone()]);
        let mut second = candidate(vec![v]);
        assert!(negotiator.resolve(&mut first));
        assert!(negotiator.resolve(&mut second));
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_all_drops_infeasible() {
        let ok = candidate(vec![vote().with_condition(TimeCondition::at_most(exec(), c(1.0)))]);
        let bad = candidate(vec![vote()
            .with_condition(TimeCondition::at_least(exec(), c(2.0)))
            .with_condition(TimeCondition::at_most(exec(), c(1.0)))]);
        let resolved = negotiator().resolve_all(vec![bad, ok]);
        assert_eq!(resolved.len(), 1);
    }
}
