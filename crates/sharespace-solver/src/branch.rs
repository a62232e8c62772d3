//! Depth-first branch and bound over LP relaxations

use tracing::debug;

use crate::relaxation::{solve_relaxation, NodeBounds};
use crate::{Assignment, Constraint, LinearModel, LinearSolver, Relation, Sense, SolveError, SolveResult, VarKind};

/// Solver limits and tolerances
#[derive(Clone, Debug, PartialEq)]
pub struct SolverConfig {
    /// Maximum number of relaxations solved per model
    pub max_nodes: usize,
    /// Distance from an integer still treated as integral
    pub integrality_tolerance: f64,
    /// Minimum separation enforced by a `!=` constraint
    pub disequality_gap: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            max_nodes: 2_000,
            integrality_tolerance: 1e-6,
            disequality_gap: 1e-3,
        }
    }
}

/// Mixed-integer solver with disequality support
#[derive(Clone, Debug, Default)]
pub struct BranchAndBound {
    config: SolverConfig,
}

impl BranchAndBound {
    pub fn new(config: SolverConfig) -> Self {
        BranchAndBound { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    fn better(sense: Sense, candidate: f64, incumbent: f64) -> bool {
        match sense {
            Sense::Minimize => candidate < incumbent - 1e-9,
            Sense::Maximize => candidate > incumbent + 1e-9,
        }
    }

    /// First disequality the relaxed solution sits on
    fn violated_disequality<'a>(&self, model: &'a LinearModel, values: &[f64]) -> Option<&'a Constraint> {
        model.constraints().iter().find(|c| {
            c.relation == Relation::Ne
                && !c.is_constant()
                && (c.lhs(values) - c.rhs).abs() < self.config.disequality_gap * 0.5
        })
    }

    /// First integer variable with a fractional value
    fn fractional_var(&self, model: &LinearModel, values: &[f64]) -> Option<usize> {
        model.vars().iter().enumerate().find_map(|(i, spec)| {
            let v = values[i];
            let frac = (v - v.round()).abs();
            (spec.kind == VarKind::Integer && frac > self.config.integrality_tolerance).then_some(i)
        })
    }
}

impl LinearSolver for BranchAndBound {
    fn solve(&self, model: &LinearModel) -> SolveResult<Assignment> {
        let gap = self.config.disequality_gap;
        let mut stack = vec![NodeBounds::root(model)];
        let mut best: Option<Assignment> = None;
        let mut nodes = 0usize;

        while let Some(node) = stack.pop() {
            if nodes >= self.config.max_nodes {
                debug!(nodes, "branch and bound node limit reached");
                return best.ok_or(SolveError::NodeLimit(self.config.max_nodes));
            }
            nodes += 1;

            let relaxed = match solve_relaxation(model, &node, gap) {
                Ok(relaxed) => relaxed,
                Err(SolveError::Infeasible) => continue,
                Err(e) => return Err(e),
            };

            if let Some(incumbent) = &best {
                if !Self::better(model.sense(), relaxed.objective, incumbent.objective) {
                    continue;
                }
            }

            if let Some(constraint) = self.violated_disequality(model, &relaxed.values) {
                let below = Constraint {
                    terms: constraint.terms.clone(),
                    relation: Relation::Le,
                    rhs: constraint.rhs - gap,
                };
                let above = Constraint {
                    terms: constraint.terms.clone(),
                    relation: Relation::Ge,
                    rhs: constraint.rhs + gap,
                };
                let mut upper = node.clone();
                upper.cuts.push(above);
                let mut lower = node;
                lower.cuts.push(below);
                stack.push(upper);
                stack.push(lower);
                continue;
            }

            if let Some(i) = self.fractional_var(model, &relaxed.values) {
                let v = relaxed.values[i];
                let mut ceil = node.clone();
                ceil.bounds[i].0 = v.ceil();
                let mut floor = node;
                floor.bounds[i].1 = v.floor();
                stack.push(ceil);
                stack.push(floor);
                continue;
            }

            let mut solved = relaxed;
            for (i, spec) in model.vars().iter().enumerate() {
                if spec.kind == VarKind::Integer {
                    solved.values[i] = solved.values[i].round();
                }
            }
            best = Some(solved);
        }

        debug!(nodes, feasible = best.is_some(), "branch and bound finished");
        best.ok_or(SolveError::Infeasible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VarId;

    fn solver() -> BranchAndBound {
        BranchAndBound::default()
    }

    #[test]
    fn test_plain_lp() {
        // max x + y, x + 2y <= 4, 3x + y <= 6
        let mut model = LinearModel::new(Sense::Maximize);
        let x = model.add_nonnegative();
        let y = model.add_nonnegative();
        model.add_objective_term(x, 1.0);
        model.add_objective_term(y, 1.0);
        model.add_constraint(vec![(x, 1.0), (y, 2.0)], Relation::Le, 4.0);
        model.add_constraint(vec![(x, 3.0), (y, 1.0)], Relation::Le, 6.0);

        let result = solver().solve(&model).unwrap();
        assert!((result.value(x) - 1.6).abs() < 1e-6);
        assert!((result.value(y) - 1.2).abs() < 1e-6);
        assert!((result.objective - 2.8).abs() < 1e-6);
    }

    #[test]
    fn test_integer_branching() {
        // max x + y, 2x + 2y <= 5, integer
        let mut model = LinearModel::new(Sense::Maximize);
        let x = model.add_var(VarKind::Integer, 0.0, 10.0);
        let y = model.add_var(VarKind::Integer, 0.0, 10.0);
        model.add_objective_term(x, 1.0);
        model.add_objective_term(y, 1.0);
        model.add_constraint(vec![(x, 2.0), (y, 2.0)], Relation::Le, 5.0);

        let result = solver().solve(&model).unwrap();
        assert_eq!(result.value(x) + result.value(y), 2.0);
        assert_eq!(result.value(x).fract(), 0.0);
    }

    #[test]
    fn test_disequality_branching() {
        // min x, x >= 1, x != 1
        let mut model = LinearModel::new(Sense::Minimize);
        let x = model.add_nonnegative();
        model.add_objective_term(x, 1.0);
        model.add_constraint(vec![(x, 1.0)], Relation::Ge, 1.0);
        model.add_constraint(vec![(x, 1.0)], Relation::Ne, 1.0);

        let result = solver().solve(&model).unwrap();
        assert!((result.value(x) - 1.001).abs() < 1e-6);
    }

    #[test]
    fn test_infeasible() {
        let mut model = LinearModel::new(Sense::Maximize);
        let x = model.add_nonnegative();
        model.add_constraint(vec![(x, 1.0)], Relation::Ge, 2.0);
        model.add_constraint(vec![(x, 1.0)], Relation::Le, 1.0);
        assert_eq!(solver().solve(&model), Err(SolveError::Infeasible));
    }

    #[test]
    fn test_constant_constraint_infeasible() {
        let mut model = LinearModel::new(Sense::Maximize);
        model.add_nonnegative();
        model.add_constraint(vec![(VarId(0), 0.0)], Relation::Ge, 1.0);
        assert_eq!(solver().solve(&model), Err(SolveError::Infeasible));
    }

    #[test]
    fn test_unbounded() {
        let mut model = LinearModel::new(Sense::Maximize);
        let x = model.add_nonnegative();
        model.add_objective_term(x, 1.0);
        assert_eq!(solver().solve(&model), Err(SolveError::Unbounded));
    }

    #[test]
    fn test_fix_and_feasibility_only() {
        let mut model = LinearModel::new(Sense::Maximize);
        let x = model.add_free();
        model.fix(x, 12.5);
        let result = solver().solve(&model).unwrap();
        assert!((result.value(x) - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic() {
        let mut model = LinearModel::new(Sense::Minimize);
        let x = model.add_var(VarKind::Integer, 0.0, 100.0);
        let y = model.add_nonnegative();
        model.add_objective_term(y, 1.0);
        model.add_constraint(vec![(x, 1.0), (y, -0.3)], Relation::Le, 2.5);
        model.add_constraint(vec![(x, 1.0)], Relation::Ge, 3.2);
        let a = solver().solve(&model).unwrap();
        let b = solver().solve(&model).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.value(x), 4.0);
    }

    #[test]
    fn test_node_limit() {
        let config = SolverConfig { max_nodes: 1, ..SolverConfig::default() };
        let mut model = LinearModel::new(Sense::Maximize);
        let x = model.add_var(VarKind::Integer, 0.0, 10.0);
        model.add_objective_term(x, 1.0);
        model.add_constraint(vec![(x, 2.0)], Relation::Le, 5.0);
        assert_eq!(BranchAndBound::new(config).solve(&model), Err(SolveError::NodeLimit(1)));
    }
}
