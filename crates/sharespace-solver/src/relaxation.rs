//! LP relaxation backed by `minilp`

use minilp::{ComparisonOp, Error as LpError, LinearExpr, OptimizationDirection, Problem};

use crate::{Assignment, Constraint, LinearModel, Relation, Sense, SolveError, SolveResult, VarKind};

/// Per-node tightening of a model
#[derive(Clone, Debug, Default)]
pub struct NodeBounds {
    /// Overrides of variable bounds
    pub bounds: Vec<(f64, f64)>,
    /// Extra constraints added by disequality branching
    pub cuts: Vec<Constraint>,
}

impl NodeBounds {
    pub fn root(model: &LinearModel) -> Self {
        NodeBounds {
            bounds: model.vars().iter().map(|v| (v.lower, v.upper)).collect(),
            cuts: Vec::new(),
        }
    }
}

/// Solve the continuous relaxation of `model` under `node`.
///
/// Disequalities are ignored here; the caller branches on them.
pub fn solve_relaxation(model: &LinearModel, node: &NodeBounds, gap: f64) -> SolveResult<Assignment> {
    let direction = match model.sense() {
        Sense::Minimize => OptimizationDirection::Minimize,
        Sense::Maximize => OptimizationDirection::Maximize,
    };
    let mut problem = Problem::new(direction);

    let mut objective = vec![0.0; model.num_vars()];
    for (var, coef) in model.objective() {
        objective[var.0] += coef;
    }

    let mut lp_vars = Vec::with_capacity(model.num_vars());
    for (i, spec) in model.vars().iter().enumerate() {
        let (lower, upper) = node.bounds[i];
        if lower > upper + 1e-9 {
            return Err(SolveError::Infeasible);
        }
        let (lower, upper) = match spec.kind {
            VarKind::Integer => (lower.ceil(), upper.floor()),
            VarKind::Continuous => (lower, upper),
        };
        if lower > upper {
            return Err(SolveError::Infeasible);
        }
        lp_vars.push(problem.add_var(objective[i], (lower, upper)));
    }

    for constraint in model.constraints().iter().chain(node.cuts.iter()) {
        if constraint.is_constant() {
            if !constraint.holds_trivially(gap) {
                return Err(SolveError::Infeasible);
            }
            continue;
        }
        let op = match constraint.relation {
            Relation::Le => ComparisonOp::Le,
            Relation::Ge => ComparisonOp::Ge,
            Relation::Eq => ComparisonOp::Eq,
            Relation::Ne => continue,
        };
        let mut expr = LinearExpr::empty();
        for (var, coef) in &constraint.terms {
            if *coef != 0.0 {
                expr.add(lp_vars[var.0], *coef);
            }
        }
        problem.add_constraint(expr, op, constraint.rhs);
    }

    let solution = problem.solve().map_err(|e| match e {
        LpError::Infeasible => SolveError::Infeasible,
        LpError::Unbounded => SolveError::Unbounded,
    })?;

    Ok(Assignment {
        values: lp_vars.iter().map(|v| solution[*v]).collect(),
        objective: solution.objective(),
    })
}
