//! Linear model description

/// Variable handle within one model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    Continuous,
    Integer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relation {
    Le,
    Ge,
    Eq,
    /// Disequality, resolved by branching
    Ne,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sense {
    Minimize,
    Maximize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarSpec {
    pub kind: VarKind,
    pub lower: f64,
    pub upper: f64,
}

/// `sum(terms) relation rhs`
#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    pub terms: Vec<(VarId, f64)>,
    pub relation: Relation,
    pub rhs: f64,
}

impl Constraint {
    pub fn lhs(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|(v, c)| values[v.0] * c).sum()
    }

    /// Whether the constraint has no effective variable term
    pub fn is_constant(&self) -> bool {
        self.terms.iter().all(|(_, c)| *c == 0.0)
    }

    /// Check a constant constraint (`0 relation rhs`)
    pub fn holds_trivially(&self, gap: f64) -> bool {
        match self.relation {
            Relation::Le => 0.0 <= self.rhs + 1e-9,
            Relation::Ge => 0.0 >= self.rhs - 1e-9,
            Relation::Eq => self.rhs.abs() <= 1e-9,
            Relation::Ne => self.rhs.abs() >= gap * 0.5,
        }
    }
}

/// Variables, constraints and an optional objective
#[derive(Clone, Debug, PartialEq)]
pub struct LinearModel {
    vars: Vec<VarSpec>,
    constraints: Vec<Constraint>,
    objective: Vec<(VarId, f64)>,
    sense: Sense,
}

impl LinearModel {
    pub fn new(sense: Sense) -> Self {
        LinearModel {
            vars: Vec::new(),
            constraints: Vec::new(),
            objective: Vec::new(),
            sense,
        }
    }

    pub fn add_var(&mut self, kind: VarKind, lower: f64, upper: f64) -> VarId {
        self.vars.push(VarSpec { kind, lower, upper });
        VarId(self.vars.len() - 1)
    }

    /// Continuous variable in `[lower, +inf)`
    pub fn add_nonnegative(&mut self) -> VarId {
        self.add_var(VarKind::Continuous, 0.0, f64::INFINITY)
    }

    /// Unbounded continuous variable
    pub fn add_free(&mut self) -> VarId {
        self.add_var(VarKind::Continuous, f64::NEG_INFINITY, f64::INFINITY)
    }

    pub fn add_constraint(&mut self, terms: Vec<(VarId, f64)>, relation: Relation, rhs: f64) {
        self.constraints.push(Constraint { terms, relation, rhs });
    }

    /// Fix a variable to a value
    pub fn fix(&mut self, var: VarId, value: f64) {
        self.add_constraint(vec![(var, 1.0)], Relation::Eq, value);
    }

    /// Add `coef * var` to the objective
    pub fn add_objective_term(&mut self, var: VarId, coef: f64) {
        match self.objective.iter_mut().find(|(v, _)| *v == var) {
            Some((_, c)) => *c += coef,
            None => self.objective.push((var, coef)),
        }
    }

    /// Drop the objective, leaving a feasibility problem
    pub fn clear_objective(&mut self) {
        self.objective.clear();
    }

    pub fn has_objective(&self) -> bool {
        self.objective.iter().any(|(_, c)| *c != 0.0)
    }

    pub fn vars(&self) -> &[VarSpec] {
        &self.vars
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &[(VarId, f64)] {
        &self.objective
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }
}

/// Solved variable values
#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    pub values: Vec<f64>,
    pub objective: f64,
}

impl Assignment {
    #[inline]
    pub fn value(&self, var: VarId) -> f64 {
        self.values[var.0]
    }
}
