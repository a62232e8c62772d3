//! Symbolic timing conditions
//!
//! Participants describe which preparation/execution times they can accept
//! as linear relations over a small set of variables. All times in a
//! condition are seconds.

use serde::{Deserialize, Serialize};

use crate::{SharespaceError, SharespaceResult};

/// Kind of a timing variable
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VariableKind {
    /// Length of the preparation phase in seconds
    PreparationTime,
    /// Length of the execution phase in seconds
    ExecutionTime,
    /// Arrival time of the vote, bound to its observed value
    ArrivalTime,
    /// Participant-local auxiliary variable
    Continuous,
    /// Participant-local auxiliary integer variable
    Integer,
}

/// Timing variable; `id` distinguishes auxiliary variables of one participant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variable {
    pub kind: VariableKind,
    #[serde(default)]
    pub id: u32,
}

impl Variable {
    pub const PREPARATION: Variable = Variable { kind: VariableKind::PreparationTime, id: 0 };
    pub const EXECUTION: Variable = Variable { kind: VariableKind::ExecutionTime, id: 0 };
    pub const ARRIVAL: Variable = Variable { kind: VariableKind::ArrivalTime, id: 0 };

    pub fn continuous(id: u32) -> Self {
        Variable { kind: VariableKind::Continuous, id }
    }

    pub fn integer(id: u32) -> Self {
        Variable { kind: VariableKind::Integer, id }
    }

    /// Shared timing variable rather than a participant-local one
    pub fn is_shared(&self) -> bool {
        matches!(self.kind, VariableKind::PreparationTime | VariableKind::ExecutionTime)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Plus,
    Minus,
    Multiply,
}

/// Term of a timing condition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Constant(f64),
    Variable(Variable),
    Expression {
        op: Operation,
        left: Box<Value>,
        right: Box<Value>,
    },
}

impl Value {
    pub fn constant(c: f64) -> Self {
        Value::Constant(c)
    }

    pub fn var(v: Variable) -> Self {
        Value::Variable(v)
    }

    pub fn plus(self, rhs: Value) -> Self {
        Value::Expression { op: Operation::Plus, left: Box::new(self), right: Box::new(rhs) }
    }

    pub fn minus(self, rhs: Value) -> Self {
        Value::Expression { op: Operation::Minus, left: Box::new(self), right: Box::new(rhs) }
    }

    pub fn times(self, rhs: Value) -> Self {
        Value::Expression { op: Operation::Multiply, left: Box::new(self), right: Box::new(rhs) }
    }

    /// Reduce to `sum(coef * var) + constant`.
    ///
    /// Fails when two variable terms are multiplied.
    pub fn linearize(&self) -> SharespaceResult<LinearForm> {
        match self {
            Value::Constant(c) => Ok(LinearForm::constant(*c)),
            Value::Variable(v) => Ok(LinearForm::variable(*v)),
            Value::Expression { op, left, right } => {
                let l = left.linearize()?;
                let r = right.linearize()?;
                match op {
                    Operation::Plus => Ok(l.add(&r, 1.0)),
                    Operation::Minus => Ok(l.add(&r, -1.0)),
                    Operation::Multiply => {
                        if l.is_constant() {
                            Ok(r.scale(l.constant))
                        } else if r.is_constant() {
                            Ok(l.scale(r.constant))
                        } else {
                            Err(SharespaceError::NonLinearCondition)
                        }
                    }
                }
            }
        }
    }
}

/// Relation between both sides of a condition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundKind {
    Equal,
    SmallerEqual,
    NotEqual,
}

/// `left (==|<=|!=) right`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeCondition {
    pub kind: BoundKind,
    pub left: Value,
    pub right: Value,
}

impl TimeCondition {
    pub fn new(kind: BoundKind, left: Value, right: Value) -> Self {
        TimeCondition { kind, left, right }
    }

    pub fn equal(left: Value, right: Value) -> Self {
        TimeCondition::new(BoundKind::Equal, left, right)
    }

    pub fn at_most(left: Value, right: Value) -> Self {
        TimeCondition::new(BoundKind::SmallerEqual, left, right)
    }

    /// `left >= right`, stored as `right <= left`
    pub fn at_least(left: Value, right: Value) -> Self {
        TimeCondition::new(BoundKind::SmallerEqual, right, left)
    }

    pub fn not_equal(left: Value, right: Value) -> Self {
        TimeCondition::new(BoundKind::NotEqual, left, right)
    }

    /// `left - right` as a linear form, to be related to zero by `kind`
    pub fn difference(&self) -> SharespaceResult<LinearForm> {
        Ok(self.left.linearize()?.add(&self.right.linearize()?, -1.0))
    }
}

/// `sum(coef * var) + constant`, with at most one term per variable
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinearForm {
    pub terms: Vec<(Variable, f64)>,
    pub constant: f64,
}

impl LinearForm {
    pub fn constant(c: f64) -> Self {
        LinearForm { terms: Vec::new(), constant: c }
    }

    pub fn variable(v: Variable) -> Self {
        LinearForm { terms: vec![(v, 1.0)], constant: 0.0 }
    }

    pub fn is_constant(&self) -> bool {
        self.terms.iter().all(|(_, c)| *c == 0.0)
    }

    /// `self + factor * other`
    pub fn add(mut self, other: &LinearForm, factor: f64) -> Self {
        for (var, coef) in &other.terms {
            match self.terms.iter_mut().find(|(v, _)| v == var) {
                Some((_, c)) => *c += factor * coef,
                None => self.terms.push((*var, factor * coef)),
            }
        }
        self.constant += factor * other.constant;
        self
    }

    pub fn scale(mut self, factor: f64) -> Self {
        for (_, c) in &mut self.terms {
            *c *= factor;
        }
        self.constant *= factor;
        self
    }

    pub fn coefficient(&self, var: Variable) -> f64 {
        self.terms.iter().find(|(v, _)| *v == var).map(|(_, c)| *c).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linearize_expression() {
        // 2 * exec + prep - 3
        let value = Value::constant(2.0)
            .times(Value::var(Variable::EXECUTION))
            .plus(Value::var(Variable::PREPARATION))
            .minus(Value::constant(3.0));
        let form = value.linearize().unwrap();
        assert_eq!(form.coefficient(Variable::EXECUTION), 2.0);
        assert_eq!(form.coefficient(Variable::PREPARATION), 1.0);
        assert_eq!(form.constant, -3.0);
    }

    #[test]
    fn test_linearize_merges_terms() {
        let value = Value::var(Variable::EXECUTION).minus(Value::var(Variable::EXECUTION));
        let form = value.linearize().unwrap();
        assert!(form.is_constant());
    }

    #[test]
    fn test_nonlinear_rejected() {
        let value = Value::var(Variable::EXECUTION).times(Value::var(Variable::PREPARATION));
        assert!(matches!(value.linearize(), Err(SharespaceError::NonLinearCondition)));
    }

    #[test]
    fn test_at_least_difference() {
        // exec >= 2  ->  2 - exec <= 0
        let cond = TimeCondition::at_least(Value::var(Variable::EXECUTION), Value::constant(2.0));
        assert_eq!(cond.kind, BoundKind::SmallerEqual);
        let diff = cond.difference().unwrap();
        assert_eq!(diff.coefficient(Variable::EXECUTION), -1.0);
        assert_eq!(diff.constant, 2.0);
    }

    #[test]
    fn test_condition_json() {
        let cond = TimeCondition::at_most(Value::var(Variable::continuous(3)), Value::constant(1.5));
        let json = serde_json::to_string(&cond).unwrap();
        let back: TimeCondition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cond);
    }
}
