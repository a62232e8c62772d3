//! Solver errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("Model is infeasible")]
    Infeasible,

    #[error("Objective is unbounded")]
    Unbounded,

    #[error("Node limit of {0} reached without a feasible assignment")]
    NodeLimit(usize),
}

pub type SolveResult<T> = Result<T, SolveError>;
