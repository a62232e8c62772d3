//! Timing error types

use sharespace_core::SharespaceError;
use sharespace_solver::SolveError;
use thiserror::Error;

/// Why a candidate's timing could not be resolved
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TimingError {
    // Model construction
    #[error("Invalid timing condition: {0}")]
    Condition(#[from] SharespaceError),

    // Solving
    #[error("Solver failed: {0}")]
    Solve(#[from] SolveError),

    // Bucket matching
    #[error("No timing options submitted")]
    NoOptions,

    #[error("No bucket holds every participant")]
    NoCommonBucket,

    // Ticks
    #[error("Participant {participant} has {have} tick intervals, needs {need}")]
    NotEnoughTicks { participant: usize, have: usize, need: usize },
}

pub type TimingResult<T> = std::result::Result<T, TimingError>;
