//! Error types for the arbitration engine

use thiserror::Error;

/// Geometry collaborator failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Degenerate generator set: {0}")]
    Degenerate(String),

    #[error("Generator {0} has no cell")]
    MissingCell(usize),
}

/// Core engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SharespaceError {
    // Arrangement errors
    #[error("Arrangement is full")]
    ArrangementFull,

    #[error("Participant number {0} out of range")]
    ParticipantOutOfRange(usize),

    #[error("Expected {expected} local moves, got {actual}")]
    MoveCountMismatch { expected: usize, actual: usize },

    // Timing errors
    #[error("Timing condition is not linear")]
    NonLinearCondition,
}

/// Result type for engine operations
pub type SharespaceResult<T> = Result<T, SharespaceError>;
