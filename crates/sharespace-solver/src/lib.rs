//! Sharespace Solver - Linear and mixed-integer model solving
//!
//! Timing negotiation and tick synchronization describe their problems as a
//! [`LinearModel`] and hand it to a [`LinearSolver`]:
//! - Models hold continuous and integer variables with bounds
//! - Constraints are `<=`, `>=`, `==` and `!=`
//! - [`BranchAndBound`] solves LP relaxations and branches on integrality
//!   and disequalities, within a node limit

pub mod model;
pub mod relaxation;
pub mod branch;
pub mod error;

pub use model::*;
pub use branch::*;
pub use error::*;

/// Solves a linear model to an optimal (or best found) assignment
pub trait LinearSolver: Send + Sync {
    fn solve(&self, model: &LinearModel) -> SolveResult<Assignment>;
}
