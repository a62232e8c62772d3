//! Sharespace Vote - From participant proposals to one selected transition
//!
//! This crate implements the decision half of a turn:
//! - Aggregation of per-participant proposals into candidate transitions
//! - Asymmetric rotation synthesis for small groups
//! - Policy filters (required votes, even layout, allowed mask, actors, script)
//! - Selection mechanisms, with a rolling fairness history by default

pub mod aggregate;
pub mod filter;
pub mod history;
pub mod selection;
pub mod mechanisms;

pub use aggregate::*;
pub use filter::*;
pub use history::*;
pub use selection::*;
pub use mechanisms::*;
