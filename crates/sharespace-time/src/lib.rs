//! Sharespace Time - When a selected transition happens
//!
//! This crate implements the timing half of a turn:
//! - Timing negotiation behind the [`TimingNegotiator`] trait
//! - Condition negotiation over linear timing constraints (default)
//! - Bucket matching of discrete (planning, execution) options
//! - Tick synchronization across participant cadences

pub mod negotiator;
pub mod condition;
pub mod bucket;
pub mod ticks;
pub mod error;

pub use negotiator::*;
pub use condition::*;
pub use bucket::*;
pub use ticks::*;
pub use error::*;
