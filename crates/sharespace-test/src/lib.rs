//! Sharespace Test Harness - Scenario driving and reference collaborators
//!
//! This crate provides:
//! - A clipped Voronoi area partitioner
//! - A turn-by-turn scenario harness over the orchestrator
//! - Seeded ballot generation for randomized sessions

pub mod partitioner;
pub mod harness;
pub mod ballots;

pub use partitioner::*;
pub use harness::*;
pub use ballots::*;
