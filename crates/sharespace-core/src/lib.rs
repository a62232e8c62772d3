//! Sharespace Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every part of the arbitration engine:
//! - Identifiers (ParticipantId, StateId, EventId)
//! - Turn clock
//! - Geometry primitives and the area partitioner interface
//! - System transitions, local moves and visual states
//! - Votes, candidate transitions and timing conditions
//! - Wire messages exchanged with participants

pub mod id;
pub mod time;
pub mod geometry;
pub mod transition;
pub mod condition;
pub mod vote;
pub mod message;
pub mod error;

pub use id::*;
pub use time::*;
pub use geometry::*;
pub use transition::*;
pub use condition::*;
pub use vote::*;
pub use message::*;
pub use error::*;
