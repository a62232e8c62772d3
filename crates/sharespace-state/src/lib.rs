//! Sharespace State - Rotational arrangement of participants
//!
//! This crate implements the rotational state machine:
//! - Eight rotational slots with a global rotation offset
//! - Focus and the three-step switch maneuver
//! - Generator positions handed to the area partitioner
//! - Even-layout checks and new-participant slot assignment

pub mod positions;
pub mod machine;
pub mod placement;

pub use positions::*;
pub use machine::*;
pub use placement::*;

/// Number of rotational slots around the shared area
pub const NUM_SLOTS: usize = 8;

/// Generator positions per participant
pub const NUM_GENERATORS: usize = 4;

/// Wrap-around distance between two slots
#[inline]
pub fn slot_distance(a: usize, b: usize) -> usize {
    let d = (a as i32 - b as i32).rem_euclid(NUM_SLOTS as i32) as usize;
    d.min(NUM_SLOTS - d)
}

/// Slot shifted by a signed offset, wrapped into 0..8
#[inline]
pub fn wrap_slot(slot: i32) -> usize {
    slot.rem_euclid(NUM_SLOTS as i32) as usize
}
