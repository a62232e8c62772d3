//! Placement of joining participants and removal of leaving ones

use sharespace_core::{SharespaceError, SharespaceResult};
use tracing::debug;

use crate::{slot_distance, RotationalStateMachine, NUM_SLOTS};

/// Pick a base slot for a new participant given the occupied base slots.
///
/// Prefers free slots whose two neighbours are free as well. The first
/// participant takes the lowest such slot; later ones must match the parity
/// of the existing occupants and maximize the minimum wrap-around distance to
/// them. Returns `None` when no parity-matching slot is free.
pub fn choose_slot(occupied: &[usize]) -> Option<usize> {
    let is_free = |s: usize| !occupied.contains(&(s % NUM_SLOTS));
    let free: Vec<usize> = (0..NUM_SLOTS).filter(|s| is_free(*s)).collect();
    let buffered: Vec<usize> = free
        .iter()
        .copied()
        .filter(|s| is_free(s + 1) && is_free(s + NUM_SLOTS - 1))
        .collect();

    let Some(first) = occupied.first() else {
        return buffered.first().or(free.first()).copied();
    };

    let parity = first % 2;
    let matching: Vec<usize> = buffered.iter().copied().filter(|s| s % 2 == parity).collect();
    let pool = if matching.is_empty() {
        free.iter().copied().filter(|s| s % 2 == parity).collect()
    } else {
        matching
    };

    let mut best: Option<(usize, usize)> = None;
    for slot in pool {
        let spread = occupied.iter().map(|o| slot_distance(slot, *o)).min().unwrap_or(NUM_SLOTS);
        if best.map_or(true, |(_, d)| spread > d) {
            best = Some((slot, spread));
        }
    }
    best.map(|(slot, _)| slot)
}

impl RotationalStateMachine {
    /// Place a new participant and return its participant number
    pub fn add_participant(&mut self) -> SharespaceResult<usize> {
        let slot = choose_slot(self.base_slots()).ok_or(SharespaceError::ArrangementFull)?;
        let slots = self.base_slots_mut();
        slots.push(slot);
        let participant = slots.len() - 1;
        debug!(participant, slot, "placed participant");
        Ok(participant)
    }

    /// Remove participants by number. Later participants shift down.
    pub fn remove_participants(&mut self, participants: &[usize]) -> SharespaceResult<()> {
        let mut ordered = participants.to_vec();
        ordered.sort_unstable_by(|a, b| b.cmp(a));
        ordered.dedup();
        let slots = self.base_slots_mut();
        if let Some(out_of_range) = ordered.iter().find(|p| **p >= slots.len()) {
            return Err(SharespaceError::ParticipantOutOfRange(*out_of_range));
        }
        for participant in ordered {
            slots.remove(participant);
        }
        Ok(())
    }
}
