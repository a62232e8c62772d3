//! Rotational state machine
//!
//! The arrangement stores a base slot per participant plus a global
//! rotation. A participant's absolute slot is `(base + rotation) mod 8`.
//! Focus is held on an absolute slot, always an even one.

use sharespace_core::{
    LocalMove, Point, SharespaceError, SharespaceResult, StateId, SystemTransition, VisualState,
};
use tracing::trace;

use crate::{wrap_slot, StatePositions, NUM_GENERATORS, NUM_SLOTS};

/// Arrangement of participants around the shared area
#[derive(Clone, Debug, PartialEq)]
pub struct RotationalStateMachine {
    /// Base slot per participant number
    slots: Vec<usize>,
    rotation: usize,
    /// Absolute slot holding the focus
    focus: Option<usize>,
    /// Progress of a running switch (0 when idle)
    switch_step: u8,
    state_id: StateId,
    positions: StatePositions,
}

impl RotationalStateMachine {
    pub fn new(positions: StatePositions) -> Self {
        RotationalStateMachine {
            slots: Vec::new(),
            rotation: 0,
            focus: None,
            switch_step: 0,
            state_id: StateId::ZERO,
            positions,
        }
    }

    #[inline]
    pub fn state_id(&self) -> StateId {
        self.state_id
    }

    #[inline]
    pub fn num_participants(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn rotation(&self) -> usize {
        self.rotation
    }

    #[inline]
    pub fn focus(&self) -> Option<usize> {
        self.focus
    }

    #[inline]
    pub fn is_focused(&self) -> bool {
        self.focus.is_some()
    }

    /// Whether a multi-step switch is in progress
    #[inline]
    pub fn in_switch(&self) -> bool {
        self.switch_step != 0
    }

    pub fn positions(&self) -> &StatePositions {
        &self.positions
    }

    /// Base slots by participant number
    pub fn base_slots(&self) -> &[usize] {
        &self.slots
    }

    pub(crate) fn base_slots_mut(&mut self) -> &mut Vec<usize> {
        &mut self.slots
    }

    /// Absolute slot of a participant
    pub fn absolute_slot(&self, participant: usize) -> SharespaceResult<usize> {
        self.slots
            .get(participant)
            .map(|base| (base + self.rotation) % NUM_SLOTS)
            .ok_or(SharespaceError::ParticipantOutOfRange(participant))
    }

    /// Absolute slots of all participants, by participant number
    pub fn absolute_slots(&self) -> Vec<usize> {
        self.slots.iter().map(|base| (base + self.rotation) % NUM_SLOTS).collect()
    }

    fn participant_at(&self, absolute: usize) -> Option<usize> {
        self.slots
            .iter()
            .position(|base| (base + self.rotation) % NUM_SLOTS == absolute % NUM_SLOTS)
    }

    /// Apply one step of a system transition.
    ///
    /// Returns true while the transition needs further steps. Only the final
    /// step increments the state id.
    pub fn apply(&mut self, transition: SystemTransition, moves: &[LocalMove]) -> SharespaceResult<bool> {
        let intermediate = match transition {
            SystemTransition::Stay
            | SystemTransition::RotateLeft
            | SystemTransition::RotateRight
            | SystemTransition::Rotate45Left
            | SystemTransition::Rotate45Right => {
                let offset = transition.rotation_offset().unwrap_or(0);
                self.rotation = wrap_slot(self.rotation as i32 + offset);
                false
            }
            SystemTransition::Focus1
            | SystemTransition::Focus2
            | SystemTransition::Focus3
            | SystemTransition::Focus4 => {
                let quarter = transition.focus_index().unwrap_or(0);
                self.focus = Some(quarter * 2);
                false
            }
            SystemTransition::Unfocus => {
                self.focus = None;
                false
            }
            SystemTransition::Switch1
            | SystemTransition::Switch2
            | SystemTransition::Switch3
            | SystemTransition::Switch4 => {
                let target = transition.switch_index().unwrap_or(0) * 2;
                self.step_switch(target)
            }
            SystemTransition::AssymmetricRotation => {
                self.rotate_individually(moves)?;
                false
            }
        };

        if !intermediate {
            self.state_id = self.state_id.next();
        }
        trace!(
            %transition,
            intermediate,
            rotation = self.rotation,
            focus = ?self.focus,
            state_id = %self.state_id,
            "applied transition"
        );
        Ok(intermediate)
    }

    fn step_switch(&mut self, target: usize) -> bool {
        match self.switch_step {
            0 => {
                self.focus = Some(target);
                self.switch_step = 1;
                true
            }
            1 => {
                let from = self.focus.unwrap_or(target);
                let to = (from + 2) % NUM_SLOTS;
                let first = self.participant_at(from);
                let second = self.participant_at(to);
                if let Some(p) = first {
                    self.slots[p] = wrap_slot(to as i32 - self.rotation as i32);
                }
                if let Some(q) = second {
                    self.slots[q] = wrap_slot(from as i32 - self.rotation as i32);
                }
                self.focus = Some(to);
                self.switch_step = 2;
                true
            }
            _ => {
                self.focus = None;
                self.switch_step = 0;
                false
            }
        }
    }

    fn rotate_individually(&mut self, moves: &[LocalMove]) -> SharespaceResult<()> {
        if moves.len() != self.slots.len() {
            return Err(SharespaceError::MoveCountMismatch {
                expected: self.slots.len(),
                actual: moves.len(),
            });
        }
        for (base, mv) in self.slots.iter_mut().zip(moves) {
            let absolute = (*base + self.rotation) as i32 + mv.slot_offset().unwrap_or(0);
            *base = wrap_slot(absolute - self.rotation as i32);
        }
        Ok(())
    }

    /// Current visual state and legal local moves of a participant
    pub fn candidate_options(&self, participant: usize) -> SharespaceResult<(VisualState, Vec<LocalMove>)> {
        let absolute = self.absolute_slot(participant)?;
        let options = match self.focus {
            Some(focus) if focus == absolute => {
                (VisualState::Focused, vec![LocalMove::Unfocus, LocalMove::Stay])
            }
            Some(_) => (VisualState::Defocused, vec![LocalMove::Undefocus, LocalMove::Stay]),
            None => {
                let mut moves = LocalMove::ROTATIONAL.to_vec();
                if absolute % 2 == 0 {
                    moves.extend_from_slice(&LocalMove::FOCUS_ELIGIBLE);
                }
                (VisualState::for_slot(absolute), moves)
            }
        };
        Ok(options)
    }

    /// Visual state of a participant
    pub fn visual_state(&self, participant: usize) -> SharespaceResult<VisualState> {
        Ok(self.candidate_options(participant)?.0)
    }

    /// The participant's own generator followed by three phantom generators
    pub fn positions_for(&self, participant: usize) -> SharespaceResult<[Point; NUM_GENERATORS]> {
        let absolute = self.absolute_slot(participant)?;
        let mut generators = [Point::ZERO; NUM_GENERATORS];
        for (g, generator) in generators.iter_mut().enumerate() {
            let slot = (absolute + 2 * g) % NUM_SLOTS;
            *generator = match self.focus {
                None => self.positions.regular[slot],
                Some(focus) if focus == slot => {
                    if self.in_switch() {
                        self.positions.switch_focus[slot / 2]
                    } else {
                        self.positions.focus[slot / 2]
                    }
                }
                Some(_) => self.positions.defocus[slot / 2],
            };
        }
        Ok(generators)
    }

    /// Generator positions of every participant
    pub fn all_positions(&self) -> SharespaceResult<Vec<[Point; NUM_GENERATORS]>> {
        (0..self.slots.len()).map(|p| self.positions_for(p)).collect()
    }

    /// Positions a participant would have after its own local move,
    /// applied from its point of view
    pub fn preview(&self, participant: usize, mv: LocalMove) -> SharespaceResult<[Point; NUM_GENERATORS]> {
        let absolute = self.absolute_slot(participant)?;
        let mut future = self.clone();
        match mv {
            LocalMove::Stay => {}
            LocalMove::Focus => future.focus = Some(absolute - absolute % 2),
            LocalMove::Defocus => future.focus = Some((absolute - absolute % 2 + 2) % NUM_SLOTS),
            LocalMove::Unfocus | LocalMove::Undefocus => future.focus = None,
            LocalMove::SwitchLeft => future.rotation = wrap_slot(future.rotation as i32 + 2),
            LocalMove::SwitchRight => future.rotation = wrap_slot(future.rotation as i32 - 2),
            rotational => {
                let offset = rotational.slot_offset().unwrap_or(0);
                future.rotation = wrap_slot(future.rotation as i32 + offset);
            }
        }
        future.switch_step = 0;
        future.positions_for(participant)
    }

    /// All occupied slots share parity
    pub fn is_even(&self) -> bool {
        Self::same_parity(self.slots.iter().copied())
    }

    /// Would the layout stay even after each participant moved by its
    /// own rotational move
    pub fn is_even_after(&self, moves: &[LocalMove]) -> bool {
        Self::same_parity(self.slots.iter().enumerate().map(|(p, base)| {
            let offset = moves.get(p).and_then(|m| m.slot_offset()).unwrap_or(0);
            wrap_slot(*base as i32 + offset)
        }))
    }

    fn same_parity(mut slots: impl Iterator<Item = usize>) -> bool {
        match slots.next() {
            None => true,
            Some(first) => slots.all(|s| s % 2 == first % 2),
        }
    }

    /// Clear rotation, focus and switch progress. Slot ownership and the
    /// state id are preserved; the reset itself counts as a new state.
    pub fn reset(&mut self) {
        self.rotation = 0;
        self.focus = None;
        self.switch_step = 0;
        self.state_id = self.state_id.next();
    }
}

impl Default for RotationalStateMachine {
    fn default() -> Self {
        RotationalStateMachine::new(StatePositions::default())
    }
}
