//! System transitions, local moves and visual states
//!
//! A system transition changes the whole arrangement. A local move is the
//! same change seen from one participant's point of view.

use std::fmt;

use serde::{Deserialize, Serialize};

/// System-level transition of the shared arrangement
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SystemTransition {
    Stay = 0,
    RotateLeft = 1,
    RotateRight = 2,
    Rotate45Left = 3,
    Rotate45Right = 4,
    Focus1 = 5,
    Focus2 = 6,
    Focus3 = 7,
    Focus4 = 8,
    Unfocus = 9,
    Switch1 = 10,
    Switch2 = 11,
    Switch3 = 12,
    Switch4 = 13,
    /// Every participant rotates independently by its own local move
    AssymmetricRotation = 14,
}

impl SystemTransition {
    pub const ALL: [SystemTransition; 15] = [
        SystemTransition::Stay,
        SystemTransition::RotateLeft,
        SystemTransition::RotateRight,
        SystemTransition::Rotate45Left,
        SystemTransition::Rotate45Right,
        SystemTransition::Focus1,
        SystemTransition::Focus2,
        SystemTransition::Focus3,
        SystemTransition::Focus4,
        SystemTransition::Unfocus,
        SystemTransition::Switch1,
        SystemTransition::Switch2,
        SystemTransition::Switch3,
        SystemTransition::Switch4,
        SystemTransition::AssymmetricRotation,
    ];

    pub const FOCUS: [SystemTransition; 4] = [
        SystemTransition::Focus1,
        SystemTransition::Focus2,
        SystemTransition::Focus3,
        SystemTransition::Focus4,
    ];

    pub const SWITCH: [SystemTransition; 4] = [
        SystemTransition::Switch1,
        SystemTransition::Switch2,
        SystemTransition::Switch3,
        SystemTransition::Switch4,
    ];

    /// Mask with every transition allowed
    pub const ALL_MASK: u32 = (1 << 15) - 1;

    pub fn from_byte(b: u8) -> Option<Self> {
        SystemTransition::ALL.get(b as usize).copied()
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Bit of this transition in an allowed-transitions mask
    #[inline]
    pub fn bit(self) -> u32 {
        1 << (self as u8)
    }

    #[inline]
    pub fn is_allowed_by(self, mask: u32) -> bool {
        mask & self.bit() != 0
    }

    /// Focus quarter (0..4) for `FocusN`
    pub fn focus_index(self) -> Option<usize> {
        SystemTransition::FOCUS.iter().position(|t| *t == self)
    }

    /// Switch quarter (0..4) for `SwitchN`
    pub fn switch_index(self) -> Option<usize> {
        SystemTransition::SWITCH.iter().position(|t| *t == self)
    }

    /// Minimum number of actors a candidate of this kind needs
    pub fn min_actors(self) -> usize {
        if self.switch_index().is_some() {
            2
        } else {
            0
        }
    }

    /// Rotation offset for symmetric rotations
    pub fn rotation_offset(self) -> Option<i32> {
        match self {
            SystemTransition::Stay => Some(0),
            SystemTransition::RotateLeft => Some(2),
            SystemTransition::RotateRight => Some(-2),
            SystemTransition::Rotate45Left => Some(1),
            SystemTransition::Rotate45Right => Some(-1),
            _ => None,
        }
    }
}

impl fmt::Display for SystemTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Participant-centric move
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalMove {
    Stay,
    RotateLeft,
    RotateRight,
    Rotate45Left,
    Rotate45Right,
    /// Take the centre of the area
    Focus,
    /// Give the centre to someone else
    Defocus,
    /// Leave the centre
    Unfocus,
    /// Grow back after someone else leaves the centre
    Undefocus,
    SwitchLeft,
    SwitchRight,
}

impl LocalMove {
    /// Moves that rotate (or hold) without touching focus
    pub const ROTATIONAL: [LocalMove; 5] = [
        LocalMove::RotateLeft,
        LocalMove::RotateRight,
        LocalMove::Rotate45Left,
        LocalMove::Rotate45Right,
        LocalMove::Stay,
    ];

    /// Moves only available on focus-eligible slots
    pub const FOCUS_ELIGIBLE: [LocalMove; 4] = [
        LocalMove::Focus,
        LocalMove::Defocus,
        LocalMove::SwitchLeft,
        LocalMove::SwitchRight,
    ];

    /// Slot offset of a rotational move
    pub fn slot_offset(self) -> Option<i32> {
        match self {
            LocalMove::Stay => Some(0),
            LocalMove::RotateLeft => Some(2),
            LocalMove::RotateRight => Some(-2),
            LocalMove::Rotate45Left => Some(1),
            LocalMove::Rotate45Right => Some(-1),
            _ => None,
        }
    }

    #[inline]
    pub fn is_rotational(self) -> bool {
        self.slot_offset().is_some()
    }

    /// Matching symmetric system transition for rotational moves
    pub fn as_rotation(self) -> Option<SystemTransition> {
        match self {
            LocalMove::Stay => Some(SystemTransition::Stay),
            LocalMove::RotateLeft => Some(SystemTransition::RotateLeft),
            LocalMove::RotateRight => Some(SystemTransition::RotateRight),
            LocalMove::Rotate45Left => Some(SystemTransition::Rotate45Left),
            LocalMove::Rotate45Right => Some(SystemTransition::Rotate45Right),
            _ => None,
        }
    }
}

/// Shape of a participant's area as seen by that participant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisualState {
    Up,
    UpRight,
    Right,
    DownRight,
    Down,
    DownLeft,
    Left,
    UpLeft,
    /// Holding the centre
    Focused,
    /// Pushed to a corner while someone else holds the centre
    Defocused,
}

impl VisualState {
    const REGULAR: [VisualState; 8] = [
        VisualState::Up,
        VisualState::UpRight,
        VisualState::Right,
        VisualState::DownRight,
        VisualState::Down,
        VisualState::DownLeft,
        VisualState::Left,
        VisualState::UpLeft,
    ];

    /// Regular visual state for an absolute slot
    pub fn for_slot(slot: usize) -> VisualState {
        VisualState::REGULAR[slot % 8]
    }
}
