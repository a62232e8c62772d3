//! Turn clock
//!
//! The orchestrator advances in fixed turns. Timing data from participants
//! arrives in milliseconds or seconds relative to the orchestrator epoch and
//! is converted to turns here.

use std::time::Duration;

/// Turn index since the orchestrator epoch
pub type Turn = i64;

/// End turn of a held event that has not been closed yet
pub const OPEN_END: Turn = Turn::MAX;

/// Conversion between turns and wall time
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TurnClock {
    turn_ms: f64,
}

impl TurnClock {
    pub fn new(turn_period: Duration) -> Self {
        let turn_ms = (turn_period.as_secs_f64() * 1000.0).max(1.0);
        TurnClock { turn_ms }
    }

    /// Clock for a target turn rate in Hz
    pub fn from_rate(hz: u32) -> Self {
        TurnClock::new(Duration::from_secs_f64(1.0 / hz.max(1) as f64))
    }

    #[inline]
    pub fn turn_ms(&self) -> f64 {
        self.turn_ms
    }

    #[inline]
    pub fn turn_period(&self) -> Duration {
        Duration::from_secs_f64(self.turn_ms / 1000.0)
    }

    /// Number of whole turns covering `ms`, rounded to nearest
    #[inline]
    pub fn ms_to_turns(&self, ms: f64) -> Turn {
        (ms / self.turn_ms).round() as Turn
    }

    #[inline]
    pub fn turns_to_ms(&self, turns: Turn) -> f64 {
        turns as f64 * self.turn_ms
    }

    #[inline]
    pub fn seconds_at(&self, turn: Turn) -> f64 {
        self.turns_to_ms(turn) / 1000.0
    }

    #[inline]
    pub fn turn_at_seconds(&self, seconds: f64) -> Turn {
        self.ms_to_turns(seconds * 1000.0)
    }
}

impl Default for TurnClock {
    fn default() -> Self {
        TurnClock::from_rate(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rate() {
        let clock = TurnClock::default();
        assert!((clock.turn_ms() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_conversions() {
        let clock = TurnClock::new(Duration::from_millis(20));
        assert_eq!(clock.ms_to_turns(360.0), 18);
        assert_eq!(clock.ms_to_turns(1000.0), 50);
        assert_eq!(clock.ms_to_turns(29.0), 1);
        assert!((clock.seconds_at(50) - 1.0).abs() < 1e-9);
        assert_eq!(clock.turn_at_seconds(2.0), 100);
    }
}
