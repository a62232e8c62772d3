//! Alternative selection mechanisms without fairness history

use sharespace_core::{CandidateTransition, SystemTransition};

use crate::SelectionMechanism;

fn mean_normalized(candidate: &CandidateTransition) -> f64 {
    if candidate.votes.is_empty() {
        return 0.0;
    }
    let sum: f64 = candidate.votes.iter().map(|v| v.as_ref().map_or(0.0, |v| v.normalized)).sum();
    sum / candidate.votes.len() as f64
}

/// Highest mean normalized value wins, if it is positive
#[derive(Clone, Debug, Default)]
pub struct MaximumAverageSelection;

impl SelectionMechanism for MaximumAverageSelection {
    fn name(&self) -> &'static str {
        "maximum-average"
    }

    fn add_participant(&mut self) {}

    fn remove_participant(&mut self, _participant: usize) {}

    fn set_priorities(&mut self, _priorities: &[f64]) {}

    fn select_best(&mut self, candidates: &[CandidateTransition]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, candidate) in candidates.iter().enumerate().filter(|(_, c)| c.is_complete()) {
            let value = mean_normalized(candidate);
            if value > 0.0 && best.map_or(true, |(_, v)| value > v) {
                best = Some((i, value));
            }
        }
        best.map(|(i, _)| i)
    }

    fn commit(&mut self, _selected: &CandidateTransition) {}

    fn reset(&mut self) {}
}

/// Follows a fixed sequence of transitions regardless of values
#[derive(Clone, Debug)]
pub struct ChoreographySelection {
    sequence: Vec<SystemTransition>,
    cursor: usize,
}

impl ChoreographySelection {
    pub fn new(sequence: Vec<SystemTransition>) -> Self {
        ChoreographySelection { sequence, cursor: 0 }
    }

    pub fn next_transition(&self) -> Option<SystemTransition> {
        self.sequence.get(self.cursor).copied()
    }
}

impl Default for ChoreographySelection {
    fn default() -> Self {
        ChoreographySelection::new(vec![
            SystemTransition::RotateRight,
            SystemTransition::RotateRight,
            SystemTransition::RotateRight,
            SystemTransition::RotateLeft,
        ])
    }
}

impl SelectionMechanism for ChoreographySelection {
    fn name(&self) -> &'static str {
        "choreography"
    }

    fn add_participant(&mut self) {}

    fn remove_participant(&mut self, _participant: usize) {}

    fn set_priorities(&mut self, _priorities: &[f64]) {}

    fn select_best(&mut self, candidates: &[CandidateTransition]) -> Option<usize> {
        let next = self.next_transition()?;
        candidates.iter().position(|c| c.transition == next && c.is_complete())
    }

    fn commit(&mut self, _selected: &CandidateTransition) {
        if !self.sequence.is_empty() {
            self.cursor = (self.cursor + 1) % self.sequence.len();
        }
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

/// One participant decides alone for a term of four rounds, then the next
#[derive(Clone, Debug, Default)]
pub struct RotatingDictatorSelection {
    participants: usize,
    round: usize,
}

impl RotatingDictatorSelection {
    pub const TERM: usize = 4;

    pub fn dictator(&self) -> Option<usize> {
        (self.participants > 0).then(|| ((self.round + 1) / Self::TERM) % self.participants)
    }
}

impl SelectionMechanism for RotatingDictatorSelection {
    fn name(&self) -> &'static str {
        "rotating-dictator"
    }

    fn add_participant(&mut self) {
        self.participants += 1;
    }

    fn remove_participant(&mut self, _participant: usize) {
        self.participants = self.participants.saturating_sub(1);
    }

    fn set_priorities(&mut self, _priorities: &[f64]) {}

    fn prepare(&mut self, candidates: &mut [CandidateTransition]) {
        crate::normalize(candidates);
        self.round += 1;
    }

    fn select_best(&mut self, candidates: &[CandidateTransition]) -> Option<usize> {
        let dictator = self.dictator()?;
        let mut best: Option<(usize, f64)> = None;
        for (i, candidate) in candidates.iter().enumerate().filter(|(_, c)| c.is_complete()) {
            let value = candidate.votes.get(dictator)?.as_ref().map_or(0.0, |v| v.normalized);
            if value > 0.0 && best.map_or(true, |(_, v)| value > v) {
                best = Some((i, value));
            }
        }
        best.map(|(i, _)| i)
    }

    fn commit(&mut self, _selected: &CandidateTransition) {}

    fn reset(&mut self) {
        self.round = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharespace_core::{LocalMove, ParticipantVote};

    fn candidate(t: SystemTransition, values: &[f64]) -> CandidateTransition {
        let mut c = CandidateTransition::new(t, values.len());
        for (p, value) in values.iter().enumerate() {
            c.add_vote(p, &ParticipantVote::new(LocalMove::Stay, *value), false);
        }
        c
    }

    #[test]
    fn test_maximum_average() {
        let mut s = MaximumAverageSelection;
        let mut candidates = vec![
            candidate(SystemTransition::Stay, &[1.0, 0.2]),
            candidate(SystemTransition::RotateLeft, &[0.5, 1.0]),
        ];
        s.prepare(&mut candidates);
        assert_eq!(s.select_best(&candidates), Some(1));

        let mut zero = vec![candidate(SystemTransition::Stay, &[0.0, 0.0])];
        s.prepare(&mut zero);
        assert_eq!(s.select_best(&zero), None);
    }

    #[test]
    fn test_choreography_cycles() {
        let mut s = ChoreographySelection::default();
        let candidates = vec![
            candidate(SystemTransition::RotateLeft, &[1.0]),
            candidate(SystemTransition::RotateRight, &[1.0]),
        ];
        let mut picked = Vec::new();
        for _ in 0..5 {
            let i = s.select_best(&candidates).unwrap();
            picked.push(candidates[i].transition);
            s.commit(&candidates[i]);
        }
        assert_eq!(
            picked,
            vec![
                SystemTransition::RotateRight,
                SystemTransition::RotateRight,
                SystemTransition::RotateRight,
                SystemTransition::RotateLeft,
                SystemTransition::RotateRight,
            ]
        );
    }

    #[test]
    fn test_dictator_rotation() {
        let mut s = RotatingDictatorSelection::default();
        s.add_participant();
        s.add_participant();
        let mut candidates = vec![
            candidate(SystemTransition::Stay, &[1.0, 0.1]),
            candidate(SystemTransition::RotateLeft, &[0.1, 1.0]),
        ];
        // rounds 1 and 2 belong to participant 0
        s.prepare(&mut candidates);
        assert_eq!(s.dictator(), Some(0));
        assert_eq!(s.select_best(&candidates), Some(0));
        for _ in 0..3 {
            s.prepare(&mut candidates);
        }
        // round 4: (4 + 1) / 4 = 1
        assert_eq!(s.dictator(), Some(1));
        assert_eq!(s.select_best(&candidates), Some(1));
    }
}
