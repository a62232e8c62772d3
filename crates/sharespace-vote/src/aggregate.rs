//! Vote aggregation
//!
//! Each participant proposes local moves. A local move maps onto one or more
//! system transitions depending on where the participant sits; the result is
//! one candidate per system transition with one slot per participant.

use sharespace_core::{CandidateTransition, LocalMove, ParticipantVote, SystemTransition};
use sharespace_state::{slot_distance, wrap_slot, RotationalStateMachine, NUM_SLOTS};
use tracing::{debug, warn};

/// Proposals of one participant for the current turn
#[derive(Clone, Debug, PartialEq)]
pub struct Ballot {
    /// Participant number
    pub participant: usize,
    pub proposals: Vec<ParticipantVote>,
}

impl Ballot {
    pub fn new(participant: usize, proposals: Vec<ParticipantVote>) -> Self {
        Ballot { participant, proposals }
    }
}

/// Candidate order while no focus is held
const UNFOCUSED_ORDER: [SystemTransition; 13] = [
    SystemTransition::Focus1,
    SystemTransition::Focus2,
    SystemTransition::Focus3,
    SystemTransition::Focus4,
    SystemTransition::RotateLeft,
    SystemTransition::RotateRight,
    SystemTransition::Rotate45Left,
    SystemTransition::Rotate45Right,
    SystemTransition::Stay,
    SystemTransition::Switch1,
    SystemTransition::Switch2,
    SystemTransition::Switch3,
    SystemTransition::Switch4,
];

/// Builds candidate transitions from ballots
#[derive(Clone, Debug)]
pub struct VoteAggregator {
    /// Asymmetric rotations are synthesized below this participant count
    pub asymmetric_below: usize,
}

impl Default for VoteAggregator {
    fn default() -> Self {
        VoteAggregator { asymmetric_below: 4 }
    }
}

impl VoteAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(&self, machine: &RotationalStateMachine, ballots: &[Ballot]) -> Vec<CandidateTransition> {
        let n = machine.num_participants();
        let ballots: Vec<&Ballot> = ballots
            .iter()
            .filter(|b| {
                let known = b.participant < n;
                if !known {
                    warn!(participant = b.participant, "ballot for unknown participant number");
                }
                known
            })
            .collect();

        if machine.is_focused() {
            return self.build_focused(n, &ballots);
        }

        let mut candidates: Vec<CandidateTransition> =
            UNFOCUSED_ORDER.iter().map(|t| CandidateTransition::new(*t, n)).collect();
        let mut rotational: Vec<Vec<ParticipantVote>> = vec![Vec::new(); n];
        let absolute = machine.absolute_slots();

        for ballot in &ballots {
            let p = ballot.participant;
            let own = absolute[p];
            for vote in &ballot.proposals {
                match vote.local_transition {
                    LocalMove::Focus => {
                        add(&mut candidates, SystemTransition::FOCUS[own / 2], p, vote, true);
                    }
                    LocalMove::Defocus => {
                        for (other, slot) in absolute.iter().enumerate() {
                            if other != p {
                                add(&mut candidates, SystemTransition::FOCUS[slot / 2], p, vote, false);
                            }
                        }
                        let next = ((own + 1) % NUM_SLOTS) / 2;
                        let next_next = ((own + 2) % NUM_SLOTS) / 2;
                        add(&mut candidates, SystemTransition::SWITCH[next], p, vote, false);
                        add(&mut candidates, SystemTransition::SWITCH[next_next], p, vote, false);
                    }
                    LocalMove::SwitchLeft => {
                        let target = ((own + 6) % NUM_SLOTS) / 2;
                        add(&mut candidates, SystemTransition::SWITCH[target], p, vote, true);
                    }
                    LocalMove::SwitchRight => {
                        add(&mut candidates, SystemTransition::SWITCH[own / 2], p, vote, true);
                    }
                    mv => match mv.as_rotation() {
                        Some(transition) => {
                            add(&mut candidates, transition, p, vote, false);
                            rotational[p].push(vote.clone());
                        }
                        None => {
                            warn!(participant = p, local_move = ?mv, "proposal not valid without focus");
                        }
                    },
                }
            }
        }

        if n < self.asymmetric_below {
            let asymmetric = synthesize_asymmetric(machine, &rotational);
            debug!(count = asymmetric.len(), "synthesized asymmetric rotations");
            candidates.extend(asymmetric);
        }
        candidates
    }

    fn build_focused(&self, n: usize, ballots: &[&Ballot]) -> Vec<CandidateTransition> {
        let mut candidates = vec![
            CandidateTransition::new(SystemTransition::Unfocus, n),
            CandidateTransition::new(SystemTransition::Stay, n),
        ];
        for ballot in ballots {
            for vote in &ballot.proposals {
                let transition = match vote.local_transition {
                    LocalMove::Unfocus | LocalMove::Undefocus => SystemTransition::Unfocus,
                    LocalMove::Stay => SystemTransition::Stay,
                    mv => {
                        warn!(participant = ballot.participant, local_move = ?mv, "proposal not valid while focused");
                        continue;
                    }
                };
                add(&mut candidates, transition, ballot.participant, vote, false);
            }
        }
        candidates
    }
}

fn add(
    candidates: &mut [CandidateTransition],
    transition: SystemTransition,
    participant: usize,
    vote: &ParticipantVote,
    actor: bool,
) {
    if let Some(candidate) = candidates.iter_mut().find(|c| c.transition == transition) {
        candidate.add_vote(participant, vote, actor);
    }
}

/// Enumerate combinations of individually chosen rotational moves.
///
/// Depth-first over participant numbers. A choice is kept only if it ends at
/// least two slots from every earlier participant's target, does not swap
/// places with one of them, and the whole combination keeps an even layout.
/// Combinations where everyone chose the same move are skipped since the
/// symmetric candidates already cover them.
pub fn synthesize_asymmetric(
    machine: &RotationalStateMachine,
    rotational: &[Vec<ParticipantVote>],
) -> Vec<CandidateTransition> {
    let n = machine.num_participants();
    if n == 0 || rotational.len() != n {
        return Vec::new();
    }
    let current = machine.absolute_slots();
    let mut chosen: Vec<&ParticipantVote> = Vec::with_capacity(n);
    let mut combinations = Vec::new();
    expand(&current, rotational, &mut chosen, &mut combinations);

    combinations
        .into_iter()
        .filter(|combo| {
            let moves: Vec<LocalMove> = combo.iter().map(|v| v.local_transition).collect();
            machine.is_even_after(&moves)
        })
        .map(|combo| {
            let mut candidate = CandidateTransition::new(SystemTransition::AssymmetricRotation, n);
            for (p, vote) in combo.into_iter().enumerate() {
                candidate.add_vote(p, &vote, false);
            }
            candidate
        })
        .collect()
}

fn target_slot(current: usize, vote: &ParticipantVote) -> usize {
    wrap_slot(current as i32 + vote.local_transition.slot_offset().unwrap_or(0))
}

fn expand<'a>(
    current: &[usize],
    rotational: &'a [Vec<ParticipantVote>],
    chosen: &mut Vec<&'a ParticipantVote>,
    out: &mut Vec<Vec<ParticipantVote>>,
) {
    let p = chosen.len();
    if p == current.len() {
        let first = chosen[0].local_transition;
        if chosen.iter().any(|v| v.local_transition != first) {
            out.push(chosen.iter().map(|v| (*v).clone()).collect());
        }
        return;
    }

    for vote in &rotational[p] {
        let mine = target_slot(current[p], vote);
        let valid = chosen.iter().enumerate().all(|(other, other_vote)| {
            let theirs = target_slot(current[other], other_vote);
            let crossed = mine == current[other] && current[p] == theirs;
            slot_distance(mine, theirs) >= 2 && !crossed
        });
        if valid {
            chosen.push(vote);
            expand(current, rotational, chosen, out);
            chosen.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(participants: usize) -> RotationalStateMachine {
        let mut m = RotationalStateMachine::default();
        for _ in 0..participants {
            m.add_participant().unwrap();
        }
        m
    }

    fn vote(mv: LocalMove, value: f64) -> ParticipantVote {
        ParticipantVote::new(mv, value)
    }

    fn find(candidates: &[CandidateTransition], t: SystemTransition) -> &CandidateTransition {
        candidates.iter().find(|c| c.transition == t).unwrap()
    }

    #[test]
    fn test_unfocused_candidate_set() {
        let m = machine(2);
        let candidates = VoteAggregator::new().build(&m, &[]);
        assert_eq!(candidates.len(), 13);
        assert!(candidates.iter().all(|c| c.votes.len() == 2 && !c.is_complete()));
    }

    #[test]
    fn test_focus_maps_to_own_quarter() {
        // participants at slots 0 and 4
        let m = machine(2);
        let ballots = [
            Ballot::new(0, vec![vote(LocalMove::Focus, 1.0)]),
            Ballot::new(1, vec![vote(LocalMove::Focus, 1.0)]),
        ];
        let candidates = VoteAggregator::new().build(&m, &ballots);
        let f1 = find(&candidates, SystemTransition::Focus1);
        assert_eq!(f1.local_move(0), Some(LocalMove::Focus));
        assert_eq!(f1.num_actors(), 1);
        let f3 = find(&candidates, SystemTransition::Focus3);
        assert_eq!(f3.local_move(1), Some(LocalMove::Focus));
    }

    #[test]
    fn test_defocus_supports_others() {
        let m = machine(2);
        let ballots = [
            Ballot::new(0, vec![vote(LocalMove::Focus, 1.0)]),
            Ballot::new(1, vec![vote(LocalMove::Defocus, 0.5)]),
        ];
        let candidates = VoteAggregator::new().build(&m, &ballots);
        let f1 = find(&candidates, SystemTransition::Focus1);
        assert!(f1.is_complete());
        assert_eq!(f1.num_actors(), 1);
        // participant 1 sits at slot 4: switch quarters (5/2) and (6/2)
        assert_eq!(find(&candidates, SystemTransition::Switch3).local_move(1), Some(LocalMove::Defocus));
        assert_eq!(find(&candidates, SystemTransition::Switch4).local_move(1), Some(LocalMove::Defocus));
        assert_eq!(find(&candidates, SystemTransition::Focus3).local_move(1), None);
    }

    #[test]
    fn test_switch_mapping() {
        let m = machine(2);
        let ballots = [
            Ballot::new(0, vec![vote(LocalMove::SwitchLeft, 1.0)]),
            Ballot::new(1, vec![vote(LocalMove::SwitchRight, 1.0)]),
        ];
        let candidates = VoteAggregator::new().build(&m, &ballots);
        // slot 0 + 6 -> quarter 3
        assert_eq!(find(&candidates, SystemTransition::Switch4).local_move(0), Some(LocalMove::SwitchLeft));
        // slot 4 -> quarter 2
        assert_eq!(find(&candidates, SystemTransition::Switch3).local_move(1), Some(LocalMove::SwitchRight));
    }

    #[test]
    fn test_focused_candidates() {
        let mut m = machine(2);
        m.apply(SystemTransition::Focus1, &[]).unwrap();
        let ballots = [
            Ballot::new(0, vec![vote(LocalMove::Unfocus, 1.0), vote(LocalMove::RotateLeft, 1.0)]),
            Ballot::new(1, vec![vote(LocalMove::Undefocus, 1.0), vote(LocalMove::Stay, 0.2)]),
        ];
        let candidates = VoteAggregator::new().build(&m, &ballots);
        assert_eq!(candidates.len(), 2);
        assert!(find(&candidates, SystemTransition::Unfocus).is_complete());
        assert!(!find(&candidates, SystemTransition::Stay).is_complete());
    }

    #[test]
    fn test_asymmetric_rotation_synthesis() {
        // slots 0 and 4
        let m = machine(2);
        let all = |p| {
            Ballot::new(p, LocalMove::ROTATIONAL.iter().map(|mv| vote(*mv, 1.0)).collect())
        };
        let candidates = VoteAggregator::new().build(&m, &[all(0), all(1)]);
        let asymmetric: Vec<_> = candidates
            .iter()
            .filter(|c| c.transition == SystemTransition::AssymmetricRotation)
            .collect();
        assert!(!asymmetric.is_empty());
        for c in &asymmetric {
            assert!(c.is_complete());
            let moves = c.local_moves();
            assert_ne!(moves[0], moves[1]);
            assert!(m.is_even_after(&moves));
            let a = wrap_slot(moves[0].slot_offset().unwrap());
            let b = wrap_slot(4 + moves[1].slot_offset().unwrap());
            assert!(slot_distance(a, b) >= 2);
        }
        // RotateLeft for 0 (to 2) with Stay for 1 (at 4)
        assert!(asymmetric
            .iter()
            .any(|c| c.local_moves() == vec![LocalMove::RotateLeft, LocalMove::Stay]));
        // odd and even mix is never offered
        assert!(!asymmetric
            .iter()
            .any(|c| c.local_moves() == vec![LocalMove::Rotate45Left, LocalMove::Stay]));
    }

    #[test]
    fn test_asymmetric_rejects_crossing() {
        let mut m = RotationalStateMachine::default();
        m.add_participant().unwrap();
        m.add_participant().unwrap();
        m.add_participant().unwrap();
        // slots 0, 4, 2: participant 0 moving left onto 2 while 2 moves right onto 0
        let rotational = vec![
            vec![vote(LocalMove::RotateLeft, 1.0)],
            vec![vote(LocalMove::Stay, 1.0)],
            vec![vote(LocalMove::RotateRight, 1.0)],
        ];
        assert!(synthesize_asymmetric(&m, &rotational).is_empty());
    }

    #[test]
    fn test_no_asymmetric_for_four() {
        let m = machine(4);
        let ballots: Vec<Ballot> = (0..4)
            .map(|p| Ballot::new(p, vec![vote(LocalMove::Stay, 1.0), vote(LocalMove::RotateLeft, 1.0)]))
            .collect();
        let candidates = VoteAggregator::new().build(&m, &ballots);
        assert!(candidates.iter().all(|c| c.transition != SystemTransition::AssymmetricRotation));
        assert!(find(&candidates, SystemTransition::Stay).is_complete());
    }
}
