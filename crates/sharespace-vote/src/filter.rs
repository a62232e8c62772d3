//! Post-aggregation policy filters
//!
//! Filters run in a fixed order. When one of them removes every remaining
//! candidate the turn ends without a transition; the stage that emptied the
//! list is reported so the orchestrator can log it.

use std::fmt;

use sharespace_core::{CandidateTransition, SystemTransition};
use sharespace_state::RotationalStateMachine;
use tracing::debug;

/// Filter stage, in application order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterStage {
    Incomplete,
    Required,
    EvenLayout,
    AllowedMask,
    MinActors,
    Script,
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterStage::Required => "required votes",
            FilterStage::EvenLayout => "even layout",
            FilterStage::AllowedMask => "allowed transitions",
            FilterStage::MinActors => "minimum actors",
            FilterStage::Incomplete => "incomplete votes",
            FilterStage::Script => "scripted transition",
        };
        f.write_str(name)
    }
}

/// Inputs the filters depend on
#[derive(Clone, Copy, Debug)]
pub struct FilterContext<'a> {
    pub machine: &'a RotationalStateMachine,
    /// Roster changes are waiting for an even layout
    pub force_even: bool,
    pub allowed_mask: u32,
    /// Head of the scripted override queue
    pub scripted: Option<SystemTransition>,
}

/// Apply every filter in order. Incomplete candidates go first so a
/// required vote never narrows onto a candidate that cannot win.
pub fn apply_filters(
    mut candidates: Vec<CandidateTransition>,
    ctx: &FilterContext<'_>,
) -> Result<Vec<CandidateTransition>, FilterStage> {
    let stages: [(FilterStage, fn(Vec<CandidateTransition>, &FilterContext<'_>) -> Vec<CandidateTransition>); 6] = [
        (FilterStage::Incomplete, complete_only),
        (FilterStage::Required, narrow_required),
        (FilterStage::EvenLayout, restore_even_layout),
        (FilterStage::AllowedMask, allowed_only),
        (FilterStage::MinActors, enough_actors),
        (FilterStage::Script, follow_script),
    ];

    for (stage, filter) in stages {
        let before = candidates.len();
        candidates = filter(candidates, ctx);
        if before != candidates.len() {
            debug!(%stage, removed = before - candidates.len(), remaining = candidates.len(), "filtered candidates");
        }
        if candidates.is_empty() {
            return Err(stage);
        }
    }
    Ok(candidates)
}

/// Narrow participant by participant to candidates carrying that
/// participant's required vote
pub fn narrow_required(mut candidates: Vec<CandidateTransition>, _ctx: &FilterContext<'_>) -> Vec<CandidateTransition> {
    if !candidates.iter().any(|c| c.required) {
        return candidates;
    }
    let participants = candidates.first().map_or(0, |c| c.votes.len());
    let required_at = |c: &CandidateTransition, p: usize| c.votes[p].as_ref().is_some_and(|v| v.required);
    for p in 0..participants {
        if candidates.iter().any(|c| required_at(c, p)) {
            candidates.retain(|c| required_at(c, p));
        }
    }
    candidates
}

/// Keep only candidates that leave every participant on the same parity,
/// when the layout is currently uneven or a roster change is waiting
pub fn restore_even_layout(candidates: Vec<CandidateTransition>, ctx: &FilterContext<'_>) -> Vec<CandidateTransition> {
    if ctx.machine.is_even() && !ctx.force_even {
        return candidates;
    }
    candidates
        .into_iter()
        .filter(|c| ctx.machine.is_even_after(&c.local_moves()))
        .collect()
}

pub fn allowed_only(candidates: Vec<CandidateTransition>, ctx: &FilterContext<'_>) -> Vec<CandidateTransition> {
    candidates
        .into_iter()
        .filter(|c| c.transition.is_allowed_by(ctx.allowed_mask))
        .collect()
}

pub fn enough_actors(candidates: Vec<CandidateTransition>, _ctx: &FilterContext<'_>) -> Vec<CandidateTransition> {
    candidates
        .into_iter()
        .filter(|c| c.num_actors() >= c.transition.min_actors())
        .collect()
}

pub fn complete_only(candidates: Vec<CandidateTransition>, _ctx: &FilterContext<'_>) -> Vec<CandidateTransition> {
    candidates.into_iter().filter(|c| c.is_complete()).collect()
}

pub fn follow_script(candidates: Vec<CandidateTransition>, ctx: &FilterContext<'_>) -> Vec<CandidateTransition> {
    match ctx.scripted {
        Some(head) => candidates.into_iter().filter(|c| c.transition == head).collect(),
        None => candidates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharespace_core::{LocalMove, ParticipantVote};

    fn machine() -> RotationalStateMachine {
        let mut m = RotationalStateMachine::default();
        m.add_participant().unwrap();
        m.add_participant().unwrap();
        m
    }

    fn candidate(t: SystemTransition, moves: &[Option<(LocalMove, bool)>]) -> CandidateTransition {
        let mut c = CandidateTransition::new(t, moves.len());
        for (p, mv) in moves.iter().enumerate() {
            if let Some((mv, required)) = mv {
                let mut v = ParticipantVote::new(*mv, 1.0);
                v.required = *required;
                c.add_vote(p, &v, matches!(mv, LocalMove::SwitchLeft | LocalMove::SwitchRight));
            }
        }
        c
    }

    fn ctx(m: &RotationalStateMachine) -> FilterContext<'_> {
        FilterContext { machine: m, force_even: false, allowed_mask: SystemTransition::ALL_MASK, scripted: None }
    }

    #[test]
    fn test_required_narrowing() {
        let m = machine();
        let candidates = vec![
            candidate(SystemTransition::Stay, &[Some((LocalMove::Stay, false)), Some((LocalMove::Stay, false))]),
            candidate(SystemTransition::RotateLeft, &[Some((LocalMove::RotateLeft, true)), Some((LocalMove::RotateLeft, false))]),
            candidate(SystemTransition::RotateRight, &[Some((LocalMove::RotateRight, true)), Some((LocalMove::RotateRight, true))]),
        ];
        let kept = narrow_required(candidates, &ctx(&m));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].transition, SystemTransition::RotateRight);
    }

    #[test]
    fn test_required_earlier_participant_wins() {
        let m = machine();
        let candidates = vec![
            candidate(SystemTransition::RotateLeft, &[Some((LocalMove::RotateLeft, true)), Some((LocalMove::RotateLeft, false))]),
            candidate(SystemTransition::RotateRight, &[Some((LocalMove::RotateRight, false)), Some((LocalMove::RotateRight, true))]),
        ];
        let kept = apply_filters(candidates, &ctx(&m)).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].transition, SystemTransition::RotateLeft);
    }

    #[test]
    fn test_mask_and_script() {
        let m = machine();
        let both = [Some((LocalMove::Stay, false)), Some((LocalMove::Stay, false))];
        let candidates = vec![
            candidate(SystemTransition::Stay, &both),
            candidate(SystemTransition::RotateLeft, &[Some((LocalMove::RotateLeft, false)), Some((LocalMove::RotateLeft, false))]),
        ];
        let mut context = ctx(&m);
        context.allowed_mask = SystemTransition::RotateLeft.bit();
        let kept = apply_filters(candidates.clone(), &context).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].transition, SystemTransition::RotateLeft);

        let mut context = ctx(&m);
        context.scripted = Some(SystemTransition::Stay);
        let kept = apply_filters(candidates.clone(), &context).unwrap();
        assert_eq!(kept[0].transition, SystemTransition::Stay);

        context.scripted = Some(SystemTransition::Focus4);
        assert_eq!(apply_filters(candidates, &context), Err(FilterStage::Script));
    }

    #[test]
    fn test_switch_needs_two_actors() {
        let m = machine();
        let one = candidate(SystemTransition::Switch1, &[Some((LocalMove::SwitchRight, false)), Some((LocalMove::Defocus, false))]);
        let two = candidate(SystemTransition::Switch2, &[Some((LocalMove::SwitchRight, false)), Some((LocalMove::SwitchLeft, false))]);
        let kept = enough_actors(vec![one, two], &ctx(&m));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].transition, SystemTransition::Switch2);
    }

    #[test]
    fn test_incomplete_removed() {
        let m = machine();
        let candidates = vec![candidate(SystemTransition::Stay, &[Some((LocalMove::Stay, false)), None])];
        assert_eq!(apply_filters(candidates, &ctx(&m)), Err(FilterStage::Incomplete));
    }

    #[test]
    fn test_required_on_incomplete_candidate() {
        let m = machine();
        let candidates = vec![
            candidate(SystemTransition::Focus1, &[Some((LocalMove::Focus, true)), None]),
            candidate(SystemTransition::Stay, &[Some((LocalMove::Stay, false)), Some((LocalMove::Stay, false))]),
        ];
        let kept = apply_filters(candidates, &ctx(&m)).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].transition, SystemTransition::Stay);
    }

    #[test]
    fn test_force_even() {
        let m = machine();
        let candidates = vec![
            candidate(SystemTransition::AssymmetricRotation, &[Some((LocalMove::Rotate45Left, false)), Some((LocalMove::Stay, false))]),
            candidate(SystemTransition::Stay, &[Some((LocalMove::Stay, false)), Some((LocalMove::Stay, false))]),
        ];
        let mut context = ctx(&m);
        assert_eq!(restore_even_layout(candidates.clone(), &context).len(), 2);
        context.force_even = true;
        let kept = restore_even_layout(candidates, &context);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].transition, SystemTransition::Stay);
    }
}
