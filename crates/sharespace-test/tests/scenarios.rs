use std::time::Duration;

use sharespace_core::{
    LocalMove, ParticipantId, ParticipantVote, SystemTransition, TimeCondition, Value, Variable, VisualState,
};
use sharespace_runtime::{CoolDownReason, EventContext, OrchestratorConfig, TurnOutcome};
use sharespace_test::ScenarioHarness;

fn exec() -> Value {
    Value::var(Variable::EXECUTION)
}

fn seconds(s: f64) -> Value {
    Value::constant(s)
}

/// Join everyone at turn 0 and run the turn that places them
fn session(config: OrchestratorConfig, ids: &[u64]) -> ScenarioHarness {
    let mut harness = ScenarioHarness::new(config);
    for id in ids {
        harness.join(*id);
    }
    harness.step();
    harness
}

#[test]
fn single_participant_takes_first_slot() {
    let harness = session(OrchestratorConfig::deterministic(), &[1]);

    assert_eq!(harness.slots(), vec![0]);
    assert!(harness.orchestrator().machine().is_even());

    let info = harness.state_of(1).unwrap();
    assert_eq!(info.current_visual_state, VisualState::Up);
    assert_eq!(info.legal_moves.len(), 9);
    assert!(info.legal_moves.contains(&LocalMove::Focus));
    assert_eq!(info.candidate_end_area_per_move.len(), info.legal_moves.len());
    assert!(info.candidate_end_area_per_move.iter().all(|area| area.area() > 0.0));

    let held: Vec<_> = harness.events().collect();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].context, EventContext::Static);
    assert!(held[0].is_open());
}

#[test]
fn unanimous_stay_keeps_arrangement() {
    let mut harness = session(OrchestratorConfig::deterministic(), &[1, 2]);
    let slots = harness.slots();
    let state = harness.orchestrator().machine().state_id();

    for id in [1, 2] {
        harness.vote(id, vec![ParticipantVote::new(LocalMove::Stay, 80.0)]).unwrap();
    }
    let outcome = harness.step();

    assert_eq!(
        outcome,
        TurnOutcome::Transitioned { transition: SystemTransition::Stay, state_id: state.next() }
    );
    assert_eq!(harness.slots(), slots);
    assert_eq!(harness.state_of(2).unwrap().past_transitions.len(), 1);
}

#[test]
fn stronger_focus_wins_over_stay() {
    let mut harness = session(OrchestratorConfig::deterministic(), &[1, 2]);

    let focus = ParticipantVote::new(LocalMove::Focus, 100.0)
        .with_condition(TimeCondition::at_least(exec(), seconds(0.5)))
        .with_condition(TimeCondition::at_most(exec(), seconds(5.0)));
    harness.vote(1, vec![focus]).unwrap();
    harness
        .vote(
            2,
            vec![ParticipantVote::new(LocalMove::Stay, 50.0), ParticipantVote::new(LocalMove::Defocus, 10.0)],
        )
        .unwrap();

    match harness.step() {
        TurnOutcome::Transitioned { transition, .. } => {
            assert!(SystemTransition::FOCUS.contains(&transition), "{transition}")
        }
        other => panic!("expected a focus transition, got {other:?}"),
    }

    let machine = harness.orchestrator().machine();
    assert!(machine.is_focused());
    let focused = [1, 2]
        .iter()
        .filter(|id| harness.state_of(**id).unwrap().current_visual_state == VisualState::Focused)
        .count();
    assert_eq!(focused, 1);
    assert_eq!(harness.state_of(1).unwrap().current_visual_state, VisualState::Focused);
    assert_eq!(harness.state_of(2).unwrap().current_visual_state, VisualState::Defocused);

    let history = harness.orchestrator().history(ParticipantId(1));
    let last = history.last().unwrap();
    let execution = last.to_seconds - last.from_seconds;
    assert!(execution > 0.0 && execution <= 5.0 + 1e-9, "{execution}");
}

#[test]
fn contradictory_conditions_cool_down() {
    let mut config = OrchestratorConfig::deterministic();
    config.failure_cooldown = Duration::from_secs(1);
    let mut harness = session(config, &[1, 2]);
    let state = harness.orchestrator().machine().state_id();
    harness.take_outbound();

    let impossible = ParticipantVote::new(LocalMove::Stay, 100.0)
        .with_condition(TimeCondition::at_least(exec(), seconds(2.0)))
        .with_condition(TimeCondition::at_most(exec(), seconds(1.0)));
    harness.vote(1, vec![impossible]).unwrap();
    harness.vote(2, vec![ParticipantVote::new(LocalMove::Stay, 100.0)]).unwrap();

    let now = harness.now();
    assert_eq!(
        harness.step(),
        TurnOutcome::CoolDown { reason: CoolDownReason::NoFeasibleTiming, until: now + 50 }
    );
    assert_eq!(harness.orchestrator().machine().state_id(), state);
    assert_eq!(harness.events().count(), 0);
    assert_eq!(harness.step(), TurnOutcome::Idle(sharespace_runtime::IdleReason::CoolingDown));
}

#[test]
fn infeasible_favourite_falls_back() {
    let mut harness = session(OrchestratorConfig::deterministic(), &[1, 2]);

    let impossible = ParticipantVote::new(LocalMove::Stay, 100.0)
        .with_condition(TimeCondition::at_least(exec(), seconds(2.0)))
        .with_condition(TimeCondition::at_most(exec(), seconds(1.0)));
    harness.vote(1, vec![impossible, ParticipantVote::new(LocalMove::RotateLeft, 50.0)]).unwrap();
    harness
        .vote(2, vec![ParticipantVote::new(LocalMove::Stay, 100.0), ParticipantVote::new(LocalMove::RotateLeft, 50.0)])
        .unwrap();

    match harness.step() {
        TurnOutcome::Transitioned { transition, .. } => assert_ne!(transition, SystemTransition::Stay),
        other => panic!("expected a fallback transition, got {other:?}"),
    }
    let history = harness.orchestrator().history(ParticipantId(1));
    assert_eq!(history.last().unwrap().local_move, LocalMove::RotateLeft);
}

#[test]
fn leaving_participant_keeps_even_layout() {
    let mut harness = session(OrchestratorConfig::deterministic(), &[1, 2, 3]);
    assert_eq!(harness.slots(), vec![0, 4, 2]);
    assert!(harness.orchestrator().machine().is_even());

    harness.leave(2);
    harness.step();
    assert_eq!(harness.orchestrator().roster(), &[ParticipantId(1), ParticipantId(3)]);
    assert_eq!(harness.slots(), vec![0, 2]);
    assert!(harness.orchestrator().machine().is_even());
    assert!(!harness.orchestrator().is_forcing_even());
    assert_eq!(harness.orchestrator().ledger().events_for(ParticipantId(2)).count(), 0);

    for id in [1, 3] {
        harness.vote(id, vec![ParticipantVote::new(LocalMove::Stay, 1.0)]).unwrap();
    }
    assert!(matches!(
        harness.step(),
        TurnOutcome::Transitioned { transition: SystemTransition::Stay, .. }
    ));
}

#[test]
fn rotations_animate_between_held_phases() {
    let mut harness = session(OrchestratorConfig::deterministic(), &[1, 2]);
    harness.take_outbound();

    for id in [1, 2] {
        harness.vote(id, vec![ParticipantVote::new(LocalMove::RotateLeft, 1.0)]).unwrap();
    }
    assert!(matches!(harness.step(), TurnOutcome::Transitioned { transition: SystemTransition::RotateLeft, .. }));
    assert_eq!(harness.slots(), vec![2, 6]);

    let animations: Vec<_> = harness
        .events()
        .filter(|e| e.participant == ParticipantId(1) && e.context == EventContext::Animation)
        .collect();
    assert_eq!(animations.len(), 1);
    let frames = &animations[0].frames;
    assert!(!frames.is_empty());
    assert!(frames.iter().all(|f| f.area.area() > 0.0));
    assert!(animations[0].speed > 0.0);
    assert_eq!(harness.state_of(1).unwrap().current_visual_state, VisualState::Right);
}
