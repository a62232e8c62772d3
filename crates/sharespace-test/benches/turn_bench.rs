//! Benchmarks for the per-turn decision pipeline

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sharespace_core::SystemTransition;
use sharespace_runtime::OrchestratorConfig;
use sharespace_state::RotationalStateMachine;
use sharespace_test::{BallotConfig, BallotGenerator, ScenarioHarness};
use sharespace_time::{ConditionNegotiator, TimingNegotiator};
use sharespace_vote::{
    apply_filters, Ballot, FairnessSelection, FilterContext, SelectionMechanism, VoteAggregator,
};

fn setup(participants: usize) -> (RotationalStateMachine, Vec<Ballot>) {
    let mut machine = RotationalStateMachine::default();
    for _ in 0..participants {
        machine.add_participant().unwrap();
    }
    let mut generator = BallotGenerator::new(BallotConfig::default());
    let ballots = (0..participants)
        .map(|p| Ballot::new(p, generator.for_machine(&machine, p).unwrap()))
        .collect();
    (machine, ballots)
}

fn bench_aggregation(c: &mut Criterion) {
    let aggregator = VoteAggregator::new();
    for participants in [2, 3, 4] {
        let (machine, ballots) = setup(participants);
        c.bench_function(&format!("aggregate_{participants}_participants"), |b| {
            b.iter(|| black_box(aggregator.build(black_box(&machine), black_box(&ballots))))
        });
    }
}

fn bench_fairness_selection(c: &mut Criterion) {
    let (machine, ballots) = setup(3);
    let candidates = VoteAggregator::new().build(&machine, &ballots);
    let ctx = FilterContext {
        machine: &machine,
        force_even: false,
        allowed_mask: SystemTransition::ALL_MASK,
        scripted: None,
    };
    let mut candidates = apply_filters(candidates, &ctx).unwrap();

    let mut selection = FairnessSelection::default();
    for _ in 0..3 {
        selection.add_participant();
    }
    selection.prepare(&mut candidates);

    c.bench_function("fairness_select_best", |b| {
        b.iter(|| black_box(selection.select_best(black_box(&candidates))))
    });
}

fn bench_condition_timing(c: &mut Criterion) {
    let (machine, ballots) = setup(3);
    let candidates = VoteAggregator::new().build(&machine, &ballots);
    let candidate = candidates.into_iter().find(|c| c.is_complete()).unwrap();
    let mut negotiator = ConditionNegotiator::default();

    c.bench_function("condition_negotiate", |b| {
        b.iter(|| {
            let mut candidate = candidate.clone();
            black_box(negotiator.resolve(&mut candidate))
        })
    });
}

fn bench_full_turn(c: &mut Criterion) {
    let mut harness = ScenarioHarness::new(OrchestratorConfig::deterministic());
    for id in 1..=3 {
        harness.join(id);
    }
    harness.step();
    let mut generator = BallotGenerator::new(BallotConfig::default());

    c.bench_function("full_turn_3_participants", |b| {
        b.iter(|| {
            harness.vote_all(&mut generator);
            let outcome = harness.step();
            harness.settle();
            harness.take_outbound();
            black_box(outcome)
        })
    });
}

criterion_group!(
    benches,
    bench_aggregation,
    bench_fairness_selection,
    bench_condition_timing,
    bench_full_turn,
);

criterion_main!(benches);
