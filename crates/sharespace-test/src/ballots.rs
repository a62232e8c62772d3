//! Seeded ballot generation
//!
//! Mimics participant clients that vote on every legal move each turn. Hold
//! and rotation moves get mid-range desirability, giving up the centre gets
//! a low one.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sharespace_core::{
    LocalMove, ParticipantVote, SharespaceResult, StateInfo, TimeCondition, Value, Variable, VoteMessage,
};
use sharespace_state::RotationalStateMachine;

/// Ballot generator configuration
#[derive(Clone, Debug)]
pub struct BallotConfig {
    /// Probability that one proposal of a ballot is marked required
    pub required_prob: f64,
    /// Probability that a proposal carries an execution window
    pub condition_prob: f64,
    /// Probability that a proposal carries discrete timing options
    pub option_prob: f64,
    pub seed: u64,
}

impl Default for BallotConfig {
    fn default() -> Self {
        BallotConfig {
            required_prob: 0.0,
            condition_prob: 0.3,
            option_prob: 0.5,
            seed: 42,
        }
    }
}

impl BallotConfig {
    /// No timing constraints at all
    pub fn unconstrained() -> Self {
        BallotConfig {
            condition_prob: 0.0,
            option_prob: 0.0,
            ..Default::default()
        }
    }

    /// Frequent required votes and execution windows
    pub fn demanding() -> Self {
        BallotConfig {
            required_prob: 0.3,
            condition_prob: 0.8,
            option_prob: 0.8,
            seed: 42,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Builds proposals for legal moves
pub struct BallotGenerator {
    config: BallotConfig,
    rng: StdRng,
}

impl BallotGenerator {
    pub fn new(config: BallotConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        BallotGenerator { config, rng }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(BallotConfig::default().with_seed(seed))
    }

    pub fn config(&self) -> &BallotConfig {
        &self.config
    }

    fn desirability(&mut self, mv: LocalMove) -> f64 {
        match mv {
            LocalMove::Defocus => self.rng.gen_range(0.0..25.0),
            LocalMove::Stay => self.rng.gen_range(40.0..90.0),
            _ => self.rng.gen_range(0.0..100.0),
        }
    }

    /// Execution window `lo <= exec <= hi`, in seconds
    fn execution_window(&mut self) -> (TimeCondition, TimeCondition) {
        let lo = self.rng.gen_range(0.5..2.0);
        let hi = lo + self.rng.gen_range(0.5..3.0);
        let exec = Value::var(Variable::EXECUTION);
        (
            TimeCondition::at_least(exec.clone(), Value::constant(lo)),
            TimeCondition::at_most(exec, Value::constant(hi)),
        )
    }

    /// One proposal per move
    pub fn proposals(&mut self, moves: &[LocalMove]) -> Vec<ParticipantVote> {
        let required = if !moves.is_empty() && self.rng.gen_bool(self.config.required_prob) {
            Some(self.rng.gen_range(0..moves.len()))
        } else {
            None
        };

        moves
            .iter()
            .enumerate()
            .map(|(i, mv)| {
                let mut vote = ParticipantVote::new(*mv, self.desirability(*mv));
                if required == Some(i) {
                    vote = vote.required();
                }
                if self.rng.gen_bool(self.config.condition_prob) {
                    let (lower, upper) = self.execution_window();
                    vote = vote.with_condition(lower).with_condition(upper);
                }
                if self.rng.gen_bool(self.config.option_prob) {
                    for _ in 0..self.rng.gen_range(1..=3) {
                        let planning = self.rng.gen_range(0.0..1500.0);
                        let execution = self.rng.gen_range(360.0..3000.0);
                        vote = vote.with_option(planning, execution);
                    }
                }
                vote
            })
            .collect()
    }

    /// Ballot for the legal moves announced in a state summary
    pub fn ballot(&mut self, info: &StateInfo) -> VoteMessage {
        VoteMessage {
            user_id: info.user_id,
            state_id: info.state_id,
            proposals: self.proposals(&info.legal_moves),
        }
    }

    /// Proposals for a participant of a bare state machine
    pub fn for_machine(
        &mut self,
        machine: &RotationalStateMachine,
        participant: usize,
    ) -> SharespaceResult<Vec<ParticipantVote>> {
        let (_, moves) = machine.candidate_options(participant)?;
        Ok(self.proposals(&moves))
    }
}
