//! Scenario harness
//!
//! Drives a [`ConflictOrchestrator`] turn by turn on a manual clock and
//! keeps everything it sends out, so tests can script a session and then
//! inspect the announced states and emitted events.

use std::sync::Arc;

use sharespace_core::{AreaPartitioner, LocalMove, ParticipantId, ParticipantVote, StateInfo, Turn, VoteMessage};
use sharespace_runtime::{ConflictOrchestrator, Inbound, OrchestratorConfig, Outbound, TransitionEvent, TurnOutcome};
use thiserror::Error;
use tracing::debug;

use crate::{BallotGenerator, ClippedVoronoi};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HarnessError {
    #[error("Participant {0} is not active")]
    UnknownParticipant(ParticipantId),

    #[error("Participant {0} has not been sent a state yet")]
    NoState(ParticipantId),

    #[error("Move {mv:?} is not legal for participant {participant}")]
    IllegalMove { participant: ParticipantId, mv: LocalMove },
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Turn-by-turn driver for one orchestrator
pub struct ScenarioHarness {
    orchestrator: ConflictOrchestrator,
    now: Turn,
    outbound: Vec<Outbound>,
}

impl ScenarioHarness {
    /// Harness over a Voronoi partition of the configured bounds
    pub fn new(config: OrchestratorConfig) -> Self {
        let partitioner = Arc::new(ClippedVoronoi::new(config.bounds));
        Self::with_partitioner(config, partitioner)
    }

    /// Harness on the default deterministic configuration
    pub fn deterministic() -> Self {
        Self::new(OrchestratorConfig::deterministic())
    }

    pub fn with_partitioner(config: OrchestratorConfig, partitioner: Arc<dyn AreaPartitioner>) -> Self {
        ScenarioHarness {
            orchestrator: ConflictOrchestrator::new(config, partitioner),
            now: 0,
            outbound: Vec::new(),
        }
    }

    pub fn orchestrator(&self) -> &ConflictOrchestrator {
        &self.orchestrator
    }

    pub fn now(&self) -> Turn {
        self.now
    }

    /// Deliver a message at the current turn
    pub fn send(&mut self, message: Inbound) {
        self.orchestrator.handle(message, self.now);
        self.collect();
    }

    pub fn join(&mut self, id: u64) -> ParticipantId {
        let id = ParticipantId(id);
        self.send(Inbound::Join(id));
        id
    }

    pub fn leave(&mut self, id: u64) {
        self.send(Inbound::Leave(ParticipantId(id)));
    }

    /// Vote for the participant's current state, checking each move
    /// against the legal moves it was sent
    pub fn vote(&mut self, id: u64, proposals: Vec<ParticipantVote>) -> HarnessResult<()> {
        let id = ParticipantId(id);
        if self.orchestrator.participant_number(id).is_none() {
            return Err(HarnessError::UnknownParticipant(id));
        }
        let info = self.orchestrator.state_info(id).ok_or(HarnessError::NoState(id))?;
        if let Some(illegal) = proposals.iter().find(|p| !info.legal_moves.contains(&p.local_transition)) {
            return Err(HarnessError::IllegalMove { participant: id, mv: illegal.local_transition });
        }

        let state_id = info.state_id;
        self.send(Inbound::Vote(VoteMessage { user_id: id, state_id, proposals }));
        Ok(())
    }

    /// Let every active participant vote through `generator`
    pub fn vote_all(&mut self, generator: &mut BallotGenerator) {
        let ballots: Vec<VoteMessage> = self
            .orchestrator
            .roster()
            .iter()
            .filter_map(|id| self.orchestrator.state_info(*id))
            .map(|info| generator.ballot(info))
            .collect();
        for ballot in ballots {
            self.send(Inbound::Vote(ballot));
        }
    }

    /// Run the current turn and move the clock on by one
    pub fn step(&mut self) -> TurnOutcome {
        let outcome = self.orchestrator.run_turn(self.now);
        debug!(turn = self.now, ?outcome, "scenario step");
        self.collect();
        self.now += 1;
        outcome
    }

    pub fn advance(&mut self, turns: Turn) -> Vec<TurnOutcome> {
        (0..turns).map(|_| self.step()).collect()
    }

    /// Move the clock without running turns
    pub fn skip(&mut self, turns: Turn) {
        self.now += turns.max(0);
    }

    /// Move the clock past every recorded transition and any cool-down
    pub fn settle(&mut self) {
        let clock = self.orchestrator.clock();
        let finished = self
            .orchestrator
            .roster()
            .iter()
            .filter_map(|id| self.orchestrator.history(*id).last())
            .map(|t| clock.turn_at_seconds(t.to_seconds) + 1)
            .max()
            .unwrap_or(self.now);
        self.now = self.now.max(finished).max(self.orchestrator.cooldown_until());
    }

    fn collect(&mut self) {
        self.outbound.extend(self.orchestrator.drain_outbound());
    }

    /// Everything sent since the last call
    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbound)
    }

    pub fn outbound(&self) -> &[Outbound] {
        &self.outbound
    }

    pub fn state_infos(&self) -> impl Iterator<Item = &StateInfo> {
        self.outbound.iter().filter_map(|o| match o {
            Outbound::StateInfo(info) => Some(info),
            _ => None,
        })
    }

    pub fn events(&self) -> impl Iterator<Item = &TransitionEvent> {
        self.outbound
            .iter()
            .filter_map(|o| match o {
                Outbound::Events(events) => Some(events.iter()),
                _ => None,
            })
            .flatten()
    }

    /// Latest state summary of a participant
    pub fn state_of(&self, id: u64) -> Option<&StateInfo> {
        self.orchestrator.state_info(ParticipantId(id))
    }

    /// Absolute slots by participant number
    pub fn slots(&self) -> Vec<usize> {
        self.orchestrator.machine().absolute_slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_checks() {
        let mut harness = ScenarioHarness::deterministic();
        assert_eq!(
            harness.vote(1, vec![]),
            Err(HarnessError::UnknownParticipant(ParticipantId(1)))
        );

        harness.join(1);
        harness.step();
        let err = harness.vote(1, vec![ParticipantVote::new(LocalMove::Unfocus, 1.0)]).unwrap_err();
        assert!(matches!(err, HarnessError::IllegalMove { mv: LocalMove::Unfocus, .. }));
        assert!(harness.vote(1, vec![ParticipantVote::new(LocalMove::Stay, 1.0)]).is_ok());
    }

    #[test]
    fn test_settle_passes_transition() {
        let mut harness = ScenarioHarness::deterministic();
        harness.join(1);
        harness.step();
        harness.vote(1, vec![ParticipantVote::new(LocalMove::RotateLeft, 1.0)]).unwrap();
        assert!(matches!(harness.step(), TurnOutcome::Transitioned { .. }));

        harness.settle();
        harness.vote(1, vec![ParticipantVote::new(LocalMove::Stay, 1.0)]).unwrap();
        assert!(matches!(harness.step(), TurnOutcome::Transitioned { .. }));
    }
}
