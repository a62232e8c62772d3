//! Orchestrator inputs and outputs

use serde::{Deserialize, Serialize};
use sharespace_core::{ParticipantId, ParticipantProperties, RecommendedTicks, StateInfo, StrategySettings, Tick, VoteMessage};

use crate::TransitionEvent;

/// Messages handled between turns
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Inbound {
    Join(ParticipantId),
    Leave(ParticipantId),
    Vote(VoteMessage),
    Settings(StrategySettings),
    Properties(ParticipantProperties),
    Tick(Tick),
}

impl Inbound {
    /// Participant the message is about, if any
    pub fn participant(&self) -> Option<ParticipantId> {
        match self {
            Inbound::Join(id) | Inbound::Leave(id) => Some(*id),
            Inbound::Vote(vote) => Some(vote.user_id),
            Inbound::Properties(props) => Some(props.user_id),
            Inbound::Tick(tick) => Some(tick.user_id),
            Inbound::Settings(_) => None,
        }
    }
}

/// Messages produced by a turn
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Outbound {
    StateInfo(StateInfo),
    Events(Vec<TransitionEvent>),
    RecommendedTicks(RecommendedTicks),
    /// Settings after a server-side version bump
    Settings(StrategySettings),
}
