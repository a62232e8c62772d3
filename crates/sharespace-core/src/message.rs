//! Messages exchanged with participants and the operator frontend

use serde::{Deserialize, Serialize};

use crate::{LocalMove, ParticipantId, ParticipantVote, Point, Polygon, StateId, SystemTransition, VisualState};

/// A participant's ballot for one arrangement version
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteMessage {
    pub user_id: ParticipantId,
    pub state_id: StateId,
    pub proposals: Vec<ParticipantVote>,
}

/// One entry of a participant's transition history
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionInfo {
    pub from_state: VisualState,
    pub to_state: VisualState,
    #[serde(rename = "move")]
    pub local_move: LocalMove,
    pub from_area: Polygon,
    pub to_area: Polygon,
    pub from_seconds: f64,
    pub to_seconds: f64,
}

/// Per-participant state summary sent after every decision
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateInfo {
    pub user_id: ParticipantId,
    pub state_id: StateId,
    pub current_visual_state: VisualState,
    pub legal_moves: Vec<LocalMove>,
    pub candidate_end_position_per_move: Vec<Point>,
    pub candidate_end_area_per_move: Vec<Polygon>,
    pub from_seconds: f64,
    pub to_seconds: f64,
    pub earliest_next_execution_seconds: f64,
    pub past_transitions: Vec<TransitionInfo>,
}

/// Operator settings, accepted only when the version matches
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySettings {
    pub version_number: u64,
    pub run: bool,
    pub reset: bool,
    pub allowed_transitions_mask: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_maneuver_second_distance_seconds: Option<f64>,
    pub max_allowed_execution_seconds: f64,
    pub transition_queue_length: usize,
    pub focus_weight: f64,
    #[serde(default)]
    pub custom_transition_queue: Vec<SystemTransition>,
}

impl Default for StrategySettings {
    fn default() -> Self {
        StrategySettings {
            version_number: 0,
            run: true,
            reset: false,
            allowed_transitions_mask: SystemTransition::ALL_MASK,
            preferred_speed: None,
            preferred_maneuver_second_distance_seconds: None,
            max_allowed_execution_seconds: 60.0,
            transition_queue_length: 0,
            focus_weight: 1.0,
            custom_transition_queue: Vec::new(),
        }
    }
}

/// Device tick report
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tick {
    pub user_id: ParticipantId,
    pub seconds_timestamp: f64,
    pub in_relation_to_previous_tick: bool,
}

/// Upcoming synchronized ticks, as seconds from now
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedTicks {
    pub user_id: ParticipantId,
    pub tick_seconds_left: Vec<f64>,
}

/// Participant-side tuning of its own influence
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantProperties {
    pub user_id: ParticipantId,
    pub move_priority: f64,
    pub time_priority: f64,
    pub queue_length: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_message_field_names() {
        let json = r#"{
            "userId": 4,
            "stateId": 9,
            "proposals": [
                { "localTransition": "Focus", "desirability": 100.0, "required": true },
                { "localTransition": "Stay", "desirability": 1.0,
                  "planningTimesMs": [10.0], "executionTimesMs": [500.0] }
            ]
        }"#;
        let msg: VoteMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.user_id, ParticipantId(4));
        assert_eq!(msg.state_id, StateId(9));
        assert_eq!(msg.proposals.len(), 2);
        assert!(msg.proposals[0].required);
        assert_eq!(msg.proposals[1].timing_options().collect::<Vec<_>>(), vec![(10.0, 500.0)]);
    }

    #[test]
    fn test_settings_roundtrip() {
        let mut settings = StrategySettings::default();
        settings.custom_transition_queue = vec![SystemTransition::Switch2];
        settings.preferred_speed = Some(0.5);
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["allowedTransitionsMask"], SystemTransition::ALL_MASK);
        assert_eq!(json["customTransitionQueue"][0], "Switch2");
        let back: StrategySettings = serde_json::from_value(json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_transition_info_move_field() {
        let info = TransitionInfo {
            from_state: VisualState::Up,
            to_state: VisualState::Left,
            local_move: LocalMove::RotateLeft,
            from_area: Polygon::default(),
            to_area: Polygon::default(),
            from_seconds: 1.0,
            to_seconds: 2.0,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["move"], "RotateLeft");
        assert_eq!(json["fromState"], "Up");
    }
}
