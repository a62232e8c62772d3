//! Transition events and their per-turn frames
//!
//! Every participant always has exactly one held static event with an open
//! end. A committed transition caps it, appends an animation event covering
//! the execution phase and opens a new static event at the end positions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sharespace_core::{
    weight_generators, AreaPartitioner, EventId, GeometryError, LocalMove, ParticipantId, Point, Polygon, Turn,
    OPEN_END,
};
use sharespace_state::{StatePositions, NUM_GENERATORS};
use tracing::{debug, warn};

/// Area of one participant at one turn
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionFrame {
    pub turn: Turn,
    /// Centroid of the area
    pub position: Point,
    pub area: Polygon,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventContext {
    Animation,
    Static,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionEvent {
    pub event_id: EventId,
    pub participant: ParticipantId,
    pub transition_id: u64,
    pub previous_transition_id: u64,
    pub context: EventContext,
    pub start_turn: Turn,
    /// Last turn covered, `OPEN_END` while held
    pub end_turn: Turn,
    pub frames: Vec<TransitionFrame>,
    #[serde(rename = "move")]
    pub local_move: LocalMove,
    /// Metres per second
    pub speed: f64,
}

impl TransitionEvent {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.end_turn == OPEN_END
    }

    /// Capped before it ever started
    #[inline]
    pub fn is_revoked(&self) -> bool {
        self.end_turn < self.start_turn
    }

    /// Shorten to end at `end`. Returns false when already that short.
    pub fn cap(&mut self, end: Turn) -> bool {
        if end >= self.end_turn {
            return false;
        }
        self.end_turn = end.max(self.start_turn - 1);
        self.frames.retain(|f| f.turn <= end);
        true
    }
}

/// Every live event, plus the updates not yet sent
#[derive(Debug, Default)]
pub struct EventLedger {
    events: BTreeMap<EventId, TransitionEvent>,
    pending: BTreeMap<EventId, TransitionEvent>,
    next_id: u64,
}

impl EventLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids are never reused
    pub fn next_id(&mut self) -> EventId {
        self.next_id += 1;
        EventId(self.next_id)
    }

    pub fn insert(&mut self, event: TransitionEvent) {
        self.pending.insert(event.event_id, event.clone());
        self.events.insert(event.event_id, event);
    }

    pub fn get(&self, id: EventId) -> Option<&TransitionEvent> {
        self.events.get(&id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events_for(&self, participant: ParticipantId) -> impl Iterator<Item = &TransitionEvent> {
        self.events.values().filter(move |e| e.participant == participant)
    }

    /// Cap the participant's held static events at `end`
    pub fn cap_held(&mut self, participant: ParticipantId, end: Turn) -> usize {
        self.cap_where(end, |e| e.participant == participant && e.context == EventContext::Static && e.is_open())
    }

    /// Cap every event that runs past `end`
    pub fn cap_all(&mut self, end: Turn) -> usize {
        self.cap_where(end, |_| true)
    }

    /// Withdraw a departing participant's events. Unstarted events are
    /// revoked, running ones end at `now`.
    pub fn revoke(&mut self, participant: ParticipantId, now: Turn) -> usize {
        let ids: Vec<EventId> = self.events_for(participant).map(|e| e.event_id).collect();
        let mut changed = 0;
        for id in ids {
            let Some(mut event) = self.events.remove(&id) else {
                continue;
            };
            let end = if event.start_turn > now { event.start_turn - 1 } else { now };
            if event.cap(end) {
                changed += 1;
                self.pending.insert(id, event);
            }
        }
        debug!(%participant, changed, "revoked events");
        changed
    }

    /// Forget events that ended before `turn`
    pub fn prune(&mut self, turn: Turn) {
        self.events.retain(|_, e| e.end_turn >= turn);
    }

    /// Updates since the last call, in id order
    pub fn take_pending(&mut self) -> Vec<TransitionEvent> {
        std::mem::take(&mut self.pending).into_values().collect()
    }

    fn cap_where(&mut self, end: Turn, pred: impl Fn(&TransitionEvent) -> bool) -> usize {
        let mut changed = 0;
        for event in self.events.values_mut().filter(|e| pred(e)) {
            if event.cap(end) {
                changed += 1;
                self.pending.insert(event.event_id, event.clone());
            }
        }
        changed
    }
}

/// Turns generator positions into participant areas
pub struct FrameBuilder<'a> {
    partitioner: &'a dyn AreaPartitioner,
    positions: &'a StatePositions,
    focus_weight: f64,
}

impl<'a> FrameBuilder<'a> {
    pub fn new(partitioner: &'a dyn AreaPartitioner, positions: &'a StatePositions, focus_weight: f64) -> Self {
        FrameBuilder { partitioner, positions, focus_weight }
    }

    /// Central generators carry the focus weight
    pub fn weights(&self, generators: &[Point; NUM_GENERATORS]) -> [f64; NUM_GENERATORS] {
        generators.map(|g| if self.positions.is_central(g) { self.focus_weight } else { 1.0 })
    }

    /// Cell of generator 0
    pub fn area(&self, generators: &[Point]) -> Result<Polygon, GeometryError> {
        let input: BTreeMap<usize, Point> = generators.iter().copied().enumerate().collect();
        let mut cells = self.partitioner.partition(&input)?;
        cells.remove(&0).ok_or(GeometryError::MissingCell(0))
    }

    /// Weighted frame at `turn`, or None when the partition fails
    pub fn frame(
        &self,
        turn: Turn,
        generators: &[Point; NUM_GENERATORS],
        weights: &[f64; NUM_GENERATORS],
    ) -> Option<TransitionFrame> {
        let weighted = weight_generators(generators, weights);
        match self.area(&weighted) {
            Ok(area) => Some(TransitionFrame { turn, position: area.centroid(), area }),
            Err(e) => {
                warn!(turn, error = %e, "skipping frame");
                None
            }
        }
    }

    /// One frame per turn from `start`, interpolating generators and
    /// weights over `turns` turns
    pub fn animation(
        &self,
        start: Turn,
        turns: Turn,
        from: &[Point; NUM_GENERATORS],
        to: &[Point; NUM_GENERATORS],
    ) -> Vec<TransitionFrame> {
        let (from_w, to_w) = (self.weights(from), self.weights(to));
        let turns = turns.max(1);
        (0..turns)
            .filter_map(|offset| {
                let t = offset as f64 / turns as f64;
                let generators: [Point; NUM_GENERATORS] = std::array::from_fn(|g| from[g].lerp(to[g], t));
                let weights: [f64; NUM_GENERATORS] = std::array::from_fn(|g| from_w[g] + (to_w[g] - from_w[g]) * t);
                self.frame(start + offset, &generators, &weights)
            })
            .collect()
    }

    /// Single frame of a held position
    pub fn held(&self, start: Turn, at: &[Point; NUM_GENERATORS]) -> Option<TransitionFrame> {
        self.frame(start, at, &self.weights(at))
    }
}

/// Average speed between the first and last frame
pub fn frames_speed(frames: &[TransitionFrame], turn_seconds: f64) -> f64 {
    let (Some(first), Some(last)) = (frames.first(), frames.last()) else {
        return 0.0;
    };
    let seconds = (last.turn - first.turn) as f64 * turn_seconds;
    if seconds <= 0.0 {
        return 0.0;
    }
    first.position.distance(last.position) / seconds
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharespace_core::Rect;

    /// Every generator gets a unit square around itself
    struct Squares;

    impl AreaPartitioner for Squares {
        fn partition(&self, generators: &BTreeMap<usize, Point>) -> Result<BTreeMap<usize, Polygon>, GeometryError> {
            if generators.values().any(|p| p.x.is_nan()) {
                return Err(GeometryError::Degenerate("nan".into()));
            }
            Ok(generators
                .iter()
                .map(|(&k, &p)| (k, Rect::centered_square(1.0).to_polygon().translate(p)))
                .collect())
        }
    }

    fn event(id: u64, participant: u64, context: EventContext, start: Turn, end: Turn) -> TransitionEvent {
        TransitionEvent {
            event_id: EventId(id),
            participant: ParticipantId(participant),
            transition_id: 0,
            previous_transition_id: 0,
            context,
            start_turn: start,
            end_turn: end,
            frames: (start..start + 3)
                .map(|turn| TransitionFrame { turn, position: Point::ZERO, area: Polygon::default() })
                .collect(),
            local_move: LocalMove::Stay,
            speed: 0.0,
        }
    }

    #[test]
    fn test_cap_and_revoke_flags() {
        let mut e = event(1, 1, EventContext::Static, 10, OPEN_END);
        assert!(e.is_open());
        assert!(e.cap(11));
        assert_eq!(e.end_turn, 11);
        assert_eq!(e.frames.len(), 2);
        assert!(!e.cap(20));

        assert!(e.cap(3));
        assert!(e.is_revoked());
        assert!(e.frames.is_empty());
    }

    #[test]
    fn test_cap_held_only_touches_open_static() {
        let mut ledger = EventLedger::new();
        ledger.insert(event(1, 1, EventContext::Static, 0, OPEN_END));
        ledger.insert(event(2, 1, EventContext::Animation, 5, 9));
        ledger.insert(event(3, 2, EventContext::Static, 0, OPEN_END));
        assert_eq!(ledger.take_pending().len(), 3);

        assert_eq!(ledger.cap_held(ParticipantId(1), 7), 1);
        let pending = ledger.take_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_id, EventId(1));
        assert_eq!(ledger.get(EventId(2)).unwrap().end_turn, 9);
        assert!(ledger.get(EventId(3)).unwrap().is_open());
    }

    #[test]
    fn test_revoke() {
        let mut ledger = EventLedger::new();
        ledger.insert(event(1, 1, EventContext::Static, 0, 12));
        ledger.insert(event(2, 1, EventContext::Animation, 13, 20));
        ledger.insert(event(3, 1, EventContext::Static, 20, OPEN_END));
        ledger.take_pending();

        assert_eq!(ledger.revoke(ParticipantId(1), 8), 3);
        assert!(ledger.is_empty());

        let pending = ledger.take_pending();
        assert_eq!(pending[0].end_turn, 8);
        assert!(pending[1].is_revoked());
        assert!(pending[2].is_revoked());
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut ledger = EventLedger::new();
        let a = ledger.next_id();
        let b = ledger.next_id();
        assert!(b > a);
    }

    #[test]
    fn test_animation_frames() {
        let positions = StatePositions::default();
        let builder = FrameBuilder::new(&Squares, &positions, 1.0);
        let from = [Point::new(-1.0, -1.0), Point::new(1.0, -1.0), Point::new(1.0, 1.0), Point::new(-1.0, 1.0)];
        let to = [Point::new(1.0, -1.0), Point::new(1.0, 1.0), Point::new(-1.0, 1.0), Point::new(-1.0, -1.0)];

        let frames = builder.animation(100, 4, &from, &to);
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].turn, 100);
        assert_eq!(frames[3].turn, 103);
        assert!(frames[0].position.x < frames[3].position.x);

        let speed = frames_speed(&frames, 0.02);
        let expected = frames[0].position.distance(frames[3].position) / 0.06;
        assert!((speed - expected).abs() < 1e-9);
    }

    #[test]
    fn test_failed_partition_skips_frame() {
        let positions = StatePositions::default();
        let builder = FrameBuilder::new(&Squares, &positions, 1.0);
        let bad = [Point::new(f64::NAN, 0.0), Point::ZERO, Point::ZERO, Point::ZERO];
        assert!(builder.held(0, &bad).is_none());
        assert_eq!(frames_speed(&[], 0.02), 0.0);
    }

    #[test]
    fn test_focus_weight() {
        let positions = StatePositions::default();
        let builder = FrameBuilder::new(&Squares, &positions, 3.0);
        let w = builder.weights(&[Point::ZERO, Point::new(1.0, 1.0), Point::new(0.2, -0.3), Point::new(-1.0, 0.0)]);
        assert_eq!(w, [3.0, 1.0, 3.0, 1.0]);
    }
}
