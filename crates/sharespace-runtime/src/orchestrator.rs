//! Conflict orchestrator
//!
//! Owns one instance of every engine component and advances them one turn
//! at a time. The orchestrator is synchronous; the worker feeds it inbound
//! messages between turns and ships whatever it queued for sending.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sharespace_core::{
    AreaPartitioner, CandidateTransition, LocalMove, ParticipantId, ParticipantProperties, Point, Polygon,
    RecommendedTicks, SharespaceError, SharespaceResult, StateId, StateInfo, StrategySettings, SystemTransition,
    Tick, TransitionInfo, Turn, TurnClock, VisualState, VoteMessage, OPEN_END,
};
use sharespace_solver::BranchAndBound;
use sharespace_state::{RotationalStateMachine, NUM_GENERATORS};
use sharespace_time::{build_negotiator, TickSynchronizer, TimingNegotiator};
use sharespace_vote::{apply_filters, build_selection, Ballot, FilterContext, FilterStage, SelectionMechanism, VoteAggregator};
use tracing::{debug, error, info, trace, warn};

use crate::{
    frames_speed, EventContext, EventLedger, FrameBuilder, Inbound, OrchestratorConfig, Outbound, TransitionEvent,
};

/// Transition records kept per participant
const HISTORY_CAP: usize = 32;

#[derive(Clone, Debug, Default)]
pub struct OrchestratorStats {
    pub turns: u64,
    pub transitions: u64,
    pub cooldowns: u64,
    pub idle_turns: u64,
    pub votes_received: u64,
    pub stale_votes: u64,
    pub discarded_messages: u64,
    pub events_emitted: u64,
    pub participants: usize,
    pub state_id: StateId,
    pub last_turn: Turn,
    pub last_turn_duration: Duration,
}

/// Why a turn did nothing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdleReason {
    NoParticipants,
    Paused,
    CoolingDown,
    /// More transitions in flight than the queue allows
    QueueFull,
}

/// Why a turn started a cool-down
#[derive(Clone, Debug, PartialEq)]
pub enum CoolDownReason {
    /// Waiting for this many participants inside the grace period
    MissingVotes(usize),
    NoVotes,
    Filtered(FilterStage),
    NoFeasibleTiming,
    NoSelection,
    Commit(SharespaceError),
}

#[derive(Clone, Debug, PartialEq)]
pub enum TurnOutcome {
    Idle(IdleReason),
    CoolDown { reason: CoolDownReason, until: Turn },
    Transitioned { transition: SystemTransition, state_id: StateId },
}

/// Turn boundaries of one committed step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepSchedule {
    pub preparation_start: Turn,
    pub execution_start: Turn,
    /// First turn after the movement
    pub execution_end: Turn,
}

impl StepSchedule {
    #[inline]
    pub fn execution_turns(&self) -> Turn {
        self.execution_end - self.execution_start
    }
}

/// Arbitrates one shared play area
pub struct ConflictOrchestrator {
    config: OrchestratorConfig,
    clock: TurnClock,
    partitioner: Arc<dyn AreaPartitioner>,
    machine: RotationalStateMachine,
    aggregator: VoteAggregator,
    selection: Box<dyn SelectionMechanism>,
    negotiator: Box<dyn TimingNegotiator>,
    ticks: TickSynchronizer,
    ledger: EventLedger,
    settings: StrategySettings,
    /// Active participants by participant number
    roster: Vec<ParticipantId>,
    /// Requested roster, in join order
    desired: Vec<ParticipantId>,
    roster_pending: bool,
    force_even: bool,
    properties: HashMap<ParticipantId, ParticipantProperties>,
    queue_length: usize,
    votes: HashMap<ParticipantId, VoteMessage>,
    state_infos: HashMap<ParticipantId, StateInfo>,
    histories: HashMap<ParticipantId, Vec<TransitionInfo>>,
    /// Start of the held static events
    held_since: Option<Turn>,
    cooldown_until: Turn,
    /// Seconds
    last_decision: f64,
    transition_id: u64,
    outbox: Vec<Outbound>,
    stats: OrchestratorStats,
}

impl ConflictOrchestrator {
    pub fn new(config: OrchestratorConfig, partitioner: Arc<dyn AreaPartitioner>) -> Self {
        let selection = build_selection(config.selection, &config.fairness);
        let negotiator = build_negotiator(config.timing, &config.solver, &config.buckets);
        Self::with_strategies(config, partitioner, selection, negotiator)
    }

    pub fn with_strategies(
        config: OrchestratorConfig,
        partitioner: Arc<dyn AreaPartitioner>,
        selection: Box<dyn SelectionMechanism>,
        negotiator: Box<dyn TimingNegotiator>,
    ) -> Self {
        info!(
            selection = selection.name(),
            timing = negotiator.name(),
            turn_ms = config.turn_period.as_millis() as u64,
            "orchestrator created"
        );
        ConflictOrchestrator {
            clock: config.clock(),
            machine: RotationalStateMachine::new(config.positions()),
            ticks: TickSynchronizer::with_solver(config.ticks.clone(), BranchAndBound::new(config.solver.clone())),
            settings: config.settings.clone(),
            config,
            partitioner,
            aggregator: VoteAggregator::new(),
            selection,
            negotiator,
            ledger: EventLedger::new(),
            roster: Vec::new(),
            desired: Vec::new(),
            roster_pending: false,
            force_even: false,
            properties: HashMap::new(),
            queue_length: 0,
            votes: HashMap::new(),
            state_infos: HashMap::new(),
            histories: HashMap::new(),
            held_since: None,
            cooldown_until: Turn::MIN,
            last_decision: f64::NEG_INFINITY,
            transition_id: 0,
            outbox: Vec::new(),
            stats: OrchestratorStats::default(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn clock(&self) -> TurnClock {
        self.clock
    }

    pub fn machine(&self) -> &RotationalStateMachine {
        &self.machine
    }

    pub fn ledger(&self) -> &EventLedger {
        &self.ledger
    }

    pub fn settings(&self) -> &StrategySettings {
        &self.settings
    }

    pub fn stats(&self) -> &OrchestratorStats {
        &self.stats
    }

    /// Active participants by participant number
    pub fn roster(&self) -> &[ParticipantId] {
        &self.roster
    }

    pub fn participant_number(&self, id: ParticipantId) -> Option<usize> {
        self.roster.iter().position(|p| *p == id)
    }

    pub fn queue_length(&self) -> usize {
        self.queue_length
    }

    pub fn cooldown_until(&self) -> Turn {
        self.cooldown_until
    }

    pub fn is_forcing_even(&self) -> bool {
        self.force_even
    }

    /// Last summary sent to a participant
    pub fn state_info(&self, id: ParticipantId) -> Option<&StateInfo> {
        self.state_infos.get(&id)
    }

    pub fn history(&self, id: ParticipantId) -> &[TransitionInfo] {
        self.histories.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Messages queued since the last drain
    pub fn drain_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    /// Process one inbound message
    pub fn handle(&mut self, message: Inbound, now: Turn) {
        let now_s = self.clock.seconds_at(now);
        match message {
            Inbound::Join(id) => {
                if self.desired.contains(&id) {
                    debug!(participant = %id, "duplicate join");
                } else {
                    self.desired.push(id);
                    self.roster_pending = true;
                }
            }
            Inbound::Leave(id) => {
                if self.desired.contains(&id) {
                    self.desired.retain(|d| *d != id);
                    self.roster_pending = true;
                } else {
                    warn!(participant = %id, "leave from unknown participant");
                    self.stats.discarded_messages += 1;
                }
            }
            Inbound::Vote(vote) => self.handle_vote(vote, now_s),
            Inbound::Settings(settings) => self.handle_settings(settings),
            Inbound::Properties(properties) => self.handle_properties(properties),
            Inbound::Tick(tick) => self.handle_tick(tick, now_s),
        }
        self.flush_events();
    }

    fn handle_vote(&mut self, mut vote: VoteMessage, now_s: f64) {
        if self.participant_number(vote.user_id).is_none() {
            warn!(participant = %vote.user_id, "vote from unknown participant");
            self.stats.discarded_messages += 1;
            return;
        }
        self.stats.votes_received += 1;

        let current = self.machine.state_id();
        if vote.state_id != current {
            warn!(participant = %vote.user_id, state_id = %vote.state_id, %current, "stale vote");
            self.stats.stale_votes += 1;
            self.resend_state_info(vote.user_id);
            return;
        }

        for proposal in &mut vote.proposals {
            proposal.arrival_seconds = now_s;
        }
        trace!(participant = %vote.user_id, proposals = vote.proposals.len(), "vote buffered");
        self.votes.insert(vote.user_id, vote);
    }

    fn handle_settings(&mut self, settings: StrategySettings) {
        if settings.version_number != self.settings.version_number {
            debug!(
                got = settings.version_number,
                current = self.settings.version_number,
                "ignoring settings for another version"
            );
            return;
        }
        info!(
            version = settings.version_number,
            run = settings.run,
            reset = settings.reset,
            "settings accepted"
        );
        self.settings = settings;
        self.update_queue_length();
    }

    fn handle_properties(&mut self, properties: ParticipantProperties) {
        if !self.desired.contains(&properties.user_id) {
            warn!(participant = %properties.user_id, "properties from unknown participant");
            self.stats.discarded_messages += 1;
            return;
        }
        self.properties.insert(properties.user_id, properties);
        self.update_priorities();
        self.update_queue_length();
    }

    fn handle_tick(&mut self, tick: Tick, now_s: f64) {
        let Some(participant) = self.participant_number(tick.user_id) else {
            warn!(participant = %tick.user_id, "tick from unknown participant");
            self.stats.discarded_messages += 1;
            return;
        };
        self.ticks.add_tick(participant, tick.seconds_timestamp, tick.in_relation_to_previous_tick);
        self.ticks.forget_before(now_s);

        if !self.ticks.is_due(now_s) {
            return;
        }
        let Some(recommendations) = self.ticks.recommend(now_s) else {
            return;
        };
        for (user_id, tick_seconds_left) in self.roster.iter().copied().zip(recommendations) {
            self.outbox.push(Outbound::RecommendedTicks(RecommendedTicks { user_id, tick_seconds_left }));
        }
    }

    /// Run one turn
    pub fn run_turn(&mut self, now: Turn) -> TurnOutcome {
        let start = Instant::now();
        self.stats.turns += 1;
        self.stats.last_turn = now;

        let outcome = self.turn(now);
        match &outcome {
            TurnOutcome::Idle(_) => self.stats.idle_turns += 1,
            TurnOutcome::CoolDown { .. } => self.stats.cooldowns += 1,
            TurnOutcome::Transitioned { .. } => self.stats.transitions += 1,
        }

        self.ledger.prune(now);
        self.flush_events();
        self.stats.participants = self.roster.len();
        self.stats.state_id = self.machine.state_id();
        self.stats.last_turn_duration = start.elapsed();
        outcome
    }

    fn turn(&mut self, now: Turn) -> TurnOutcome {
        let now_s = self.clock.seconds_at(now);

        // Stage 1: Roster changes
        if self.roster_pending {
            self.apply_roster(now);
        }
        if self.roster.is_empty() {
            return TurnOutcome::Idle(IdleReason::NoParticipants);
        }

        // Stage 2: Skip conditions
        if self.settings.reset {
            self.reset(now);
        }
        if !self.settings.run {
            return TurnOutcome::Idle(IdleReason::Paused);
        }
        if now < self.cooldown_until {
            return TurnOutcome::Idle(IdleReason::CoolingDown);
        }
        let in_flight = self.in_flight(now_s);
        if in_flight > self.queue_length {
            trace!(in_flight, queue_length = self.queue_length, "transition queue full");
            return TurnOutcome::Idle(IdleReason::QueueFull);
        }

        // Stage 3: Votes for the current state
        let ballots = match self.collect_ballots(now_s) {
            Ok(ballots) => ballots,
            Err(reason) => return self.cool_down(now, reason, self.config.missing_votes_cooldown),
        };

        // Stage 4: Aggregate and filter
        let candidates = self.aggregator.build(&self.machine, &ballots);
        let ctx = FilterContext {
            machine: &self.machine,
            force_even: self.force_even,
            allowed_mask: self.settings.allowed_transitions_mask,
            scripted: self.settings.custom_transition_queue.first().copied(),
        };
        let candidates = match apply_filters(candidates, &ctx) {
            Ok(candidates) => candidates,
            Err(stage) => {
                debug!(%stage, "no candidate survived filtering");
                return self.cool_down(now, CoolDownReason::Filtered(stage), self.config.failure_cooldown_turns());
            }
        };

        // Stage 5: Selection and timing
        let winner = match self.select(candidates) {
            Ok(winner) => winner,
            Err(reason) => {
                debug!(?reason, "no transition selected");
                return self.cool_down(now, reason, self.config.failure_cooldown_turns());
            }
        };

        // Stage 6: Commit
        if let Err(e) = self.commit_selected(&winner, now) {
            error!(transition = %winner.transition, error = %e, "failed to commit transition");
            return self.cool_down(now, CoolDownReason::Commit(e), self.config.failure_cooldown_turns());
        }
        self.advance_script(winner.transition);

        // Stage 7: Clear the buffer
        self.votes.clear();
        self.last_decision = now_s;

        let state_id = self.machine.state_id();
        info!(
            transition = %winner.transition,
            %state_id,
            planning_ms = winner.planning_ms,
            execution_ms = winner.execution_ms,
            "transition committed"
        );
        TurnOutcome::Transitioned { transition: winner.transition, state_id }
    }

    fn cool_down(&mut self, now: Turn, reason: CoolDownReason, turns: Turn) -> TurnOutcome {
        self.cooldown_until = now + turns;
        TurnOutcome::CoolDown { reason, until: self.cooldown_until }
    }

    /// Recorded transitions that have not finished yet
    fn in_flight(&self, now_s: f64) -> usize {
        self.roster
            .iter()
            .filter_map(|id| self.histories.get(id))
            .map(|history| history.iter().filter(|t| t.to_seconds > now_s).count())
            .max()
            .unwrap_or(0)
    }

    fn collect_ballots(&mut self, now_s: f64) -> Result<Vec<Ballot>, CoolDownReason> {
        let state_id = self.machine.state_id();
        let mut ballots = Vec::with_capacity(self.roster.len());
        let mut missing = Vec::new();
        for (participant, id) in self.roster.iter().enumerate() {
            match self.votes.get(id) {
                Some(vote) if vote.state_id == state_id => {
                    ballots.push(Ballot::new(participant, vote.proposals.clone()))
                }
                _ => missing.push(*id),
            }
        }

        let grace = self.config.grace_period.as_secs_f64();
        if !missing.is_empty() && now_s - self.last_decision < grace {
            debug!(missing = missing.len(), "waiting for votes");
            for id in &missing {
                self.resend_state_info(*id);
            }
            return Err(CoolDownReason::MissingVotes(missing.len()));
        }
        if ballots.is_empty() {
            return Err(CoolDownReason::NoVotes);
        }
        Ok(ballots)
    }

    /// Select until a candidate's timing resolves
    fn select(&mut self, mut candidates: Vec<CandidateTransition>) -> Result<CandidateTransition, CoolDownReason> {
        let max_execution_ms = self.settings.max_allowed_execution_seconds * 1000.0;
        let resolved_first = self.selection.uses_time_quality();
        let mut dropped = 0;

        if resolved_first {
            let before = candidates.len();
            candidates = self.negotiator.resolve_all(candidates);
            candidates.retain(|c| c.execution_ms <= max_execution_ms);
            dropped = before - candidates.len();
        }
        self.selection.prepare(&mut candidates);

        loop {
            let Some(index) = self.selection.select_best(&candidates).filter(|i| *i < candidates.len()) else {
                return Err(if dropped > 0 { CoolDownReason::NoFeasibleTiming } else { CoolDownReason::NoSelection });
            };
            let mut candidate = candidates.remove(index);
            if resolved_first
                || (self.negotiator.resolve(&mut candidate) && candidate.execution_ms <= max_execution_ms)
            {
                return Ok(candidate);
            }
            debug!(transition = %candidate.transition, "timing infeasible, selecting again");
            dropped += 1;
        }
    }

    /// Planning and execution time after operator overrides
    fn preferred_timing(
        &self,
        winner: &CandidateTransition,
        before: &[[Point; NUM_GENERATORS]],
        after: &[[Point; NUM_GENERATORS]],
    ) -> (f64, f64) {
        let mut planning_ms = winner.planning_ms;
        let mut execution_ms = winner.execution_ms;

        if let Some(seconds) = self.settings.preferred_maneuver_second_distance_seconds.filter(|s| *s > 0.0) {
            planning_ms = seconds * 1000.0;
        }
        if let Some(speed) = self.settings.preferred_speed.filter(|v| *v > 0.0) {
            let n = before.len().max(1) as f64;
            let distance: f64 = before.iter().zip(after).map(|(b, a)| b[0].distance(a[0])).sum::<f64>() / n;
            execution_ms = distance / speed * 1000.0;
        }
        (planning_ms, execution_ms)
    }

    /// Place a step after the held phase. Planning time counts from the
    /// preparation start.
    pub fn schedule(&self, now: Turn, planning_ms: f64, execution_ms: f64) -> StepSchedule {
        let preparation_start = now.max(self.held_since.unwrap_or(now));
        let preparation_turns = self.config.min_preparation_turns.max(self.clock.ms_to_turns(planning_ms));
        let execution_turns = self.clock.ms_to_turns(execution_ms.max(self.config.min_execution_ms)).max(1);
        let execution_start = preparation_start + preparation_turns + 1;
        StepSchedule {
            preparation_start,
            execution_start,
            execution_end: execution_start + execution_turns,
        }
    }

    /// Commit the arrangement, then record the outcome with the selection
    /// mechanism. A rejected transition leaves the selection history alone.
    fn commit_selected(&mut self, winner: &CandidateTransition, now: Turn) -> SharespaceResult<()> {
        self.commit(winner, now)?;
        self.selection.commit(winner);
        Ok(())
    }

    fn commit(&mut self, winner: &CandidateTransition, now: Turn) -> SharespaceResult<()> {
        let moves = winner.local_moves();
        let start_visual: Vec<VisualState> =
            (0..self.roster.len()).map(|p| self.machine.visual_state(p)).collect::<SharespaceResult<_>>()?;
        let start_positions = self.machine.all_positions()?;
        let mut first: Option<StepSchedule> = None;

        loop {
            let before = self.machine.all_positions()?;
            let intermediate = self.machine.apply(winner.transition, &moves)?;
            let after = self.machine.all_positions()?;

            let (planning_ms, execution_ms) = self.preferred_timing(winner, &before, &after);
            let schedule = self.schedule(now, planning_ms, execution_ms);
            self.emit_step(&moves, &before, &after, &schedule);
            first.get_or_insert(schedule);
            trace!(?schedule, intermediate, "step scheduled");

            if !intermediate {
                break;
            }
        }
        self.force_even = self.force_even && !self.machine.is_even();

        let delay = self.config.execution_delay_turns;
        let movement_start = first.map_or(now, |s| s.execution_start) + delay;
        let held_start = self.held_since.unwrap_or(now) + delay;
        let from_seconds = self.clock.seconds_at(movement_start);
        let earliest = self.clock.seconds_at(held_start);

        for participant in 0..self.roster.len() {
            let id = self.roster[participant];
            let to_state = self.machine.visual_state(participant)?;
            let to_area = self.area_of(&self.machine.positions_for(participant)?);
            let history = self.histories.entry(id).or_default();
            let (from_state, from_area) = match history.last() {
                Some(previous) => (previous.to_state, previous.to_area.clone()),
                None => (start_visual[participant], area_of(&*self.partitioner, &start_positions[participant])),
            };
            history.push(TransitionInfo {
                from_state,
                to_state,
                local_move: moves.get(participant).copied().unwrap_or(LocalMove::Stay),
                from_area,
                to_area,
                from_seconds,
                to_seconds: earliest,
            });
            if history.len() > HISTORY_CAP {
                let excess = history.len() - HISTORY_CAP;
                history.drain(..excess);
            }
            let past = history[history.len().saturating_sub(self.config.past_transitions)..].to_vec();
            let info = self.build_state_info(participant, from_seconds, self.clock.seconds_at(held_start - 1), earliest, past)?;
            self.publish(info);
        }
        Ok(())
    }

    /// Cap the held events and append animation plus new held events
    fn emit_step(
        &mut self,
        moves: &[LocalMove],
        before: &[[Point; NUM_GENERATORS]],
        after: &[[Point; NUM_GENERATORS]],
        schedule: &StepSchedule,
    ) {
        let delay = self.config.execution_delay_turns;
        let previous_transition_id = self.transition_id;
        self.transition_id += 1;
        let transition_id = self.transition_id;
        let turn_seconds = self.clock.turn_ms() / 1000.0;
        let animation_start = schedule.execution_start + delay;
        let held_start = schedule.execution_end + delay;

        let builder = FrameBuilder::new(self.partitioner.as_ref(), self.machine.positions(), self.settings.focus_weight);
        for (participant, id) in self.roster.iter().enumerate() {
            let (Some(from), Some(to)) = (before.get(participant), after.get(participant)) else {
                continue;
            };
            let local_move = moves.get(participant).copied().unwrap_or(LocalMove::Stay);
            self.ledger.cap_held(*id, animation_start - 1);

            let frames = builder.animation(animation_start, schedule.execution_turns(), from, to);
            let event_id = self.ledger.next_id();
            self.ledger.insert(TransitionEvent {
                event_id,
                participant: *id,
                transition_id,
                previous_transition_id,
                context: EventContext::Animation,
                start_turn: animation_start,
                end_turn: held_start - 1,
                speed: frames_speed(&frames, turn_seconds),
                frames,
                local_move,
            });

            let event_id = self.ledger.next_id();
            self.ledger.insert(TransitionEvent {
                event_id,
                participant: *id,
                transition_id,
                previous_transition_id,
                context: EventContext::Static,
                start_turn: held_start,
                end_turn: OPEN_END,
                frames: builder.held(held_start, to).into_iter().collect(),
                local_move,
                speed: 0.0,
            });
        }
        self.held_since = Some(schedule.execution_end);
    }

    /// Hold everyone at the current positions from `now` and announce it
    fn send_initial_state(&mut self, now: Turn) {
        self.ledger.cap_all(now - 1);
        let Ok(positions) = self.machine.all_positions() else {
            error!("arrangement has no positions for its roster");
            return;
        };

        let builder = FrameBuilder::new(self.partitioner.as_ref(), self.machine.positions(), self.settings.focus_weight);
        for (id, at) in self.roster.iter().zip(&positions) {
            let event_id = self.ledger.next_id();
            self.ledger.insert(TransitionEvent {
                event_id,
                participant: *id,
                transition_id: self.transition_id,
                previous_transition_id: self.transition_id,
                context: EventContext::Static,
                start_turn: now,
                end_turn: OPEN_END,
                frames: builder.held(now, at).into_iter().collect(),
                local_move: LocalMove::Stay,
                speed: 0.0,
            });
        }
        self.held_since = Some(now);

        let seconds = self.clock.seconds_at(now);
        for participant in 0..self.roster.len() {
            match self.build_state_info(participant, seconds, seconds, seconds, Vec::new()) {
                Ok(info) => self.publish(info),
                Err(e) => error!(participant, error = %e, "failed to build state summary"),
            }
        }
        self.last_decision = seconds;
    }

    fn build_state_info(
        &self,
        participant: usize,
        from_seconds: f64,
        to_seconds: f64,
        earliest_next_execution_seconds: f64,
        past_transitions: Vec<TransitionInfo>,
    ) -> SharespaceResult<StateInfo> {
        let user_id = *self.roster.get(participant).ok_or(SharespaceError::ParticipantOutOfRange(participant))?;
        let (current_visual_state, legal_moves) = self.machine.candidate_options(participant)?;

        let mut ends = Vec::with_capacity(legal_moves.len());
        let mut areas = Vec::with_capacity(legal_moves.len());
        for mv in &legal_moves {
            let generators = self.machine.preview(participant, *mv)?;
            let area = self.area_of(&generators);
            ends.push(if area.is_empty() { generators[0] } else { area.centroid() });
            areas.push(area);
        }

        Ok(StateInfo {
            user_id,
            state_id: self.machine.state_id(),
            current_visual_state,
            legal_moves,
            candidate_end_position_per_move: ends,
            candidate_end_area_per_move: areas,
            from_seconds,
            to_seconds,
            earliest_next_execution_seconds,
            past_transitions,
        })
    }

    fn area_of(&self, generators: &[Point; NUM_GENERATORS]) -> Polygon {
        area_of(&*self.partitioner, generators)
    }

    fn publish(&mut self, info: StateInfo) {
        self.outbox.push(Outbound::StateInfo(info.clone()));
        self.state_infos.insert(info.user_id, info);
    }

    fn resend_state_info(&mut self, id: ParticipantId) {
        if let Some(info) = self.state_infos.get(&id) {
            self.outbox.push(Outbound::StateInfo(info.clone()));
        }
    }

    fn flush_events(&mut self) {
        let events = self.ledger.take_pending();
        if !events.is_empty() {
            self.stats.events_emitted += events.len() as u64;
            self.outbox.push(Outbound::Events(events));
        }
    }

    fn advance_script(&mut self, transition: SystemTransition) {
        if self.settings.custom_transition_queue.first() != Some(&transition) {
            return;
        }
        self.settings.custom_transition_queue.remove(0);
        self.settings.version_number += 1;
        debug!(
            remaining = self.settings.custom_transition_queue.len(),
            version = self.settings.version_number,
            "scripted transition done"
        );
        self.outbox.push(Outbound::Settings(self.settings.clone()));
    }

    fn reset(&mut self, now: Turn) {
        info!(state_id = %self.machine.state_id(), "resetting arrangement");
        self.ledger.cap_all(now - 1);
        self.machine.reset();
        self.ticks.reset();
        self.selection.reset();
        self.negotiator.reset();
        self.votes.clear();
        self.cooldown_until = Turn::MIN;
        self.send_initial_state(now);

        self.settings.reset = false;
        self.settings.version_number += 1;
        self.outbox.push(Outbound::Settings(self.settings.clone()));
    }

    /// Apply the desired roster. An uneven layout only lets participants
    /// leave; joins wait until a transition evens it out.
    fn apply_roster(&mut self, now: Turn) {
        let even = self.machine.is_even();
        let removed: Vec<usize> = self
            .roster
            .iter()
            .enumerate()
            .filter(|(_, id)| !self.desired.contains(id))
            .map(|(p, _)| p)
            .collect();
        let mut changed = false;

        if !removed.is_empty() {
            if let Err(e) = self.machine.remove_participants(&removed) {
                error!(error = %e, "failed to remove participants");
                return;
            }
            for &participant in removed.iter().rev() {
                self.selection.remove_participant(participant);
                self.ticks.remove_participant(participant);
                let id = self.roster.remove(participant);
                self.ledger.revoke(id, now);
                self.votes.remove(&id);
                self.state_infos.remove(&id);
                self.histories.remove(&id);
                self.properties.remove(&id);
                info!(participant = %id, "participant left");
            }
            changed = true;
        }

        if even {
            let joining: Vec<ParticipantId> =
                self.desired.iter().filter(|id| !self.roster.contains(id)).copied().collect();
            for id in joining {
                match self.machine.add_participant() {
                    Ok(number) => {
                        self.roster.push(id);
                        self.selection.add_participant();
                        self.ticks.add_participant();
                        info!(participant = %id, number, "participant joined");
                        changed = true;
                    }
                    Err(e) => {
                        warn!(participant = %id, error = %e, "cannot place participant");
                        self.desired.retain(|d| *d != id);
                    }
                }
            }
            self.roster_pending = false;
        } else {
            debug!(waiting = self.desired.len().saturating_sub(self.roster.len()), "layout uneven, joins deferred");
        }
        self.force_even = !even;

        if changed {
            self.update_priorities();
            self.update_queue_length();
            self.send_initial_state(now);
        }
    }

    fn update_priorities(&mut self) {
        let priority = |id: &ParticipantId, pick: fn(&ParticipantProperties) -> f64| {
            self.properties.get(id).map_or(1.0, pick)
        };
        let moves: Vec<f64> = self.roster.iter().map(|id| priority(id, |p| p.move_priority)).collect();
        let times: Vec<f64> = self.roster.iter().map(|id| priority(id, |p| p.time_priority)).collect();
        self.selection.set_priorities(&moves);
        self.negotiator.set_priorities(&times);
    }

    fn update_queue_length(&mut self) {
        let requested = self
            .roster
            .iter()
            .filter_map(|id| self.properties.get(id))
            .map(|p| p.queue_length)
            .min()
            .unwrap_or(0);
        self.queue_length = match self.settings.transition_queue_length {
            0 => requested,
            configured => configured,
        };
    }
}

/// Unweighted area of generator 0, empty when the partition fails
fn area_of(partitioner: &dyn AreaPartitioner, generators: &[Point; NUM_GENERATORS]) -> Polygon {
    let input = generators.iter().copied().enumerate().collect();
    match partitioner.partition(&input) {
        Ok(mut cells) => cells.remove(&0).unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "partition failed");
            Polygon::default()
        }
    }
}
