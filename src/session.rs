//! Recording session state machine
//!
//! Gates trigger and release signals on their way to the [`Timeline`], follows
//! the player's play/pause state and runs an optional countdown measured in
//! position-clock time since the session anchor.
//!
//! States: `Idle -> Waiting -> Recording <-> Paused -> Idle | Completed`.
//!
//! Play/pause requests issued by the session leave a token; the player
//! notification that answers such a request consumes the token and is ignored,
//! so the session never reacts to its own commands.

use crate::clock::{
    effective_frame_duration, ClockSource, PositionSource, SystemClock, DEFAULT_FRAME_DURATION_MS,
};
use crate::error::TimelineError;
use crate::notify::{DomainEvent, EventBus, TimelineObserver};
use crate::timeline::{RewindGuard, RewindOutcome, RewindReport, Timeline, DEFAULT_REWIND_EPSILON_MS};
use crate::types::{ms_to_secs, EventIndex, TriggerId};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Recording session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    /// Start requested; recording begins on the first trigger or release
    Waiting,
    Recording,
    Paused,
    /// The countdown ran out
    Completed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Waiting => "waiting",
            SessionState::Recording => "recording",
            SessionState::Paused => "paused",
            SessionState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Session tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Backward jumps up to this size are not treated as rewinds
    pub rewind_epsilon_ms: u64,
    /// Keep closed events untouched when the player rewinds
    pub preserve_on_rewind: bool,
    /// Frame length used when the player reports 0
    pub default_frame_duration_ms: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rewind_epsilon_ms: DEFAULT_REWIND_EPSILON_MS,
            preserve_on_rewind: false,
            default_frame_duration_ms: DEFAULT_FRAME_DURATION_MS,
        }
    }
}

/// Requests from the session to the host player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackCommand {
    Play,
    Pause,
}

/// Caller's answer to a reset candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewindDecision {
    /// Clear the whole timeline and return to idle
    ResetSession,
    /// Keep recording and apply the usual cutoff edits
    Continue,
}

/// What a trigger or release did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The signal started recording and was consumed
    RecordingStarted,
    Opened,
    Closed(EventIndex),
}

/// What a position update did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionUpdate {
    /// The session is not recording or paused
    Ignored,
    Steady,
    Rewound(RewindReport),
    ResetCandidate { position_ms: u64, anchor_ms: u64 },
    /// A reset decision is still outstanding
    AwaitingDecision,
    /// The countdown ran out on this update
    Completed,
}

#[derive(Debug, Clone, Copy)]
struct Countdown {
    target_secs: f64,
    anchor_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct PendingReset {
    position_ms: u64,
}

/// A live recording session over one timeline
#[derive(Debug)]
pub struct RecordingSession<C: ClockSource = SystemClock> {
    id: Uuid,
    config: SessionConfig,
    state: SessionState,
    timeline: Timeline,
    guard: RewindGuard,
    clock: C,
    bus: EventBus,
    countdown: Option<Countdown>,
    /// Playback state the player will report in answer to our last command
    expected_playback: Option<bool>,
    pending_reset: Option<PendingReset>,
    commands: Vec<PlaybackCommand>,
}

impl RecordingSession<SystemClock> {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: ClockSource> RecordingSession<C> {
    pub fn with_clock(config: SessionConfig, clock: C) -> Self {
        let guard = RewindGuard::new(config.rewind_epsilon_ms, config.preserve_on_rewind);
        Self {
            id: Uuid::new_v4(),
            config,
            state: SessionState::Idle,
            timeline: Timeline::new(),
            guard,
            clock,
            bus: EventBus::new(),
            countdown: None,
            expected_playback: None,
            pending_reset: None,
            commands: Vec::new(),
        }
    }

    /// Continue recording into an existing timeline
    pub fn with_timeline(mut self, timeline: Timeline) -> Self {
        self.timeline = timeline;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn into_timeline(self) -> Timeline {
        self.timeline
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn subscribe(&mut self, observer: Box<dyn TimelineObserver>) {
        self.bus.subscribe(observer);
    }

    pub fn set_preserve_on_rewind(&mut self, preserve: bool) {
        self.config.preserve_on_rewind = preserve;
        self.guard.set_preserve(preserve);
    }

    pub fn has_pending_reset(&self) -> bool {
        self.pending_reset.is_some()
    }

    /// Take the playback commands issued since the last call
    pub fn drain_commands(&mut self) -> Vec<PlaybackCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Arm a session; `duration_secs` sets the countdown for timed sessions.
    ///
    /// Starting from `Completed` keeps the timeline, so the next anchor
    /// begins another segment of it.
    pub fn request_start(&mut self, duration_secs: Option<f64>) -> Result<(), TimelineError> {
        if !matches!(self.state, SessionState::Idle | SessionState::Completed) {
            return Err(self.rejected(format!("cannot start while {}", self.state)));
        }
        if let Some(secs) = duration_secs {
            if !(secs.is_finite() && secs > 0.0) {
                return Err(TimelineError::InvalidTransition(format!(
                    "countdown must be positive, got {}",
                    secs
                )));
            }
            self.timeline.set_test_duration_secs(Some(secs));
        }
        self.expected_playback = None;
        self.countdown = duration_secs.map(|target_secs| Countdown {
            target_secs,
            anchor_ms: None,
        });
        info!(
            "Session {} armed ({})",
            self.id,
            duration_secs.map_or("untimed".to_string(), |s| format!("{}s", s))
        );
        self.transition(SessionState::Waiting);
        Ok(())
    }

    /// A trigger was pressed
    pub fn handle_trigger(
        &mut self,
        player: &impl PositionSource,
        trigger_id: TriggerId,
        label: &str,
    ) -> Result<SignalOutcome, TimelineError> {
        self.ensure_no_pending_reset()?;
        match self.state {
            SessionState::Waiting => {
                self.begin_recording(player);
                Ok(SignalOutcome::RecordingStarted)
            }
            SessionState::Recording if player.is_playing() => {
                let result = self
                    .timeline
                    .start(trigger_id, label, player.position_ms(), self.clock.now());
                self.flush();
                result.map(|_| SignalOutcome::Opened)
            }
            SessionState::Recording => Err(self.rejected("player is not playing".to_string())),
            state => Err(self.rejected(format!("trigger ignored while {}", state))),
        }
    }

    /// A trigger was released
    pub fn handle_release(
        &mut self,
        player: &impl PositionSource,
        trigger_id: &TriggerId,
    ) -> Result<SignalOutcome, TimelineError> {
        self.ensure_no_pending_reset()?;
        match self.state {
            SessionState::Waiting => {
                self.begin_recording(player);
                Ok(SignalOutcome::RecordingStarted)
            }
            SessionState::Recording => {
                let frame = self.frame(player);
                let result =
                    self.timeline
                        .end(trigger_id, player.position_ms(), self.clock.now(), frame);
                self.flush();
                result.map(SignalOutcome::Closed)
            }
            state => Err(self.rejected(format!("release ignored while {}", state))),
        }
    }

    /// The player's play/pause state changed
    pub fn on_playback_changed(&mut self, player: &impl PositionSource) {
        let playing = player.is_playing();
        if let Some(expected) = self.expected_playback.take() {
            if expected == playing {
                debug!("Playback change to playing={} was requested by the session", playing);
                return;
            }
        }
        match (self.state, playing) {
            (SessionState::Recording, false) => self.enter_paused(player),
            (SessionState::Paused, true) => self.transition(SessionState::Recording),
            _ => {}
        }
    }

    /// Explicit pause request
    pub fn pause(&mut self, player: &impl PositionSource) -> Result<(), TimelineError> {
        if self.state != SessionState::Recording {
            return Err(TimelineError::InvalidTransition(format!(
                "cannot pause while {}",
                self.state
            )));
        }
        if player.is_playing() {
            self.request_playback(PlaybackCommand::Pause);
        }
        self.enter_paused(player);
        Ok(())
    }

    /// Explicit resume request
    pub fn resume(&mut self, player: &impl PositionSource) -> Result<(), TimelineError> {
        if self.state != SessionState::Paused {
            return Err(TimelineError::InvalidTransition(format!(
                "cannot resume while {}",
                self.state
            )));
        }
        if !player.is_playing() {
            self.request_playback(PlaybackCommand::Play);
        }
        self.transition(SessionState::Recording);
        Ok(())
    }

    /// Manual stop; the timeline is kept
    pub fn stop(&mut self, player: &impl PositionSource) -> Result<(), TimelineError> {
        match self.state {
            SessionState::Recording | SessionState::Paused => {
                let frame = self.frame(player);
                self.timeline
                    .close_all(player.position_ms(), self.clock.now(), frame);
                self.countdown = None;
                self.pending_reset = None;
                info!("Session {} stopped", self.id);
                self.transition(SessionState::Idle);
                Ok(())
            }
            SessionState::Waiting => self.cancel(),
            state => Err(TimelineError::InvalidTransition(format!(
                "cannot stop while {}",
                state
            ))),
        }
    }

    /// Abandon an armed session before recording began
    pub fn cancel(&mut self) -> Result<(), TimelineError> {
        if self.state != SessionState::Waiting {
            return Err(TimelineError::InvalidTransition(format!(
                "cannot cancel while {}",
                self.state
            )));
        }
        self.countdown = None;
        info!("Session {} cancelled", self.id);
        self.transition(SessionState::Idle);
        Ok(())
    }

    /// The playback position moved
    pub fn on_position(&mut self, player: &impl PositionSource) -> PositionUpdate {
        if !matches!(self.state, SessionState::Recording | SessionState::Paused) {
            return PositionUpdate::Ignored;
        }
        let position_ms = player.position_ms();
        if self.pending_reset.is_some() {
            self.guard.note_position(position_ms);
            return PositionUpdate::AwaitingDecision;
        }

        let frame = self.frame(player);
        let outcome = self
            .guard
            .observe(&mut self.timeline, position_ms, self.clock.now(), frame);
        self.flush();

        match outcome {
            RewindOutcome::Steady => {
                if self.tick(player) {
                    PositionUpdate::Completed
                } else {
                    PositionUpdate::Steady
                }
            }
            RewindOutcome::Rewound(report) => PositionUpdate::Rewound(report),
            RewindOutcome::ResetCandidate {
                position_ms,
                anchor_ms,
                ..
            } => {
                self.pending_reset = Some(PendingReset { position_ms });
                PositionUpdate::ResetCandidate {
                    position_ms,
                    anchor_ms,
                }
            }
        }
    }

    /// Complete the session if the countdown has run out
    pub fn tick(&mut self, player: &impl PositionSource) -> bool {
        if self.state != SessionState::Recording {
            return false;
        }
        match self.remaining_secs(player) {
            Some(remaining) if remaining <= 0.0 => {
                self.complete(player);
                true
            }
            _ => false,
        }
    }

    /// Seconds left on the countdown, `None` for untimed sessions
    pub fn remaining_secs(&self, player: &impl PositionSource) -> Option<f64> {
        let countdown = self.countdown?;
        let elapsed = countdown
            .anchor_ms
            .map(|anchor| ms_to_secs(player.position_ms().saturating_sub(anchor)))
            .unwrap_or(0.0);
        Some((countdown.target_secs - elapsed).max(0.0))
    }

    /// Answer an outstanding reset candidate
    pub fn resolve_rewind(
        &mut self,
        decision: RewindDecision,
    ) -> Result<Option<RewindReport>, TimelineError> {
        let Some(pending) = self.pending_reset.take() else {
            return Err(TimelineError::InvalidTransition(
                "no rewind decision pending".to_string(),
            ));
        };

        match decision {
            RewindDecision::ResetSession => {
                info!("Session {} reset after rewind to {}ms", self.id, pending.position_ms);
                self.timeline.clear();
                self.countdown = None;
                self.guard.reset(None);
                self.transition(SessionState::Idle);
                Ok(None)
            }
            RewindDecision::Continue => {
                let report = if self.guard.preserve() {
                    RewindReport {
                        position_ms: pending.position_ms,
                        ..RewindReport::default()
                    }
                } else {
                    RewindGuard::apply_cutoff(&mut self.timeline, pending.position_ms)
                };
                self.flush();
                Ok(Some(report))
            }
        }
    }

    fn begin_recording(&mut self, player: &impl PositionSource) {
        let position_ms = player.position_ms();
        self.timeline.insert_anchor(position_ms);
        if let Some(countdown) = self.countdown.as_mut() {
            countdown.anchor_ms = Some(position_ms);
        }
        self.guard.reset(Some(position_ms));
        if !player.is_playing() {
            self.request_playback(PlaybackCommand::Play);
        }
        info!("Session {} recording from {}ms", self.id, position_ms);
        self.transition(SessionState::Recording);
    }

    fn enter_paused(&mut self, player: &impl PositionSource) {
        let frame = self.frame(player);
        self.timeline
            .close_all(player.position_ms(), self.clock.now(), frame);
        self.transition(SessionState::Paused);
    }

    fn complete(&mut self, player: &impl PositionSource) {
        let frame = self.frame(player);
        self.timeline
            .close_all(player.position_ms(), self.clock.now(), frame);
        if player.is_playing() {
            self.request_playback(PlaybackCommand::Pause);
        }
        info!("Session {} completed", self.id);
        self.transition(SessionState::Completed);
    }

    fn request_playback(&mut self, command: PlaybackCommand) {
        self.expected_playback = Some(command == PlaybackCommand::Play);
        self.commands.push(command);
    }

    fn ensure_no_pending_reset(&self) -> Result<(), TimelineError> {
        if self.pending_reset.is_some() {
            warn!("Signal ignored: rewind decision pending");
            return Err(TimelineError::SignalRejected(
                "rewind decision pending".to_string(),
            ));
        }
        Ok(())
    }

    fn rejected(&self, reason: String) -> TimelineError {
        warn!("Session {}: {}", self.id, reason);
        TimelineError::SignalRejected(reason)
    }

    fn frame(&self, player: &impl PositionSource) -> u32 {
        effective_frame_duration(player.frame_duration_ms(), self.config.default_frame_duration_ms)
    }

    fn transition(&mut self, to: SessionState) {
        self.flush();
        let from = std::mem::replace(&mut self.state, to);
        if from != to {
            debug!("Session {}: {} -> {}", self.id, from, to);
            self.bus.publish(&DomainEvent::SessionStateChanged { from, to });
        }
    }

    fn flush(&mut self) {
        let events = self.timeline.drain_events();
        self.bus.publish_all(events);
    }
}
