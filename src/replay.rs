//! Host signal replay
//!
//! A recorded session is a newline-delimited JSON stream of host callbacks,
//! each stamped with the wall clock reading at which it arrived:
//!
//! ```text
//! {"wall_secs": 0.0, "kind": "start", "duration_secs": 300}
//! {"wall_secs": 1.2, "kind": "position", "ms": 1200}
//! {"wall_secs": 1.2, "kind": "press", "key": "o"}
//! {"wall_secs": 2.9, "kind": "release", "key": "o"}
//! ```
//!
//! Records are fed through a [`RecordingSession`] driven by a manual clock and
//! a scripted player, so a replay is fully deterministic. Playback commands
//! issued by the session are applied to the player and answered with a
//! play/pause notification, the way a real player would.

use crate::action_map::ActionMap;
use crate::clock::{ManualClock, ScriptedPlayer};
use crate::error::TimelineError;
use crate::session::{
    PlaybackCommand, PositionUpdate, RecordingSession, RewindDecision, SessionConfig, SessionState,
};
use crate::timeline::Timeline;
use crate::types::{TriggerId, WallTime};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use uuid::Uuid;

/// One host callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    /// Wall clock reading in seconds
    pub wall_secs: f64,
    #[serde(flatten)]
    pub signal: HostSignal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostSignal {
    /// Arm a session, timed when `duration_secs` is set
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_secs: Option<f64>,
    },
    /// The playback position moved
    Position { ms: u64 },
    /// The player started or stopped playing
    Playback { playing: bool },
    Press { key: String },
    Release { key: String },
    Pause,
    Resume,
    Stop,
    Cancel,
    Tick,
    /// Answer to an outstanding reset candidate
    Decide { decision: RewindDecision },
}

/// Counters collected during a replay
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplayStats {
    pub session_id: Uuid,
    pub final_state: Option<SessionState>,
    pub records: usize,
    /// Signals refused by the session or the action map
    pub rejected: usize,
    pub rewinds: usize,
    pub reset_candidates: usize,
    pub events: usize,
}

#[derive(Debug)]
pub struct ReplayOutcome {
    pub stats: ReplayStats,
    pub timeline: Timeline,
}

/// Drives a session from host records
pub struct Replayer {
    session: RecordingSession<ManualClock>,
    player: ScriptedPlayer,
    map: ActionMap,
    stats: ReplayStats,
}

impl Replayer {
    pub fn new(config: SessionConfig, map: ActionMap) -> Self {
        let session = RecordingSession::with_clock(config, ManualClock::new(WallTime::from_secs(0.0)));
        let stats = ReplayStats {
            session_id: session.id(),
            ..ReplayStats::default()
        };
        Self {
            session,
            player: ScriptedPlayer::default(),
            map,
            stats,
        }
    }

    pub fn session(&self) -> &RecordingSession<ManualClock> {
        &self.session
    }

    pub fn player(&self) -> &ScriptedPlayer {
        &self.player
    }

    pub fn stats(&self) -> &ReplayStats {
        &self.stats
    }

    /// Apply one record. Refused signals are counted, not returned.
    pub fn apply(&mut self, record: &HostRecord) {
        self.stats.records += 1;
        self.session.clock_mut().set(WallTime::from_secs(record.wall_secs));

        let result = match &record.signal {
            HostSignal::Start { duration_secs } => self.session.request_start(*duration_secs),
            HostSignal::Position { ms } => {
                self.player.position_ms = *ms;
                match self.session.on_position(&self.player) {
                    PositionUpdate::Rewound(report) => {
                        debug!("Rewind to {}ms: {:?}", ms, report);
                        self.stats.rewinds += 1;
                    }
                    PositionUpdate::ResetCandidate { anchor_ms, .. } => {
                        info!("Rewind to {}ms passed the anchor at {}ms", ms, anchor_ms);
                        self.stats.rewinds += 1;
                        self.stats.reset_candidates += 1;
                    }
                    _ => {}
                }
                Ok(())
            }
            HostSignal::Playback { playing } => {
                self.player.playing = *playing;
                self.session.on_playback_changed(&self.player);
                Ok(())
            }
            HostSignal::Press { key } => self.press(TriggerId::from(key.as_str())),
            HostSignal::Release { key } => self
                .session
                .handle_release(&self.player, &TriggerId::from(key.as_str()))
                .map(|_| ()),
            HostSignal::Pause => self.session.pause(&self.player),
            HostSignal::Resume => self.session.resume(&self.player),
            HostSignal::Stop => self.session.stop(&self.player),
            HostSignal::Cancel => self.session.cancel(),
            HostSignal::Tick => {
                self.session.tick(&self.player);
                Ok(())
            }
            HostSignal::Decide { decision } => self.session.resolve_rewind(*decision).map(|_| ()),
        };

        if let Err(err) = result {
            warn!("Record {} refused: {}", self.stats.records, err);
            self.stats.rejected += 1;
        }
        self.follow_commands();
    }

    fn press(&mut self, trigger: TriggerId) -> Result<(), TimelineError> {
        // only an actual recording needs the label
        let label = if self.session.state() == SessionState::Recording {
            self.map.resolve(&trigger)?
        } else {
            ""
        };
        self.session
            .handle_trigger(&self.player, trigger, label)
            .map(|_| ())
    }

    fn follow_commands(&mut self) {
        for command in self.session.drain_commands() {
            self.player.playing = command == PlaybackCommand::Play;
            debug!("Player follows {:?}", command);
            self.session.on_playback_changed(&self.player);
        }
    }

    /// Stop a session still in progress and hand back its timeline
    pub fn finish(mut self) -> ReplayOutcome {
        if matches!(
            self.session.state(),
            SessionState::Recording | SessionState::Paused | SessionState::Waiting
        ) {
            info!("Replay ended while {}; stopping", self.session.state());
            if let Err(err) = self.session.stop(&self.player) {
                warn!("Could not stop session: {}", err);
            }
        }
        self.stats.final_state = Some(self.session.state());
        let timeline = self.session.into_timeline();
        self.stats.events = timeline.closed_count();
        ReplayOutcome {
            stats: self.stats,
            timeline,
        }
    }
}

/// Parse a script, skipping blank lines and `#` comments
pub fn parse_script<R: BufRead>(reader: R) -> Result<Vec<HostRecord>, TimelineError> {
    let mut records = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let record = serde_json::from_str(line)
            .map_err(|err| TimelineError::ParseError(format!("line {}: {}", number + 1, err)))?;
        records.push(record);
    }
    Ok(records)
}

/// Replay a whole script
pub fn replay<R: BufRead>(
    reader: R,
    config: SessionConfig,
    map: ActionMap,
) -> Result<ReplayOutcome, TimelineError> {
    let records = parse_script(reader)?;
    let mut replayer = Replayer::new(config, map);
    for record in &records {
        replayer.apply(record);
    }
    let outcome = replayer.finish();
    info!(
        "Replayed {} records: {} events, {} refused",
        outcome.stats.records, outcome.stats.events, outcome.stats.rejected
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(script: &str) -> ReplayOutcome {
        replay(script.as_bytes(), SessionConfig::default(), ActionMap::default()).unwrap()
    }

    #[test]
    fn test_record_parsing() {
        let record: HostRecord =
            serde_json::from_str(r#"{"wall_secs": 1.5, "kind": "press", "key": "o"}"#).unwrap();
        assert_eq!(record.signal, HostSignal::Press { key: "o".to_string() });

        let record: HostRecord =
            serde_json::from_str(r#"{"wall_secs": 0, "kind": "decide", "decision": "reset_session"}"#)
                .unwrap();
        assert_eq!(
            record.signal,
            HostSignal::Decide {
                decision: RewindDecision::ResetSession
            }
        );

        let record: HostRecord = serde_json::from_str(r#"{"wall_secs": 0, "kind": "start"}"#).unwrap();
        assert_eq!(record.signal, HostSignal::Start { duration_secs: None });
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let script = "# header\n\n{\"wall_secs\": 0, \"kind\": \"tick\"}\n{\"kind\": \"jump\"}\n";
        let err = parse_script(script.as_bytes()).unwrap_err();
        assert!(matches!(err, TimelineError::ParseError(ref msg) if msg.starts_with("line 4")));
    }

    #[test]
    fn test_replay_records_event() {
        let outcome = run(r#"
            {"wall_secs": 0.0, "kind": "start", "duration_secs": 300}
            {"wall_secs": 0.0, "kind": "playback", "playing": true}
            {"wall_secs": 1.0, "kind": "position", "ms": 1000}
            {"wall_secs": 1.0, "kind": "press", "key": "o"}
            {"wall_secs": 2.0, "kind": "position", "ms": 2000}
            {"wall_secs": 2.0, "kind": "press", "key": "o"}
            {"wall_secs": 3.5, "kind": "position", "ms": 3500}
            {"wall_secs": 3.5, "kind": "release", "key": "o"}
            {"wall_secs": 4.0, "kind": "press", "key": "z"}
            {"wall_secs": 4.0, "kind": "stop"}
        "#);

        let events = outcome.timeline.snapshot();
        assert_eq!(events.len(), 2);
        assert!(events[0].is_anchor());
        assert_eq!(events[0].onset, 1000);
        assert_eq!(events[1].label, "Attack bites");
        assert_eq!((events[1].onset, events[1].offset), (2000, Some(3500)));
        assert_eq!(outcome.stats.rejected, 1);
        assert_eq!(outcome.stats.events, 2);
        assert_eq!(outcome.stats.final_state, Some(SessionState::Idle));
        assert_eq!(outcome.timeline.test_duration_secs(), Some(300.0));
    }

    #[test]
    fn test_session_play_request_is_followed() {
        let mut replayer = Replayer::new(SessionConfig::default(), ActionMap::default());
        for line in [
            r#"{"wall_secs": 0, "kind": "start"}"#,
            r#"{"wall_secs": 0, "kind": "press", "key": "q"}"#,
        ] {
            replayer.apply(&serde_json::from_str(line).unwrap());
        }
        assert!(replayer.player().playing);
        assert_eq!(replayer.session().state(), SessionState::Recording);
        assert_eq!(replayer.stats().rejected, 0);
    }

    #[test]
    fn test_rewind_past_anchor_then_reset() {
        let outcome = run(r#"
            {"wall_secs": 0, "kind": "start"}
            {"wall_secs": 0, "kind": "playback", "playing": true}
            {"wall_secs": 1, "kind": "position", "ms": 1000}
            {"wall_secs": 1, "kind": "press", "key": "o"}
            {"wall_secs": 5, "kind": "position", "ms": 5000}
            {"wall_secs": 5, "kind": "press", "key": "o"}
            {"wall_secs": 6, "kind": "position", "ms": 6000}
            {"wall_secs": 7, "kind": "position", "ms": 500}
            {"wall_secs": 7, "kind": "press", "key": "j"}
            {"wall_secs": 8, "kind": "decide", "decision": "reset_session"}
        "#);

        assert_eq!(outcome.stats.reset_candidates, 1);
        // the press while the decision was pending
        assert_eq!(outcome.stats.rejected, 1);
        assert!(outcome.timeline.is_empty());
        assert_eq!(outcome.stats.final_state, Some(SessionState::Idle));
    }

    #[test]
    fn test_rewind_inside_session_truncates() {
        let outcome = run(r#"
            {"wall_secs": 0, "kind": "start"}
            {"wall_secs": 0, "kind": "playback", "playing": true}
            {"wall_secs": 0, "kind": "position", "ms": 0}
            {"wall_secs": 0, "kind": "press", "key": "o"}
            {"wall_secs": 1, "kind": "position", "ms": 1000}
            {"wall_secs": 1, "kind": "press", "key": "q"}
            {"wall_secs": 3, "kind": "position", "ms": 3000}
            {"wall_secs": 3, "kind": "release", "key": "q"}
            {"wall_secs": 4, "kind": "position", "ms": 2000}
        "#);

        assert_eq!(outcome.stats.rewinds, 1);
        let events = outcome.timeline.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].label, "Chasing");
        assert_eq!((events[1].onset, events[1].offset), (1000, Some(2000)));
        assert!(events.iter().all(|e| !e.is_open()));
    }
}
