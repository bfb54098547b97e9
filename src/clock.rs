//! Clock collaborators
//!
//! The engine never produces time itself. A host player supplies the position
//! clock and a [`ClockSource`] supplies true wall-clock readings.

use crate::types::WallTime;
use chrono::Utc;

/// Nominal length of one video frame when the player cannot report it
pub const DEFAULT_FRAME_DURATION_MS: u32 = 33;

/// Playback position supplied by the host video player
pub trait PositionSource {
    /// Current playback position in milliseconds (may jump backward)
    fn position_ms(&self) -> u64;

    fn is_playing(&self) -> bool;

    /// Length of one frame in milliseconds, 0 if unknown
    fn frame_duration_ms(&self) -> u32;
}

/// True wall-clock readings
pub trait ClockSource {
    fn now(&self) -> WallTime;
}

/// Wall clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> WallTime {
        WallTime::from_secs(Utc::now().timestamp_micros() as f64 / 1_000_000.0)
    }
}

/// Wall clock that only moves when told to
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualClock {
    now: WallTime,
}

impl ManualClock {
    pub fn new(start: WallTime) -> Self {
        Self { now: start }
    }

    pub fn set(&mut self, now: WallTime) {
        self.now = now;
    }

    pub fn advance_ms(&mut self, ms: f64) {
        self.now = WallTime::from_secs(self.now.as_secs() + ms / 1000.0);
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> WallTime {
        self.now
    }
}

/// Player state driven explicitly by a script or a test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedPlayer {
    pub position_ms: u64,
    pub playing: bool,
    pub frame_duration_ms: u32,
}

impl Default for ScriptedPlayer {
    fn default() -> Self {
        Self {
            position_ms: 0,
            playing: false,
            frame_duration_ms: DEFAULT_FRAME_DURATION_MS,
        }
    }
}

impl ScriptedPlayer {
    pub fn playing_at(position_ms: u64) -> Self {
        Self {
            position_ms,
            playing: true,
            ..Self::default()
        }
    }
}

impl PositionSource for ScriptedPlayer {
    fn position_ms(&self) -> u64 {
        self.position_ms
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn frame_duration_ms(&self) -> u32 {
        self.frame_duration_ms
    }
}

/// Frame length to use, substituting `fallback` when the player reports 0
pub fn effective_frame_duration(reported: u32, fallback: u32) -> u32 {
    match (reported, fallback) {
        (0, 0) => DEFAULT_FRAME_DURATION_MS,
        (0, fallback) => fallback,
        (reported, _) => reported,
    }
}
