//! Rewind guard
//!
//! Watches position updates. A backward jump of more than `epsilon_ms`
//! finalizes open events at the new position, then removes closed events that
//! start after it and truncates those that straddle it. Jumping back before
//! the latest `RecordingStart` anchor is surfaced as a reset candidate instead.

use crate::timeline::store::Timeline;
use crate::types::{EventIndex, WallTime};
use log::{info, warn};
use serde::Serialize;

/// Backward jumps up to this many milliseconds are treated as jitter
pub const DEFAULT_REWIND_EPSILON_MS: u64 = 100;

/// Edits applied to a timeline after a rewind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewindReport {
    pub position_ms: u64,
    /// Events that were still open and got closed at the new position
    pub finalized: Vec<EventIndex>,
    pub removed: Vec<EventIndex>,
    pub truncated: Vec<EventIndex>,
}

/// Result of observing one position update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewindOutcome {
    Steady,
    Rewound(RewindReport),
    /// The position moved before the latest anchor; nothing but open events
    /// were touched and the caller must decide how to proceed
    ResetCandidate {
        position_ms: u64,
        anchor_ms: u64,
        finalized: Vec<EventIndex>,
    },
}

#[derive(Debug, Clone)]
pub struct RewindGuard {
    epsilon_ms: u64,
    preserve: bool,
    last_position: Option<u64>,
}

impl Default for RewindGuard {
    fn default() -> Self {
        Self::new(DEFAULT_REWIND_EPSILON_MS, false)
    }
}

impl RewindGuard {
    pub fn new(epsilon_ms: u64, preserve: bool) -> Self {
        Self {
            epsilon_ms,
            preserve,
            last_position: None,
        }
    }

    pub fn preserve(&self) -> bool {
        self.preserve
    }

    /// Toggle "preserve annotations on rewind"
    pub fn set_preserve(&mut self, preserve: bool) {
        self.preserve = preserve;
    }

    pub fn last_position(&self) -> Option<u64> {
        self.last_position
    }

    /// Restart position bookkeeping, e.g. when recording begins
    pub fn reset(&mut self, position_ms: Option<u64>) {
        self.last_position = position_ms;
    }

    /// Record a position without looking for a rewind
    pub fn note_position(&mut self, position_ms: u64) {
        self.last_position = Some(position_ms);
    }

    /// Observe a position update and apply rewind edits to `timeline`
    pub fn observe(
        &mut self,
        timeline: &mut Timeline,
        position_ms: u64,
        now: WallTime,
        frame_duration_ms: u32,
    ) -> RewindOutcome {
        let Some(last) = self.last_position.replace(position_ms) else {
            return RewindOutcome::Steady;
        };
        if last.saturating_sub(position_ms) <= self.epsilon_ms {
            return RewindOutcome::Steady;
        }

        info!("Rewind detected: {}ms -> {}ms", last, position_ms);
        let finalized = timeline.close_all(position_ms, now, frame_duration_ms);

        if let Some(anchor_ms) = timeline.latest_anchor() {
            if position_ms < anchor_ms {
                warn!(
                    "Rewind to {}ms precedes recording start at {}ms; awaiting reset decision",
                    position_ms, anchor_ms
                );
                return RewindOutcome::ResetCandidate {
                    position_ms,
                    anchor_ms,
                    finalized,
                };
            }
        }

        let mut report = if self.preserve {
            RewindReport {
                position_ms,
                ..RewindReport::default()
            }
        } else {
            Self::apply_cutoff(timeline, position_ms)
        };
        report.finalized = finalized;
        RewindOutcome::Rewound(report)
    }

    /// Remove events starting after `position_ms` and truncate those spanning it.
    ///
    /// Anchors are never edited.
    pub fn apply_cutoff(timeline: &mut Timeline, position_ms: u64) -> RewindReport {
        let mut to_remove = Vec::new();
        let mut to_truncate = Vec::new();
        for (index, event) in timeline.closed_events() {
            if event.is_anchor() {
                continue;
            }
            let offset = event.offset.unwrap_or(event.onset);
            if event.onset > position_ms {
                to_remove.push(index);
            } else if position_ms < offset {
                to_truncate.push(index);
            }
        }

        let mut report = RewindReport {
            position_ms,
            ..RewindReport::default()
        };
        for &index in to_remove.iter().rev() {
            if timeline.remove(index).is_ok() {
                report.removed.push(index);
            }
        }
        for index in to_truncate {
            if timeline.update(index, position_ms).is_ok() {
                report.truncated.push(index);
            }
        }
        if !report.removed.is_empty() || !report.truncated.is_empty() {
            info!(
                "Rewind to {}ms removed {} and truncated {} events",
                position_ms,
                report.removed.len(),
                report.truncated.len()
            );
        }
        report
    }
}
