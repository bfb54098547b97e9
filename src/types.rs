//! Core data types for the timeline engine
//!
//! Position-clock times are whole milliseconds (`u64`). Wall-clock readings are
//! seconds (`f64`) and are only used to correct sub-frame closures.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved label of the session anchor event
pub const RECORDING_START: &str = "RecordingStart";

/// Trigger recorded on anchor events
pub const ANCHOR_TRIGGER: &str = "R";

/// Trigger recorded on events read back from an annotation file
pub const IMPORTED_TRIGGER: &str = "I";

/// Labels that echo a section header of the annotation format
const HEADER_ECHOES: [&str; 2] = ["Event", "Behavior"];

/// Opaque token identifying the key or control that produced an event
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerId(String);

impl TriggerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Single-character triggers can be looked up in an action map
    pub fn as_char(&self) -> Option<char> {
        let mut chars = self.0.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }
}

impl From<&str> for TriggerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TriggerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<char> for TriggerId {
    fn from(key: char) -> Self {
        Self(key.to_string())
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// True-clock reading in seconds
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WallTime(pub f64);

impl WallTime {
    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    pub fn as_secs(self) -> f64 {
        self.0
    }

    /// Milliseconds elapsed since an earlier reading
    pub fn millis_since(self, earlier: WallTime) -> f64 {
        (self.0 - earlier.0) * 1000.0
    }
}

/// Stable handle to a closed event inside a [`Timeline`](crate::Timeline)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventIndex(pub usize);

impl fmt::Display for EventIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A labeled time interval on the position clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorEvent {
    pub trigger_id: TriggerId,
    pub label: String,
    /// Position-clock onset in milliseconds
    pub onset: u64,
    /// Position-clock offset in milliseconds; `None` while open
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_onset: Option<WallTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_offset: Option<WallTime>,
}

impl BehaviorEvent {
    /// An in-progress event opened at `onset`
    pub fn open(trigger_id: TriggerId, label: impl Into<String>, onset: u64, wall: WallTime) -> Self {
        Self {
            trigger_id,
            label: label.into(),
            onset,
            offset: None,
            wall_onset: Some(wall),
            wall_offset: None,
        }
    }

    /// A finished event with no wall-clock readings (imports, fixtures)
    pub fn closed(trigger_id: TriggerId, label: impl Into<String>, onset: u64, offset: u64) -> Self {
        Self {
            trigger_id,
            label: label.into(),
            onset,
            offset: Some(offset.max(onset)),
            wall_onset: None,
            wall_offset: None,
        }
    }

    /// Zero-duration session anchor
    pub fn anchor(position_ms: u64) -> Self {
        Self::closed(TriggerId::from(ANCHOR_TRIGGER), RECORDING_START, position_ms, position_ms)
    }

    pub fn is_anchor(&self) -> bool {
        self.label == RECORDING_START
    }

    pub fn is_open(&self) -> bool {
        self.offset.is_none()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.offset.map(|offset| offset.saturating_sub(self.onset))
    }

    pub fn onset_secs(&self) -> f64 {
        ms_to_secs(self.onset)
    }

    pub fn offset_secs(&self) -> Option<f64> {
        self.offset.map(ms_to_secs)
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_ms().map(ms_to_secs)
    }
}

/// Aggregated duration and occurrence count for one label
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LabelSummary {
    pub duration_secs: f64,
    pub count: u32,
}

impl LabelSummary {
    pub fn add(&mut self, duration_secs: f64) {
        self.duration_secs += duration_secs;
        self.count += 1;
    }
}

/// Live per-label statistics shown while recording
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BehaviorStatistics {
    pub count: u32,
    pub total_secs: f64,
    pub mean_secs: f64,
}

/// Whether a label takes part in behavior statistics.
///
/// Empty labels, the anchor label and header echoes are placeholders.
pub fn is_statistic_label(label: &str) -> bool {
    let label = label.trim();
    !label.is_empty() && label != RECORDING_START && !HEADER_ECHOES.contains(&label)
}

pub fn ms_to_secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

pub fn secs_to_ms(secs: f64) -> u64 {
    (secs * 1000.0).round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_is_zero_duration() {
        let anchor = BehaviorEvent::anchor(1200);
        assert!(anchor.is_anchor());
        assert_eq!(anchor.duration_ms(), Some(0));
        assert_eq!(anchor.trigger_id.as_str(), ANCHOR_TRIGGER);
    }

    #[test]
    fn test_closed_clamps_negative_duration() {
        let event = BehaviorEvent::closed(TriggerId::from('o'), "Attack bites", 500, 400);
        assert_eq!(event.offset, Some(500));
        assert_eq!(event.duration_ms(), Some(0));
    }

    #[test]
    fn test_statistic_label_filter() {
        assert!(is_statistic_label("Chasing"));
        assert!(!is_statistic_label(""));
        assert!(!is_statistic_label("  "));
        assert!(!is_statistic_label(RECORDING_START));
        assert!(!is_statistic_label("Event"));
        assert!(!is_statistic_label("Behavior"));
    }

    #[test]
    fn test_trigger_as_char() {
        assert_eq!(TriggerId::from('q').as_char(), Some('q'));
        assert_eq!(TriggerId::from("ctrl").as_char(), None);
    }

    #[test]
    fn test_time_conversions() {
        assert!((ms_to_secs(1234) - 1.234).abs() < 1e-9);
        assert_eq!(secs_to_ms(1.2346), 1235);
        assert_eq!(secs_to_ms(-0.5), 0);
        let earlier = WallTime::from_secs(10.0);
        assert!((WallTime::from_secs(10.02).millis_since(earlier) - 20.0).abs() < 1e-6);
    }
}
