//! Fixed-width interval slicing
//!
//! Windows start at the session anchor and cover the test duration; the last
//! window is cut short at `anchor + test_duration`. Events contribute only
//! their overlap with a window and are counted once per window they touch.
//! Window bounds are session times, so a session anchored at 10 s reports its
//! first minute as `10.0-70.0`.

use crate::analysis::config::TotalTimeMetric;
use crate::analysis::stats::{behavior_events, select_anchor, union_duration};
use crate::error::TimelineError;
use crate::types::{ms_to_secs, BehaviorEvent, LabelSummary};
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;

/// Narrowest accepted interval width
pub const MIN_INTERVAL_SECS: f64 = 1.0;

/// Most windows produced for one source
pub const MAX_INTERVALS: u32 = 100_000;

/// A named metric value in seconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricValue {
    pub name: String,
    pub value_secs: f64,
}

/// Statistics for one window, bounds in session seconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalSnapshot {
    /// 1-based
    pub interval_number: u32,
    pub start_secs: f64,
    pub end_secs: f64,
    pub duration_secs: f64,
    pub labels: BTreeMap<String, LabelSummary>,
    pub total_times: Vec<MetricValue>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalSlicer {
    width_secs: f64,
}

impl IntervalSlicer {
    pub fn new(width_secs: f64) -> Result<Self, TimelineError> {
        if !(width_secs.is_finite() && width_secs >= MIN_INTERVAL_SECS) {
            return Err(TimelineError::InvalidInterval(width_secs));
        }
        Ok(Self { width_secs })
    }

    pub fn width_secs(&self) -> f64 {
        self.width_secs
    }

    /// Slice `events` into windows covering `test_duration_secs`.
    ///
    /// Every label in `labels` gets an entry in every window, zero or not.
    pub fn slice<'a>(
        &self,
        events: &[BehaviorEvent],
        test_duration_secs: f64,
        labels: &[String],
        total_time_metrics: impl IntoIterator<Item = &'a TotalTimeMetric>,
    ) -> Vec<IntervalSnapshot> {
        if test_duration_secs <= 0.0 {
            return Vec::new();
        }
        let metrics: Vec<&TotalTimeMetric> = total_time_metrics.into_iter().collect();
        let anchor = select_anchor(events, None).map(ms_to_secs).unwrap_or(0.0);
        let end_of_test = anchor + test_duration_secs;
        let wanted = (test_duration_secs / self.width_secs).ceil();
        let count = if wanted > f64::from(MAX_INTERVALS) {
            warn!(
                "{:.0} windows of {}s requested, slicing only the first {}",
                wanted, self.width_secs, MAX_INTERVALS
            );
            MAX_INTERVALS
        } else {
            wanted as u32
        };

        let spans: Vec<(&str, f64, f64)> = behavior_events(events)
            .filter_map(|e| e.offset_secs().map(|off| (e.label.as_str(), e.onset_secs(), off)))
            .collect();

        debug!(
            "Slicing {:.1}s from anchor {:.3}s into {} windows of {}s",
            test_duration_secs, anchor, count, self.width_secs
        );

        (0..count)
            .map(|i| {
                let start = anchor + f64::from(i) * self.width_secs;
                let end = (anchor + f64::from(i + 1) * self.width_secs).min(end_of_test);

                let mut per_label: BTreeMap<String, LabelSummary> = labels
                    .iter()
                    .map(|label| (label.clone(), LabelSummary::default()))
                    .collect();
                for &(label, onset, offset) in &spans {
                    if let Some(entry) = per_label.get_mut(label) {
                        let overlap = offset.min(end) - onset.max(start);
                        if overlap > 0.0 {
                            entry.add(overlap);
                        }
                    }
                }

                let total_times = metrics
                    .iter()
                    .map(|metric| {
                        let clipped: Vec<(f64, f64)> = spans
                            .iter()
                            .filter(|(label, onset, offset)| {
                                *onset < end && *offset > start && metric.behaviors.iter().any(|b| b == label)
                            })
                            .map(|&(_, onset, offset)| (onset.max(start), offset.min(end)))
                            .collect();
                        MetricValue {
                            name: metric.name.clone(),
                            value_secs: union_duration(&clipped),
                        }
                    })
                    .collect();

                IntervalSnapshot {
                    interval_number: i + 1,
                    start_secs: start,
                    end_secs: end,
                    duration_secs: end - start,
                    labels: per_label,
                    total_times,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::stats::label_totals;
    use crate::types::TriggerId;
    use pretty_assertions::assert_eq;

    fn event(label: &str, onset: u64, offset: u64) -> BehaviorEvent {
        BehaviorEvent::closed(TriggerId::from('x'), label, onset, offset)
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_width_validation() {
        assert!(IntervalSlicer::new(0.5).is_err());
        assert!(IntervalSlicer::new(f64::INFINITY).is_err());
        assert!(IntervalSlicer::new(1.0).is_ok());
    }

    #[test]
    fn test_windows_start_at_anchor_and_clip_to_test_end() {
        let events = vec![BehaviorEvent::anchor(10_000)];
        let slicer = IntervalSlicer::new(60.0).unwrap();
        let windows = slicer.slice(&events, 150.0, &[], std::iter::empty());

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].interval_number, 1);
        assert_eq!((windows[0].start_secs, windows[0].end_secs), (10.0, 70.0));
        assert_eq!((windows[2].start_secs, windows[2].end_secs), (130.0, 160.0));
        assert!((windows[2].duration_secs - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_event_spanning_windows_counted_once_per_window() {
        let events = vec![BehaviorEvent::anchor(0), event("Chasing", 50_000, 130_000)];
        let slicer = IntervalSlicer::new(60.0).unwrap();
        let windows = slicer.slice(&events, 180.0, &labels(&["Chasing"]), std::iter::empty());

        let counts: Vec<u32> = windows.iter().map(|w| w.labels["Chasing"].count).collect();
        assert_eq!(counts, vec![1, 1, 1]);
        let durations: Vec<f64> = windows.iter().map(|w| w.labels["Chasing"].duration_secs).collect();
        assert!((durations[0] - 10.0).abs() < 1e-9);
        assert!((durations[1] - 60.0).abs() < 1e-9);
        assert!((durations[2] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_interval_durations_add_up_to_session_total() {
        let events = vec![
            BehaviorEvent::anchor(2_000),
            event("Attack bites", 3_250, 9_870),
            event("Attack bites", 59_990, 61_020),
            event("Attack bites", 100_000, 185_500),
            event("Chasing", 12_000, 14_000),
        ];
        let slicer = IntervalSlicer::new(7.0).unwrap();
        let windows = slicer.slice(&events, 300.0, &labels(&["Attack bites"]), std::iter::empty());

        let sliced: f64 = windows.iter().map(|w| w.labels["Attack bites"].duration_secs).sum();
        let whole = label_totals(&events)["Attack bites"].duration_secs;
        assert!((sliced - whole).abs() < 1e-6);
    }

    #[test]
    fn test_total_time_metric_per_window_uses_clipped_union() {
        let events = vec![
            BehaviorEvent::anchor(0),
            event("Attack bites", 5_000, 15_000),
            event("Chasing", 8_000, 12_000),
        ];
        let metric = TotalTimeMetric {
            name: "Total Aggression".to_string(),
            behaviors: labels(&["Attack bites", "Chasing"]),
            enabled: true,
        };
        let slicer = IntervalSlicer::new(10.0).unwrap();
        let windows = slicer.slice(&events, 20.0, &[], [&metric]);

        assert_eq!(windows[0].total_times[0].name, "Total Aggression");
        assert!((windows[0].total_times[0].value_secs - 5.0).abs() < 1e-9);
        assert!((windows[1].total_times[0].value_secs - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_huge_test_duration_is_capped() {
        let events = vec![BehaviorEvent::anchor(0), event("Chasing", 0, 2_000)];
        let slicer = IntervalSlicer::new(1.0).unwrap();
        let windows = slicer.slice(&events, 999_999_999_999.0, &labels(&["Chasing"]), std::iter::empty());

        assert_eq!(windows.len(), MAX_INTERVALS as usize);
        assert_eq!(windows.last().unwrap().interval_number, MAX_INTERVALS);
        assert_eq!(windows[1].labels["Chasing"].count, 1);
    }

    #[test]
    fn test_zero_test_duration_yields_no_windows() {
        let slicer = IntervalSlicer::new(60.0).unwrap();
        assert!(slicer.slice(&[], 0.0, &[], std::iter::empty()).is_empty());
    }
}
