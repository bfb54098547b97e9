//! Whole-timeline statistics
//!
//! All results are in seconds. Anchors and placeholder labels never count
//! towards behavior statistics.

use crate::types::{is_statistic_label, ms_to_secs, BehaviorEvent, LabelSummary};
use log::{debug, warn};
use std::collections::BTreeMap;

/// Closed, countable events of a timeline
pub fn behavior_events(events: &[BehaviorEvent]) -> impl Iterator<Item = &BehaviorEvent> {
    events
        .iter()
        .filter(|e| !e.is_open() && is_statistic_label(&e.label))
}

/// Summed duration and count per label
pub fn label_totals(events: &[BehaviorEvent]) -> BTreeMap<String, LabelSummary> {
    let mut totals: BTreeMap<String, LabelSummary> = BTreeMap::new();
    for event in behavior_events(events) {
        let duration = event.duration_secs().unwrap_or(0.0);
        totals.entry(event.label.clone()).or_default().add(duration);
    }
    totals
}

/// Measure of the union of `(start, end)` intervals.
///
/// Boundary points are swept in `(time, -delta)` order, so at equal times
/// starts are processed before ends and a zero-gap hand-off counts as
/// continuous coverage.
pub fn union_duration(intervals: &[(f64, f64)]) -> f64 {
    let mut points: Vec<(f64, i32)> = Vec::with_capacity(intervals.len() * 2);
    for &(start, end) in intervals {
        points.push((start, 1));
        points.push((end, -1));
    }
    points.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(&a.1)));

    let mut total = 0.0;
    let mut active = 0i32;
    let mut previous: Option<f64> = None;
    for (time, delta) in points {
        if let Some(prev) = previous {
            if active > 0 {
                total += time - prev;
            }
        }
        active += delta;
        previous = Some(time);
    }

    if total < 0.0 {
        warn!("Negative combined duration {:.4}s clamped to 0", total);
        return 0.0;
    }
    total
}

/// Overlap-merged duration of every event whose label is in `labels`
pub fn combined_duration(events: &[BehaviorEvent], labels: &[String]) -> f64 {
    let intervals: Vec<(f64, f64)> = behavior_events(events)
        .filter(|e| labels.contains(&e.label))
        .filter_map(|e| e.offset_secs().map(|offset| (e.onset_secs(), offset)))
        .collect();
    union_duration(&intervals)
}

/// Earliest onset of `label`, in milliseconds
pub fn first_onset(events: &[BehaviorEvent], label: &str) -> Option<u64> {
    behavior_events(events)
        .filter(|e| e.label == label)
        .map(|e| e.onset)
        .min()
}

/// Anchor onset used as time zero, in milliseconds.
///
/// A single `RecordingStart` is used as is. With several, the latest one
/// strictly before `first_target_onset` wins, falling back to the earliest.
/// Without anchors the earliest onset of any event is used.
pub fn select_anchor(events: &[BehaviorEvent], first_target_onset: Option<u64>) -> Option<u64> {
    let mut anchors: Vec<u64> = events
        .iter()
        .filter(|e| e.is_anchor())
        .map(|e| e.onset)
        .collect();
    anchors.sort_unstable();

    match anchors.as_slice() {
        [] => events.iter().map(|e| e.onset).min(),
        [only] => Some(*only),
        [earliest, ..] => first_target_onset
            .and_then(|target| anchors.iter().rev().find(|&&a| a < target).copied())
            .or(Some(*earliest)),
    }
}

/// Seconds from the anchor to the first `label` onset.
///
/// An absent label yields `test_duration_secs`.
pub fn latency_secs(events: &[BehaviorEvent], label: &str, test_duration_secs: f64) -> f64 {
    let Some(first) = first_onset(events, label) else {
        debug!("No '{}' found, latency is the test duration", label);
        return test_duration_secs;
    };
    let anchor = select_anchor(events, Some(first)).unwrap_or(0);
    if first < anchor {
        warn!(
            "'{}' starts {}ms before the recording anchor; latency clamped to 0",
            label,
            anchor - first
        );
        return 0.0;
    }
    ms_to_secs(first - anchor)
}
