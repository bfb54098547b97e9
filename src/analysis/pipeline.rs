//! Analysis orchestration
//!
//! Turns completed timelines, annotation files or pre-aggregated summaries
//! into per-source statistics. Raw events take precedence; summary-only
//! inputs get best-effort metrics and no interval breakdown.

use crate::action_map::DEFAULT_MAPPINGS;
use crate::analysis::config::MetricsConfig;
use crate::analysis::intervals::{IntervalSlicer, IntervalSnapshot, MetricValue};
use crate::analysis::stats::{combined_duration, label_totals, latency_secs};
use crate::error::TimelineError;
use crate::format::annotation::{read_annotation_file, AnnotationFile};
use crate::timeline::Timeline;
use crate::types::{is_statistic_label, BehaviorEvent, LabelSummary};
use log::{info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Test duration assumed when a source carries none
pub const DEFAULT_TEST_DURATION_SECS: f64 = 300.0;

/// Labels always tracked, in report order
pub fn default_behaviors() -> Vec<String> {
    DEFAULT_MAPPINGS
        .iter()
        .map(|(_, label)| label.to_string())
        .collect()
}

/// One source to analyze
#[derive(Debug, Clone, Default)]
pub struct AnalysisInput {
    pub source: String,
    pub events: Option<Vec<BehaviorEvent>>,
    pub summary: Option<BTreeMap<String, LabelSummary>>,
    pub test_duration_secs: Option<f64>,
}

impl AnalysisInput {
    pub fn from_timeline(source: impl Into<String>, timeline: &Timeline) -> Self {
        Self {
            source: source.into(),
            events: Some(timeline.snapshot()),
            summary: None,
            test_duration_secs: timeline.test_duration_secs(),
        }
    }

    pub fn from_annotation(source: impl Into<String>, file: AnnotationFile) -> Self {
        Self {
            source: source.into(),
            events: file.events,
            summary: file.summary,
            test_duration_secs: file.test_duration_secs,
        }
    }

    /// Raw events, unless the list is empty and a summary can stand in
    fn raw_events(&self) -> Option<&[BehaviorEvent]> {
        match (&self.events, &self.summary) {
            (Some(events), Some(_)) if events.is_empty() => None,
            (Some(events), _) => Some(events.as_slice()),
            (None, _) => None,
        }
    }

    fn labels_present(&self) -> BTreeSet<String> {
        let mut labels: BTreeSet<String> = BTreeSet::new();
        if let Some(events) = &self.events {
            labels.extend(events.iter().map(|e| e.label.clone()));
        }
        if let Some(summary) = &self.summary {
            labels.extend(summary.keys().cloned());
        }
        labels.retain(|label| is_statistic_label(label));
        labels
    }
}

/// Statistics for one source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub source: String,
    pub test_duration_secs: f64,
    pub labels: BTreeMap<String, LabelSummary>,
    pub latencies: Vec<MetricValue>,
    pub total_times: Vec<MetricValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intervals: Option<Vec<IntervalSnapshot>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl AnalysisResult {
    /// Totals for a label, zero when absent
    pub fn label(&self, name: &str) -> LabelSummary {
        self.labels.get(name).copied().unwrap_or_default()
    }

    /// Value of a latency or total-time metric
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.latencies
            .iter()
            .chain(&self.total_times)
            .find(|m| m.name == name)
            .map(|m| m.value_secs)
    }
}

/// Results for a batch of sources
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub tracked_labels: Vec<String>,
    /// Enabled latency metric names, in column order
    pub latency_metrics: Vec<String>,
    /// Enabled total-time metric names, in column order
    pub total_time_metrics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<f64>,
    pub results: Vec<AnalysisResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_sources: Vec<String>,
}

/// Batch analyzer configured with metrics and optional interval slicing
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: MetricsConfig,
    slicer: Option<IntervalSlicer>,
    default_test_duration_secs: f64,
    tracked_labels: Option<Vec<String>>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

impl Analyzer {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            slicer: None,
            default_test_duration_secs: DEFAULT_TEST_DURATION_SECS,
            tracked_labels: None,
        }
    }

    /// Enable interval slicing with windows of `width_secs` (at least 1s)
    pub fn with_interval(mut self, width_secs: f64) -> Result<Self, TimelineError> {
        self.slicer = Some(IntervalSlicer::new(width_secs)?);
        Ok(self)
    }

    pub fn with_default_test_duration(mut self, secs: f64) -> Self {
        self.default_test_duration_secs = secs;
        self
    }

    /// Report exactly these labels instead of defaults plus discovered ones
    pub fn with_tracked_labels(mut self, labels: Vec<String>) -> Self {
        self.tracked_labels = Some(labels);
        self
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn interval_secs(&self) -> Option<f64> {
        self.slicer.map(|s| s.width_secs())
    }

    /// Labels reported for a batch: default behaviors, then others sorted
    pub fn tracked_labels_for(&self, inputs: &[AnalysisInput]) -> Vec<String> {
        if let Some(labels) = &self.tracked_labels {
            return labels.clone();
        }
        let mut labels = default_behaviors();
        let discovered: BTreeSet<String> = inputs
            .iter()
            .flat_map(AnalysisInput::labels_present)
            .filter(|label| !labels.contains(label))
            .collect();
        if !discovered.is_empty() {
            info!("Tracking {} additional behaviors: {:?}", discovered.len(), discovered);
        }
        labels.extend(discovered);
        labels
    }

    /// Analyze a single source
    pub fn analyze(&self, input: &AnalysisInput) -> AnalysisResult {
        let labels = self.tracked_labels_for(std::slice::from_ref(input));
        self.analyze_with_labels(input, &labels)
    }

    /// Analyze a batch with a shared label list
    pub fn analyze_all(&self, inputs: &[AnalysisInput]) -> AnalysisReport {
        let tracked_labels = self.tracked_labels_for(inputs);
        let results = inputs
            .iter()
            .map(|input| self.analyze_with_labels(input, &tracked_labels))
            .collect();
        AnalysisReport {
            tracked_labels,
            latency_metrics: self
                .config
                .enabled_latency_metrics()
                .map(|m| m.name.clone())
                .collect(),
            total_time_metrics: self
                .config
                .enabled_total_time_metrics()
                .map(|m| m.name.clone())
                .collect(),
            interval_secs: self.interval_secs(),
            results,
            skipped_sources: Vec::new(),
        }
    }

    fn analyze_with_labels(&self, input: &AnalysisInput, tracked: &[String]) -> AnalysisResult {
        let test_duration_secs = input
            .test_duration_secs
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .unwrap_or(self.default_test_duration_secs);
        let mut warnings = Vec::new();

        let result = match input.raw_events() {
            Some(events) => {
                let labels = label_totals(events);
                if let Some(summary) = &input.summary {
                    check_consistency(&input.source, &labels, summary, &mut warnings);
                }
                let intervals = self.slicer.map(|slicer| {
                    slicer.slice(
                        events,
                        test_duration_secs,
                        tracked,
                        self.config.enabled_total_time_metrics(),
                    )
                });
                AnalysisResult {
                    source: input.source.clone(),
                    test_duration_secs,
                    latencies: self.latencies(events, test_duration_secs),
                    total_times: self.total_times(events),
                    labels,
                    intervals,
                    warnings,
                }
            }
            None => {
                let labels: BTreeMap<String, LabelSummary> = input
                    .summary
                    .iter()
                    .flatten()
                    .filter(|(label, _)| is_statistic_label(label))
                    .map(|(label, summary)| (label.clone(), *summary))
                    .collect();
                let intervals = self.slicer.map(|_| {
                    let message = format!(
                        "{}: interval analysis needs raw events; only a summary is available",
                        input.source
                    );
                    warn!("{}", message);
                    warnings.push(message);
                    Vec::new()
                });
                AnalysisResult {
                    source: input.source.clone(),
                    test_duration_secs,
                    latencies: self.summary_latencies(&labels, test_duration_secs),
                    total_times: self.summary_total_times(&labels),
                    labels,
                    intervals,
                    warnings,
                }
            }
        };

        info!(
            "Analyzed {}: {} behaviors, test duration {:.1}s",
            result.source,
            result.labels.len(),
            result.test_duration_secs
        );
        result
    }

    fn latencies(&self, events: &[BehaviorEvent], test_duration_secs: f64) -> Vec<MetricValue> {
        self.config
            .enabled_latency_metrics()
            .map(|metric| MetricValue {
                name: metric.name.clone(),
                value_secs: latency_secs(events, &metric.behavior, test_duration_secs),
            })
            .collect()
    }

    fn total_times(&self, events: &[BehaviorEvent]) -> Vec<MetricValue> {
        self.config
            .enabled_total_time_metrics()
            .map(|metric| MetricValue {
                name: metric.name.clone(),
                value_secs: combined_duration(events, &metric.behaviors),
            })
            .collect()
    }

    /// Without onsets a present behavior gets latency 0, an absent one the test duration
    fn summary_latencies(
        &self,
        labels: &BTreeMap<String, LabelSummary>,
        test_duration_secs: f64,
    ) -> Vec<MetricValue> {
        self.config
            .enabled_latency_metrics()
            .map(|metric| {
                let present = labels.get(&metric.behavior).is_some_and(|s| s.count > 0);
                MetricValue {
                    name: metric.name.clone(),
                    value_secs: if present { 0.0 } else { test_duration_secs },
                }
            })
            .collect()
    }

    /// Without intervals overlaps cannot be merged; durations are summed
    fn summary_total_times(&self, labels: &BTreeMap<String, LabelSummary>) -> Vec<MetricValue> {
        self.config
            .enabled_total_time_metrics()
            .map(|metric| MetricValue {
                name: metric.name.clone(),
                value_secs: metric
                    .behaviors
                    .iter()
                    .filter_map(|b| labels.get(b))
                    .map(|s| s.duration_secs)
                    .sum(),
            })
            .collect()
    }
}

fn check_consistency(
    source: &str,
    raw: &BTreeMap<String, LabelSummary>,
    summary: &BTreeMap<String, LabelSummary>,
    warnings: &mut Vec<String>,
) {
    for (label, stated) in summary.iter().filter(|(label, _)| is_statistic_label(label)) {
        let derived = raw.get(label).map(|s| s.count).unwrap_or(0);
        if derived != stated.count {
            let message = format!(
                "{}: summary lists {} x '{}' but the event list has {}; using the event list",
                source, stated.count, label, derived
            );
            warn!("{}", message);
            warnings.push(message);
        }
    }
}

/// Read and analyze annotation files.
///
/// Files in an unrecognized format are skipped and listed in the report;
/// I/O failures abort.
pub fn analyze_files<P: AsRef<Path>>(
    paths: &[P],
    analyzer: &Analyzer,
) -> Result<AnalysisReport, TimelineError> {
    let mut inputs = Vec::with_capacity(paths.len());
    let mut skipped = Vec::new();
    for path in paths {
        let path = path.as_ref();
        match read_annotation_file(path) {
            Ok(file) => inputs.push(AnalysisInput::from_annotation(source_name(path), file)),
            Err(TimelineError::UnrecognizedFormat(reason)) => {
                warn!("Skipping {}: {}", path.display(), reason);
                skipped.push(source_name(path));
            }
            Err(err) => return Err(err),
        }
    }
    let mut report = analyzer.analyze_all(&inputs);
    report.skipped_sources = skipped;
    Ok(report)
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TriggerId;
    use pretty_assertions::assert_eq;

    fn event(label: &str, onset: u64, offset: u64) -> BehaviorEvent {
        BehaviorEvent::closed(TriggerId::from('x'), label, onset, offset)
    }

    fn raw_input(events: Vec<BehaviorEvent>) -> AnalysisInput {
        AnalysisInput {
            source: "mouse1_annotations.csv".to_string(),
            events: Some(events),
            summary: None,
            test_duration_secs: Some(300.0),
        }
    }

    fn summary(entries: &[(&str, f64, u32)]) -> BTreeMap<String, LabelSummary> {
        entries
            .iter()
            .map(|(label, duration_secs, count)| {
                (
                    label.to_string(),
                    LabelSummary {
                        duration_secs: *duration_secs,
                        count: *count,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_raw_event_analysis() {
        let input = raw_input(vec![
            BehaviorEvent::anchor(1000),
            event("Attack bites", 4500, 5500),
            event("Chasing", 5000, 7000),
            event("Tail rattles", 20_000, 21_000),
        ]);
        let result = Analyzer::default().analyze(&input);

        assert_eq!(result.label("Attack bites").count, 1);
        assert!((result.metric("Attack Latency").unwrap() - 3.5).abs() < 1e-9);
        // 4.5-7.0 merged plus 20-21
        assert!((result.metric("Total Aggression").unwrap() - 3.5).abs() < 1e-9);
        assert!((result.metric("Total Aggression(without tail-rattles)").unwrap() - 2.5).abs() < 1e-9);
        assert!(result.intervals.is_none());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_absent_behavior_latency_uses_test_duration() {
        let mut input = raw_input(vec![BehaviorEvent::anchor(0), event("Chasing", 0, 100)]);
        input.test_duration_secs = Some(600.0);
        let result = Analyzer::default().analyze(&input);
        assert_eq!(result.metric("Attack Latency"), Some(600.0));
    }

    #[test]
    fn test_zero_test_duration_from_file_overrides_default() {
        let text = "Metadata\nTest Duration (seconds),0\n\nEvent,Onset,Offset\n\
                    RecordingStart,0.0,0.0\nChasing,1.0,2.0\n";
        let file = crate::format::read_annotations(text.as_bytes()).unwrap();
        let result = Analyzer::default().analyze(&AnalysisInput::from_annotation("m1.csv", file));
        assert_eq!(result.test_duration_secs, 0.0);
        assert_eq!(result.metric("Attack Latency"), Some(0.0));
    }

    #[test]
    fn test_missing_test_duration_uses_default() {
        let mut input = raw_input(vec![]);
        input.test_duration_secs = None;
        let result = Analyzer::default().with_default_test_duration(120.0).analyze(&input);
        assert_eq!(result.test_duration_secs, 120.0);
        assert_eq!(result.metric("Attack Latency"), Some(120.0));
    }

    #[test]
    fn test_summary_only_input() {
        let input = AnalysisInput {
            source: "old.csv".to_string(),
            events: None,
            summary: Some(summary(&[
                ("Attack bites", 4.0, 2),
                ("Chasing", 3.0, 1),
                ("RecordingStart", 0.0, 1),
            ])),
            test_duration_secs: None,
        };
        let analyzer = Analyzer::default().with_interval(60.0).unwrap();
        let result = analyzer.analyze(&input);

        assert_eq!(result.metric("Attack Latency"), Some(0.0));
        assert_eq!(result.metric("Total Aggression"), Some(7.0));
        assert!(!result.labels.contains_key("RecordingStart"));
        assert_eq!(result.intervals, Some(Vec::new()));
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_raw_events_win_over_summary() {
        let mut input = raw_input(vec![
            BehaviorEvent::anchor(0),
            event("Attack bites", 1000, 2000),
            event("Attack bites", 3000, 4000),
        ]);
        input.summary = Some(summary(&[("Attack bites", 9.0, 3)]));
        let result = Analyzer::default().analyze(&input);

        assert_eq!(result.label("Attack bites").count, 2);
        assert!((result.label("Attack bites").duration_secs - 2.0).abs() < 1e-9);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_interval_analysis_on_raw_events() {
        let input = raw_input(vec![BehaviorEvent::anchor(0), event("Chasing", 50_000, 70_000)]);
        let analyzer = Analyzer::default().with_interval(60.0).unwrap();
        let result = analyzer.analyze(&input);

        let intervals = result.intervals.unwrap();
        assert_eq!(intervals.len(), 5);
        assert!((intervals[0].labels["Chasing"].duration_secs - 10.0).abs() < 1e-9);
        assert_eq!(intervals[1].labels["Chasing"].count, 1);
        assert_eq!(intervals[0].total_times.len(), 2);
    }

    #[test]
    fn test_tracked_labels_defaults_then_discovered() {
        let inputs = vec![
            raw_input(vec![event("Zigzag", 0, 10), event("Chasing", 0, 10)]),
            raw_input(vec![event("Burrowing", 0, 10), event("", 0, 10)]),
        ];
        let report = Analyzer::default().analyze_all(&inputs);
        let tail: Vec<&str> = report.tracked_labels[8..].iter().map(String::as_str).collect();
        assert_eq!(report.tracked_labels[0], "Attack bites");
        assert_eq!(tail, vec!["Burrowing", "Zigzag"]);
        assert_eq!(report.results.len(), 2);

        let explicit = Analyzer::default()
            .with_tracked_labels(vec!["Chasing".to_string()])
            .analyze_all(&inputs);
        assert_eq!(explicit.tracked_labels, vec!["Chasing".to_string()]);
    }

    #[test]
    fn test_from_timeline_carries_test_duration() {
        let mut timeline = Timeline::new();
        timeline.insert_anchor(0);
        timeline.set_test_duration_secs(Some(90.0));
        let input = AnalysisInput::from_timeline("live", &timeline);
        assert_eq!(input.test_duration_secs, Some(90.0));
        assert_eq!(input.events.map(|e| e.len()), Some(1));
    }
}
