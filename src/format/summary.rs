//! Aggregate summary CSV for a batch of analyzed sources
//!
//! The standard layout has one row per source: durations per label, a blank
//! spacer, counts per label, a blank spacer, then latency and total-time
//! metrics. The interval layout has one row per `(source, interval)` pair and
//! a blank line after each source.

use crate::analysis::{AnalysisReport, AnalysisResult, IntervalSnapshot};
use crate::error::TimelineError;
use crate::format::csv_block;
use log::{debug, info};
use std::io::Write;
use std::path::Path;

const ANIMAL_ID_HEADER: &str = "animal_id";
const ANNOTATION_SUFFIX: &str = "_annotations";

/// Source name without extension and `_annotations` suffix
pub fn animal_id(source: &str) -> String {
    let stem = Path::new(source)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string());
    stem.strip_suffix(ANNOTATION_SUFFIX)
        .map(str::to_string)
        .unwrap_or(stem)
}

/// Write the interval layout when the report was sliced into intervals,
/// the standard layout otherwise
pub fn write_summary<W: Write>(writer: W, report: &AnalysisReport) -> Result<(), TimelineError> {
    if report.interval_secs.is_some() {
        write_interval_summary(writer, report)
    } else {
        write_standard_summary(writer, report)
    }
}

pub fn write_summary_file(path: impl AsRef<Path>, report: &AnalysisReport) -> Result<(), TimelineError> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)?;
    write_summary(std::io::BufWriter::new(file), report)?;
    info!("Wrote summary of {} sources to {}", report.results.len(), path.display());
    Ok(())
}

/// Header row naming the Duration and Frequency column groups
fn group_row(lead: usize, labels: usize, trailing: usize) -> Vec<String> {
    let mut row = vec![String::new(); lead + 2 * labels + 1 + trailing];
    if labels > 0 {
        row[lead] = "Duration".to_string();
        row[lead + labels + 1] = "Frequency".to_string();
    }
    row
}

pub fn write_standard_summary<W: Write>(
    mut writer: W,
    report: &AnalysisReport,
) -> Result<(), TimelineError> {
    let labels = &report.tracked_labels;
    let metric_count = report.latency_metrics.len() + report.total_time_metrics.len();

    let mut rows = vec![group_row(1, labels.len(), 1 + metric_count)];
    let mut columns = vec![ANIMAL_ID_HEADER.to_string()];
    columns.extend(labels.iter().cloned());
    columns.push(String::new());
    columns.extend(labels.iter().cloned());
    columns.push(String::new());
    columns.extend(report.latency_metrics.iter().cloned());
    columns.extend(report.total_time_metrics.iter().cloned());
    rows.push(columns);

    for result in &report.results {
        let mut row = vec![animal_id(&result.source)];
        row.extend(labels.iter().map(|l| format!("{:.2}", result.label(l).duration_secs)));
        row.push(String::new());
        row.extend(labels.iter().map(|l| result.label(l).count.to_string()));
        row.push(String::new());
        row.extend(report.latency_metrics.iter().map(|name| {
            let latency = result.metric(name).unwrap_or(result.test_duration_secs);
            format!("{:.2}", latency)
        }));
        row.extend(
            report
                .total_time_metrics
                .iter()
                .map(|name| format!("{:.2}", result.metric(name).unwrap_or(0.0))),
        );
        rows.push(row);
    }

    writer.write_all(csv_block(rows)?.as_bytes())?;
    writer.flush()?;
    Ok(())
}

pub fn write_interval_summary<W: Write>(
    mut writer: W,
    report: &AnalysisReport,
) -> Result<(), TimelineError> {
    let labels = &report.tracked_labels;
    let totals = &report.total_time_metrics;
    let width = report.interval_secs.unwrap_or_default();
    let trailing = if totals.is_empty() { 0 } else { 1 + totals.len() };

    let mut head = vec![
        vec![format!("Interval analysis ({}-second intervals)", width)],
        group_row(4, labels.len(), trailing),
    ];
    let mut columns: Vec<String> = [ANIMAL_ID_HEADER, "Interval", "Time (sec)", ""]
        .iter()
        .map(|s| s.to_string())
        .collect();
    columns.extend(labels.iter().cloned());
    columns.push(String::new());
    columns.extend(labels.iter().cloned());
    if !totals.is_empty() {
        columns.push(String::new());
        columns.extend(totals.iter().cloned());
    }
    head.push(columns);

    let mut out = csv_block(head)?;
    for result in &report.results {
        let Some(intervals) = result.intervals.as_ref().filter(|i| !i.is_empty()) else {
            debug!("{} has no interval data, left out of the interval summary", result.source);
            continue;
        };
        let rows = intervals
            .iter()
            .map(|snapshot| interval_row(result, snapshot, labels, totals))
            .collect();
        out.push_str(&csv_block(rows)?);
        out.push('\n');
    }

    writer.write_all(out.as_bytes())?;
    writer.flush()?;
    Ok(())
}

fn interval_row(
    result: &AnalysisResult,
    snapshot: &IntervalSnapshot,
    labels: &[String],
    totals: &[String],
) -> Vec<String> {
    let label = |name: &String| snapshot.labels.get(name).copied().unwrap_or_default();
    let mut row = vec![
        animal_id(&result.source),
        snapshot.interval_number.to_string(),
        format!("{:.1}-{:.1}", snapshot.start_secs, snapshot.end_secs),
        String::new(),
    ];
    row.extend(labels.iter().map(|l| format!("{:.2}", label(l).duration_secs)));
    row.push(String::new());
    row.extend(labels.iter().map(|l| label(l).count.to_string()));
    if !totals.is_empty() {
        row.push(String::new());
        row.extend(totals.iter().map(|name| {
            let value = snapshot
                .total_times
                .iter()
                .find(|m| &m.name == name)
                .map_or(0.0, |m| m.value_secs);
            format!("{:.2}", value)
        }));
    }
    row
}
