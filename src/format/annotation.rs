//! Per-timeline annotation file
//!
//! Three sections separated by blank lines:
//!
//! ```text
//! Metadata
//! Test Duration (seconds),300
//!
//! Event,Onset,Offset
//! RecordingStart,1.0000,1.0000
//! Attack bites,4.5000,5.2330
//!
//! Behavior,Duration,Frequency
//! Attack bites,0.73,1
//! ```
//!
//! Sections are found by their header lines, so files carrying only the event
//! list or only the summary are accepted. Older files with
//! `key,label,onset,offset,duration` rows are read as well.

use crate::error::TimelineError;
use crate::format::csv_block;
use crate::timeline::Timeline;
use crate::types::{
    is_statistic_label, secs_to_ms, BehaviorEvent, LabelSummary, TriggerId, ANCHOR_TRIGGER,
    IMPORTED_TRIGGER, RECORDING_START,
};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

const METADATA_HEADER: &str = "Metadata";
const TEST_DURATION_KEY: &str = "Test Duration (seconds)";
const EVENT_HEADER: &str = "Event,Onset,Offset";
const LEGACY_EVENT_HEADER: &str = "Key,Behavior,Onset,Offset";
const SUMMARY_HEADER: &str = "Behavior,Duration,Frequency";

static TEST_DURATION_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"Test Duration \(seconds\),\s*(\d+\.?\d*)").ok());

/// Contents of one annotation file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationFile {
    pub test_duration_secs: Option<f64>,
    /// Present when the file has an event section
    pub events: Option<Vec<BehaviorEvent>>,
    /// Present when the file has a summary section
    pub summary: Option<BTreeMap<String, LabelSummary>>,
    pub skipped_rows: usize,
}

impl AnnotationFile {
    /// Closed events as a timeline, carrying the test duration
    pub fn into_timeline(self) -> Timeline {
        let mut timeline = Timeline::from_events(self.events.unwrap_or_default());
        timeline.set_test_duration_secs(self.test_duration_secs);
        timeline
    }
}

/// Write `events` as an annotation file.
///
/// The summary lists `summary_labels` in order (zero rows included), then any
/// other labels found in the events, sorted.
pub fn write_annotations<W: Write>(
    mut writer: W,
    events: &[BehaviorEvent],
    test_duration_secs: Option<f64>,
    summary_labels: &[String],
) -> Result<(), TimelineError> {
    let metadata = csv_block(vec![
        vec![METADATA_HEADER.to_string()],
        vec![
            TEST_DURATION_KEY.to_string(),
            format!("{}", test_duration_secs.unwrap_or(0.0)),
        ],
    ])?;

    let mut event_rows = vec![header_row(EVENT_HEADER)];
    event_rows.extend(events.iter().filter_map(|event| {
        event.offset_secs().map(|offset| {
            vec![
                event.label.clone(),
                format!("{:.4}", event.onset_secs()),
                format!("{:.4}", offset),
            ]
        })
    }));

    let mut totals: BTreeMap<String, LabelSummary> = BTreeMap::new();
    for event in events.iter().filter(|e| is_statistic_label(&e.label)) {
        totals
            .entry(event.label.clone())
            .or_default()
            .add(event.duration_secs().unwrap_or(0.0));
    }
    let mut order: Vec<&str> = summary_labels
        .iter()
        .map(String::as_str)
        .filter(|label| is_statistic_label(label))
        .collect();
    for label in totals.keys() {
        if !order.contains(&label.as_str()) {
            order.push(label);
        }
    }
    let mut summary_rows = vec![header_row(SUMMARY_HEADER)];
    summary_rows.extend(order.into_iter().map(|label| {
        let total = totals.get(label).copied().unwrap_or_default();
        vec![
            label.to_string(),
            format!("{:.2}", total.duration_secs),
            total.count.to_string(),
        ]
    }));

    let body = [metadata, csv_block(event_rows)?, csv_block(summary_rows)?].join("\n");
    writer.write_all(body.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Export a timeline's closed events to `path`
pub fn write_annotation_file(
    path: impl AsRef<Path>,
    timeline: &Timeline,
    summary_labels: &[String],
) -> Result<(), TimelineError> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)?;
    write_annotations(
        std::io::BufWriter::new(file),
        &timeline.snapshot(),
        timeline.test_duration_secs(),
        summary_labels,
    )?;
    info!("Exported {} events to {}", timeline.closed_count(), path.display());
    Ok(())
}

fn header_row(header: &str) -> Vec<String> {
    header.split(',').map(str::to_string).collect()
}

/// Parse an annotation file
pub fn read_annotations<R: Read>(mut reader: R) -> Result<AnnotationFile, TimelineError> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;
    parse_annotations(&content)
}

pub fn read_annotation_file(path: impl AsRef<Path>) -> Result<AnnotationFile, TimelineError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let parsed = read_annotations(std::io::BufReader::new(file))?;
    debug!(
        "Read {}: {} events, {} summary rows, {} skipped",
        path.display(),
        parsed.events.as_ref().map_or(0, Vec::len),
        parsed.summary.as_ref().map_or(0, BTreeMap::len),
        parsed.skipped_rows
    );
    Ok(parsed)
}

fn parse_annotations(content: &str) -> Result<AnnotationFile, TimelineError> {
    let lines: Vec<&str> = content.lines().map(str::trim_end).collect();
    let mut file = AnnotationFile {
        test_duration_secs: test_duration(content),
        ..AnnotationFile::default()
    };

    if let Some(block) = section_after(&lines, EVENT_HEADER) {
        file.events = Some(parse_events(&block, &mut file.skipped_rows)?);
    } else if let Some(block) = section_after(&lines, LEGACY_EVENT_HEADER) {
        file.events = Some(parse_events(&block, &mut file.skipped_rows)?);
    }
    if let Some(block) = section_after(&lines, SUMMARY_HEADER) {
        file.summary = Some(parse_summary(&block, &mut file.skipped_rows)?);
    }

    if file.events.is_none() && file.summary.is_none() {
        return Err(TimelineError::UnrecognizedFormat(
            "no event list or summary section found".to_string(),
        ));
    }
    if file.skipped_rows > 0 {
        warn!("Skipped {} malformed rows", file.skipped_rows);
    }
    Ok(file)
}

fn test_duration(content: &str) -> Option<f64> {
    let captures = (*TEST_DURATION_RE).as_ref()?.captures(content)?;
    let value = captures.get(1)?.as_str();
    match value.parse::<f64>() {
        Ok(secs) if secs.is_finite() => Some(secs),
        _ => {
            warn!("Unparsable test duration '{}'", value);
            None
        }
    }
}

/// Lines following `header` up to the next blank line or section header
fn section_after(lines: &[&str], header: &str) -> Option<String> {
    let start = lines
        .iter()
        .position(|line| line.trim_start().starts_with(header))?;
    let block: Vec<&str> = lines[start + 1..]
        .iter()
        .take_while(|line| {
            !line.trim().is_empty()
                && !line.starts_with(SUMMARY_HEADER)
                && !line.starts_with(EVENT_HEADER)
        })
        .copied()
        .collect();
    Some(block.join("\n"))
}

fn records(block: &str) -> impl Iterator<Item = Result<StringRecord, csv::Error>> + '_ {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(block.as_bytes())
        .into_records()
}

fn parse_events(block: &str, skipped: &mut usize) -> Result<Vec<BehaviorEvent>, TimelineError> {
    let mut events = Vec::new();
    for record in records(block) {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                warn!("Skipping unreadable event row: {}", err);
                *skipped += 1;
                continue;
            }
        };
        match parse_event_row(&record) {
            Ok(event) => events.push(event),
            Err(reason) => {
                warn!("Skipping event row {:?}: {}", record.iter().collect::<Vec<_>>(), reason);
                *skipped += 1;
            }
        }
    }
    Ok(events)
}

fn parse_event_row(record: &StringRecord) -> Result<BehaviorEvent, String> {
    let field = |i: usize| record.get(i).unwrap_or("");
    let (trigger, label, onset, offset) = if record.len() >= 5 {
        let onset = legacy_time_ms(field(2))?;
        let offset = legacy_time_ms(field(3))?;
        (TriggerId::from(field(0)), field(1), onset, offset)
    } else if record.len() >= 3 {
        let onset = seconds_ms(field(1))?;
        let offset = seconds_ms(field(2))?;
        (TriggerId::from(IMPORTED_TRIGGER), field(0), onset, offset)
    } else {
        return Err(format!("expected 3 columns, found {}", record.len()));
    };

    if label.is_empty() {
        return Err("empty label".to_string());
    }
    if offset < onset {
        return Err(format!("offset {}ms before onset {}ms", offset, onset));
    }
    let trigger = if label == RECORDING_START {
        TriggerId::from(ANCHOR_TRIGGER)
    } else {
        trigger
    };
    Ok(BehaviorEvent::closed(trigger, label, onset, offset))
}

fn seconds_ms(text: &str) -> Result<u64, String> {
    if text.is_empty() {
        return Err("missing time".to_string());
    }
    let secs: f64 = text
        .parse()
        .map_err(|_| format!("invalid time '{}'", text))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("invalid time '{}'", text));
    }
    Ok(secs_to_ms(secs))
}

/// Legacy rows hold seconds when a decimal point is present, else milliseconds
fn legacy_time_ms(text: &str) -> Result<u64, String> {
    if text.contains('.') {
        seconds_ms(text)
    } else if text.is_empty() {
        Err("missing time".to_string())
    } else {
        text.parse().map_err(|_| format!("invalid time '{}'", text))
    }
}

fn parse_summary(
    block: &str,
    skipped: &mut usize,
) -> Result<BTreeMap<String, LabelSummary>, TimelineError> {
    let mut summary = BTreeMap::new();
    for record in records(block) {
        let Ok(record) = record else {
            *skipped += 1;
            continue;
        };
        let label = record.get(0).unwrap_or("");
        if label.is_empty() || record.len() < 3 {
            warn!("Skipping summary row {:?}", record.iter().collect::<Vec<_>>());
            *skipped += 1;
            continue;
        }
        let duration = record.get(1).filter(|s| !s.is_empty()).unwrap_or("0");
        let count = record.get(2).filter(|s| !s.is_empty()).unwrap_or("0");
        match (duration.parse::<f64>(), count.parse::<u32>()) {
            (Ok(duration_secs), Ok(count)) => {
                summary.insert(
                    label.to_string(),
                    LabelSummary {
                        duration_secs: duration_secs.max(0.0),
                        count,
                    },
                );
            }
            _ => {
                warn!("Skipping summary row for '{}': bad numbers", label);
                *skipped += 1;
            }
        }
    }
    Ok(summary)
}
