//! Error types for the timeline engine

use crate::types::TriggerId;
use thiserror::Error;

/// Errors that can occur while recording, analyzing or reading annotations
#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("Event already open for trigger: {0}")]
    AlreadyOpen(TriggerId),

    #[error("No open event for trigger: {0}")]
    NotOpen(TriggerId),

    #[error("No event at index: {0}")]
    InvalidIndex(usize),

    #[error("Offset {offset}ms precedes onset {onset}ms")]
    NegativeDuration { onset: u64, offset: u64 },

    #[error("Invalid session transition: {0}")]
    InvalidTransition(String),

    #[error("Signal rejected: {0}")]
    SignalRejected(String),

    #[error("Trigger not mapped to a behavior: {0}")]
    UnmappedTrigger(TriggerId),

    #[error("Invalid action mapping: {0}")]
    InvalidMapping(String),

    #[error("Metric name already exists: {0}")]
    DuplicateMetric(String),

    #[error("Metric not found: {0}")]
    MetricNotFound(String),

    #[error("At least one {0} metric must remain")]
    LastMetric(&'static str),

    #[error("Invalid metrics configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid interval width: {0} seconds")]
    InvalidInterval(f64),

    #[error("Failed to parse annotation file: {0}")]
    ParseError(String),

    #[error("Unrecognized annotation file format: {0}")]
    UnrecognizedFormat(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
