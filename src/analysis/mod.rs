//! Batch analysis of completed timelines
//!
//! Stages: per-label totals and metrics ([`stats`]), optional interval
//! breakdown ([`intervals`]), orchestrated per source by [`pipeline`].

pub mod config;
pub mod intervals;
pub mod pipeline;
pub mod stats;

pub use config::{LatencyMetric, MetricsConfig, TotalTimeMetric};
pub use intervals::{IntervalSlicer, IntervalSnapshot, MetricValue};
pub use pipeline::{
    analyze_files, AnalysisInput, AnalysisReport, AnalysisResult, Analyzer,
    DEFAULT_TEST_DURATION_SECS,
};
