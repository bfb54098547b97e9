//! Rabet Timeline - behavior event recording and analysis engine
//!
//! Records named behavior intervals against a video playback clock and turns
//! the resulting timelines into statistics: trigger/release signals → session
//! gating → timeline store (with duration correction and rewind handling) →
//! annotation files → batch analysis → summary tables.
//!
//! ## Modules
//!
//! - **Live recording**: [`session`], [`timeline`], [`clock`], [`notify`], [`action_map`]
//! - **Analysis**: [`analysis`] statistics, overlap unions, latencies and interval slicing
//! - **Files**: [`format`] annotation and summary CSV, [`replay`] host-signal scripts

pub mod action_map;
pub mod analysis;
pub mod clock;
pub mod error;
pub mod format;
pub mod notify;
pub mod replay;
pub mod session;
pub mod timeline;
pub mod types;

pub use action_map::ActionMap;
pub use clock::{ClockSource, ManualClock, PositionSource, ScriptedPlayer, SystemClock};
pub use error::TimelineError;
pub use notify::{DomainEvent, EventBus, TimelineObserver};
pub use session::{
    PlaybackCommand, PositionUpdate, RecordingSession, RewindDecision, SessionConfig, SessionState,
    SignalOutcome,
};
pub use timeline::{RewindGuard, RewindOutcome, RewindReport, Timeline};
pub use types::{BehaviorEvent, EventIndex, LabelSummary, TriggerId, WallTime, RECORDING_START};

// Analysis exports
pub use analysis::{analyze_files, AnalysisInput, AnalysisReport, AnalysisResult, Analyzer, MetricsConfig};

/// Crate version, reported by the CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
