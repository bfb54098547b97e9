//! Timeline store, duration correction and rewind handling

pub mod corrector;
pub mod rewind;
pub mod store;

pub use corrector::{Correction, DurationCorrector};
pub use rewind::{RewindGuard, RewindOutcome, RewindReport, DEFAULT_REWIND_EPSILON_MS};
pub use store::Timeline;
