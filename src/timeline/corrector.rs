//! Duration correction at close time
//!
//! The position clock can be stale or quantized while the wall clock keeps
//! fine-grained time. A close that arrives less than one frame of real time
//! after the open, or at a position not past the onset, gets an offset of
//! exactly one frame past the onset.

use crate::clock::DEFAULT_FRAME_DURATION_MS;
use crate::types::{BehaviorEvent, WallTime};
use log::debug;

/// Final offset chosen for a closing event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correction {
    pub offset: u64,
    /// The offset was forced to `onset + frame`
    pub adjusted: bool,
}

/// Decides offsets for closing events
pub struct DurationCorrector;

impl DurationCorrector {
    /// Compute the offset for `event` closed at `position_ms` and `wall_close`.
    ///
    /// A frame duration of 0 means unknown and falls back to 33 ms. Events
    /// without a wall onset are judged on the position clock alone.
    pub fn correct(
        event: &BehaviorEvent,
        position_ms: u64,
        wall_close: WallTime,
        frame_duration_ms: u32,
    ) -> Correction {
        let frame = if frame_duration_ms == 0 {
            DEFAULT_FRAME_DURATION_MS
        } else {
            frame_duration_ms
        };

        let too_fast = event
            .wall_onset
            .map(|onset| wall_close.millis_since(onset) < f64::from(frame))
            .unwrap_or(false);
        let stale_position = position_ms <= event.onset;

        if too_fast || stale_position {
            let offset = event.onset + u64::from(frame);
            debug!(
                "Adjusted offset of '{}' to {}ms (wall elapsed short: {}, stale position: {})",
                event.label, offset, too_fast, stale_position
            );
            Correction {
                offset,
                adjusted: true,
            }
        } else {
            Correction {
                offset: position_ms,
                adjusted: false,
            }
        }
    }
}
