use chrono::Utc;

use crate::api::types::Position;

/// Clock millis are scaled by this much, and no two clock-derived keys from
/// one allocator are closer than it.
pub const CLOCK_SCALE: f64 = 100.0;

/// Gap used when a key must sort before an existing first sibling.
const LEADING_GAP: f64 = 100.0;

pub fn clock_position() -> Position {
    Utc::now().timestamp_millis() as f64 * CLOCK_SCALE
}

/// The key halfway between two siblings, or `None` once the floats between
/// them are used up.
pub fn midpoint(prev: Position, next: Position) -> Option<Position> {
    let mid = (prev + next) / 2.0;
    (mid > prev && mid < next).then_some(mid)
}

/// Hands out sibling ordering keys for one editing session. Clock-derived
/// values never go backwards within a run, even if the wall clock does.
#[derive(Debug, Default)]
pub struct PositionAllocator {
    last_clock: Position,
}

impl PositionAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A key strictly between `prev` and `next`. Returns `None` when both are
    /// given and no float fits between them; the caller must re-key the
    /// following siblings.
    pub fn allocate(&mut self, prev: Option<Position>, next: Option<Position>) -> Option<Position> {
        match (prev, next) {
            (Some(prev), Some(next)) => {
                let mid = midpoint(prev, next);
                if mid.is_none() {
                    tracing::warn!(prev, next, "position precision exhausted between siblings");
                }
                mid
            }
            (None, Some(next)) => Some(next - LEADING_GAP).filter(|p| *p < next),
            (prev, None) => Some(self.append(prev)),
        }
    }

    /// A key after `prev` (or anywhere, without one), at least
    /// [`CLOCK_SCALE`] past it.
    pub fn append(&mut self, prev: Option<Position>) -> Position {
        let pos = self.tick();
        match prev {
            Some(prev) if pos < prev + CLOCK_SCALE => {
                // The clock lags behind a key allocated elsewhere.
                self.last_clock = prev + CLOCK_SCALE;
                self.last_clock
            }
            _ => pos,
        }
    }

    fn tick(&mut self) -> Position {
        self.last_clock = clock_position().max(self.last_clock + CLOCK_SCALE);
        self.last_clock
    }
}
