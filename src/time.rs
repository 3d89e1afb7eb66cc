//! Sleep block for delaying tick-driven work.
//!
//! Time here is purely the externally supplied per-tick delta; there is no
//! wall clock. [`Sleep`] counts its remaining seconds down by the delta of
//! whatever context it is advanced with, so a parent that dilates time via
//! [`TickCx::scaled`](crate::TickCx::scaled) dilates the sleep too.

use crate::cx::TickCx;
use crate::error::Result;
use crate::step::{Block, BoxBlock, Step};

/// A block that pauses until a duration of tick time has elapsed.
///
/// On each advance the current delta is subtracted from the remaining
/// time; the block pauses while the remainder is positive and completes
/// otherwise. Zero or negative initial durations complete on the first
/// advance without pausing.
#[derive(Debug, Clone)]
pub struct Sleep {
    remaining: f64,
}

impl Sleep {
    /// Creates a sleep of `seconds` of tick time.
    #[must_use]
    pub const fn new(seconds: f64) -> Self {
        Self { remaining: seconds }
    }

    /// Returns the remaining tick time, never below zero.
    #[must_use]
    pub fn remaining(&self) -> f64 {
        self.remaining.max(0.0)
    }
}

impl Block for Sleep {
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        self.remaining -= cx.delta();
        Ok(if self.remaining > 0.0 {
            Step::Pause
        } else {
            Step::Done
        })
    }
}

/// A block that pauses until `seconds` of tick time have elapsed.
#[must_use]
pub fn sleep(seconds: f64) -> BoxBlock {
    Box::new(Sleep::new(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_duration_completes_immediately() {
        let mut s = Sleep::new(0.0);
        assert!(s.advance(TickCx::new(0.0)).unwrap().is_done());
    }

    #[test]
    fn negative_duration_completes_immediately() {
        let mut s = Sleep::new(-1.0);
        assert!(s.advance(TickCx::new(0.0)).unwrap().is_done());
        assert_eq!(s.remaining(), 0.0);
    }

    #[test]
    fn counts_down_across_ticks() {
        let mut s = Sleep::new(0.3);
        assert!(s.advance(TickCx::new(0.1)).unwrap().is_pause());
        assert!(s.advance(TickCx::new(0.1)).unwrap().is_pause());
        // Third tick brings the remainder to zero.
        assert!(s.advance(TickCx::new(0.1)).unwrap().is_done());
    }

    #[test]
    fn reads_delta_per_advance() {
        let mut s = Sleep::new(1.0);
        assert!(s.advance(TickCx::new(0.25)).unwrap().is_pause());
        // A single large tick finishes the rest.
        assert!(s.advance(TickCx::new(10.0)).unwrap().is_done());
    }

    #[test]
    fn zero_delta_never_progresses() {
        let mut s = Sleep::new(0.5);
        for _ in 0..10 {
            assert!(s.advance(TickCx::ZERO).unwrap().is_pause());
        }
        assert_eq!(s.remaining(), 0.5);
    }

    #[test]
    fn scaled_context_dilates_sleep() {
        let mut s = Sleep::new(1.0);
        let cx = TickCx::new(1.0).scaled(0.5);
        assert!(s.advance(cx).unwrap().is_pause());
        assert!(s.advance(cx).unwrap().is_done());
    }
}
