//! Test utilities for Tickflow.
//!
//! Shared helpers for unit and integration tests:
//! - Consistent tracing-based logging initialization
//! - Tick-drive helpers for resumables
//!
//! # Example
//! ```
//! use tickflow::test_utils::{drive_to_completion, init_test_logging};
//! use tickflow::Coroutine;
//!
//! init_test_logging();
//! let mut co = Coroutine::new(tickflow::step::done());
//! let ticks = drive_to_completion(&mut co, 0.016, 10).unwrap();
//! assert_eq!(ticks, 1);
//! ```

use crate::error::{Error, Result};
use crate::resumable::Resumable;
use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Resumes `target` with a fixed `delta` until it finishes.
///
/// Returns the number of resumes performed, or fails once `max_ticks`
/// resumes were not enough, the usual sign of a block that never stops
/// pausing.
pub fn drive_to_completion<R: Resumable + ?Sized>(
    target: &mut R,
    delta: f64,
    max_ticks: usize,
) -> Result<usize> {
    let mut ticks = 0;
    while !target.finished() {
        if ticks >= max_ticks {
            return Err(Error::internal(format!(
                "not finished after {max_ticks} ticks"
            )));
        }
        target.tick(delta)?;
        ticks += 1;
    }
    Ok(ticks)
}

/// Resumes `target` exactly `n` times with a fixed `delta`.
pub fn drive_n<R: Resumable + ?Sized>(target: &mut R, delta: f64, n: usize) -> Result<()> {
    for _ in 0..n {
        target.tick(delta)?;
    }
    Ok(())
}
