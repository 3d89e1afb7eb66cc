//! Tickflow: cooperative coroutines for tick-driven hosts.
//!
//! # Overview
//!
//! Tickflow gives step-yielding blocks the structure a frame-loop host
//! does not supply natively: a call stack for nested blocks, concurrent
//! composition under one driver, typed value-or-error results layered on
//! top, and deterministic resource release on early termination. The host
//! supplies nothing but a recurring tick with a time delta; everything in
//! the crate advances only inside those calls.
//!
//! # Core Guarantees
//!
//! - **Stacked suspension**: a block can suspend on a nested block; the
//!   parent resumes in the same tick the child finishes
//! - **Bounded tail-replacement**: mutually `Become`-ing blocks run in
//!   constant stack depth
//! - **Deterministic cleanup**: disposal tears down blocks in LIFO order
//!   and runs their deferred cleanups on every exit path
//! - **Typed completion**: a finished task holds exactly one of result or
//!   error; block errors are captured at task boundaries, never lost in
//!   the step stream
//! - **Cooperative blocking**: threaded and pooled tasks run closures
//!   off-thread while being polled from the tick loop, with a
//!   cooperative cancel flag instead of forcible aborts
//!
//! # Module Structure
//!
//! - [`cx`]: the tick context carrying the current delta
//! - [`step`]: the yield protocol and the [`Block`] trait
//! - [`resumable`]: the common scheduling capability
//! - [`coroutine`]: the stack machine hosting blocks
//! - [`time`]: delta-driven sleeping
//! - [`executor`]: multiplexing many resumables under one driver
//! - [`join`]: driving a resumable from inside a coroutine
//! - [`task`]: typed value-or-error producers and completion sources
//! - [`combinator`]: sequencing, recovery, and concurrent groups
//! - [`defer`]: LIFO scoped cleanup
//! - [`error`]: error types
//! - [`test_utils`]: logging and drive helpers for tests
//!
//! # Example
//!
//! ```
//! use tickflow::{Coroutine, Resumable, Step};
//!
//! // A block that waits one tick, then finishes.
//! let mut ready = false;
//! let mut co = Coroutine::from_fn(move |_cx| {
//!     if ready {
//!         Ok(Step::Done)
//!     } else {
//!         ready = true;
//!         Ok(Step::Pause)
//!     }
//! });
//!
//! while !co.finished() {
//!     co.tick(0.016)?;
//! }
//! # Ok::<(), tickflow::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod combinator;
pub mod coroutine;
pub mod cx;
pub mod defer;
pub mod error;
pub mod executor;
pub mod join;
pub mod resumable;
pub mod step;
pub mod task;
pub mod test_utils;
pub mod time;

pub use combinator::{
    all, all2, all3, first_completed, first_completed_or_faulted, loop_with, wait_all, wait_all2,
    wait_all3, wait_until, wait_with, LoopStep,
};
pub use coroutine::Coroutine;
pub use cx::TickCx;
pub use defer::Defer;
pub use error::{AggregateError, Error, ErrorKind, Result};
pub use executor::{Executor, MemberId};
pub use join::{join, join_while, timed_join};
pub use resumable::Resumable;
pub use step::{from_fn, Block, BoxBlock, Step};
pub use task::blocking::{CancelFlag, WorkerPool};
pub use task::{CompletionSink, CompletionSource, Task};
pub use time::{sleep, Sleep};
