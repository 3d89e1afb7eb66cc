//! The common scheduling capability.
//!
//! Anything with `finished` and `resume` can be driven by a host tick loop
//! or multiplexed under an [`Executor`](crate::Executor). Both
//! [`Coroutine`](crate::Coroutine) and [`Executor`](crate::Executor)
//! implement [`Resumable`].

use crate::cx::TickCx;
use crate::error::Result;
use std::cell::RefCell;
use std::rc::Rc;

/// A unit of cooperative work advanced once per host tick.
///
/// The host contract is:
///
/// ```ignore
/// while !r.finished() {
///     r.tick(delta_this_tick)?;
/// }
/// ```
///
/// `resume` must not be re-entered on the same value; Rust's `&mut`
/// receiver enforces this for direct owners, and the shared
/// [`Rc<RefCell<_>>`] impl panics on reentrant borrowing.
pub trait Resumable {
    /// Returns true once the work has terminated.
    fn finished(&self) -> bool;

    /// Advances the work by one tick under `cx`.
    ///
    /// Resuming finished work is a no-op.
    fn resume(&mut self, cx: TickCx) -> Result<()>;

    /// Tears down in-flight work without running it to completion.
    ///
    /// After dispose the work reports `finished` and further resumes are
    /// no-ops. An aggregator discarding a live member calls this instead
    /// of relying on the member's `Drop`. The default does nothing;
    /// implementations that own frames or members override it.
    fn dispose(&mut self) {}

    /// Convenience: resume with a fresh context of `delta` seconds.
    fn tick(&mut self, delta: f64) -> Result<()> {
        self.resume(TickCx::new(delta))
    }
}

impl<R: Resumable + ?Sized> Resumable for Box<R> {
    fn finished(&self) -> bool {
        (**self).finished()
    }

    fn resume(&mut self, cx: TickCx) -> Result<()> {
        (**self).resume(cx)
    }

    fn dispose(&mut self) {
        (**self).dispose();
    }
}

/// Shared handle impl so a resumable can be driven from a join adapter
/// while the host keeps its own handle for inspection.
impl<R: Resumable + ?Sized> Resumable for Rc<RefCell<R>> {
    fn finished(&self) -> bool {
        self.borrow().finished()
    }

    fn resume(&mut self, cx: TickCx) -> Result<()> {
        self.borrow_mut().resume(cx)
    }

    fn dispose(&mut self) {
        self.borrow_mut().dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coroutine::Coroutine;
    use crate::step::{from_fn, Step};

    #[test]
    fn boxed_resumable_delegates() {
        let mut boxed: Box<dyn Resumable> = Box::new(Coroutine::new(from_fn(|_| Ok(Step::Done))));
        assert!(!boxed.finished());
        boxed.tick(0.0).unwrap();
        assert!(boxed.finished());
    }

    #[test]
    fn shared_resumable_delegates() {
        let shared = Rc::new(RefCell::new(Coroutine::new(from_fn(|_| Ok(Step::Done)))));
        let mut driver = Rc::clone(&shared);
        driver.tick(0.0).unwrap();
        assert!(shared.borrow().finished());
    }

    #[test]
    fn dispose_forwards_through_boxed_handle() {
        let mut boxed: Box<dyn Resumable> = Box::new(Coroutine::new(from_fn(|_| Ok(Step::Pause))));
        boxed.tick(0.0).unwrap();
        assert!(!boxed.finished());
        boxed.dispose();
        assert!(boxed.finished());
    }
}
