//! Join adapters: drive a resumable from inside a coroutine.
//!
//! Each adapter wraps a resumable in a block so an outer coroutine can
//! suspend on it. Every advance performs one resume of the target *before*
//! pausing, so a target that completes instantly does not cost an extra
//! tick. The adapters own their target; to keep a handle on the driven
//! value, wrap it in `Rc<RefCell<_>>` (which is itself [`Resumable`]) and
//! hand the adapter a clone.

use crate::cx::TickCx;
use crate::error::Result;
use crate::resumable::Resumable;
use crate::step::{Block, BoxBlock, Step};

struct Join<R> {
    target: R,
}

impl<R: Resumable> Block for Join<R> {
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        if self.target.finished() {
            return Ok(Step::Done);
        }
        self.target.resume(cx)?;
        Ok(if self.target.finished() {
            Step::Done
        } else {
            Step::Pause
        })
    }
}

/// A block that resumes `target` each tick until it finishes.
#[must_use]
pub fn join<R: Resumable + 'static>(target: R) -> BoxBlock {
    Box::new(Join { target })
}

struct JoinWhile<R, P> {
    target: R,
    pred: P,
}

impl<R: Resumable, P: FnMut() -> bool> Block for JoinWhile<R, P> {
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        if !(self.pred)() {
            return Ok(Step::Done);
        }
        self.target.resume(cx)?;
        Ok(Step::Pause)
    }
}

/// A block that resumes `target` each tick while `pred` holds.
///
/// The target's own `finished` state is ignored; resuming a finished
/// resumable is a no-op, so the adapter simply idles until the predicate
/// turns false.
#[must_use]
pub fn join_while<R, P>(target: R, pred: P) -> BoxBlock
where
    R: Resumable + 'static,
    P: FnMut() -> bool + 'static,
{
    Box::new(JoinWhile { target, pred })
}

struct TimedJoin<R> {
    target: R,
    budget: f64,
}

impl<R: Resumable> Block for TimedJoin<R> {
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        if self.budget <= 0.0 || self.target.finished() {
            return Ok(Step::Done);
        }
        self.target.resume(cx)?;
        self.budget -= cx.delta();
        Ok(if self.target.finished() || self.budget <= 0.0 {
            Step::Done
        } else {
            Step::Pause
        })
    }
}

/// A block that resumes `target` each tick until it finishes or `budget`
/// seconds of tick time have elapsed.
///
/// The target is abandoned, not disposed, when the budget runs out; it is
/// handed back to its owner's `Drop` when the block goes away.
#[must_use]
pub fn timed_join<R: Resumable + 'static>(target: R, budget: f64) -> BoxBlock {
    Box::new(TimedJoin { target, budget })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coroutine::Coroutine;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn pausing(n: u32) -> Coroutine {
        let mut left = n;
        Coroutine::from_fn(move |_| {
            Ok(if left == 0 {
                Step::Done
            } else {
                left -= 1;
                Step::Pause
            })
        })
    }

    // =========================================================================
    // join
    // =========================================================================

    #[test]
    fn join_instantaneous_completes_without_pause() {
        let mut block = join(pausing(0));
        assert!(block.advance(TickCx::ZERO).unwrap().is_done());
    }

    #[test]
    fn join_drives_target_to_completion() {
        let mut outer = Coroutine::new(join(pausing(2)));
        let mut ticks = 0;
        while !outer.finished() {
            outer.tick(0.0).unwrap();
            ticks += 1;
            assert!(ticks < 10);
        }
        assert_eq!(ticks, 3);
    }

    #[test]
    fn join_shared_handle_observable_from_outside() {
        let target = Rc::new(RefCell::new(pausing(1)));
        let mut outer = Coroutine::new(join(Rc::clone(&target)));
        outer.tick(0.0).unwrap();
        assert!(!target.borrow().finished());
        outer.tick(0.0).unwrap();
        assert!(target.borrow().finished());
        assert!(outer.finished());
    }

    // =========================================================================
    // join_while
    // =========================================================================

    #[test]
    fn join_while_stops_when_predicate_turns_false() {
        let gate = Rc::new(Cell::new(2u32));
        let seen = Rc::clone(&gate);
        let mut block = join_while(pausing(10), move || {
            if seen.get() == 0 {
                false
            } else {
                seen.set(seen.get() - 1);
                true
            }
        });
        assert!(block.advance(TickCx::ZERO).unwrap().is_pause());
        assert!(block.advance(TickCx::ZERO).unwrap().is_pause());
        assert!(block.advance(TickCx::ZERO).unwrap().is_done());
    }

    #[test]
    fn join_while_ignores_target_finish() {
        let mut calls = 0;
        let mut block = join_while(pausing(0), move || {
            calls += 1;
            calls <= 3
        });
        assert!(block.advance(TickCx::ZERO).unwrap().is_pause());
        assert!(block.advance(TickCx::ZERO).unwrap().is_pause());
        assert!(block.advance(TickCx::ZERO).unwrap().is_pause());
        assert!(block.advance(TickCx::ZERO).unwrap().is_done());
    }

    // =========================================================================
    // timed_join
    // =========================================================================

    #[test]
    fn timed_join_exits_when_budget_elapses() {
        let mut block = timed_join(pausing(100), 0.25);
        assert!(block.advance(TickCx::new(0.1)).unwrap().is_pause());
        assert!(block.advance(TickCx::new(0.1)).unwrap().is_pause());
        assert!(block.advance(TickCx::new(0.1)).unwrap().is_done());
    }

    #[test]
    fn timed_join_exits_early_when_target_finishes() {
        let mut block = timed_join(pausing(1), 100.0);
        assert!(block.advance(TickCx::new(0.1)).unwrap().is_pause());
        assert!(block.advance(TickCx::new(0.1)).unwrap().is_done());
    }

    #[test]
    fn timed_join_zero_budget_exits_immediately() {
        let mut block = timed_join(pausing(5), 0.0);
        assert!(block.advance(TickCx::new(0.1)).unwrap().is_done());
    }
}
