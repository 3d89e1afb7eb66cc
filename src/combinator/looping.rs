//! Effectful state loops: `loop_with` and the [`LoopStep`] control record.

use crate::cx::TickCx;
use crate::error::{Error, Result};
use crate::step::{Block, Step};
use crate::task::{new_slot, settle_if_empty, Drive, Task, TaskSlot};
use std::rc::Rc;

/// The verdict of one loop or wait iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStep<S> {
    /// Iterate again with the new state.
    Continue(S),
    /// Stop and settle with the final state.
    Break(S),
}

impl<S> LoopStep<S> {
    /// Returns true for [`LoopStep::Continue`].
    #[must_use]
    pub const fn is_continue(&self) -> bool {
        matches!(self, Self::Continue(_))
    }

    /// Returns true for [`LoopStep::Break`].
    #[must_use]
    pub const fn is_break(&self) -> bool {
        matches!(self, Self::Break(_))
    }

    /// Unwraps the carried state either way.
    pub fn into_state(self) -> S {
        match self {
            Self::Continue(s) | Self::Break(s) => s,
        }
    }
}

/// Repeatedly runs the effect task `reducer` builds from the loop state.
///
/// Each iteration runs the effect to termination: an effect error settles
/// the loop with that error; `Continue(s)` feeds `s` into the next
/// iteration without an intervening pause; `Break(s)` settles the loop
/// with `s`.
#[must_use]
pub fn loop_with<S, R>(reducer: R, initial: S) -> Task<S>
where
    S: 'static,
    R: FnMut(S) -> Task<LoopStep<S>> + 'static,
{
    let slot = new_slot();
    let runner = Box::new(LoopBlock {
        reducer,
        state: Some(initial),
        effect: None,
        drive: None,
        slot: Rc::clone(&slot),
    });
    Task::from_parts(slot, runner)
}

struct LoopBlock<S, R> {
    reducer: R,
    state: Option<S>,
    effect: Option<Task<LoopStep<S>>>,
    drive: Option<Drive>,
    slot: TaskSlot<S>,
}

impl<S, R> LoopBlock<S, R> {
    fn settle(&self, outcome: Result<S>) -> Result<Step> {
        settle_if_empty(&self.slot, outcome);
        Ok(Step::Done)
    }
}

impl<S, R> Block for LoopBlock<S, R>
where
    S: 'static,
    R: FnMut(S) -> Task<LoopStep<S>>,
{
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        loop {
            if self.effect.is_none() {
                let Some(state) = self.state.take() else {
                    return self.settle(Err(Error::internal("loop state lost")));
                };
                let mut effect = (self.reducer)(state);
                self.drive = Some(Drive::new(effect.run()));
                self.effect = Some(effect);
            }
            let Some(drive) = self.drive.as_mut() else {
                return self.settle(Err(Error::internal("loop drive lost")));
            };
            match drive.step(cx) {
                Err(err) => return self.settle(Err(err)),
                Ok(false) => return Ok(Step::Pause),
                Ok(true) => {
                    let outcome = self
                        .effect
                        .as_mut()
                        .and_then(Task::take)
                        .unwrap_or_else(|| Err(Error::internal("effect never settled")));
                    self.effect = None;
                    self.drive = None;
                    match outcome {
                        Err(err) => return self.settle(Err(err)),
                        Ok(LoopStep::Break(state)) => return self.settle(Ok(state)),
                        Ok(LoopStep::Continue(state)) => {
                            self.state = Some(state);
                            // Next iteration starts within this same tick.
                        }
                    }
                }
            }
        }
    }
}
