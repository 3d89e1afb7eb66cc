//! Pure waiting: re-evaluate a reducer once per tick until it breaks.
//!
//! Unlike [`loop_with`](super::loop_with) there is no inner effect task:
//! the reducer is a plain function evaluated once per advance. Pausing N
//! times therefore invokes the reducer exactly N+1 times; the final call
//! is the one that returns `Break`.

use crate::cx::TickCx;
use crate::error::{Error, Result};
use crate::step::{Block, Step};
use crate::task::{new_slot, settle_if_empty, Task, TaskSlot};
use std::rc::Rc;

use super::looping::LoopStep;

/// Re-evaluates `reducer` over the threaded state once per tick;
/// settles with the state carried by `Break`.
#[must_use]
pub fn wait_with<S, R>(reducer: R, initial: S) -> Task<S>
where
    S: 'static,
    R: FnMut(S) -> LoopStep<S> + 'static,
{
    let slot = new_slot();
    let runner = Box::new(WaitBlock {
        reducer,
        state: Some(initial),
        slot: Rc::clone(&slot),
    });
    Task::from_parts(slot, runner)
}

/// Pauses while `pred` returns true; settles once it returns false.
#[must_use]
pub fn wait_until<P>(mut pred: P) -> Task<()>
where
    P: FnMut() -> bool + 'static,
{
    wait_with(
        move |()| {
            if pred() {
                LoopStep::Continue(())
            } else {
                LoopStep::Break(())
            }
        },
        (),
    )
}

struct WaitBlock<S, R> {
    reducer: R,
    state: Option<S>,
    slot: TaskSlot<S>,
}

impl<S, R> Block for WaitBlock<S, R>
where
    S: 'static,
    R: FnMut(S) -> LoopStep<S>,
{
    fn advance(&mut self, _cx: TickCx) -> Result<Step> {
        let Some(state) = self.state.take() else {
            settle_if_empty(&self.slot, Err(Error::internal("wait state lost")));
            return Ok(Step::Done);
        };
        match (self.reducer)(state) {
            LoopStep::Continue(next) => {
                self.state = Some(next);
                Ok(Step::Pause)
            }
            LoopStep::Break(fin) => {
                settle_if_empty(&self.slot, Ok(fin));
                Ok(Step::Done)
            }
        }
    }
}
