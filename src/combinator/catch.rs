//! Error recovery: `catch` on [`Task`].

use crate::cx::TickCx;
use crate::error::{Error, Result};
use crate::step::{Block, Step};
use crate::task::{new_slot, settle_if_empty, Drive, Task, TaskSlot};
use std::rc::Rc;

impl<T: 'static> Task<T> {
    /// Recovers from a failure by continuing with the task `handler`
    /// builds from the error.
    ///
    /// A success passes through untouched; on failure the recovery task's
    /// outcome is adopted wholesale, result or error.
    #[must_use]
    pub fn catch<H>(mut self, handler: H) -> Task<T>
    where
        H: FnOnce(&Error) -> Task<T> + 'static,
    {
        let slot = new_slot();
        let drive = Drive::new(self.run());
        let runner = Box::new(CatchBlock {
            first: self,
            recovery: None,
            handler: Some(handler),
            drive,
            slot: Rc::clone(&slot),
        });
        Task::from_parts(slot, runner)
    }
}

struct CatchBlock<T, H> {
    first: Task<T>,
    recovery: Option<Task<T>>,
    handler: Option<H>,
    drive: Drive,
    slot: TaskSlot<T>,
}

impl<T, H> CatchBlock<T, H>
where
    T: 'static,
    H: FnOnce(&Error) -> Task<T>,
{
    fn settle(&self, outcome: Result<T>) -> Result<Step> {
        settle_if_empty(&self.slot, outcome);
        Ok(Step::Done)
    }

    /// Starts the recovery stage; yields a terminal step only if the
    /// handler was somehow already consumed.
    fn begin_recovery(&mut self, error: &Error) -> Option<Step> {
        let Some(handler) = self.handler.take() else {
            settle_if_empty(&self.slot, Err(Error::internal("handler consumed")));
            return Some(Step::Done);
        };
        let mut recovery = handler(error);
        self.drive = Drive::new(recovery.run());
        self.recovery = Some(recovery);
        None
    }
}

impl<T, H> Block for CatchBlock<T, H>
where
    T: 'static,
    H: FnOnce(&Error) -> Task<T>,
{
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        loop {
            if self.recovery.is_none() {
                match self.drive.step(cx) {
                    Err(err) => {
                        // The block itself raised; that is the failure to recover from.
                        if let Some(step) = self.begin_recovery(&err) {
                            return Ok(step);
                        }
                    }
                    Ok(false) => return Ok(Step::Pause),
                    Ok(true) => match self.first.take() {
                        Some(Ok(value)) => return self.settle(Ok(value)),
                        Some(Err(err)) => {
                            if let Some(step) = self.begin_recovery(&err) {
                                return Ok(step);
                            }
                        }
                        None => {
                            return self.settle(Err(Error::internal("first stage never settled")))
                        }
                    },
                }
            } else {
                match self.drive.step(cx) {
                    Err(err) => return self.settle(Err(err)),
                    Ok(false) => return Ok(Step::Pause),
                    Ok(true) => {
                        let outcome = self
                            .recovery
                            .as_mut()
                            .and_then(Task::take)
                            .unwrap_or_else(|| {
                                Err(Error::internal("recovery never settled"))
                            });
                        return self.settle(outcome);
                    }
                }
            }
        }
    }
}
