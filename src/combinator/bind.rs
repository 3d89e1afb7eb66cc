//! Sequential composition: `bind`, `then`, and `map` on [`Task`].
//!
//! All three run the first task's runner to termination, then continue
//! with the derived work in the same tick. The second stage never costs
//! an extra pause when the first stage finishes instantaneously.

use crate::cx::TickCx;
use crate::error::{Error, Result};
use crate::step::{Block, Step};
use crate::task::{new_slot, settle_if_empty, Drive, Task, TaskSlot};
use std::rc::Rc;

impl<T: 'static> Task<T> {
    /// Sequences `binder` after this task and merges both results through
    /// `selector`.
    ///
    /// The binder borrows the first result to build the second task; the
    /// selector consumes both values once the second task succeeds. An
    /// error from either task settles the combined task with that error.
    #[must_use]
    pub fn bind<U, V, B, S>(mut self, binder: B, selector: S) -> Task<V>
    where
        U: 'static,
        V: 'static,
        B: FnOnce(&T) -> Task<U> + 'static,
        S: FnOnce(T, U) -> V + 'static,
    {
        let slot = new_slot();
        let drive = Drive::new(self.run());
        let runner = Box::new(BindBlock {
            first: self,
            second: None,
            first_value: None,
            binder: Some(binder),
            selector: Some(selector),
            drive,
            slot: Rc::clone(&slot),
        });
        Task::from_parts(slot, runner)
    }

    /// Sequences `next` after this task; the combined task settles with
    /// the second task's outcome.
    #[must_use]
    pub fn then<U, F>(mut self, next: F) -> Task<U>
    where
        U: 'static,
        F: FnOnce(T) -> Task<U> + 'static,
    {
        let slot = new_slot();
        let drive = Drive::new(self.run());
        let runner = Box::new(ThenBlock {
            first: self,
            second: None,
            next: Some(next),
            drive,
            slot: Rc::clone(&slot),
        });
        Task::from_parts(slot, runner)
    }

    /// Transforms this task's result with `f`.
    #[must_use]
    pub fn map<U, F>(mut self, f: F) -> Task<U>
    where
        U: 'static,
        F: FnOnce(T) -> U + 'static,
    {
        let slot = new_slot();
        let drive = Drive::new(self.run());
        let runner = Box::new(MapBlock {
            first: self,
            f: Some(f),
            drive,
            slot: Rc::clone(&slot),
        });
        Task::from_parts(slot, runner)
    }
}

struct BindBlock<T, U, V, B, S> {
    first: Task<T>,
    second: Option<Task<U>>,
    first_value: Option<T>,
    binder: Option<B>,
    selector: Option<S>,
    drive: Drive,
    slot: TaskSlot<V>,
}

impl<T, U, V, B, S> Block for BindBlock<T, U, V, B, S>
where
    T: 'static,
    U: 'static,
    V: 'static,
    B: FnOnce(&T) -> Task<U>,
    S: FnOnce(T, U) -> V,
{
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        loop {
            if self.second.is_none() {
                match self.drive.step(cx) {
                    Err(err) => return self.settle(Err(err)),
                    Ok(false) => return Ok(Step::Pause),
                    Ok(true) => match self.first.take() {
                        Some(Err(err)) => return self.settle(Err(err)),
                        Some(Ok(value)) => {
                            let Some(binder) = self.binder.take() else {
                                return self.settle(Err(Error::internal("binder consumed")));
                            };
                            let mut second = binder(&value);
                            self.first_value = Some(value);
                            self.drive = Drive::new(second.run());
                            self.second = Some(second);
                            // Continue into the second stage this tick.
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
                            .second
                            .as_mut()
                            .and_then(Task::take)
                            .unwrap_or_else(|| {
                                Err(Error::internal("second stage never settled"))
                            });
                        return match outcome {
                            Err(err) => self.settle(Err(err)),
                            Ok(second_value) => {
                                let (Some(first_value), Some(selector)) =
                                    (self.first_value.take(), self.selector.take())
                                else {
                                    return self
                                        .settle(Err(Error::internal("selector consumed")));
                                };
                                self.settle(Ok(selector(first_value, second_value)))
                            }
                        };
                    }
                }
            }
        }
    }
}

impl<T, U, V, B, S> BindBlock<T, U, V, B, S> {
    fn settle(&self, outcome: Result<V>) -> Result<Step> {
        settle_if_empty(&self.slot, outcome);
        Ok(Step::Done)
    }
}

struct ThenBlock<T, U, F> {
    first: Task<T>,
    second: Option<Task<U>>,
    next: Option<F>,
    drive: Drive,
    slot: TaskSlot<U>,
}

impl<T, U, F> Block for ThenBlock<T, U, F>
where
    T: 'static,
    U: 'static,
    F: FnOnce(T) -> Task<U>,
{
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        loop {
            if self.second.is_none() {
                match self.drive.step(cx) {
                    Err(err) => return self.settle(Err(err)),
                    Ok(false) => return Ok(Step::Pause),
                    Ok(true) => match self.first.take() {
                        Some(Err(err)) => return self.settle(Err(err)),
                        Some(Ok(value)) => {
                            let Some(next) = self.next.take() else {
                                return self.settle(Err(Error::internal("stage consumed")));
                            };
                            let mut second = next(value);
                            self.drive = Drive::new(second.run());
                            self.second = Some(second);
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
                            .second
                            .as_mut()
                            .and_then(Task::take)
                            .unwrap_or_else(|| {
                                Err(Error::internal("second stage never settled"))
                            });
                        return self.settle(outcome);
                    }
                }
            }
        }
    }
}

impl<T, U, F> ThenBlock<T, U, F> {
    fn settle(&self, outcome: Result<U>) -> Result<Step> {
        settle_if_empty(&self.slot, outcome);
        Ok(Step::Done)
    }
}

struct MapBlock<T, U, F> {
    first: Task<T>,
    f: Option<F>,
    drive: Drive,
    slot: TaskSlot<U>,
}

impl<T, U, F> Block for MapBlock<T, U, F>
where
    T: 'static,
    U: 'static,
    F: FnOnce(T) -> U,
{
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        match self.drive.step(cx) {
            Err(err) => {
                settle_if_empty(&self.slot, Err(err));
                Ok(Step::Done)
            }
            Ok(false) => Ok(Step::Pause),
            Ok(true) => {
                let outcome = match self.first.take() {
                    Some(Ok(value)) => match self.f.take() {
                        Some(f) => Ok(f(value)),
                        None => Err(Error::internal("map closure consumed")),
                    },
                    Some(Err(err)) => Err(err),
                    None => Err(Error::internal("first stage never settled")),
                };
                settle_if_empty(&self.slot, outcome);
                Ok(Step::Done)
            }
        }
    }
}
