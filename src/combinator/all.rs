//! Fail-fast concurrent groups: wait for every member, abort on the
//! first member error.
//!
//! `all` runs its members under an internal [`Executor`]. Each tick
//! advances every unfinished member once; the group settles with the
//! per-member results in input order once all members finish, or with the
//! first member error seen, disposing the remaining members mid-flight
//! so their cleanups run before the group reports the failure.

use crate::cx::TickCx;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::resumable::Resumable;
use crate::step::{Block, Step};
use crate::task::{new_slot, settle_if_empty, Task, TaskSlot};
use std::cell::RefCell;
use std::rc::Rc;

use super::group::MemberDriver;

type ErrorCell = Rc<RefCell<Option<Error>>>;

fn first_error_hook<T: 'static>(cell: &ErrorCell) -> Box<dyn FnOnce(&TaskSlot<T>)> {
    let cell = Rc::clone(cell);
    Box::new(move |slot: &TaskSlot<T>| {
        if let Some(Err(err)) = &*slot.borrow() {
            let mut first = cell.borrow_mut();
            if first.is_none() {
                *first = Some(err.clone());
            }
        }
    })
}

fn spawn_driver<T: 'static>(exec: &mut Executor, task: &mut Task<T>, cell: &ErrorCell) {
    exec.add(MemberDriver::for_task(task, first_error_hook(cell)));
}

/// Runs every task concurrently; settles with all results in input order,
/// or with the first member error.
#[must_use]
pub fn all<T: 'static>(mut tasks: Vec<Task<T>>) -> Task<Vec<T>> {
    let slot = new_slot();
    let first_error: ErrorCell = Rc::default();
    let mut exec = Executor::new();
    for task in &mut tasks {
        spawn_driver(&mut exec, task, &first_error);
    }
    let runner = Box::new(AllBlock {
        exec,
        members: tasks,
        first_error,
        slot: Rc::clone(&slot),
    });
    Task::from_parts(slot, runner)
}

struct AllBlock<T> {
    exec: Executor,
    members: Vec<Task<T>>,
    first_error: ErrorCell,
    slot: TaskSlot<Vec<T>>,
}

impl<T: 'static> AllBlock<T> {
    fn try_finish(&mut self) -> Option<Step> {
        if let Some(err) = self.first_error.borrow_mut().take() {
            // First error aborts the group: dispose the live siblings
            // before reporting, running their cleanups.
            self.exec.dispose();
            settle_if_empty(&self.slot, Err(err));
            return Some(Step::Done);
        }
        if !self.exec.finished() {
            return None;
        }
        let mut results = Vec::with_capacity(self.members.len());
        for member in &mut self.members {
            match member.take() {
                Some(Ok(value)) => results.push(value),
                Some(Err(err)) => {
                    settle_if_empty(&self.slot, Err(err));
                    return Some(Step::Done);
                }
                None => {
                    settle_if_empty(
                        &self.slot,
                        Err(Error::internal("group member never settled")),
                    );
                    return Some(Step::Done);
                }
            }
        }
        settle_if_empty(&self.slot, Ok(results));
        Some(Step::Done)
    }
}

impl<T: 'static> Block for AllBlock<T> {
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        if let Some(step) = self.try_finish() {
            return Ok(step);
        }
        self.exec.resume(cx)?;
        Ok(self.try_finish().unwrap_or(Step::Pause))
    }
}

/// Two-member group over differing result types; settles with the pair.
#[must_use]
pub fn all2<T1: 'static, T2: 'static>(mut a: Task<T1>, mut b: Task<T2>) -> Task<(T1, T2)> {
    let slot = new_slot();
    let first_error: ErrorCell = Rc::default();
    let mut exec = Executor::new();
    spawn_driver(&mut exec, &mut a, &first_error);
    spawn_driver(&mut exec, &mut b, &first_error);
    let runner = Box::new(All2Block {
        exec,
        a,
        b,
        first_error,
        slot: Rc::clone(&slot),
    });
    Task::from_parts(slot, runner)
}

struct All2Block<T1, T2> {
    exec: Executor,
    a: Task<T1>,
    b: Task<T2>,
    first_error: ErrorCell,
    slot: TaskSlot<(T1, T2)>,
}

impl<T1: 'static, T2: 'static> All2Block<T1, T2> {
    fn try_finish(&mut self) -> Option<Step> {
        if let Some(err) = self.first_error.borrow_mut().take() {
            self.exec.dispose();
            settle_if_empty(&self.slot, Err(err));
            return Some(Step::Done);
        }
        if !self.exec.finished() {
            return None;
        }
        let outcome = pair_results(self.a.take(), self.b.take());
        settle_if_empty(&self.slot, outcome);
        Some(Step::Done)
    }
}

impl<T1: 'static, T2: 'static> Block for All2Block<T1, T2> {
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        if let Some(step) = self.try_finish() {
            return Ok(step);
        }
        self.exec.resume(cx)?;
        Ok(self.try_finish().unwrap_or(Step::Pause))
    }
}

/// Three-member group over differing result types; settles with the triple.
#[must_use]
pub fn all3<T1: 'static, T2: 'static, T3: 'static>(
    mut a: Task<T1>,
    mut b: Task<T2>,
    mut c: Task<T3>,
) -> Task<(T1, T2, T3)> {
    let slot = new_slot();
    let first_error: ErrorCell = Rc::default();
    let mut exec = Executor::new();
    spawn_driver(&mut exec, &mut a, &first_error);
    spawn_driver(&mut exec, &mut b, &first_error);
    spawn_driver(&mut exec, &mut c, &first_error);
    let runner = Box::new(All3Block {
        exec,
        a,
        b,
        c,
        first_error,
        slot: Rc::clone(&slot),
    });
    Task::from_parts(slot, runner)
}

struct All3Block<T1, T2, T3> {
    exec: Executor,
    a: Task<T1>,
    b: Task<T2>,
    c: Task<T3>,
    first_error: ErrorCell,
    slot: TaskSlot<(T1, T2, T3)>,
}

impl<T1: 'static, T2: 'static, T3: 'static> All3Block<T1, T2, T3> {
    fn try_finish(&mut self) -> Option<Step> {
        if let Some(err) = self.first_error.borrow_mut().take() {
            self.exec.dispose();
            settle_if_empty(&self.slot, Err(err));
            return Some(Step::Done);
        }
        if !self.exec.finished() {
            return None;
        }
        let ab = pair_results(self.a.take(), self.b.take());
        let outcome = match (ab, take_settled(self.c.take())) {
            (Ok((a, b)), Ok(c)) => Ok((a, b, c)),
            (Err(err), _) | (_, Err(err)) => Err(err),
        };
        settle_if_empty(&self.slot, outcome);
        Some(Step::Done)
    }
}

impl<T1: 'static, T2: 'static, T3: 'static> Block for All3Block<T1, T2, T3> {
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        if let Some(step) = self.try_finish() {
            return Ok(step);
        }
        self.exec.resume(cx)?;
        Ok(self.try_finish().unwrap_or(Step::Pause))
    }
}

pub(super) fn take_settled<T>(taken: Option<Result<T>>) -> Result<T> {
    taken.unwrap_or_else(|| Err(Error::internal("group member never settled")))
}

fn pair_results<T1, T2>(a: Option<Result<T1>>, b: Option<Result<T2>>) -> Result<(T1, T2)> {
    match (take_settled(a), take_settled(b)) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(err), _) | (_, Err(err)) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coroutine::Coroutine;
    use crate::step::from_fn;
    use crate::test_utils::drive_to_completion;

    fn after_pauses<T: 'static>(pauses: u32, value: T) -> Task<T> {
        let mut cell = Some(value);
        Task::block(move |sink| {
            let mut left = pauses;
            from_fn(move |_| {
                if left > 0 {
                    left -= 1;
                    return Ok(Step::Pause);
                }
                if let Some(v) = cell.take() {
                    sink.accept(v)?;
                }
                Ok(Step::Done)
            })
        })
    }

    fn fail_after_pauses<T: 'static>(pauses: u32, message: &'static str) -> Task<T> {
        Task::block(move |sink| {
            let mut left = pauses;
            from_fn(move |_| {
                if left > 0 {
                    left -= 1;
                    return Ok(Step::Pause);
                }
                sink.fail(Error::user(message))?;
                Ok(Step::Done)
            })
        })
    }

    #[test]
    fn all_collects_in_input_order() {
        let mut task = all(vec![
            after_pauses(3, 1),
            after_pauses(0, 2),
            after_pauses(1, 3),
        ]);
        let mut co = Coroutine::new(task.run());
        drive_to_completion(&mut co, 0.0, 20).unwrap();
        assert_eq!(task.take().unwrap().unwrap(), [1, 2, 3]);
    }

    #[test]
    fn all_empty_group_settles_immediately() {
        let mut task: Task<Vec<i32>> = all(Vec::new());
        let mut co = Coroutine::new(task.run());
        let ticks = drive_to_completion(&mut co, 0.0, 5).unwrap();
        assert_eq!(ticks, 1);
        assert!(task.take().unwrap().unwrap().is_empty());
    }

    #[test]
    fn all_fails_fast_on_first_error() {
        let mut task = all(vec![
            after_pauses(10, 1),
            fail_after_pauses(1, "early"),
        ]);
        let mut co = Coroutine::new(task.run());
        drive_to_completion(&mut co, 0.0, 20).unwrap();
        assert_eq!(task.error().unwrap().context(), Some("early"));
    }

    #[test]
    fn all2_pairs_heterogeneous_results() {
        let mut task = all2(after_pauses(2, 10), after_pauses(1, "ok".to_owned()));
        let mut co = Coroutine::new(task.run());
        drive_to_completion(&mut co, 0.0, 20).unwrap();
        assert_eq!(task.take().unwrap().unwrap(), (10, "ok".to_owned()));
    }

    #[test]
    fn all3_triples_results() {
        let mut task = all3(
            after_pauses(0, 1u8),
            after_pauses(1, 2u16),
            after_pauses(2, 3u32),
        );
        let mut co = Coroutine::new(task.run());
        drive_to_completion(&mut co, 0.0, 20).unwrap();
        assert_eq!(task.take().unwrap().unwrap(), (1, 2, 3));
    }
}
