//! First-of groups: adopt the first member to settle.
//!
//! Both variants run members under an internal [`Executor`] and break as
//! soon as a winner claims the group. [`first_completed`] only lets
//! *successful* members claim it (a member that fails in the same tick a
//! sibling succeeds can never shadow the success) and fails with the
//! aggregate of all member errors when no member succeeds.
//! [`first_completed_or_faulted`] adopts whichever member settles first,
//! outcome and all.
//!
//! Once a winner claims the group, the remaining members are disposed
//! mid-flight, running their cleanups before the group settles.

use crate::cx::TickCx;
use crate::error::{Error, ErrorKind, Result};
use crate::executor::Executor;
use crate::resumable::Resumable;
use crate::step::{Block, Step};
use crate::task::{new_slot, settle_if_empty, Task, TaskSlot};
use std::cell::RefCell;
use std::rc::Rc;

use super::group::MemberDriver;

type WinnerCell = Rc<RefCell<Option<usize>>>;

/// Adopts the first member to *succeed*; fails with an aggregate error if
/// every member settles without a success.
#[must_use]
pub fn first_completed<T: 'static>(tasks: Vec<Task<T>>) -> Task<T> {
    first_of(tasks, true)
}

/// Adopts the first member to settle, success or failure.
#[must_use]
pub fn first_completed_or_faulted<T: 'static>(tasks: Vec<Task<T>>) -> Task<T> {
    first_of(tasks, false)
}

fn first_of<T: 'static>(mut tasks: Vec<Task<T>>, only_completed: bool) -> Task<T> {
    if tasks.is_empty() {
        return Task::fail(Error::new(ErrorKind::AllFailed).with_context("empty group"));
    }
    let slot = new_slot();
    let winner: WinnerCell = Rc::default();
    let mut exec = Executor::new();
    for (index, task) in tasks.iter_mut().enumerate() {
        let cell = Rc::clone(&winner);
        let hook = Box::new(move |member_slot: &TaskSlot<T>| {
            let settled_ok = matches!(&*member_slot.borrow(), Some(Ok(_)));
            if !only_completed || settled_ok {
                let mut claimed = cell.borrow_mut();
                if claimed.is_none() {
                    *claimed = Some(index);
                }
            }
        });
        exec.add(MemberDriver::for_task(task, hook));
    }
    let runner = Box::new(RaceBlock {
        exec,
        members: tasks,
        winner,
        slot: Rc::clone(&slot),
    });
    Task::from_parts(slot, runner)
}

struct RaceBlock<T> {
    exec: Executor,
    members: Vec<Task<T>>,
    winner: WinnerCell,
    slot: TaskSlot<T>,
}

impl<T: 'static> RaceBlock<T> {
    fn try_finish(&mut self) -> Option<Step> {
        if let Some(index) = *self.winner.borrow() {
            let outcome = self.members[index]
                .take()
                .unwrap_or_else(|| Err(Error::internal("race winner never settled")));
            // The losers are disposed mid-flight, cleanups included.
            self.exec.dispose();
            settle_if_empty(&self.slot, outcome);
            return Some(Step::Done);
        }
        if !self.exec.finished() {
            return None;
        }
        // Every member settled and none claimed the win: collect the
        // member errors in input order.
        let errors: Vec<Error> = self
            .members
            .iter_mut()
            .filter_map(|member| match member.take() {
                Some(Err(err)) => Some(err),
                _ => None,
            })
            .collect();
        let outcome = if errors.is_empty() {
            Err(Error::internal("race finished without winner or errors"))
        } else {
            Err(Error::aggregate(errors))
        };
        settle_if_empty(&self.slot, outcome);
        Some(Step::Done)
    }
}

impl<T: 'static> Block for RaceBlock<T> {
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        if let Some(step) = self.try_finish() {
            return Ok(step);
        }
        self.exec.resume(cx)?;
        Ok(self.try_finish().unwrap_or(Step::Pause))
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
    fn fastest_success_wins() {
        let mut task = first_completed(vec![after_pauses(3, 1), after_pauses(1, 2)]);
        let mut co = Coroutine::new(task.run());
        drive_to_completion(&mut co, 0.0, 20).unwrap();
        assert_eq!(task.take().unwrap().unwrap(), 2);
    }

    #[test]
    fn failure_cannot_claim_first_completed() {
        let mut task = first_completed(vec![
            fail_after_pauses(0, "fast failure"),
            after_pauses(3, 9),
        ]);
        let mut co = Coroutine::new(task.run());
        drive_to_completion(&mut co, 0.0, 20).unwrap();
        assert_eq!(task.take().unwrap().unwrap(), 9);
    }

    #[test]
    fn all_failures_aggregate_in_input_order() {
        let mut task: Task<i32> = first_completed(vec![
            fail_after_pauses(1, "one"),
            fail_after_pauses(0, "two"),
        ]);
        let mut co = Coroutine::new(task.run());
        drive_to_completion(&mut co, 0.0, 20).unwrap();
        let err = task.error().unwrap();
        assert_eq!(err.kind(), ErrorKind::AllFailed);
        let flat = err.as_aggregate().unwrap().flatten();
        let contexts: Vec<_> = flat.iter().map(|e| e.context().unwrap()).collect();
        assert_eq!(contexts, ["one", "two"]);
    }

    #[test]
    fn faulted_variant_adopts_fast_failure() {
        let mut task = first_completed_or_faulted(vec![
            after_pauses(3, 1),
            fail_after_pauses(1, "boom"),
        ]);
        let mut co = Coroutine::new(task.run());
        drive_to_completion(&mut co, 0.0, 20).unwrap();
        assert_eq!(task.error().unwrap().context(), Some("boom"));
    }

    #[test]
    fn empty_group_fails() {
        let task: Task<i32> = first_completed(Vec::new());
        assert_eq!(task.error().unwrap().kind(), ErrorKind::AllFailed);
    }
}
