//! Never-failing concurrent groups: wait for every member and report each
//! member's completion record.
//!
//! Unlike [`all`](super::all), member errors do not abort the group; the
//! group always runs every member to termination and settles successfully
//! with the per-member `Result`s in input order.

use crate::cx::TickCx;
use crate::error::Result;
use crate::executor::Executor;
use crate::resumable::Resumable;
use crate::step::{Block, Step};
use crate::task::{new_slot, settle_if_empty, Task, TaskSlot};
use std::rc::Rc;

use super::all::take_settled;
use super::group::MemberDriver;

fn no_hook<T: 'static>() -> Box<dyn FnOnce(&TaskSlot<T>)> {
    Box::new(|_| {})
}

/// Runs every task to termination; settles with the completion records in
/// input order. Never fails.
#[must_use]
pub fn wait_all<T: 'static>(mut tasks: Vec<Task<T>>) -> Task<Vec<Result<T>>> {
    let slot = new_slot();
    let mut exec = Executor::new();
    for task in &mut tasks {
        exec.add(MemberDriver::for_task(task, no_hook()));
    }
    let runner = Box::new(WaitAllBlock {
        exec,
        members: tasks,
        slot: Rc::clone(&slot),
    });
    Task::from_parts(slot, runner)
}

struct WaitAllBlock<T> {
    exec: Executor,
    members: Vec<Task<T>>,
    slot: TaskSlot<Vec<Result<T>>>,
}

impl<T: 'static> WaitAllBlock<T> {
    fn try_finish(&mut self) -> Option<Step> {
        if !self.exec.finished() {
            return None;
        }
        let records: Vec<Result<T>> = self
            .members
            .iter_mut()
            .map(|member| take_settled(member.take()))
            .collect();
        self.exec.dispose();
        settle_if_empty(&self.slot, Ok(records));
        Some(Step::Done)
    }
}

impl<T: 'static> Block for WaitAllBlock<T> {
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        if let Some(step) = self.try_finish() {
            return Ok(step);
        }
        self.exec.resume(cx)?;
        Ok(self.try_finish().unwrap_or(Step::Pause))
    }
}

/// Two-member wait-all over differing result types.
#[must_use]
pub fn wait_all2<T1: 'static, T2: 'static>(
    mut a: Task<T1>,
    mut b: Task<T2>,
) -> Task<(Result<T1>, Result<T2>)> {
    let slot = new_slot();
    let mut exec = Executor::new();
    exec.add(MemberDriver::for_task(&mut a, no_hook()));
    exec.add(MemberDriver::for_task(&mut b, no_hook()));
    let runner = Box::new(WaitAll2Block {
        exec,
        a,
        b,
        slot: Rc::clone(&slot),
    });
    Task::from_parts(slot, runner)
}

struct WaitAll2Block<T1, T2> {
    exec: Executor,
    a: Task<T1>,
    b: Task<T2>,
    slot: TaskSlot<(Result<T1>, Result<T2>)>,
}

impl<T1: 'static, T2: 'static> WaitAll2Block<T1, T2> {
    fn finish(&mut self) -> Step {
        let records = (take_settled(self.a.take()), take_settled(self.b.take()));
        self.exec.dispose();
        settle_if_empty(&self.slot, Ok(records));
        Step::Done
    }
}

impl<T1: 'static, T2: 'static> Block for WaitAll2Block<T1, T2> {
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        if self.exec.finished() {
            return Ok(self.finish());
        }
        self.exec.resume(cx)?;
        if self.exec.finished() {
            return Ok(self.finish());
        }
        Ok(Step::Pause)
    }
}

/// Three-member wait-all over differing result types.
#[must_use]
pub fn wait_all3<T1: 'static, T2: 'static, T3: 'static>(
    mut a: Task<T1>,
    mut b: Task<T2>,
    mut c: Task<T3>,
) -> Task<(Result<T1>, Result<T2>, Result<T3>)> {
    let slot = new_slot();
    let mut exec = Executor::new();
    exec.add(MemberDriver::for_task(&mut a, no_hook()));
    exec.add(MemberDriver::for_task(&mut b, no_hook()));
    exec.add(MemberDriver::for_task(&mut c, no_hook()));
    let runner = Box::new(WaitAll3Block {
        exec,
        a,
        b,
        c,
        slot: Rc::clone(&slot),
    });
    Task::from_parts(slot, runner)
}

struct WaitAll3Block<T1, T2, T3> {
    exec: Executor,
    a: Task<T1>,
    b: Task<T2>,
    c: Task<T3>,
    slot: TaskSlot<(Result<T1>, Result<T2>, Result<T3>)>,
}

impl<T1: 'static, T2: 'static, T3: 'static> WaitAll3Block<T1, T2, T3> {
    fn finish(&mut self) -> Step {
        let records = (
            take_settled(self.a.take()),
            take_settled(self.b.take()),
            take_settled(self.c.take()),
        );
        self.exec.dispose();
        settle_if_empty(&self.slot, Ok(records));
        Step::Done
    }
}

impl<T1: 'static, T2: 'static, T3: 'static> Block for WaitAll3Block<T1, T2, T3> {
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        if self.exec.finished() {
            return Ok(self.finish());
        }
        self.exec.resume(cx)?;
        if self.exec.finished() {
            return Ok(self.finish());
        }
        Ok(Step::Pause)
    }
}
