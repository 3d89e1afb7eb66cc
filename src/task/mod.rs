//! Tasks: typed value-or-error producers driven by step blocks.
//!
//! A [`Task<T>`] couples a completion slot with a one-shot runner block.
//! Hosting code takes the runner with [`Task::run`], drives it inside a
//! coroutine, and reads the settled value back with [`Task::take`] once
//! the runner completes. After a well-formed runner finishes, the slot
//! holds exactly one `Ok` or `Err`.
//!
//! # Construction
//!
//! - [`Task::ready`] / [`Task::fail`]: preset outcomes, empty runner
//! - [`Task::from_fn`]: settle from a closure on first advance
//! - [`Task::block`]: author a multi-tick block that settles through a
//!   [`CompletionSink`]
//! - [`Task::threaded`] / [`Task::pooled`]: run a blocking closure on a
//!   worker while the task is polled cooperatively (see [`blocking`])
//! - combinators in [`crate::combinator`]: sequencing, recovery, groups
//!
//! # Error capture
//!
//! Every adapter lifts block errors into the task's slot at its boundary;
//! errors never travel through the step stream of a task runner.

pub mod blocking;

use crate::coroutine::Coroutine;
use crate::cx::TickCx;
use crate::error::{Error, ErrorKind, Result};
use crate::step::{self, Block, BoxBlock, Step};
use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

/// Shared completion slot: empty until the runner settles it once.
pub(crate) type TaskSlot<T> = Rc<RefCell<Option<Result<T>>>>;

pub(crate) fn new_slot<T>() -> TaskSlot<T> {
    Rc::new(RefCell::new(None))
}

/// Writes `outcome` if the slot is still empty; returns whether it wrote.
pub(crate) fn settle_if_empty<T>(slot: &TaskSlot<T>, outcome: Result<T>) -> bool {
    let mut guard = slot.borrow_mut();
    if guard.is_some() {
        return false;
    }
    trace!(ok = outcome.is_ok(), "task settled");
    *guard = Some(outcome);
    true
}

/// Drives a child coroutine one cooperative step at a time, capturing
/// block errors instead of propagating them.
///
/// This is the boundary where a "thrown" error becomes task data: an
/// `Err` from the child tears the child down and is handed to the caller
/// to store in a slot, never re-raised out of the owning runner.
pub(crate) struct Drive {
    child: Coroutine,
}

impl Drive {
    pub(crate) fn new(block: BoxBlock) -> Self {
        Self {
            child: Coroutine::new(block),
        }
    }

    /// Tears the child down mid-flight, running its cleanups.
    pub(crate) fn dispose(&mut self) {
        self.child.dispose();
    }

    /// One step. `Ok(true)` means the child finished, `Ok(false)` that it
    /// paused; `Err` means it failed and has been disposed.
    pub(crate) fn step(&mut self, cx: TickCx) -> Result<bool> {
        use crate::resumable::Resumable as _;
        if self.child.finished() {
            return Ok(true);
        }
        match self.child.resume(cx) {
            Ok(()) => Ok(self.child.finished()),
            Err(err) => {
                self.child.dispose();
                Err(err)
            }
        }
    }
}

/// A typed, single-shot value-or-error producer.
pub struct Task<T> {
    slot: TaskSlot<T>,
    runner: Option<BoxBlock>,
}

impl<T: 'static> Task<T> {
    pub(crate) fn from_parts(slot: TaskSlot<T>, runner: BoxBlock) -> Self {
        Self {
            slot,
            runner: Some(runner),
        }
    }

    pub(crate) fn slot(&self) -> TaskSlot<T> {
        Rc::clone(&self.slot)
    }

    /// A task already settled with `value`.
    #[must_use]
    pub fn ready(value: T) -> Self {
        let slot = new_slot();
        *slot.borrow_mut() = Some(Ok(value));
        Self::from_parts(slot, step::done())
    }

    /// A task already settled with `error`.
    #[must_use]
    pub fn fail(error: Error) -> Self {
        let slot = new_slot();
        *slot.borrow_mut() = Some(Err(error));
        Self::from_parts(slot, step::done())
    }

    /// A task that settles from `f` on the first advance of its runner.
    #[must_use]
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<T> + 'static,
    {
        let slot = new_slot();
        let runner = Box::new(FuncBlock {
            slot: Rc::clone(&slot),
            f: Some(f),
        });
        Self::from_parts(slot, runner)
    }

    /// A task whose runner is authored as a step block settling through a
    /// [`CompletionSink`].
    ///
    /// `build` receives the sink and returns the block to drive. If the
    /// block finishes without calling `accept` or `fail`, the task settles
    /// with [`ErrorKind::BlockIncomplete`]; if the block raises, the error
    /// is captured into the slot.
    #[must_use]
    pub fn block<F>(build: F) -> Self
    where
        F: FnOnce(CompletionSink<T>) -> BoxBlock,
    {
        let slot = new_slot();
        let sink = CompletionSink {
            slot: Rc::clone(&slot),
        };
        let inner = build(sink);
        let runner = Box::new(GuardBlock {
            slot: Rc::clone(&slot),
            drive: Drive::new(inner),
        });
        Self::from_parts(slot, runner)
    }

    /// Takes the one-shot runner block.
    ///
    /// A second call returns a runner that raises
    /// [`ErrorKind::TaskAlreadyRun`] out of the driving resume; the slot
    /// is left untouched.
    pub fn run(&mut self) -> BoxBlock {
        match self.runner.take() {
            Some(runner) => runner,
            None => step::fail(Error::new(ErrorKind::TaskAlreadyRun)),
        }
    }

    /// Returns true once the slot holds an outcome.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Returns true if the slot holds a success.
    #[must_use]
    pub fn has_result(&self) -> bool {
        matches!(&*self.slot.borrow(), Some(Ok(_)))
    }

    /// Returns true if the slot holds an error.
    #[must_use]
    pub fn has_error(&self) -> bool {
        matches!(&*self.slot.borrow(), Some(Err(_)))
    }

    /// Clones the settled error out of the slot, if any.
    #[must_use]
    pub fn error(&self) -> Option<Error> {
        match &*self.slot.borrow() {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }

    /// Transfers the settled outcome to the caller, emptying the slot.
    pub fn take(&mut self) -> Option<Result<T>> {
        self.slot.borrow_mut().take()
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.slot.borrow() {
            None => "pending",
            Some(Ok(_)) => "ok",
            Some(Err(_)) => "err",
        };
        f.debug_struct("Task")
            .field("state", &state)
            .field("runner_taken", &self.runner.is_none())
            .finish()
    }
}

struct FuncBlock<T, F> {
    slot: TaskSlot<T>,
    f: Option<F>,
}

impl<T, F> Block for FuncBlock<T, F>
where
    F: FnOnce() -> Result<T>,
{
    fn advance(&mut self, _cx: TickCx) -> Result<Step> {
        if let Some(f) = self.f.take() {
            settle_if_empty(&self.slot, f());
        }
        Ok(Step::Done)
    }
}

struct GuardBlock<T> {
    slot: TaskSlot<T>,
    drive: Drive,
}

impl<T> Block for GuardBlock<T> {
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        match self.drive.step(cx) {
            Err(err) => {
                settle_if_empty(&self.slot, Err(err));
                Ok(Step::Done)
            }
            Ok(false) => Ok(Step::Pause),
            Ok(true) => {
                settle_if_empty(&self.slot, Err(Error::new(ErrorKind::BlockIncomplete)));
                Ok(Step::Done)
            }
        }
    }
}

/// The write side of a task: settles the slot exactly once.
pub struct CompletionSink<T> {
    slot: TaskSlot<T>,
}

impl<T> CompletionSink<T> {
    /// Settles the task with `value`.
    ///
    /// Fails with [`ErrorKind::DoubleCompletion`] if already settled.
    pub fn accept(&self, value: T) -> Result<()> {
        if settle_if_empty(&self.slot, Ok(value)) {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::DoubleCompletion))
        }
    }

    /// Settles the task with `error`.
    ///
    /// Fails with [`ErrorKind::DoubleCompletion`] if already settled.
    pub fn fail(&self, error: Error) -> Result<()> {
        if settle_if_empty(&self.slot, Err(error)) {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::DoubleCompletion))
        }
    }

    /// Returns true once the task has been settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.slot.borrow().is_some()
    }
}

impl<T> Clone for CompletionSink<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for CompletionSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSink")
            .field("settled", &self.is_settled())
            .finish()
    }
}

struct CellBlock<T> {
    slot: TaskSlot<T>,
}

impl<T> Block for CellBlock<T> {
    fn advance(&mut self, _cx: TickCx) -> Result<Step> {
        Ok(if self.slot.borrow().is_some() {
            Step::Done
        } else {
            Step::Pause
        })
    }
}

/// An out-of-band completion: the producer settles from outside the
/// drive loop, and the task's runner pauses until that happens.
pub struct CompletionSource<T> {
    slot: TaskSlot<T>,
    task: Option<Task<T>>,
}

impl<T: 'static> CompletionSource<T> {
    /// Creates an unsettled source and its pending task.
    #[must_use]
    pub fn new() -> Self {
        let slot = new_slot();
        let runner = Box::new(CellBlock {
            slot: Rc::clone(&slot),
        });
        let task = Task::from_parts(Rc::clone(&slot), runner);
        Self {
            slot,
            task: Some(task),
        }
    }

    /// Takes the task tied to this source. Yields once.
    pub fn take_task(&mut self) -> Option<Task<T>> {
        self.task.take()
    }

    /// Returns a write handle for this source.
    #[must_use]
    pub fn sink(&self) -> CompletionSink<T> {
        CompletionSink {
            slot: Rc::clone(&self.slot),
        }
    }

    /// Settles the task with `value`; errors on double completion.
    pub fn accept(&self, value: T) -> Result<()> {
        self.sink().accept(value)
    }

    /// Settles the task with `error`; errors on double completion.
    pub fn fail(&self, error: Error) -> Result<()> {
        self.sink().fail(error)
    }
}

impl<T: 'static> Default for CompletionSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for CompletionSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSource")
            .field("settled", &self.slot.borrow().is_some())
            .field("task_taken", &self.task.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resumable::Resumable;
    use crate::step::from_fn;

    fn drive<T: 'static>(task: &mut Task<T>) -> Result<usize> {
        let mut co = Coroutine::new(task.run());
        let mut ticks = 0;
        while !co.finished() {
            co.tick(0.0)?;
            ticks += 1;
            assert!(ticks < 100, "task did not settle");
        }
        Ok(ticks)
    }

    // =========================================================================
    // Preset and closure tasks
    // =========================================================================

    #[test]
    fn ready_settles_on_one_tick() {
        let mut task = Task::ready(42);
        let ticks = drive(&mut task).unwrap();
        assert_eq!(ticks, 1);
        assert_eq!(task.take().unwrap().unwrap(), 42);
    }

    #[test]
    fn fail_carries_preset_error() {
        let mut task: Task<i32> = Task::fail(Error::user("nope"));
        drive(&mut task).unwrap();
        assert!(task.has_error());
        assert_eq!(task.error().unwrap().context(), Some("nope"));
    }

    #[test]
    fn from_fn_captures_success_and_error() {
        let mut ok_task = Task::from_fn(|| Ok(7));
        drive(&mut ok_task).unwrap();
        assert_eq!(ok_task.take().unwrap().unwrap(), 7);

        let mut err_task: Task<i32> = Task::from_fn(|| Err(Error::user("calc")));
        drive(&mut err_task).unwrap();
        assert_eq!(err_task.error().unwrap().context(), Some("calc"));
    }

    // =========================================================================
    // Block tasks and the completion sink
    // =========================================================================

    #[test]
    fn block_settles_through_sink() {
        let mut task = Task::block(|sink| {
            let mut phase = 0;
            from_fn(move |_| {
                phase += 1;
                if phase < 3 {
                    Ok(Step::Pause)
                } else {
                    sink.accept(99)?;
                    Ok(Step::Done)
                }
            })
        });
        let ticks = drive(&mut task).unwrap();
        assert_eq!(ticks, 3);
        assert_eq!(task.take().unwrap().unwrap(), 99);
    }

    #[test]
    fn block_without_settle_is_incomplete() {
        let mut task: Task<i32> = Task::block(|_sink| from_fn(|_| Ok(Step::Done)));
        drive(&mut task).unwrap();
        assert_eq!(task.error().unwrap().kind(), ErrorKind::BlockIncomplete);
    }

    #[test]
    fn block_error_is_captured_not_raised() {
        let mut task: Task<i32> = Task::block(|_sink| crate::step::fail(Error::user("inside")));
        // Driving never sees the error; the slot does.
        drive(&mut task).unwrap();
        assert_eq!(task.error().unwrap().context(), Some("inside"));
    }

    #[test]
    fn sink_rejects_double_completion() {
        let task: Task<i32> = Task::block(|sink| {
            sink.accept(1).unwrap();
            let second = sink.accept(2);
            assert_eq!(
                second.unwrap_err().kind(),
                ErrorKind::DoubleCompletion
            );
            from_fn(|_| Ok(Step::Done))
        });
        assert!(task.has_result());
    }

    // =========================================================================
    // Single-shot run
    // =========================================================================

    #[test]
    fn second_run_raises_protocol_error() {
        let mut task = Task::ready(1);
        let _first = task.run();
        let mut second = task.run();
        let err = second.advance(TickCx::ZERO).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TaskAlreadyRun);
        // The slot is untouched by the protocol error.
        assert!(task.has_result());
    }

    // =========================================================================
    // Completion source
    // =========================================================================

    #[test]
    fn source_task_waits_for_external_accept() {
        let mut source = CompletionSource::new();
        let mut task = source.take_task().unwrap();
        let mut co = Coroutine::new(task.run());
        co.tick(0.0).unwrap();
        assert!(!co.finished());
        source.accept(5).unwrap();
        co.tick(0.0).unwrap();
        assert!(co.finished());
        assert_eq!(task.take().unwrap().unwrap(), 5);
    }

    #[test]
    fn source_double_completion_errors() {
        let source: CompletionSource<i32> = CompletionSource::new();
        source.accept(1).unwrap();
        assert_eq!(
            source.fail(Error::user("late")).unwrap_err().kind(),
            ErrorKind::DoubleCompletion
        );
    }

    #[test]
    fn source_settled_before_run_completes_immediately() {
        let mut source = CompletionSource::new();
        source.accept(3).unwrap();
        let mut task = source.take_task().unwrap();
        let ticks = drive(&mut task).unwrap();
        assert_eq!(ticks, 1);
        assert_eq!(task.take().unwrap().unwrap(), 3);
    }
}
