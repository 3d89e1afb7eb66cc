//! Per-member drivers shared by the group combinators.

use crate::cx::TickCx;
use crate::error::{Error, Result};
use crate::resumable::Resumable;
use crate::step::BoxBlock;
use crate::task::{settle_if_empty, Drive, Task, TaskSlot};

type SettleHook<T> = Box<dyn FnOnce(&TaskSlot<T>)>;

/// Drives one group member's runner and reports its settlement.
///
/// The driver is the adapter boundary of a group: an error propagated by
/// the member's block is written into the member's slot here, so the
/// group executor never sees a failing resume and sibling members keep
/// advancing.
pub(crate) struct MemberDriver<T> {
    drive: Drive,
    slot: TaskSlot<T>,
    on_settled: Option<SettleHook<T>>,
    done: bool,
}

impl<T: 'static> MemberDriver<T> {
    pub(crate) fn new(runner: BoxBlock, slot: TaskSlot<T>, on_settled: SettleHook<T>) -> Self {
        Self {
            drive: Drive::new(runner),
            slot,
            on_settled: Some(on_settled),
            done: false,
        }
    }

    /// Builds a driver for `task`, consuming its runner.
    pub(crate) fn for_task(task: &mut Task<T>, on_settled: SettleHook<T>) -> Self {
        Self::new(task.run(), task.slot(), on_settled)
    }

    fn complete(&mut self) {
        self.done = true;
        if let Some(hook) = self.on_settled.take() {
            hook(&self.slot);
        }
    }
}

impl<T: 'static> Resumable for MemberDriver<T> {
    fn finished(&self) -> bool {
        self.done
    }

    /// Abandons the member mid-flight. The settle hook does not run;
    /// disposal is not a settlement.
    fn dispose(&mut self) {
        self.done = true;
        self.on_settled = None;
        self.drive.dispose();
    }

    fn resume(&mut self, cx: TickCx) -> Result<()> {
        if self.done {
            return Ok(());
        }
        match self.drive.step(cx) {
            Err(err) => {
                settle_if_empty(&self.slot, Err(err));
                self.complete();
            }
            Ok(true) => {
                settle_if_empty(
                    &self.slot,
                    Err(Error::internal("group member finished without settling")),
                );
                self.complete();
            }
            Ok(false) => {}
        }
        Ok(())
    }
}
