//! The coroutine machine: a stack of step blocks advanced as one unit.
//!
//! A [`Coroutine`] owns the currently advancing block plus the suspended
//! parents beneath it. Advancing runs the top block until it pauses:
//! nested yields push the current block and descend, `Become` yields
//! tail-replace the top without growing the stack, and completed blocks
//! pop back to their parent within the same tick.
//!
//! # Failure semantics
//!
//! A block that returns an error from its advance is dropped, the error
//! propagates out of `resume`, and the coroutine stays advanceable: the
//! suspended parent (if any) continues on the next tick. Structured error
//! handling lives in the task layer, which captures block errors into the
//! owning task's slot.
//!
//! # Disposal
//!
//! [`Coroutine::dispose`] drops the top block and then every suspended
//! parent in LIFO order, running their cleanups. Disposal is idempotent,
//! a disposed coroutine reports `finished`, and dropping a coroutine
//! disposes it, so the LIFO order holds on every teardown path.

use crate::cx::TickCx;
use crate::error::Result;
use crate::resumable::Resumable;
use crate::step::{BoxBlock, Step};
use tracing::trace;

/// A resumable hosting a stack of step blocks.
pub struct Coroutine {
    /// The currently advancing block, or none once finished.
    top: Option<BoxBlock>,
    /// Suspended parents, most recently pushed last.
    stack: Vec<BoxBlock>,
}

impl Coroutine {
    /// Creates a coroutine rooted at `root`.
    #[must_use]
    pub fn new(root: BoxBlock) -> Self {
        Self {
            top: Some(root),
            stack: Vec::new(),
        }
    }

    /// Creates a coroutine rooted at a closure block.
    ///
    /// Shorthand for `Coroutine::new(from_fn(f))`.
    #[must_use]
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut(TickCx) -> Result<Step> + 'static,
    {
        Self::new(crate::step::from_fn(f))
    }

    /// Returns the number of live blocks (top plus suspended parents).
    ///
    /// Mutually tail-replacing blocks hold this at one regardless of how
    /// many replacements have happened.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len() + usize::from(self.top.is_some())
    }

    /// Returns true once every block has completed or been disposed.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.top.is_none()
    }

    /// Tears down all blocks: the top first, then suspended parents in
    /// LIFO order. Idempotent; subsequent resumes are no-ops.
    pub fn dispose(&mut self) {
        if self.top.is_none() && self.stack.is_empty() {
            return;
        }
        trace!(frames = self.depth(), "coroutine disposed");
        drop(self.top.take());
        while let Some(parent) = self.stack.pop() {
            drop(parent);
        }
    }
}

impl Drop for Coroutine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Resumable for Coroutine {
    fn finished(&self) -> bool {
        self.finished()
    }

    fn dispose(&mut self) {
        Coroutine::dispose(self);
    }

    fn resume(&mut self, cx: TickCx) -> Result<()> {
        let Some(mut top) = self.top.take() else {
            return Ok(());
        };
        loop {
            match top.advance(cx) {
                Err(err) => {
                    // The erring frame is spent; the parent resumes next tick.
                    drop(top);
                    self.top = self.stack.pop();
                    trace!(depth = self.depth(), "block failed, frame dropped");
                    return Err(err);
                }
                Ok(Step::Pause) => {
                    self.top = Some(top);
                    return Ok(());
                }
                Ok(Step::Nested(child)) => {
                    self.stack.push(top);
                    trace!(depth = self.stack.len(), "descending into nested block");
                    top = child;
                }
                Ok(Step::Become(next)) => {
                    trace!("tail-replacing top block");
                    top = next;
                }
                Ok(Step::Done) => {
                    drop(top);
                    match self.stack.pop() {
                        Some(parent) => {
                            trace!(depth = self.stack.len(), "block done, resuming parent");
                            top = parent;
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }
}

impl core::fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Coroutine")
            .field("depth", &self.depth())
            .field("finished", &self.finished())
            .finish()
    }
}
