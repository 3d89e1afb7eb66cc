//! The step protocol: lazy blocks and the yields that drive them.
//!
//! A [`Block`] is a step producer: a resumable unit of work advanced one
//! [`Step`] at a time by the [`Coroutine`](crate::Coroutine) hosting it.
//! Each advance either suspends (`Pause`), delegates to a child block
//! (`Nested`), tail-replaces itself (`Become`), or finishes (`Done`).
//!
//! The yield protocol is a closed sum type. There is no open "operation"
//! escape hatch: everything a block can ask of its coroutine is a `Step`
//! variant, so an unsupported yield is a compile error rather than a
//! runtime fault.

use crate::cx::TickCx;
use crate::error::{Error, Result};
use core::fmt;

/// A boxed, owned step producer.
pub type BoxBlock = Box<dyn Block>;

/// A step-yielding unit of cooperative work.
///
/// Blocks are single-pass: once `advance` returns [`Step::Done`] (or an
/// error) the block is spent and is dropped by its driver. Cleanup is
/// ordinary `Drop`; a block that owns resources releases them when the
/// hosting coroutine pops, replaces, or disposes it.
pub trait Block {
    /// Advances the block by one step under the given tick context.
    ///
    /// An `Err` ends the block: the driver drops it and propagates the
    /// error out of the current resume.
    fn advance(&mut self, cx: TickCx) -> Result<Step>;
}

/// The yield of a single [`Block::advance`] call.
pub enum Step {
    /// Suspend; the driver returns control to the host until next tick.
    Pause,
    /// Push a child block; the current block resumes when the child is done.
    Nested(BoxBlock),
    /// Tail-replace this block with another without growing the stack.
    ///
    /// The replaced block is dropped. Mutual replacement encodes recursive
    /// state machines in constant stack depth.
    Become(BoxBlock),
    /// The block has finished.
    Done,
}

impl Step {
    /// Returns true if the step is [`Step::Pause`].
    #[must_use]
    pub const fn is_pause(&self) -> bool {
        matches!(self, Self::Pause)
    }

    /// Returns true if the step is [`Step::Done`].
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pause => f.write_str("Pause"),
            Self::Nested(_) => f.write_str("Nested(..)"),
            Self::Become(_) => f.write_str("Become(..)"),
            Self::Done => f.write_str("Done"),
        }
    }
}

struct FnBlock<F>(F);

impl<F> Block for FnBlock<F>
where
    F: FnMut(TickCx) -> Result<Step>,
{
    fn advance(&mut self, cx: TickCx) -> Result<Step> {
        (self.0)(cx)
    }
}

/// Builds a block from a closure called once per advance.
///
/// Multi-phase blocks thread their own phase state through the closure:
///
/// ```
/// use tickflow::{from_fn, Coroutine, Resumable, Step};
///
/// let mut phase = 0;
/// let mut co = Coroutine::new(from_fn(move |_cx| {
///     phase += 1;
///     Ok(if phase < 3 { Step::Pause } else { Step::Done })
/// }));
/// co.tick(0.0).unwrap();
/// assert!(!co.finished());
/// ```
pub fn from_fn<F>(f: F) -> BoxBlock
where
    F: FnMut(TickCx) -> Result<Step> + 'static,
{
    Box::new(FnBlock(f))
}

struct DoneBlock;

impl Block for DoneBlock {
    fn advance(&mut self, _cx: TickCx) -> Result<Step> {
        Ok(Step::Done)
    }
}

/// A block that finishes on its first advance without pausing.
#[must_use]
pub fn done() -> BoxBlock {
    Box::new(DoneBlock)
}

struct FailBlock(Option<Error>);

impl Block for FailBlock {
    fn advance(&mut self, _cx: TickCx) -> Result<Step> {
        match self.0.take() {
            Some(err) => Err(err),
            None => Ok(Step::Done),
        }
    }
}

/// A block that raises `error` on its first advance.
#[must_use]
pub fn fail(error: Error) -> BoxBlock {
    Box::new(FailBlock(Some(error)))
}
