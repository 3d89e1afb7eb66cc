//! The executor: a collection of resumables advanced together each tick.
//!
//! Members are owned and keyed by a [`MemberId`] assigned at registration.
//! Each `resume` advances members in reverse insertion order and then
//! sweeps out the finished ones, preserving the relative order of the
//! survivors. Reverse iteration is the discipline that lets a member
//! finish during its own advance without disturbing the indices of
//! not-yet-advanced peers.
//!
//! The executor does not own members in the lifecycle sense: removal hands
//! the member back, and a caller that wants disposal on termination either
//! drops the returned member or drives the executor through a task
//! combinator that owns it.

use crate::cx::TickCx;
use crate::error::Result;
use crate::resumable::Resumable;
use core::fmt;
use tracing::debug;

/// Identity handle for a registered executor member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// A resumable multiplexing a set of member resumables.
#[derive(Default)]
pub struct Executor {
    members: Vec<(MemberId, Box<dyn Resumable>)>,
    next_id: u64,
}

impl Executor {
    /// Creates an empty executor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `member` and returns its identity handle.
    pub fn add<R: Resumable + 'static>(&mut self, member: R) -> MemberId {
        let id = MemberId(self.next_id);
        self.next_id += 1;
        self.members.push((id, Box::new(member)));
        debug!(member = %id, count = self.members.len(), "executor member added");
        id
    }

    /// Deregisters the member with `id`, handing it back if present.
    ///
    /// The member comes back live, not disposed: the caller decides
    /// whether to keep driving it, dispose it, or drop it (which
    /// disposes). Discarding without handing back goes through
    /// [`Executor::clear`] or [`Resumable::dispose`], both of which
    /// dispose the members they discard.
    pub fn remove(&mut self, id: MemberId) -> Option<Box<dyn Resumable>> {
        let idx = self.members.iter().position(|(mid, _)| *mid == id)?;
        let (_, member) = self.members.remove(idx);
        debug!(member = %id, count = self.members.len(), "executor member removed");
        Some(member)
    }

    /// Disposes and discards every member.
    pub fn clear(&mut self) {
        debug!(count = self.members.len(), "executor cleared");
        self.dispose_members();
    }

    /// Returns true if a member with `id` is registered.
    #[must_use]
    pub fn contains(&self, id: MemberId) -> bool {
        self.members.iter().any(|(mid, _)| *mid == id)
    }

    /// Returns the number of registered members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if no members are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterates member ids in insertion order.
    pub fn member_ids(&self) -> impl Iterator<Item = MemberId> + '_ {
        self.members.iter().map(|(id, _)| *id)
    }

    fn sweep_finished(&mut self) {
        self.members.retain(|(id, member)| {
            let keep = !member.finished();
            if !keep {
                debug!(member = %id, "executor member finished");
            }
            keep
        });
    }

    /// Disposes members newest-first, mirroring the coroutine's LIFO
    /// frame teardown.
    fn dispose_members(&mut self) {
        while let Some((_, mut member)) = self.members.pop() {
            member.dispose();
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.dispose_members();
    }
}

impl Resumable for Executor {
    fn finished(&self) -> bool {
        self.members.is_empty()
    }

    fn dispose(&mut self) {
        if !self.members.is_empty() {
            debug!(count = self.members.len(), "executor disposed");
            self.dispose_members();
        }
    }

    fn resume(&mut self, cx: TickCx) -> Result<()> {
        let mut outcome = Ok(());
        for idx in (0..self.members.len()).rev() {
            let (_, member) = &mut self.members[idx];
            if member.finished() {
                continue;
            }
            if let Err(err) = member.resume(cx) {
                outcome = Err(err);
                break;
            }
        }
        // Finished entries leave after the pass, survivors keep their order,
        // even when a member's error cut the pass short.
        self.sweep_finished();
        outcome
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("members", &self.members.len())
            .finish()
    }
}
