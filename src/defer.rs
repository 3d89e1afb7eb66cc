//! Scoped cleanup: record release actions, run them LIFO on exit.
//!
//! A [`Defer`] collects cleanup thunks for a scope and runs them in
//! reverse registration order (last added, first run) when disposed, or
//! on drop, which covers every exit path including a coroutine being torn
//! down mid-flight. Thunks are plain closures; they run to completion and
//! cannot suspend.

use tracing::trace;

/// An ordered recorder of cleanup actions.
#[derive(Default)]
pub struct Defer {
    thunks: Vec<Box<dyn FnOnce()>>,
}

impl Defer {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cleanup thunk. Thunks run in LIFO order on dispose.
    pub fn add(&mut self, thunk: impl FnOnce() + 'static) {
        self.thunks.push(Box::new(thunk));
    }

    /// Returns the number of pending thunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.thunks.len()
    }

    /// Returns true if no thunks are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.thunks.is_empty()
    }

    /// Runs all pending thunks in LIFO order. Idempotent.
    pub fn dispose(&mut self) {
        if self.thunks.is_empty() {
            return;
        }
        trace!(thunks = self.thunks.len(), "running deferred cleanups");
        while let Some(thunk) = self.thunks.pop() {
            thunk();
        }
    }
}

impl Drop for Defer {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl core::fmt::Debug for Defer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Defer")
            .field("pending", &self.thunks.len())
            .finish()
    }
}
