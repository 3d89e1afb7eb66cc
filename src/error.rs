//! Error types and error-handling strategy for Tickflow.
//!
//! This module defines the crate-wide error type used by coroutines, tasks,
//! and combinators. Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - User errors raised inside task closures are captured into the owning
//!   task's slot, never smuggled through the step stream
//! - Group failures aggregate into a recursively flattenable container

use core::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === User code ===
    /// Error raised by a user-provided closure or block.
    User,
    /// A worker thread panicked while running user code.
    Panicked,

    // === Task protocol ===
    /// A block task's step producer finished without calling `accept` or
    /// `fail` on its completion sink.
    BlockIncomplete,
    /// A completion sink or source was settled twice.
    DoubleCompletion,
    /// A task's runner was requested after it had already been consumed.
    TaskAlreadyRun,

    // === Groups ===
    /// Every member of a first-completed group settled without a success.
    AllFailed,

    // === Internal ===
    /// Internal invariant violation (a bug in this crate).
    Internal,
}

impl ErrorKind {
    /// Returns a short human-readable description of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user error",
            Self::Panicked => "worker panicked",
            Self::BlockIncomplete => "block finished without settling its completion",
            Self::DoubleCompletion => "completion settled twice",
            Self::TaskAlreadyRun => "task runner already consumed",
            Self::AllFailed => "all group members failed",
            Self::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for Tickflow operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    /// Creates a user error carrying a message.
    #[must_use]
    pub fn user(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_context(message)
    }

    /// Creates a user error wrapping an existing error as its source.
    #[must_use]
    pub fn wrap(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(ErrorKind::User).with_source(source)
    }

    /// Creates a panic error from a worker's panic payload description.
    #[must_use]
    pub fn panicked(payload: impl Into<String>) -> Self {
        Self::new(ErrorKind::Panicked).with_context(payload)
    }

    /// Creates an aggregate error over the given member errors.
    ///
    /// The members must be non-empty; the aggregate is attached as the
    /// error source and recoverable through [`Error::as_aggregate`].
    #[must_use]
    pub fn aggregate(members: Vec<Error>) -> Self {
        Self::new(ErrorKind::AllFailed).with_source(AggregateError::new(members))
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_context(message)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the context message, if any.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Adds context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns true if this error carries an aggregate of member errors.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        self.as_aggregate().is_some()
    }

    /// Returns the aggregate container if this error carries one.
    #[must_use]
    pub fn as_aggregate(&self) -> Option<&AggregateError> {
        self.source
            .as_deref()
            .and_then(|s| s.downcast_ref::<AggregateError>())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(ctx) => write!(f, "{}: {ctx}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| &**s as &(dyn std::error::Error + 'static))
    }
}

/// A non-empty collection of member errors produced by a failed group.
///
/// Nested aggregates arise when groups compose (a first-completed group of
/// first-completed groups); [`AggregateError::flatten`] unwraps them
/// recursively into a flat list.
#[derive(Debug, Clone)]
pub struct AggregateError {
    inner: Vec<Error>,
}

impl AggregateError {
    /// Creates an aggregate over `inner`.
    ///
    /// `inner` must be non-empty.
    #[must_use]
    pub fn new(inner: Vec<Error>) -> Self {
        debug_assert!(!inner.is_empty(), "aggregate over zero errors");
        Self { inner }
    }

    /// Returns the member errors in input order.
    #[must_use]
    pub fn inner_errors(&self) -> &[Error] {
        &self.inner
    }

    /// Recursively unwraps nested aggregates into a flat error list.
    #[must_use]
    pub fn flatten(&self) -> Vec<Error> {
        let mut out = Vec::with_capacity(self.inner.len());
        for err in &self.inner {
            match err.as_aggregate() {
                Some(nested) => out.extend(nested.flatten()),
                None => out.push(err.clone()),
            }
        }
        out
    }

    /// Runs `predicate` over each flattened member error.
    ///
    /// Errors for which the predicate returns `false` are considered
    /// unhandled and returned as a new aggregate; `Ok(())` means every
    /// member was handled.
    pub fn handle(
        &self,
        mut predicate: impl FnMut(&Error) -> bool,
    ) -> std::result::Result<(), AggregateError> {
        let unhandled: Vec<Error> = self
            .flatten()
            .into_iter()
            .filter(|e| !predicate(e))
            .collect();
        if unhandled.is_empty() {
            Ok(())
        } else {
            Err(Self::new(unhandled))
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} member error(s)", self.inner.len())?;
        if let Some(first) = self.inner.first() {
            write!(f, "; first: {first}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// Result alias using the crate error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
