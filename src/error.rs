//! Error types for the resumef runtime.
//!
//! Errors in this crate are never fatal to the process. They fall into two
//! groups:
//!
//! - **Local no-ops**: lost arbitration races (a waiter that was already
//!   resolved by another cause) are not errors at all; they simply report
//!   `false` to the caller.
//! - **Typed failures**: conditions reported to the awaiting computation,
//!   such as polling a future before it resolved or reading a zero-capacity
//!   channel before any writer registered.
//!
//! # Error Categories
//!
//! - **Future**: result slot misuse (`NotReady`, `AlreadyAcquired`) and
//!   completions dropped without a result
//! - **Channel**: full, closed, and read-before-write on rendezvous channels
//! - **Cancellation**: stop requests and cancelled timers
//! - **User**: exceptions captured by `set_exception` and re-raised verbatim

use core::fmt;
use std::sync::Arc;

use crate::types::{StateId, TaskId};

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Future results ===
    /// A future's result was queried before it was resolved.
    NotReady,
    /// A future's result was already moved out by an earlier query.
    AlreadyAcquired,
    /// The completion feeding a future was dropped without a result.
    CallbackDropped,

    // === Channels ===
    /// A zero-capacity channel was read before any writer registered.
    ReadBeforeWrite,
    /// The channel had no free slot.
    ChannelFull,
    /// The channel was closed.
    ChannelClosed,

    // === Cancellation ===
    /// A timer was stopped before it fired.
    TimerCanceled,
    /// The owning task was asked to stop.
    StopRequested,

    // === User ===
    /// Exception captured from user code.
    User,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NotReady | Self::AlreadyAcquired | Self::CallbackDropped => {
                ErrorCategory::Future
            }
            Self::ReadBeforeWrite | Self::ChannelFull | Self::ChannelClosed => {
                ErrorCategory::Channel
            }
            Self::TimerCanceled | Self::StopRequested => ErrorCategory::Cancellation,
            Self::User => ErrorCategory::User,
        }
    }

    /// Returns true if the caller may retry after the next suspension.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady | Self::ReadBeforeWrite | Self::ChannelFull)
    }

    const fn description(&self) -> &'static str {
        match self {
            Self::NotReady => "future result not ready",
            Self::AlreadyAcquired => "future result already acquired",
            Self::CallbackDropped => "completion dropped without a result",
            Self::ReadBeforeWrite => "read before any writer on zero-capacity channel",
            Self::ChannelFull => "channel full",
            Self::ChannelClosed => "channel closed",
            Self::TimerCanceled => "timer canceled",
            Self::StopRequested => "stop requested",
            Self::User => "user error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Future result slot misuse.
    Future,
    /// Channel ordering and lifecycle failures.
    Channel,
    /// Cancellation-related failures.
    Cancellation,
    /// User-originated errors.
    User,
}

/// Diagnostic context for an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// The state object where the error surfaced.
    pub state_id: Option<StateId>,
    /// The task owning that state, when known.
    pub task_id: Option<TaskId>,
}

/// The main error type for resumef operations.
///
/// Cloning is cheap: the optional source is reference counted, so a stored
/// exception can be re-raised without copying the underlying error.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    context: ErrorContext,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
            context: ErrorContext {
                state_id: None,
                task_id: None,
            },
        }
    }

    /// Wraps an arbitrary error raised by user code.
    #[must_use]
    pub fn user(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(ErrorKind::User).with_source(source)
    }

    /// Creates a not-ready error.
    #[must_use]
    pub const fn not_ready() -> Self {
        Self::new(ErrorKind::NotReady)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns true if this is the not-ready condition.
    #[must_use]
    pub const fn is_not_ready(&self) -> bool {
        matches!(self.kind, ErrorKind::NotReady)
    }

    /// Returns true if this error reports a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind.category(), ErrorCategory::Cancellation)
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Adds structured context to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: ErrorContext) -> Self {
        self.context = ctx;
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the error context.
    #[must_use]
    pub const fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Returns the wrapped source error, if any.
    #[must_use]
    pub fn source_ref(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// A specialized Result type for resumef operations.
pub type Result<T> = core::result::Result<T, Error>;
