//! Error types raised while dispatching an event.
//!
//! This module defines the single error currency of the crate:
//!
//! - [`Exception`] an error raised by the program, the execution context, or a collaborator.
//! - [`ExceptionKind`] the coarse transport-level classification carried by every exception.
//!
//! Exceptions are `Clone` because one alarm outcome may be observed by many attached callers.
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.
//!
//! Usage violations (dispatching twice on one entrypoint, alarms without an actor) are not
//! represented here: they are programming errors and panic at the call site.

use std::fmt;

use thiserror::Error;

/// Prefix the sandbox uses for errors that carry a user-visible JavaScript error type.
pub(crate) const JSG_PREFIX: &str = "jsg.";

/// # Coarse classification of an [`Exception`].
///
/// Mirrors how the transport layer reports failures; it decides logging and the
/// synthesized status code, never the description shown to the caller.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    /// Something went wrong. The default.
    Failed,
    /// The request was rejected because a resource or capacity limit was hit.
    Overloaded,
    /// The peer went away (client disconnect, broken pipe).
    Disconnected,
}

impl ExceptionKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExceptionKind::Failed => "failed",
            ExceptionKind::Overloaded => "overloaded",
            ExceptionKind::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// # Error raised while running an event.
///
/// The description follows the sandbox's prefix conventions (`jsg.`, `remote.`,
/// `worker_do_not_log`), which the [classifier](crate::classify) relies on.
///
/// # Example
/// ```
/// use eventvisor::{Exception, ExceptionKind};
///
/// let err = Exception::overloaded("too many concurrent requests");
/// assert_eq!(err.kind(), ExceptionKind::Overloaded);
/// assert_eq!(err.as_label(), "exception_overloaded");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {description}")]
pub struct Exception {
    kind: ExceptionKind,
    description: String,
}

impl Exception {
    /// Creates an exception of the given kind.
    pub fn new(kind: ExceptionKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    /// Creates a [`ExceptionKind::Failed`] exception.
    pub fn failed(description: impl Into<String>) -> Self {
        Self::new(ExceptionKind::Failed, description)
    }

    /// Creates a [`ExceptionKind::Overloaded`] exception.
    pub fn overloaded(description: impl Into<String>) -> Self {
        Self::new(ExceptionKind::Overloaded, description)
    }

    /// Creates a [`ExceptionKind::Disconnected`] exception.
    pub fn disconnected(description: impl Into<String>) -> Self {
        Self::new(ExceptionKind::Disconnected, description)
    }

    /// Creates a user-visible `TypeError`, tunneled to the caller as-is.
    ///
    /// ```
    /// use eventvisor::Exception;
    ///
    /// let err = Exception::type_error("bad input");
    /// assert_eq!(err.description(), "jsg.TypeError: bad input");
    /// ```
    pub fn type_error(message: impl fmt::Display) -> Self {
        Self::failed(format!("{JSG_PREFIX}TypeError: {message}"))
    }

    /// Returns the exception kind.
    pub fn kind(&self) -> ExceptionKind {
        self.kind
    }

    /// Returns the raw description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Replaces the description, keeping the kind.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self.kind {
            ExceptionKind::Failed => "exception_failed",
            ExceptionKind::Overloaded => "exception_overloaded",
            ExceptionKind::Disconnected => "exception_disconnected",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        format!("{}: {}", self.kind.as_label(), self.description)
    }
}
