//! # Exception classification and sanitization.
//!
//! Decides what an [`Exception`] means for the caller before it leaves the entrypoint.
//!
//! ## Verdicts
//! ```text
//! kind == Disconnected                 ─► Disconnected     (never logged as internal)
//! kind == Overloaded                   ─► Overloaded       (503 instead of 500)
//! description tunneled / do-not-log    ─► TunneledRemote   (single canonical "remote." prefix)
//! anything else                        ─► Internal         (description replaced, logged once)
//! ```
//!
//! ## Description conventions
//! - `remote exception: ` is prepended by the transport each time an error crosses a hop.
//! - `remote.` is the canonical marker for "came from another worker"; added at most once.
//! - `jsg.` marks an error with a user-visible type (tunneled, safe to show).
//! - `worker_do_not_log` marks an error that was already logged at its origin.
//!
//! ## Rules
//! - [`sanitize`] is idempotent: sanitizing twice yields the same description.
//! - The kind of an exception is never changed, only its description.

use crate::error::{Exception, ExceptionKind, JSG_PREFIX};

/// Prefix the transport adds when an exception crosses a remote hop.
pub const REMOTE_EXCEPTION_PREFIX: &str = "remote exception: ";
/// Canonical marker for an exception that originated in another worker.
pub const TUNNELED_PREFIX: &str = "remote.";
/// Marker for exceptions that were already logged where they originated.
pub const DO_NOT_LOG_MARKER: &str = "worker_do_not_log";
/// Description shown in place of an internal error.
pub const INTERNAL_ERROR_DESCRIPTION: &str =
    "worker_do_not_log; Request failed due to internal error";

/// Caller-facing meaning of an exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionVerdict {
    /// Unexpected failure; the cause must not leak to the caller.
    Internal,
    /// Originated in a nested call chain; carries the canonical description.
    TunneledRemote(String),
    /// Peer went away.
    Disconnected,
    /// Capacity or resource rejection.
    Overloaded,
}

impl ExceptionVerdict {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExceptionVerdict::Internal => "internal",
            ExceptionVerdict::TunneledRemote(_) => "tunneled_remote",
            ExceptionVerdict::Disconnected => "disconnected",
            ExceptionVerdict::Overloaded => "overloaded",
        }
    }
}

/// Strips every leading transport prefix (`remote exception: `).
pub fn strip_remote_exception_prefix(description: &str) -> &str {
    let mut rest = description;
    while let Some(stripped) = rest.strip_prefix(REMOTE_EXCEPTION_PREFIX) {
        rest = stripped;
    }
    rest
}

/// Returns `true` if the description carries a user-visible (tunneled) error type.
pub fn is_tunneled_exception(description: &str) -> bool {
    let mut rest = strip_remote_exception_prefix(description);
    while let Some(stripped) = rest.strip_prefix(TUNNELED_PREFIX) {
        rest = strip_remote_exception_prefix(stripped);
    }
    rest.starts_with(JSG_PREFIX)
}

/// Returns `true` if the exception was already logged where it originated.
pub fn is_do_not_log_exception(description: &str) -> bool {
    description.contains(DO_NOT_LOG_MARKER)
}

/// Returns `true` if the description must be hidden from the caller.
pub fn is_internal(description: &str) -> bool {
    !is_tunneled_exception(description) && !is_do_not_log_exception(description)
}

/// Returns the description with transport prefixes replaced by one `remote.` marker.
///
/// ```
/// use eventvisor::classify::annotate_remote;
///
/// let once = annotate_remote("remote exception: remote exception: jsg.Error: boom");
/// assert_eq!(once, "remote.jsg.Error: boom");
/// assert_eq!(annotate_remote(&once), once);
/// ```
pub fn annotate_remote(description: &str) -> String {
    let stripped = strip_remote_exception_prefix(description);
    if stripped.starts_with(TUNNELED_PREFIX) {
        stripped.to_string()
    } else {
        format!("{TUNNELED_PREFIX}{stripped}")
    }
}

/// Classifies an exception.
pub fn classify(exception: &Exception) -> ExceptionVerdict {
    match exception.kind() {
        ExceptionKind::Disconnected => ExceptionVerdict::Disconnected,
        ExceptionKind::Overloaded => ExceptionVerdict::Overloaded,
        _ if !is_internal(exception.description()) => {
            ExceptionVerdict::TunneledRemote(annotate_remote(exception.description()))
        }
        _ => ExceptionVerdict::Internal,
    }
}

/// Returns `true` if the exception deserves a local error log.
///
/// Disconnects and errors already logged elsewhere are only worth an `info` line.
pub fn should_log(exception: &Exception) -> bool {
    exception.kind() != ExceptionKind::Disconnected && is_internal(exception.description())
}

/// Converts an exception into the form that may be propagated to the caller.
///
/// Internal descriptions are replaced with [`INTERNAL_ERROR_DESCRIPTION`]; everything else is
/// re-prefixed with a single `remote.` marker. The kind is preserved.
pub fn sanitize(mut exception: Exception) -> Exception {
    let description = if is_internal(exception.description()) {
        INTERNAL_ERROR_DESCRIPTION.to_string()
    } else {
        annotate_remote(exception.description())
    };
    exception.set_description(description);
    exception
}
