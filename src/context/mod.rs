//! Execution-context collaborators and the delivery envelope.
//!
//! This module groups everything the entrypoint consumes from the runtime around it:
//!
//! ## Contents
//! - [`ExecutionContext`] bounded-lifetime context owning background work and limits
//! - [`WorkerLock`], [`GlobalScope`], [`ExportedHandler`] what a closure sees under the lock
//! - [`IncomingRequest`] single-use delivery envelope for one event
//! - [`BackgroundTasks`] append-only registrar for work that outlives the caller's future
//!
//! ## Ownership
//! ```text
//! Entrypoint ──owns──► IncomingRequest ──Arc──► ExecutionContext ◄──Arc── Actor (reused)
//!                            │
//!                            └─ drain() ──► BackgroundTasks (ownership transfers)
//! ```

mod execution;
mod incoming;
mod tasks;

pub use execution::{
    ExecutionContext, ExportedHandler, GlobalScope, LockedFn, UncaughtExceptionSource, WorkerLock,
};
pub use incoming::IncomingRequest;
pub use tasks::BackgroundTasks;
