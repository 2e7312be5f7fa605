//! # Execution context contract.
//!
//! The execution context is external: it owns the isolate lock, background (`waitUntil`)
//! tasks, output gates and resource limits for one event or one actor's lifetime. The
//! entrypoint only consumes it through [`ExecutionContext`].
//!
//! ## Running program code
//! ```text
//! context.run(|lock| {                           ◄── exclusive, non-reentrant lock held
//!     let scope = lock.global_scope();
//!     let handler = lock.exported_handler(name, actor);
//!     Box::pin(async move { scope.request(..., handler).await })
//! })                                             ◄── resolves with the closure's output
//! ```
//!
//! The trait stays object-safe by taking a type-erased closure ([`LockedFn`]); the generic
//! [`run`](trait.ExecutionContext.html#method.run) wrapper carries the typed result out
//! through a oneshot channel.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::actor::{Actor, ActorId};
use crate::error::Exception;
use crate::http::{HttpRequest, Response};
use crate::interface::{AlarmResult, DeferredProxy, EventOutcome, WorkerInterface};

/// Closure run under the isolate lock.
pub type LockedFn = Box<dyn FnOnce(&dyn WorkerLock) -> BoxFuture<'static, ()> + Send>;

/// Where an uncaught exception surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UncaughtExceptionSource {
    RequestHandler,
    AlarmHandler,
    /// A background task, such as a cron or test handler.
    AsyncTask,
}

/// Handler exported by the program, resolved by entrypoint name and actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedHandler {
    /// Entrypoint name; `None` is the default export.
    pub entrypoint: Option<Arc<str>>,
    /// Actor the handler is bound to, if any.
    pub actor: Option<ActorId>,
}

/// View of the program available while the isolate lock is held.
pub trait WorkerLock: Send + Sync {
    /// Returns the program's global scope.
    fn global_scope(&self) -> Arc<dyn GlobalScope>;

    /// Resolves the exported handler for `name` (default export when `None`).
    fn exported_handler(&self, name: Option<&str>, actor: Option<&Actor>)
    -> Option<ExportedHandler>;
}

/// Event entry points of the program's global scope.
#[async_trait]
pub trait GlobalScope: Send + Sync {
    /// Invokes the fetch handler.
    async fn request(
        &self,
        request: HttpRequest,
        response: Arc<dyn Response>,
        cf_blob_json: Option<String>,
        handler: Option<ExportedHandler>,
    ) -> Result<DeferredProxy, Exception>;

    /// Starts the scheduled handler; its work continues as `waitUntil` tasks.
    fn start_scheduled(
        &self,
        scheduled_time: SystemTime,
        cron: &str,
        handler: Option<ExportedHandler>,
    ) -> Result<(), Exception>;

    /// Invokes the alarm handler.
    async fn run_alarm(
        &self,
        scheduled_time: SystemTime,
        handler: Option<ExportedHandler>,
    ) -> Result<AlarmResult, Exception>;

    /// Invokes the test handler and waits for the program's promise to settle.
    async fn test(&self, handler: Option<ExportedHandler>) -> Result<(), Exception>;
}

/// Bounded-lifetime context an event runs in.
#[async_trait]
pub trait ExecutionContext: Send + Sync + 'static {
    /// Runs `f` under the isolate lock and waits for the future it returns.
    async fn run_locked(&self, f: LockedFn) -> Result<(), Exception>;

    /// Resolves with the abort reason once the context is cancelled.
    async fn on_abort(&self) -> Exception;

    /// Current time as seen by the program.
    fn now(&self) -> SystemTime;

    /// Registers a background (`waitUntil`) task on this context.
    fn add_wait_until(&self, task: BoxFuture<'static, Result<(), Exception>>);

    /// Waits until buffered output effects are flushed.
    async fn wait_for_output_locks(&self) -> Result<(), Exception>;

    /// Whether the program asked to fall back to the origin on failure.
    fn is_fail_open(&self) -> bool;

    /// Actor this context belongs to, if any.
    fn actor(&self) -> Option<Arc<Actor>>;

    /// Channel to the next stage, used when failing open.
    fn fail_open_service(&self, cf_blob_json: Option<String>) -> Option<Arc<dyn WorkerInterface>>;

    /// Reports an exception to the program's console and the local log.
    fn log_uncaught_exception(&self, source: UncaughtExceptionSource, exception: &Exception);

    /// Waits for background tasks to finish, bounded by the context's limits.
    async fn drain(&self);

    /// Waits for a scheduled/test event to finish; `false` if limits cut it short.
    async fn finish_scheduled(&self) -> bool;

    /// Aggregate outcome of the background tasks.
    fn wait_until_status(&self) -> EventOutcome;

    /// Whether a scheduled event should be retried.
    fn should_retry_scheduled(&self) -> bool;

    /// Forces a garbage-collection pass on the program's runtime (test builds only).
    fn request_gc_for_testing(&self) {}
}

impl dyn ExecutionContext {
    /// Runs `f` under the isolate lock and returns its typed result.
    pub async fn run<T, F>(&self, f: F) -> Result<T, Exception>
    where
        T: Send + 'static,
        F: FnOnce(&dyn WorkerLock) -> BoxFuture<'static, Result<T, Exception>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.run_locked(Box::new(move |lock: &dyn WorkerLock| {
            let fut = f(lock);
            Box::pin(async move {
                let _ = tx.send(fut.await);
            }) as BoxFuture<'static, ()>
        }))
        .await?;

        rx.await.unwrap_or_else(|_| {
            Err(Exception::disconnected(
                "execution context dropped the locked closure before it completed",
            ))
        })
    }
}
