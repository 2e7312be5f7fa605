//! # Entrypoint: dispatches one event into the program.
//!
//! [`Entrypoint`] implements [`WorkerInterface`] on top of a single-use [`IncomingRequest`].
//! Whatever operation is called first consumes the envelope; any later call is a usage
//! violation and panics.
//!
//! ## Per-operation flow
//! ```text
//! request ──► delivered ─► trace Fetch ─► run(handler) ⨯ on_abort ─► Detach ─► proxy_task
//!                                              └─ Err ─► log, output gate ─┘       └─ Err ─► fail-open tree
//! connect ──► consume ─► TypeError
//! prewarm ──► consume ─► set_is_prewarm          (no delivered, no program code)
//! run_scheduled ──► delivered ─► trace ─► add_wait_until(start_scheduled) ─► finish_scheduled
//! run_alarm ──► get_alarm? ─► delivered ─► trace ─► schedule_alarm ─► run(handler) ─► DrainOnDrop
//! test ──► delivered ─► add_wait_until(test) ─► finish_scheduled
//! custom_event ──► event.run(envelope, entrypoint_name)
//! ```
//!
//! ## Rules
//! - The envelope's drain is registered with [`BackgroundTasks`] on every exit path, including
//!   when the caller drops the returned future.
//! - Failures of `request` go through the [fail-open tree](crate::fail_open); other operations
//!   return their errors as-is.
//! - With `predictable_mode_for_test` (debug builds only) a GC pass follows each operation.

mod alarm;
mod guards;
mod request;
mod scheduled;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use async_trait::async_trait;
use http::HeaderMap;

use crate::actor::Actor;
use crate::config::EntrypointConfig;
use crate::context::{BackgroundTasks, ExecutionContext, IncomingRequest};
use crate::error::Exception;
use crate::http::{HttpRequest, Response};
use crate::interface::{
    AlarmResult, CustomEvent, CustomEventResult, ScheduledResult, WorkerInterface,
};
use crate::observers::RequestObserver;
use crate::trace::WorkerTracer;

/// Per-event entrypoint.
pub struct Entrypoint {
    incoming: Mutex<Option<IncomingRequest>>,
    wait_until_tasks: BackgroundTasks,
    config: EntrypointConfig,
}

impl Entrypoint {
    /// Creates an entrypoint around an existing envelope.
    pub fn new(
        config: EntrypointConfig,
        incoming: IncomingRequest,
        wait_until_tasks: BackgroundTasks,
    ) -> Self {
        Self {
            incoming: Mutex::new(Some(incoming)),
            wait_until_tasks,
            config,
        }
    }

    /// Builds the envelope and returns the entrypoint decorated by `metrics`.
    ///
    /// An actor's cached execution context is reused; otherwise `new_context` creates one,
    /// and it is cached on the actor for the next event.
    pub fn construct<F>(
        config: EntrypointConfig,
        actor: Option<Arc<Actor>>,
        new_context: F,
        metrics: Arc<dyn RequestObserver>,
        wait_until_tasks: BackgroundTasks,
        tracer: Option<Arc<dyn WorkerTracer>>,
    ) -> Arc<dyn WorkerInterface>
    where
        F: FnOnce(Option<&Arc<Actor>>) -> Arc<dyn ExecutionContext>,
    {
        let context = match &actor {
            Some(actor) => match actor.io_context() {
                Some(cached) => cached,
                None => {
                    let created = new_context(Some(actor));
                    actor.set_io_context(Arc::clone(&created));
                    created
                }
            },
            None => new_context(None),
        };

        let incoming = IncomingRequest::new(context, Arc::clone(&metrics), tracer);
        let entrypoint = Arc::new(Self::new(config, incoming, wait_until_tasks));
        metrics.wrap_interface(entrypoint)
    }

    /// Moves the envelope out, panicking if an earlier operation already did.
    fn take_incoming(&self, op: &'static str) -> IncomingRequest {
        let taken = self
            .incoming
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some(incoming) => incoming,
            None => panic!("{op}() can only be called once"),
        }
    }

    /// Awaits `work`, then requests a GC pass when the test hook is enabled.
    async fn with_gc_pass<T>(
        &self,
        context: Arc<dyn ExecutionContext>,
        work: impl Future<Output = T>,
    ) -> T {
        let out = work.await;
        if self.config.gc_pass_enabled() {
            context.request_gc_for_testing();
        }
        out
    }
}

/// Resolves with `work`, or with the abort reason if the context is cancelled first.
async fn race_abort<T>(
    context: &dyn ExecutionContext,
    work: impl Future<Output = Result<T, Exception>>,
) -> Result<T, Exception> {
    tokio::select! {
        result = work => result,
        reason = context.on_abort() => Err(reason),
    }
}

#[async_trait]
impl WorkerInterface for Entrypoint {
    async fn request(
        &self,
        request: HttpRequest,
        response: Arc<dyn Response>,
    ) -> Result<(), Exception> {
        self.handle_request(request, response).await
    }

    async fn connect(&self, _host: &str, _headers: &HeaderMap) -> Result<(), Exception> {
        let _incoming = self.take_incoming("connect");
        Err(Exception::type_error(
            "Incoming CONNECT on a worker not supported",
        ))
    }

    fn prewarm(&self, _url: &str) {
        let incoming = self.take_incoming("prewarm");
        incoming.metrics().set_is_prewarm();
    }

    async fn run_scheduled(
        &self,
        scheduled_time: SystemTime,
        cron: &str,
    ) -> Result<ScheduledResult, Exception> {
        self.handle_scheduled(scheduled_time, cron).await
    }

    async fn run_alarm(&self, scheduled_time: SystemTime) -> Result<AlarmResult, Exception> {
        let incoming = self.take_incoming("run_alarm");
        let context = Arc::clone(incoming.context());
        self.with_gc_pass(context, self.handle_alarm(incoming, scheduled_time))
            .await
    }

    async fn test(&self) -> Result<bool, Exception> {
        self.handle_test().await
    }

    async fn custom_event(
        &self,
        event: Box<dyn CustomEvent>,
    ) -> Result<CustomEventResult, Exception> {
        let incoming = self.take_incoming("custom_event");
        // Held here so the GC hook has a context even if the event drops the envelope early.
        let context = Arc::clone(incoming.context());
        let name = self.config.entrypoint_name.clone();
        self.with_gc_pass(context, event.run(incoming, name)).await
    }
}
