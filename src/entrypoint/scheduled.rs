//! Cron and test paths.
//!
//! Both run the handler entirely as a background (`waitUntil`) task and then wait for the
//! context to report that the event finished. The caller only learns the aggregate outcome.

use std::sync::Arc;
use std::time::SystemTime;

use futures::future;
use tracing::Instrument;

use super::Entrypoint;
use crate::context::{ExecutionContext, IncomingRequest, UncaughtExceptionSource};
use crate::error::Exception;
use crate::interface::{EventOutcome, ScheduledResult};
use crate::trace::{EventInfo, epoch_millis};

impl Entrypoint {
    pub(super) async fn handle_scheduled(
        &self,
        scheduled_time: SystemTime,
        cron: &str,
    ) -> Result<ScheduledResult, Exception> {
        let mut incoming = self.take_incoming("run_scheduled");
        incoming.delivered();

        let context = Arc::clone(incoming.context());
        assert!(
            context.actor().is_none(),
            "run_scheduled() should never be called on an actor"
        );

        if let Some(tracer) = incoming.tracer() {
            tracer.set_event_info(
                context.now(),
                EventInfo::Scheduled {
                    scheduled_time_ms: epoch_millis(scheduled_time),
                    cron: cron.to_owned(),
                },
            );
        }

        let name = self.config.entrypoint_name.clone();
        let cron = cron.to_owned();
        let task_context = Arc::clone(&context);
        let span = tracing::info_span!("worker_entrypoint", event = "scheduled");
        context.add_wait_until(Box::pin(async move {
            let result = task_context
                .run(move |lock| {
                    let handler = lock.exported_handler(name.as_deref(), None);
                    let started = lock
                        .global_scope()
                        .start_scheduled(scheduled_time, &cron, handler);
                    Box::pin(future::ready(started))
                })
                .instrument(span)
                .await;
            log_task_failure(&*task_context, &result);
            result
        }));

        let outcome = self
            .with_gc_pass(Arc::clone(&context), finished_outcome(incoming))
            .await;
        Ok(ScheduledResult {
            retry: context.should_retry_scheduled(),
            outcome,
        })
    }

    pub(super) async fn handle_test(&self) -> Result<bool, Exception> {
        let mut incoming = self.take_incoming("test");
        incoming.delivered();

        let context = Arc::clone(incoming.context());
        let name = self.config.entrypoint_name.clone();
        let task_context = Arc::clone(&context);
        let span = tracing::info_span!("worker_entrypoint", event = "test");
        context.add_wait_until(Box::pin(async move {
            let result = task_context
                .run(move |lock| {
                    let handler = lock.exported_handler(name.as_deref(), None);
                    let scope = lock.global_scope();
                    Box::pin(async move { scope.test(handler).await })
                })
                .instrument(span)
                .await;
            log_task_failure(&*task_context, &result);
            result
        }));

        let outcome = self
            .with_gc_pass(context, finished_outcome(incoming))
            .await;
        Ok(outcome == EventOutcome::Ok)
    }
}

/// Handler failures in background tasks are reported like any other uncaught exception.
fn log_task_failure(context: &dyn ExecutionContext, result: &Result<(), Exception>) {
    if let Err(e) = result {
        context.log_uncaught_exception(UncaughtExceptionSource::AsyncTask, e);
    }
}

/// Waits for the event to finish and folds it into one outcome.
async fn finished_outcome(incoming: IncomingRequest) -> EventOutcome {
    let context = Arc::clone(incoming.context());
    if incoming.finish_scheduled().await {
        context.wait_until_status()
    } else {
        EventOutcome::ExceededCpu
    }
}
