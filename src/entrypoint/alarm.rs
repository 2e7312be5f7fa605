//! # Alarm path.
//!
//! The actor's [`AlarmCoordinator`](crate::actor::AlarmCoordinator) decides whether this
//! call runs the alarm or waits for someone else's run:
//!
//! ```text
//! get_alarm(T) ── Some ─► await shared outcome          (no delivered, no drain)
//!      │ None
//!      ▼
//! delivered ─► trace Alarm ─► schedule_alarm(T)
//!                               ├─ Settled(outcome) ─► return it
//!                               └─ Fulfiller ─► run(handler) ⨯ on_abort ─► fulfill / log + reject
//!                                                └─ DrainOnDrop registers the drain on every exit
//! ```

use std::sync::Arc;
use std::time::SystemTime;

use tracing::Instrument;

use super::guards::DrainOnDrop;
use super::{Entrypoint, race_abort};
use crate::actor::ScheduledAlarm;
use crate::context::{IncomingRequest, UncaughtExceptionSource};
use crate::error::Exception;
use crate::interface::AlarmResult;
use crate::trace::EventInfo;

impl Entrypoint {
    pub(super) async fn handle_alarm(
        &self,
        mut incoming: IncomingRequest,
        scheduled_time: SystemTime,
    ) -> Result<AlarmResult, Exception> {
        let context = Arc::clone(incoming.context());
        let Some(actor) = context.actor() else {
            panic!("alarm() should only work with actors");
        };

        if let Some(waiter) = actor.get_alarm(scheduled_time) {
            return waiter.await;
        }

        incoming.delivered();
        if let Some(tracer) = incoming.tracer() {
            tracer.set_event_info(context.now(), EventInfo::Alarm { scheduled_time });
        }

        let fulfiller = match actor.schedule_alarm(scheduled_time).await {
            ScheduledAlarm::Fulfiller(fulfiller) => fulfiller,
            ScheduledAlarm::Settled(outcome) => return outcome,
        };
        // Declared after the fulfiller: on cancellation the drain is queued first, then the
        // fulfiller cancels every attached waiter.
        let _drain = DrainOnDrop::new(incoming, self.wait_until_tasks.clone());

        let name = self.config.entrypoint_name.clone();
        let handler_actor = Arc::clone(&actor);
        let span = tracing::info_span!("worker_entrypoint", event = "alarm");
        let run = context.run(move |lock| {
            let scope = lock.global_scope();
            let handler = lock.exported_handler(name.as_deref(), Some(&*handler_actor));
            Box::pin(async move { scope.run_alarm(scheduled_time, handler).await }.instrument(span))
        });

        match race_abort(&*context, run).await {
            Ok(result) => {
                fulfiller.fulfill(result);
                Ok(result)
            }
            Err(e) => {
                context.log_uncaught_exception(UncaughtExceptionSource::AlarmHandler, &e);
                fulfiller.reject(e.clone());
                Err(e)
            }
        }
    }
}
