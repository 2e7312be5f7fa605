//! # Timing decorator for [`WorkerInterface`].
//!
//! [`MeteredInterface`] wraps an interface and publishes `DispatchStarting` before and
//! `DispatchFinished` after every operation, with the operation's outcome label and duration.
//! It forwards calls unchanged, including the single-use panics of the inner entrypoint.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use async_trait::async_trait;
use http::HeaderMap;

use crate::error::Exception;
use crate::events::{Bus, Event, EventKind};
use crate::http::{HttpRequest, Response};
use crate::interface::{
    AlarmResult, CustomEvent, CustomEventResult, ScheduledResult, WorkerInterface,
};

/// [`WorkerInterface`] decorator publishing dispatch timings.
pub struct MeteredInterface {
    inner: Arc<dyn WorkerInterface>,
    bus: Bus,
    entrypoint: Option<Arc<str>>,
}

impl MeteredInterface {
    pub fn new(inner: Arc<dyn WorkerInterface>, bus: Bus, entrypoint: Option<Arc<str>>) -> Self {
        Self {
            inner,
            bus,
            entrypoint,
        }
    }

    fn starting(&self, dispatch: &'static str) -> Instant {
        self.start(Event::new(EventKind::DispatchStarting).with_dispatch(dispatch))
    }

    fn start(&self, event: Event) -> Instant {
        self.bus
            .publish(event.with_entrypoint_opt(self.entrypoint.as_ref()));
        Instant::now()
    }

    fn finished(&self, dispatch: &'static str, started: Instant, outcome: &str) {
        self.bus.publish(
            Event::new(EventKind::DispatchFinished)
                .with_dispatch(dispatch)
                .with_entrypoint_opt(self.entrypoint.as_ref())
                .with_outcome(outcome)
                .with_duration(started.elapsed()),
        );
    }

    fn record<T>(
        &self,
        dispatch: &'static str,
        started: Instant,
        result: &Result<T, Exception>,
        label: impl FnOnce(&T) -> &'static str,
    ) {
        let outcome = match result {
            Ok(value) => label(value),
            Err(e) => e.as_label(),
        };
        self.finished(dispatch, started, outcome);
    }
}

#[async_trait]
impl WorkerInterface for MeteredInterface {
    async fn request(
        &self,
        request: HttpRequest,
        response: Arc<dyn Response>,
    ) -> Result<(), Exception> {
        let started = self.starting("request");
        let result = self.inner.request(request, response).await;
        self.record("request", started, &result, |_| "ok");
        result
    }

    async fn connect(&self, host: &str, headers: &HeaderMap) -> Result<(), Exception> {
        let started = self.starting("connect");
        let result = self.inner.connect(host, headers).await;
        self.record("connect", started, &result, |_| "ok");
        result
    }

    fn prewarm(&self, url: &str) {
        let started = self.starting("prewarm");
        self.inner.prewarm(url);
        self.finished("prewarm", started, "ok");
    }

    async fn run_scheduled(
        &self,
        scheduled_time: SystemTime,
        cron: &str,
    ) -> Result<ScheduledResult, Exception> {
        let started = self.starting("scheduled");
        let result = self.inner.run_scheduled(scheduled_time, cron).await;
        self.record("scheduled", started, &result, |r| r.outcome.as_label());
        result
    }

    async fn run_alarm(&self, scheduled_time: SystemTime) -> Result<AlarmResult, Exception> {
        let started = self.starting("alarm");
        let result = self.inner.run_alarm(scheduled_time).await;
        self.record("alarm", started, &result, |r| r.outcome.as_label());
        result
    }

    async fn test(&self) -> Result<bool, Exception> {
        let started = self.starting("test");
        let result = self.inner.test().await;
        self.record("test", started, &result, |passed| {
            if *passed { "ok" } else { "exception" }
        });
        result
    }

    async fn custom_event(
        &self,
        event: Box<dyn CustomEvent>,
    ) -> Result<CustomEventResult, Exception> {
        let started = self.start(
            Event::new(EventKind::DispatchStarting)
                .with_dispatch("custom")
                .with_event_type(event.event_type()),
        );
        let result = self.inner.custom_event(event).await;
        self.record("custom", started, &result, |r| r.outcome.as_label());
        result
    }
}
