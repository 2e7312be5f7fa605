//! # Event interface implemented by the entrypoint.
//!
//! [`WorkerInterface`] has one operation per event kind. The entrypoint implements it once;
//! the fail-open service, the metrics decorator and custom events speak the same interface.
//!
//! ```text
//! request ─┐
//! connect ─┤
//! prewarm ─┤
//! run_scheduled ─┼──► WorkerInterface (Entrypoint / MeteredInterface / next stage)
//! run_alarm ─┤
//! test ─┤
//! custom_event ─┘
//! ```

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use futures::future::BoxFuture;
use http::HeaderMap;

use crate::context::IncomingRequest;
use crate::error::Exception;
use crate::http::{HttpRequest, Response};

/// Final status of an event, as reported to the caller and to metrics.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventOutcome {
    #[default]
    Unknown,
    Ok,
    Exception,
    ExceededCpu,
    ExceededMemory,
    KillSwitch,
    DaemonDown,
    ScriptNotFound,
    Canceled,
    LoadShed,
    ResponseStreamDisconnected,
}

impl EventOutcome {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventOutcome::Unknown => "unknown",
            EventOutcome::Ok => "ok",
            EventOutcome::Exception => "exception",
            EventOutcome::ExceededCpu => "exceeded_cpu",
            EventOutcome::ExceededMemory => "exceeded_memory",
            EventOutcome::KillSwitch => "kill_switch",
            EventOutcome::DaemonDown => "daemon_down",
            EventOutcome::ScriptNotFound => "script_not_found",
            EventOutcome::Canceled => "canceled",
            EventOutcome::LoadShed => "load_shed",
            EventOutcome::ResponseStreamDisconnected => "response_stream_disconnected",
        }
    }
}

/// Result of a cron trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledResult {
    /// Whether the trigger should be retried.
    pub retry: bool,
    pub outcome: EventOutcome,
}

/// Result of an actor alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmResult {
    /// Whether the alarm should be retried.
    pub retry: bool,
    pub outcome: EventOutcome,
}

impl AlarmResult {
    /// Successful alarm.
    pub fn ok() -> Self {
        Self {
            retry: false,
            outcome: EventOutcome::Ok,
        }
    }

    /// Alarm abandoned because the execution that owned it was cancelled.
    pub fn canceled() -> Self {
        Self {
            retry: false,
            outcome: EventOutcome::Canceled,
        }
    }
}

/// Result of a custom event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomEventResult {
    pub outcome: EventOutcome,
}

/// Continuation returned by a request handler whose response is still streaming.
///
/// The immediate part of the request is done; `proxy_task` keeps shuttling bytes and may run
/// after the execution context has been released.
pub struct DeferredProxy {
    pub proxy_task: BoxFuture<'static, Result<(), Exception>>,
}

impl DeferredProxy {
    /// Wraps a streaming continuation.
    pub fn new<F>(proxy_task: F) -> Self
    where
        F: Future<Output = Result<(), Exception>> + Send + 'static,
    {
        Self {
            proxy_task: Box::pin(proxy_task),
        }
    }

    /// A continuation with nothing left to do.
    pub fn ready() -> Self {
        Self::new(async { Ok(()) })
    }
}

/// An event type not built into the interface.
///
/// The entrypoint only manages the envelope; the event drives the program itself.
#[async_trait]
pub trait CustomEvent: Send {
    /// Numeric type tag of this event (for logs/metrics).
    fn event_type(&self) -> u16;

    /// Runs the event, consuming the delivery envelope.
    async fn run(
        self: Box<Self>,
        incoming: IncomingRequest,
        entrypoint_name: Option<Arc<str>>,
    ) -> Result<CustomEventResult, Exception>;
}

/// One operation per event kind.
///
/// Implementations backed by a single-use envelope panic when called a second time.
#[async_trait]
pub trait WorkerInterface: Send + Sync {
    /// Delivers an HTTP request; the response is written to `response`.
    async fn request(
        &self,
        request: HttpRequest,
        response: Arc<dyn Response>,
    ) -> Result<(), Exception>;

    /// Delivers an inbound CONNECT.
    async fn connect(&self, host: &str, headers: &HeaderMap) -> Result<(), Exception>;

    /// Signals that the program should be loaded; runs no program code.
    fn prewarm(&self, url: &str);

    /// Delivers a cron trigger.
    async fn run_scheduled(
        &self,
        scheduled_time: SystemTime,
        cron: &str,
    ) -> Result<ScheduledResult, Exception>;

    /// Delivers an actor alarm.
    async fn run_alarm(&self, scheduled_time: SystemTime) -> Result<AlarmResult, Exception>;

    /// Runs the program's test handler; `true` if it passed.
    async fn test(&self) -> Result<bool, Exception>;

    /// Delivers a custom event.
    async fn custom_event(
        &self,
        event: Box<dyn CustomEvent>,
    ) -> Result<CustomEventResult, Exception>;
}
