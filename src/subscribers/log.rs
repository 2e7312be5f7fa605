//! # Logging subscriber.
//!
//! [`LogWriter`] renders dispatch events through `tracing` under the `eventvisor` target.
//!
//! ## Output format
//! ```text
//! [delivered] entrypoint=api
//! [dispatch-finished] op=request outcome=ok duration_ms=12
//! [failure] reason="failed: jsg.TypeError: boom"
//! [failed-open] value=true
//! [subscriber-overflow] subscriber=metrics reason=full
//! ```

use async_trait::async_trait;

use super::Subscribe;
use crate::events::{Event, EventKind};

/// Subscriber writing events to `tracing`.
///
/// Enabled via the `logging` feature.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogWriter;

/// Formats one event as a single log line.
fn render(e: &Event) -> String {
    let entrypoint = e.entrypoint.as_deref().unwrap_or("default");
    let op = e.dispatch.unwrap_or("-");
    let reason = e.reason.as_deref().unwrap_or("");
    let subscriber = e.subscriber.unwrap_or("-");
    match e.kind {
        EventKind::Delivered => format!("[delivered] entrypoint={entrypoint}"),
        EventKind::Prewarm => format!("[prewarm] entrypoint={entrypoint}"),
        EventKind::DispatchStarting => match e.event_type {
            Some(t) => format!("[dispatch-starting] op={op} entrypoint={entrypoint} type={t}"),
            None => format!("[dispatch-starting] op={op} entrypoint={entrypoint}"),
        },
        EventKind::DispatchFinished => {
            let mut line = format!(
                "[dispatch-finished] op={op} outcome={}",
                e.outcome.as_deref().unwrap_or("unknown")
            );
            if let Some(ms) = e.duration_ms {
                line.push_str(&format!(" duration_ms={ms}"));
            }
            line
        }
        EventKind::FailureReported => format!("[failure] reason={reason:?}"),
        EventKind::FailedOpen => {
            format!("[failed-open] value={}", e.failed_open.unwrap_or(false))
        }
        EventKind::SubscriberOverflow => {
            format!("[subscriber-overflow] subscriber={subscriber} reason={reason}")
        }
        EventKind::SubscriberPanicked => {
            format!("[subscriber-panicked] subscriber={subscriber} reason={reason:?}")
        }
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let line = render(e);
        match e.kind {
            EventKind::Delivered | EventKind::Prewarm => {
                tracing::debug!(target: "eventvisor", "{line}");
            }
            EventKind::DispatchStarting => tracing::trace!(target: "eventvisor", "{line}"),
            EventKind::DispatchFinished => tracing::info!(target: "eventvisor", "{line}"),
            EventKind::FailureReported
            | EventKind::FailedOpen
            | EventKind::SubscriberOverflow => tracing::warn!(target: "eventvisor", "{line}"),
            EventKind::SubscriberPanicked => tracing::error!(target: "eventvisor", "{line}"),
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
