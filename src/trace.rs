//! Trace recorder contract.
//!
//! When a tracer is attached to the delivery envelope, the entrypoint records what kind of event
//! it is dispatching before entering the program.

use std::time::{SystemTime, UNIX_EPOCH};

use http::Method;

use crate::http::TraceHeader;

/// Per-event information recorded by a [`WorkerTracer`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventInfo {
    /// An HTTP request.
    Fetch(FetchEventInfo),
    /// A cron trigger.
    Scheduled {
        /// Scheduled time in milliseconds since the Unix epoch.
        scheduled_time_ms: f64,
        /// Cron expression that fired.
        cron: String,
    },
    /// An actor alarm.
    Alarm {
        /// Time the alarm was scheduled for.
        scheduled_time: SystemTime,
    },
}

/// Trace details of an HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchEventInfo {
    pub method: Method,
    pub url: String,
    /// JSON-encoded `cf` blob; empty when none was supplied.
    pub cf_json: String,
    /// Canonicalized headers.
    pub headers: Vec<TraceHeader>,
}

/// Recorder for per-event trace information.
pub trait WorkerTracer: Send + Sync {
    /// Records what event is being dispatched and when.
    fn set_event_info(&self, timestamp: SystemTime, info: EventInfo);
}

/// Milliseconds since the Unix epoch; times before the epoch are negative.
pub(crate) fn epoch_millis(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs_f64() * 1000.0,
        Err(before) => -(before.duration().as_secs_f64() * 1000.0),
    }
}
