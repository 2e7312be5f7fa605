//! # Dispatch events emitted by the entrypoint and its observers.
//!
//! The [`EventKind`] enum classifies event types across two categories:
//! - **Dispatch events**: one event's path through the entrypoint (delivered, failure, fail-open)
//! - **Subscriber events**: problems inside the telemetry fan-out itself (panic, overflow)
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the dispatch kind,
//! the entrypoint name, reasons, outcomes and durations.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use eventvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::DispatchFinished)
//!     .with_dispatch("request")
//!     .with_entrypoint("api")
//!     .with_outcome("ok")
//!     .with_duration(Duration::from_millis(12));
//!
//! assert_eq!(ev.kind, EventKind::DispatchFinished);
//! assert_eq!(ev.entrypoint.as_deref(), Some("api"));
//! assert_eq!(ev.duration_ms, Some(12));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of dispatch events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Dispatch events ===
    /// An event was handed to the program.
    ///
    /// Sets:
    /// - `entrypoint`: entrypoint name (if not the default export)
    Delivered,

    /// The program was asked to load without running any handler.
    Prewarm,

    /// A failure was reported for the event.
    ///
    /// Sets:
    /// - `reason`: exception label and description
    FailureReported,

    /// The request fell back to the origin, or the fallback failed.
    ///
    /// Sets:
    /// - `failed_open`: `true` when the fallback started, `false` if it failed
    FailedOpen,

    /// A dispatch operation started on the interface.
    ///
    /// Sets:
    /// - `dispatch`: operation label (`request`, `alarm`, ...)
    /// - `event_type`: type tag, for custom events only
    DispatchStarting,

    /// A dispatch operation returned.
    ///
    /// Sets:
    /// - `dispatch`: operation label
    /// - `outcome`: outcome label, or the exception label on error
    /// - `duration_ms`: wall time of the operation
    DispatchFinished,
}

/// Dispatch event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Dispatch operation label.
    pub dispatch: Option<&'static str>,
    /// Entrypoint name, if not the default export.
    pub entrypoint: Option<Arc<str>>,
    /// Name of the subscriber, for subscriber events.
    pub subscriber: Option<&'static str>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Outcome label.
    pub outcome: Option<Arc<str>>,
    /// Operation duration in milliseconds (compact).
    pub duration_ms: Option<u32>,
    /// Fail-open state.
    pub failed_open: Option<bool>,
    /// Type tag of a custom event.
    pub event_type: Option<u16>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            dispatch: None,
            entrypoint: None,
            subscriber: None,
            reason: None,
            outcome: None,
            duration_ms: None,
            failed_open: None,
            event_type: None,
        }
    }

    /// Attaches a dispatch operation label.
    #[inline]
    pub fn with_dispatch(mut self, dispatch: &'static str) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Attaches an entrypoint name.
    #[inline]
    pub fn with_entrypoint(mut self, name: impl Into<Arc<str>>) -> Self {
        self.entrypoint = Some(name.into());
        self
    }

    /// Attaches the entrypoint name when there is one.
    #[inline]
    pub fn with_entrypoint_opt(mut self, name: Option<&Arc<str>>) -> Self {
        self.entrypoint = name.cloned();
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an outcome label.
    #[inline]
    pub fn with_outcome(mut self, outcome: impl Into<Arc<str>>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    /// Attaches a duration (stored as milliseconds).
    #[inline]
    pub fn with_duration(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.duration_ms = Some(ms);
        self
    }

    /// Attaches the fail-open state.
    #[inline]
    pub fn with_failed_open(mut self, value: bool) -> Self {
        self.failed_open = Some(value);
        self
    }

    /// Attaches the type tag of a custom event.
    #[inline]
    pub fn with_event_type(mut self, event_type: u16) -> Self {
        self.event_type = Some(event_type);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow).with_reason(reason);
        ev.subscriber = Some(subscriber);
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.subscriber = Some(subscriber);
        ev
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}
