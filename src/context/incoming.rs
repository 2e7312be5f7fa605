//! # Single-use delivery envelope.
//!
//! [`IncomingRequest`] is the token for "one event has arrived". It carries the execution
//! context the event runs in, the metrics observer and an optional trace recorder.
//!
//! ## Lifecycle
//! ```text
//! new() ──► delivered() ──► run handler ──► drain() / finish_scheduled()
//!   │                                            │
//!   └────────── dropped unused (prewarm) ────────┘ envelope consumed
//! ```
//!
//! ## Rules
//! - `drain` and `finish_scheduled` consume the envelope; ownership moves into the returned
//!   future, which the caller usually hands to [`BackgroundTasks`](super::BackgroundTasks).
//! - `delivered` reports to the observer at most once.

use std::fmt;
use std::sync::Arc;

use super::ExecutionContext;
use crate::observers::RequestObserver;
use crate::trace::WorkerTracer;

/// Delivery envelope for one event.
pub struct IncomingRequest {
    context: Arc<dyn ExecutionContext>,
    metrics: Arc<dyn RequestObserver>,
    tracer: Option<Arc<dyn WorkerTracer>>,
    delivered: bool,
}

impl IncomingRequest {
    /// Creates an envelope around `context`.
    pub fn new(
        context: Arc<dyn ExecutionContext>,
        metrics: Arc<dyn RequestObserver>,
        tracer: Option<Arc<dyn WorkerTracer>>,
    ) -> Self {
        Self {
            context,
            metrics,
            tracer,
            delivered: false,
        }
    }

    /// Execution context the event runs in.
    pub fn context(&self) -> &Arc<dyn ExecutionContext> {
        &self.context
    }

    /// Metrics observer for this event.
    pub fn metrics(&self) -> &Arc<dyn RequestObserver> {
        &self.metrics
    }

    /// Trace recorder, when tracing is enabled for this event.
    pub fn tracer(&self) -> Option<&Arc<dyn WorkerTracer>> {
        self.tracer.as_ref()
    }

    /// Marks the event as handed to the program.
    pub fn delivered(&mut self) {
        if !self.delivered {
            self.delivered = true;
            self.metrics.delivered();
        }
    }

    /// Returns `true` once [`delivered`](Self::delivered) has been called.
    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    /// Waits for the context's background tasks, consuming the envelope.
    pub async fn drain(self) {
        self.context.drain().await;
    }

    /// Waits for a scheduled/test event to finish, consuming the envelope.
    ///
    /// Returns `false` if the context's limits cut the event short.
    pub async fn finish_scheduled(self) -> bool {
        self.context.finish_scheduled().await
    }
}

impl fmt::Debug for IncomingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingRequest")
            .field("delivered", &self.delivered)
            .field("traced", &self.tracer.is_some())
            .finish_non_exhaustive()
    }
}
