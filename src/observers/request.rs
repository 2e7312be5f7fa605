//! # Metrics contract for one event.
//!
//! The entrypoint reports lifecycle milestones through [`RequestObserver`]. All methods have
//! no-op defaults so sinks only implement what they record.

use std::sync::Arc;

use crate::error::Exception;
use crate::interface::WorkerInterface;

/// Observability handle carried by the delivery envelope.
pub trait RequestObserver: Send + Sync {
    /// The event was handed to the program.
    fn delivered(&self) {}

    /// The event is a prewarm; no handler will run.
    fn set_is_prewarm(&self) {}

    /// The event failed in a way the caller will notice.
    fn report_failure(&self, _exception: &Exception) {}

    /// The request fell back to the origin (`true`), or that fallback failed (`false`).
    fn set_failed_open(&self, _value: bool) {}

    /// Decorates the entrypoint before it is handed to the caller.
    fn wrap_interface(&self, interface: Arc<dyn WorkerInterface>) -> Arc<dyn WorkerInterface> {
        interface
    }
}
