//! RAII guards that hand the delivery envelope to the background-task registrar.
//!
//! Both guards run their release logic exactly once: explicitly, or from `Drop` when the
//! future that owns them is cancelled.

use std::sync::Arc;

use crate::context::{BackgroundTasks, IncomingRequest};
use crate::interface::WorkerInterface;

/// Queues `incoming`'s drain (plus the optional GC pass) on `tasks`.
fn register_drain(incoming: IncomingRequest, tasks: &BackgroundTasks, gc_pass: bool) {
    let context = Arc::clone(incoming.context());
    tasks.add(async move {
        incoming.drain().await;
        if gc_pass {
            context.request_gc_for_testing();
        }
    });
}

/// Detaches a request from its execution context.
///
/// On release the fail-open decision is captured (only if the context asked for it at that
/// instant) and the envelope's drain is registered.
pub(super) struct Detach {
    incoming: Option<IncomingRequest>,
    tasks: BackgroundTasks,
    cf_blob_json: Option<String>,
    gc_pass: bool,
}

impl Detach {
    pub(super) fn new(
        incoming: IncomingRequest,
        tasks: BackgroundTasks,
        cf_blob_json: Option<String>,
        gc_pass: bool,
    ) -> Self {
        Self {
            incoming: Some(incoming),
            tasks,
            cf_blob_json,
            gc_pass,
        }
    }

    /// Releases the envelope and returns the fail-open service, if one was chosen.
    pub(super) fn finish(mut self) -> Option<Arc<dyn WorkerInterface>> {
        self.release()
    }

    fn release(&mut self) -> Option<Arc<dyn WorkerInterface>> {
        let incoming = self.incoming.take()?;
        let context = incoming.context();
        let fail_open = if context.is_fail_open() {
            context.fail_open_service(self.cf_blob_json.take())
        } else {
            None
        };
        register_drain(incoming, &self.tasks, self.gc_pass);
        fail_open
    }
}

impl Drop for Detach {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

/// Registers the envelope's drain when dropped, whatever the alarm's outcome.
pub(super) struct DrainOnDrop {
    incoming: Option<IncomingRequest>,
    tasks: BackgroundTasks,
}

impl DrainOnDrop {
    pub(super) fn new(incoming: IncomingRequest, tasks: BackgroundTasks) -> Self {
        Self {
            incoming: Some(incoming),
            tasks,
        }
    }
}

impl Drop for DrainOnDrop {
    fn drop(&mut self) {
        if let Some(incoming) = self.incoming.take() {
            register_drain(incoming, &self.tasks, false);
        }
    }
}
