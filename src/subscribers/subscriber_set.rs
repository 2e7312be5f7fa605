//! # Fan-out of dispatch events to subscribers.
//!
//! [`SubscriberSet`] gives every subscriber its own bounded queue and worker so a slow or
//! panicking subscriber never stalls the entrypoint or its peers.
//!
//! ```text
//! emit(event)
//!     ├──► [queue 1] ──► worker 1 ──► sub1.on_event()   panic ─► SubscriberPanicked
//!     └──► [queue N] ──► worker N ──► subN.on_event()   full  ─► SubscriberOverflow
//! ```
//!
//! ## Rules
//! - **Per-subscriber FIFO**, no ordering across subscribers.
//! - **Non-blocking**: `emit_arc()` uses `try_send`.
//! - Overflow/panic reports go back to the bus; an overflow report that overflows is not re-reported.

use std::any::Any;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Subscribe;
use crate::events::{Bus, Event};

struct Lane {
    name: &'static str,
    queue: mpsc::Sender<Arc<Event>>,
}

/// Per-subscriber queues and workers.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

async fn drive(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let handled = std::panic::AssertUnwindSafe(sub.on_event(&ev))
            .catch_unwind()
            .await;
        if let Err(payload) = handled {
            bus.publish(Event::subscriber_panicked(sub.name(), panic_message(&*payload)));
        }
    }
}

impl SubscriberSet {
    /// Spawns one worker per subscriber on the current runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let (lanes, workers) = subs
            .into_iter()
            .map(|sub| {
                let (queue, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let lane = Lane {
                    name: sub.name(),
                    queue,
                };
                (lane, tokio::spawn(drive(sub, rx, bus.clone())))
            })
            .unzip();

        Self {
            lanes,
            workers,
            bus,
        }
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    /// Returns `true` if there are no subscribers.
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Queues an event for every subscriber without waiting.
    pub fn emit_arc(&self, event: Arc<Event>) {
        for lane in &self.lanes {
            let reason = match lane.queue.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !event.is_subscriber_overflow() {
                self.bus.publish(Event::subscriber_overflow(lane.name, reason));
            }
        }
    }

    /// Closes every queue and waits for the workers to drain them.
    pub async fn shutdown(self) {
        drop(self.lanes);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}
