//! # Subscriber trait
//!
//! `Subscribe` is the extension point for consuming dispatch [`Event`]s. Each subscriber is
//! driven by its own worker fed by a bounded queue owned by the
//! [`SubscriberSet`](crate::subscribers::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow (I/O, batching); they never block the entrypoint.
//! - Each subscriber declares its queue capacity via [`Subscribe::queue_capacity`]. When the
//!   queue is full, events for that subscriber are dropped and a `SubscriberOverflow` is published.
//!
//! ## Example (skeleton)
//! ```rust
//! // use eventvisor::{Event, EventKind, Subscribe};
//! //
//! // struct FailureCounter(std::sync::atomic::AtomicU64);
//! // #[async_trait::async_trait]
//! // impl Subscribe for FailureCounter {
//! //     async fn on_event(&self, ev: &Event) {
//! //         if ev.kind == EventKind::FailureReported {
//! //             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//! //         }
//! //     }
//! //     fn name(&self) -> &'static str { "failure-counter" }
//! // }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles a single event.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (for logs/metrics).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
