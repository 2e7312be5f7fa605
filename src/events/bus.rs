//! # Event bus for broadcasting dispatch events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that lets every entrypoint's
//! observer publish without blocking the dispatch path.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                     Subscriber (one):
//!   BusObserver (per event) ──┐
//!   MeteredInterface        ──┼──► Bus ───► Telemetry listener ────► SubscriberSet
//!   SubscriberSet workers   ──┘  (broadcast chan)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active subscribers at send time.

use tokio::sync::broadcast;

use super::event::Event;
use crate::config::TelemetryConfig;

/// Broadcast channel for dispatch events.
///
/// Multiple publishers can publish concurrently; subscribers receive clones of each event.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately (send clones internally).
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    ///
    /// ### Notes
    /// - Capacity is **shared** across all receivers (not per-subscriber).
    /// - When receivers lag, they will observe `RecvError::Lagged`.
    /// - The minimum capacity is 1 (clamped).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Creates a bus sized by `cfg`.
    pub fn from_config(cfg: &TelemetryConfig) -> Self {
        Self::new(cfg.bus_capacity_clamped())
    }

    /// Returns `true` if at least one receiver is attached.
    ///
    /// Publishers use it to skip building events nobody will see.
    pub fn has_receivers(&self) -> bool {
        self.tx.receiver_count() > 0
    }

    /// Publishes an event to all active subscribers.
    ///
    /// - Takes ownership of the event; the broadcast channel clones it for each receiver.
    /// - If there are no receivers, the event is dropped (this function still returns immediately).
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    ///
    /// - Each call creates an **independent** receiver.
    /// - A receiver only gets events **sent after** it subscribes.
    /// - Slow receivers get `RecvError::Lagged(n)` and skip over missed items.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
