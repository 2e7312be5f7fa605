//! Dispatch events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to publish/subscribe to
//! events emitted while the entrypoint dispatches work to the program.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: [`BusObserver`](crate::BusObserver), [`MeteredInterface`](crate::MeteredInterface),
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the [`Telemetry`](crate::Telemetry) listener, which fans out to `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
