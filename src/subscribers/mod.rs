//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and the
//! [`Telemetry`] wiring that connects them to the [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! BusObserver / MeteredInterface ── publish(Event) ──► Bus
//!                                                        │
//!                                              Telemetry listener
//!                                                        │
//!                                                 SubscriberSet::emit_arc
//!                                              ┌─────────┼─────────┐
//!                                              ▼         ▼         ▼
//!                                          LogWriter  Metrics   Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod subscribe;
mod subscriber_set;
mod telemetry;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
pub use telemetry::Telemetry;
