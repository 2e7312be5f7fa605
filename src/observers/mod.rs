//! Per-event observability.
//!
//! ## Contents
//! - [`RequestObserver`] narrow metrics contract the entrypoint reports to
//! - [`BusObserver`] implementation publishing dispatch [`Event`](crate::Event)s to the bus
//! - [`MeteredInterface`] interface decorator timing every dispatch operation
//!
//! ```text
//! Entrypoint ──► RequestObserver::delivered / report_failure / set_failed_open
//!                       │ (BusObserver)
//!                       ▼
//!                      Bus ──► Telemetry ──► SubscriberSet ──► LogWriter, ...
//! ```

mod bus_observer;
mod metered;
mod request;

pub use bus_observer::BusObserver;
pub use metered::MeteredInterface;
pub use request::RequestObserver;
