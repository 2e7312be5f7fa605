//! # Bus-backed request observer.
//!
//! [`BusObserver`] turns the entrypoint's metrics calls into [`Event`]s on the [`Bus`], and
//! decorates the entrypoint with a [`MeteredInterface`] so every dispatch is timed.
//!
//! Events are only built when the bus has a receiver.

use std::sync::Arc;

use super::{MeteredInterface, RequestObserver};
use crate::error::Exception;
use crate::events::{Bus, Event, EventKind};
use crate::interface::WorkerInterface;

/// [`RequestObserver`] publishing to a [`Bus`].
#[derive(Clone, Debug)]
pub struct BusObserver {
    bus: Bus,
    entrypoint: Option<Arc<str>>,
}

impl BusObserver {
    /// Creates an observer publishing to `bus`.
    pub fn new(bus: Bus) -> Self {
        Self {
            bus,
            entrypoint: None,
        }
    }

    /// Tags every event with the entrypoint name.
    pub fn with_entrypoint(mut self, name: Option<Arc<str>>) -> Self {
        self.entrypoint = name;
        self
    }

    fn publish(&self, kind: EventKind, build: impl FnOnce(Event) -> Event) {
        if self.bus.has_receivers() {
            let ev = Event::new(kind).with_entrypoint_opt(self.entrypoint.as_ref());
            self.bus.publish(build(ev));
        }
    }
}

impl RequestObserver for BusObserver {
    fn delivered(&self) {
        self.publish(EventKind::Delivered, |ev| ev);
    }

    fn set_is_prewarm(&self) {
        self.publish(EventKind::Prewarm, |ev| ev);
    }

    fn report_failure(&self, exception: &Exception) {
        self.publish(EventKind::FailureReported, |ev| {
            ev.with_reason(exception.as_message())
        });
    }

    fn set_failed_open(&self, value: bool) {
        self.publish(EventKind::FailedOpen, |ev| ev.with_failed_open(value));
    }

    fn wrap_interface(&self, interface: Arc<dyn WorkerInterface>) -> Arc<dyn WorkerInterface> {
        Arc::new(MeteredInterface::new(
            interface,
            self.bus.clone(),
            self.entrypoint.clone(),
        ))
    }
}
