//! # Telemetry wiring: bus → listener → subscribers.
//!
//! [`Telemetry`] owns the [`Bus`], spawns the listener that forwards every event to a
//! [`SubscriberSet`], and hands out [`BusObserver`]s for new events.
//!
//! ## Shutdown
//! ```text
//! shutdown() ──► token.cancel() ──► listener drains the bus buffer ──► SubscriberSet::shutdown()
//!                                                                      (queues drained)
//! ```

use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Subscribe, SubscriberSet};
use crate::config::TelemetryConfig;
use crate::events::Bus;
use crate::observers::{BusObserver, RequestObserver};

/// Running telemetry pipeline.
pub struct Telemetry {
    bus: Bus,
    token: CancellationToken,
    listener: JoinHandle<()>,
}

impl Telemetry {
    /// Creates the bus and starts forwarding its events to `subs`.
    pub fn new(cfg: &TelemetryConfig, subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let bus = Bus::from_config(cfg);
        let set = SubscriberSet::new(subs, bus.clone());
        let token = CancellationToken::new();

        let mut rx = bus.subscribe();
        let stop = token.clone();
        let listener = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    received = rx.recv() => match received {
                        Ok(ev) => set.emit_arc(Arc::new(ev)),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(target: "eventvisor", skipped, "telemetry listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => break,
                }
            }
            // Events published before cancellation still go out.
            loop {
                match rx.try_recv() {
                    Ok(ev) => set.emit_arc(Arc::new(ev)),
                    Err(TryRecvError::Lagged(skipped)) => {
                        tracing::warn!(target: "eventvisor", skipped, "telemetry listener lagged");
                    }
                    Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                }
            }
            set.shutdown().await;
        });

        Self {
            bus,
            token,
            listener,
        }
    }

    /// The bus events are published to.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Creates an observer for one event.
    pub fn observer(&self, entrypoint: Option<Arc<str>>) -> Arc<dyn RequestObserver> {
        Arc::new(BusObserver::new(self.bus.clone()).with_entrypoint(entrypoint))
    }

    /// Stops the listener and waits for subscribers to drain their queues.
    ///
    /// Events published before this call are delivered first.
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.listener.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventKind};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Kinds(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Kinds {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().unwrap().push(ev.kind);
        }
    }

    #[tokio::test]
    async fn test_observer_events_reach_subscribers() {
        let kinds = Arc::new(Kinds::default());
        let telemetry = Telemetry::new(
            &TelemetryConfig::default(),
            vec![kinds.clone() as Arc<dyn Subscribe>],
        );

        let observer = telemetry.observer(Some("api".into()));
        observer.delivered();
        observer.set_failed_open(false);

        telemetry.shutdown().await;

        assert_eq!(
            *kinds.0.lock().unwrap(),
            vec![EventKind::Delivered, EventKind::FailedOpen]
        );
    }

    #[tokio::test]
    async fn test_shutdown_delivers_buffered_events() {
        for _ in 0..50 {
            let kinds = Arc::new(Kinds::default());
            let telemetry = Telemetry::new(
                &TelemetryConfig::default(),
                vec![kinds.clone() as Arc<dyn Subscribe>],
            );
            telemetry.observer(None).delivered();
            telemetry.shutdown().await;
            assert_eq!(*kinds.0.lock().unwrap(), vec![EventKind::Delivered]);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_delivers_buffered_events_across_threads() {
        for _ in 0..50 {
            let kinds = Arc::new(Kinds::default());
            let telemetry = Telemetry::new(
                &TelemetryConfig::default(),
                vec![kinds.clone() as Arc<dyn Subscribe>],
            );
            let observer = telemetry.observer(Some("api".into()));
            observer.delivered();
            observer.set_failed_open(true);
            telemetry.shutdown().await;
            assert_eq!(
                *kinds.0.lock().unwrap(),
                vec![EventKind::Delivered, EventKind::FailedOpen]
            );
        }
    }
}
