//! # eventvisor
//!
//! **Eventvisor** is the per-event execution core of a sandboxed serverless runtime.
//!
//! One [`Entrypoint`] is built per inbound event. It consumes a single-use delivery envelope,
//! runs the program's handler inside an execution context, maps failures to what the caller
//! may see (fail-open fallback, synthesized 5xx, sanitized tunneling) and hands the envelope's
//! drain to background work that outlives the caller.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!        caller (HTTP front end, cron, alarm manager, test harness)
//!                               │
//!                               ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  MeteredInterface (RequestObserver::wrap_interface)               │
//! │  - DispatchStarting / DispatchFinished events                     │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Entrypoint (WorkerInterface)                                     │
//! │  - IncomingRequest (single-use envelope)                          │
//! │  - fail-open tree (classify + decide)                             │
//! │  - AlarmCoordinator (per actor, de-duplicates alarms)             │
//! │  - BackgroundTasks (drains registered from every exit path)       │
//! └──────┬──────────────────────────┬─────────────────────────┬───────┘
//!        ▼                          ▼                         ▼
//!  ExecutionContext::run      RequestObserver            WorkerTracer
//!  (program under lock)       (BusObserver)              (EventInfo)
//!                                   │
//!                                   ▼
//!                     Bus ──► Telemetry listener ──► SubscriberSet
//!                                                  ┌───────┼───────┐
//!                                                  ▼       ▼       ▼
//!                                              LogWriter  sub2    subN
//! ```
//!
//! ### Request lifecycle
//! ```text
//! request(req, sink)
//!   ├─► take envelope (second call panics) ─► delivered()
//!   ├─► trace Fetch{method, url, cf_json, canonical headers}
//!   ├─► run(handler) raced against on_abort
//!   │       └─ Err ─► log once, wait for output locks
//!   ├─► detach: capture fail-open service (if chosen), register drain
//!   ├─► await proxy_task
//!   └─ Err ─► classify ─► decide
//!              ├─ Propagate    ─► sanitized exception to the caller
//!              ├─ FailOpen     ─► replay request against the next stage
//!              ├─ Synthesize   ─► empty 500 / 503
//!              └─ Drop         ─► response already started, report only
//! ```
//!
//! ## Features
//! | Area              | Description                                                      | Key types / traits                          |
//! |-------------------|------------------------------------------------------------------|---------------------------------------------|
//! | **Dispatch**      | One operation per event kind, single-use per entrypoint.         | [`WorkerInterface`], [`Entrypoint`]         |
//! | **Context**       | What the entrypoint needs from the runtime around it.            | [`ExecutionContext`], [`IncomingRequest`]   |
//! | **Failures**      | Classification, sanitization and the fail-open decision tree.    | [`Exception`], [`classify`], [`fail_open`]  |
//! | **Actors**        | Alarm de-duplication and context reuse.                          | [`Actor`], [`AlarmCoordinator`]             |
//! | **Observability** | Metrics contract, dispatch events and subscribers.               | [`RequestObserver`], [`Subscribe`]          |
//! | **Configuration** | Per-entrypoint and telemetry settings.                           | [`EntrypointConfig`], [`TelemetryConfig`]   |
//!
//! ## Optional features
//! - `logging`: exports the built-in [`LogWriter`] subscriber (enabled by default).
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use eventvisor::{EventKind, Subscribe, Telemetry, TelemetryConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(eventvisor::LogWriter)];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn Subscribe>> = Vec::new();
//!
//!     let telemetry = Telemetry::new(&TelemetryConfig::default(), subs);
//!     let mut rx = telemetry.bus().subscribe();
//!
//!     // One observer per event; hand it to `Entrypoint::construct`.
//!     let observer = telemetry.observer(Some("api".into()));
//!     observer.delivered();
//!
//!     let ev = rx.recv().await.unwrap();
//!     assert_eq!(ev.kind, EventKind::Delivered);
//!     assert_eq!(ev.entrypoint.as_deref(), Some("api"));
//!
//!     telemetry.shutdown().await;
//! }
//! ```

mod actor;
pub mod classify;
mod config;
mod context;
mod entrypoint;
mod error;
mod events;
pub mod fail_open;
mod http;
mod interface;
mod observers;
mod subscribers;
mod trace;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use actor::{
    Actor, ActorId, AlarmCoordinator, AlarmFulfiller, AlarmOutcome, AlarmWaiter, ScheduledAlarm,
};
pub use config::{EntrypointConfig, TelemetryConfig};
pub use context::{
    BackgroundTasks, ExecutionContext, ExportedHandler, GlobalScope, IncomingRequest, LockedFn,
    UncaughtExceptionSource, WorkerLock,
};
pub use entrypoint::Entrypoint;
pub use error::{Exception, ExceptionKind};
pub use events::{Bus, Event, EventKind};
pub use self::http::{
    BodyWriter, HttpRequest, Response, ResponseSentTracker, TraceHeader, WebSocketStream,
    canonicalize_headers,
};
pub use interface::{
    AlarmResult, CustomEvent, CustomEventResult, DeferredProxy, EventOutcome, ScheduledResult,
    WorkerInterface,
};
pub use observers::{BusObserver, MeteredInterface, RequestObserver};
pub use subscribers::{Subscribe, SubscriberSet, Telemetry};
pub use trace::{EventInfo, FetchEventInfo, WorkerTracer};

// Optional: expose the built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
