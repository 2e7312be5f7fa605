//! # Example: alarms
//!
//! Demonstrates alarm de-duplication on one actor.
//!
//! Shows how to:
//! - Reuse an actor's cached [`ExecutionContext`] across entrypoints.
//! - Deliver the same alarm from several callers at once; the handler runs once and every
//!   caller observes its result.
//! - Schedule a later alarm while one is running; it runs after the current one.
//!
//! ## Flow
//! ```text
//! caller A ─ run_alarm(T1) ──► schedule_alarm ──► Fulfiller ──► handler(T1) ──► fulfill
//! caller B ─ run_alarm(T1) ──► get_alarm(T1) ─────────────────────────────────► same result
//! caller C ─ run_alarm(T2) ──► pending behind T1 ──────────────► handler(T2) ──► fulfill
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example alarms
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use eventvisor::{
    Actor, AlarmResult, BackgroundTasks, DeferredProxy, Entrypoint, EntrypointConfig,
    EventOutcome, Exception, ExecutionContext, ExportedHandler, GlobalScope, HttpRequest,
    LockedFn, LogWriter, Response, Subscribe, Telemetry, TelemetryConfig,
    UncaughtExceptionSource, WorkerInterface, WorkerLock,
};
use tokio_util::task::TaskTracker;

/// The actor's program: each alarm takes a while and is counted.
#[derive(Default)]
struct Room {
    alarms: AtomicUsize,
}

#[async_trait]
impl GlobalScope for Room {
    async fn request(
        &self,
        _request: HttpRequest,
        _response: Arc<dyn Response>,
        _cf_blob_json: Option<String>,
        _handler: Option<ExportedHandler>,
    ) -> Result<DeferredProxy, Exception> {
        Err(Exception::type_error("this actor only handles alarms"))
    }

    fn start_scheduled(
        &self,
        _scheduled_time: SystemTime,
        _cron: &str,
        _handler: Option<ExportedHandler>,
    ) -> Result<(), Exception> {
        Ok(())
    }

    async fn run_alarm(
        &self,
        scheduled_time: SystemTime,
        handler: Option<ExportedHandler>,
    ) -> Result<AlarmResult, Exception> {
        let n = self.alarms.fetch_add(1, Ordering::SeqCst) + 1;
        let actor = handler.and_then(|h| h.actor);
        println!(
            "[room] alarm #{n} for {:?} on {:?}",
            scheduled_time.duration_since(UNIX_EPOCH).unwrap_or_default(),
            actor.as_ref().map(|id| id.as_str()),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(AlarmResult::ok())
    }

    async fn test(&self, _handler: Option<ExportedHandler>) -> Result<(), Exception> {
        Ok(())
    }
}

struct Lock(Arc<Room>);

impl WorkerLock for Lock {
    fn global_scope(&self) -> Arc<dyn GlobalScope> {
        self.0.clone()
    }

    fn exported_handler(
        &self,
        name: Option<&str>,
        actor: Option<&Actor>,
    ) -> Option<ExportedHandler> {
        Some(ExportedHandler {
            entrypoint: name.map(Arc::from),
            actor: actor.map(|a| a.id().clone()),
        })
    }
}

/// Context shared by every event of the actor.
struct ActorContext {
    room: Arc<Room>,
    actor: Arc<Actor>,
    background: TaskTracker,
}

#[async_trait]
impl ExecutionContext for ActorContext {
    async fn run_locked(&self, f: LockedFn) -> Result<(), Exception> {
        f(&Lock(self.room.clone())).await;
        Ok(())
    }

    async fn on_abort(&self) -> Exception {
        futures::future::pending().await
    }

    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn add_wait_until(&self, task: futures::future::BoxFuture<'static, Result<(), Exception>>) {
        self.background.spawn(task);
    }

    async fn wait_for_output_locks(&self) -> Result<(), Exception> {
        Ok(())
    }

    fn is_fail_open(&self) -> bool {
        false
    }

    fn actor(&self) -> Option<Arc<Actor>> {
        Some(self.actor.clone())
    }

    fn fail_open_service(&self, _cf_blob_json: Option<String>) -> Option<Arc<dyn WorkerInterface>> {
        None
    }

    fn log_uncaught_exception(&self, source: UncaughtExceptionSource, exception: &Exception) {
        println!("[room] uncaught ({source:?}): {exception}");
    }

    async fn drain(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    async fn finish_scheduled(&self) -> bool {
        self.drain().await;
        true
    }

    fn wait_until_status(&self) -> EventOutcome {
        EventOutcome::Ok
    }

    fn should_retry_scheduled(&self) -> bool {
        false
    }
}

fn deliver(
    telemetry: &Telemetry,
    tasks: &BackgroundTasks,
    actor: &Arc<Actor>,
    room: &Arc<Room>,
) -> Arc<dyn WorkerInterface> {
    let room = Arc::clone(room);
    let owner = Arc::clone(actor);
    Entrypoint::construct(
        EntrypointConfig::default(),
        Some(Arc::clone(actor)),
        move |_| {
            println!("[runtime] creating the actor's context");
            Arc::new(ActorContext {
                room,
                actor: owner,
                background: TaskTracker::new(),
            }) as Arc<dyn ExecutionContext>
        },
        telemetry.observer(Some("room".into())),
        tasks.clone(),
        None,
    )
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
    let telemetry = Telemetry::new(&TelemetryConfig::default(), subs);
    let tasks = BackgroundTasks::current();

    let actor = Arc::new(Actor::new("room-42"));
    let room = Arc::new(Room::default());
    let t1 = UNIX_EPOCH + Duration::from_secs(60);
    let t2 = UNIX_EPOCH + Duration::from_secs(120);

    let a = deliver(&telemetry, &tasks, &actor, &room);
    let b = deliver(&telemetry, &tasks, &actor, &room);
    let c = deliver(&telemetry, &tasks, &actor, &room);

    let (ra, rb, rc) = tokio::join!(a.run_alarm(t1), b.run_alarm(t1), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        c.run_alarm(t2).await
    });
    println!("[caller A] {ra:?}");
    println!("[caller B] {rb:?}");
    println!("[caller C] {rc:?}");
    println!(
        "[runtime] handler ran {} times for 3 deliveries",
        room.alarms.load(Ordering::SeqCst)
    );

    tasks.wait().await;
    telemetry.shutdown().await;
}
