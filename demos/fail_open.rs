//! # Example: fail_open
//!
//! Demonstrates the request path with a program that asked to fail open.
//!
//! Shows how to:
//! - Implement [`ExecutionContext`], [`WorkerLock`] and [`GlobalScope`] for a toy runtime.
//! - Build one [`Entrypoint`] per request with [`Entrypoint::construct`].
//! - Wire [`Telemetry`] with the built-in [`LogWriter`].
//!
//! ## Flow
//! ```text
//! request("/")       ──► handler ok ──────────────────────────► 200 from the program
//! request("/broken") ──► handler throws ──► is_fail_open()? ──► replay against origin ──► 200
//! request("/broken") ──► handler throws ──► no fail-open ─────► empty 500
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example fail_open
//! ```

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use eventvisor::{
    Actor, AlarmResult, BackgroundTasks, BodyWriter, CustomEvent, CustomEventResult,
    DeferredProxy, Entrypoint, EntrypointConfig, EventOutcome, Exception, ExecutionContext,
    ExportedHandler, GlobalScope, HttpRequest, LockedFn, LogWriter, Response, ScheduledResult,
    Subscribe, Telemetry, TelemetryConfig, UncaughtExceptionSource, WebSocketStream,
    WorkerInterface, WorkerLock,
};
use http::{HeaderMap, StatusCode};
use tokio_util::task::TaskTracker;

/// The program: `/broken` throws, everything else answers 200.
struct Program;

#[async_trait]
impl GlobalScope for Program {
    async fn request(
        &self,
        request: HttpRequest,
        response: Arc<dyn Response>,
        _cf_blob_json: Option<String>,
        _handler: Option<ExportedHandler>,
    ) -> Result<DeferredProxy, Exception> {
        if request.url.ends_with("/broken") {
            return Err(Exception::failed("database connection refused"));
        }
        let _body = response.send(StatusCode::OK, &HeaderMap::new(), Some(0));
        Ok(DeferredProxy::ready())
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
        _scheduled_time: SystemTime,
        _handler: Option<ExportedHandler>,
    ) -> Result<AlarmResult, Exception> {
        Ok(AlarmResult::ok())
    }

    async fn test(&self, _handler: Option<ExportedHandler>) -> Result<(), Exception> {
        Ok(())
    }
}

struct Lock(Arc<Program>);

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

/// One request's context; `origin` is set when the program asked to fail open.
struct Context {
    program: Arc<Program>,
    origin: Option<Arc<dyn WorkerInterface>>,
    background: TaskTracker,
}

#[async_trait]
impl ExecutionContext for Context {
    async fn run_locked(&self, f: LockedFn) -> Result<(), Exception> {
        f(&Lock(self.program.clone())).await;
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
        self.origin.is_some()
    }

    fn actor(&self) -> Option<Arc<Actor>> {
        None
    }

    fn fail_open_service(&self, _cf_blob_json: Option<String>) -> Option<Arc<dyn WorkerInterface>> {
        self.origin.clone()
    }

    fn log_uncaught_exception(&self, source: UncaughtExceptionSource, exception: &Exception) {
        println!("[program] uncaught ({source:?}): {exception}");
    }

    async fn drain(&self) {
        self.background.close();
        self.background.wait().await;
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

/// The next stage behind the program; only `request` is served.
struct Origin;

#[async_trait]
impl WorkerInterface for Origin {
    async fn request(
        &self,
        request: HttpRequest,
        response: Arc<dyn Response>,
    ) -> Result<(), Exception> {
        println!("[origin] serving {} {}", request.method, request.url);
        let _body = response.send(StatusCode::OK, &HeaderMap::new(), Some(0));
        Ok(())
    }

    async fn connect(&self, _host: &str, _headers: &HeaderMap) -> Result<(), Exception> {
        Err(Exception::failed("origin does not accept CONNECT"))
    }

    fn prewarm(&self, _url: &str) {}

    async fn run_scheduled(
        &self,
        _scheduled_time: SystemTime,
        _cron: &str,
    ) -> Result<ScheduledResult, Exception> {
        Err(Exception::failed("origin has no cron triggers"))
    }

    async fn run_alarm(&self, _scheduled_time: SystemTime) -> Result<AlarmResult, Exception> {
        Err(Exception::failed("origin has no alarms"))
    }

    async fn test(&self) -> Result<bool, Exception> {
        Ok(false)
    }

    async fn custom_event(
        &self,
        _event: Box<dyn CustomEvent>,
    ) -> Result<CustomEventResult, Exception> {
        Err(Exception::failed("origin has no custom events"))
    }
}

/// Prints what the caller would see.
struct Caller(&'static str);

impl Response for Caller {
    fn send(
        &self,
        status: StatusCode,
        _headers: &HeaderMap,
        expected_body_size: Option<u64>,
    ) -> BodyWriter {
        println!("[{}] <- {status} (body size {expected_body_size:?})", self.0);
        Box::new(tokio::io::sink())
    }

    fn accept_web_socket(&self, _headers: &HeaderMap) -> Box<dyn WebSocketStream> {
        Box::new(tokio::io::duplex(64).0)
    }
}

async fn serve(
    telemetry: &Telemetry,
    tasks: &BackgroundTasks,
    label: &'static str,
    url: &str,
    fail_open: bool,
) {
    let origin = fail_open.then(|| Arc::new(Origin) as Arc<dyn WorkerInterface>);
    let entrypoint = Entrypoint::construct(
        EntrypointConfig::default(),
        None,
        |_| {
            Arc::new(Context {
                program: Arc::new(Program),
                origin,
                background: TaskTracker::new(),
            }) as Arc<dyn ExecutionContext>
        },
        telemetry.observer(None),
        tasks.clone(),
        None,
    );

    match entrypoint.request(HttpRequest::get(url), Arc::new(Caller(label))).await {
        Ok(()) => println!("[{label}] done"),
        Err(e) => println!("[{label}] error: {e}"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
    let telemetry = Telemetry::new(&TelemetryConfig::default(), subs);
    let tasks = BackgroundTasks::current();

    serve(&telemetry, &tasks, "healthy", "https://example.com/", false).await;
    serve(&telemetry, &tasks, "fail-open", "https://example.com/broken", true).await;
    serve(&telemetry, &tasks, "fail-closed", "https://example.com/broken", false).await;

    tasks.wait().await;
    telemetry.shutdown().await;
}
