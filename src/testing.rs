//! In-memory collaborators shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use async_trait::async_trait;
use futures::future::BoxFuture;
use http::{HeaderMap, StatusCode};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::actor::Actor;
use crate::config::EntrypointConfig;
use crate::context::{
    BackgroundTasks, ExecutionContext, ExportedHandler, GlobalScope, IncomingRequest, LockedFn,
    UncaughtExceptionSource, WorkerLock,
};
use crate::entrypoint::Entrypoint;
use crate::error::Exception;
use crate::http::{BodyWriter, HttpRequest, Response, WebSocketStream};
use crate::interface::{
    AlarmResult, CustomEvent, CustomEventResult, DeferredProxy, EventOutcome, ScheduledResult,
    WorkerInterface,
};
use crate::observers::RequestObserver;
use crate::trace::{EventInfo, WorkerTracer};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

type RequestFn =
    Box<dyn Fn(Arc<dyn Response>) -> BoxFuture<'static, Result<DeferredProxy, Exception>> + Send + Sync>;
type AlarmFn =
    Box<dyn Fn(SystemTime) -> BoxFuture<'static, Result<AlarmResult, Exception>> + Send + Sync>;

/// Program global scope with scripted handlers.
pub(crate) struct MockScope {
    on_request: Option<RequestFn>,
    on_alarm: Option<AlarmFn>,
    scheduled_result: Result<(), Exception>,
    test_result: Result<(), Exception>,
    requests: AtomicUsize,
    tests: AtomicUsize,
    alarm_times: Mutex<Vec<SystemTime>>,
    crons: Mutex<Vec<String>>,
    last_handler: Mutex<Option<ExportedHandler>>,
}

impl MockScope {
    pub(crate) fn new() -> Self {
        Self {
            on_request: None,
            on_alarm: None,
            scheduled_result: Ok(()),
            test_result: Ok(()),
            requests: AtomicUsize::new(0),
            tests: AtomicUsize::new(0),
            alarm_times: Mutex::new(Vec::new()),
            crons: Mutex::new(Vec::new()),
            last_handler: Mutex::new(None),
        }
    }

    pub(crate) fn on_request<F>(mut self, f: F) -> Self
    where
        F: Fn(Arc<dyn Response>) -> BoxFuture<'static, Result<DeferredProxy, Exception>>
            + Send
            + Sync
            + 'static,
    {
        self.on_request = Some(Box::new(f));
        self
    }

    pub(crate) fn on_alarm<F>(mut self, f: F) -> Self
    where
        F: Fn(SystemTime) -> BoxFuture<'static, Result<AlarmResult, Exception>>
            + Send
            + Sync
            + 'static,
    {
        self.on_alarm = Some(Box::new(f));
        self
    }

    pub(crate) fn scheduled_result(mut self, result: Result<(), Exception>) -> Self {
        self.scheduled_result = result;
        self
    }

    pub(crate) fn test_result(mut self, result: Result<(), Exception>) -> Self {
        self.test_result = result;
        self
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub(crate) fn test_count(&self) -> usize {
        self.tests.load(Ordering::SeqCst)
    }

    pub(crate) fn alarm_times(&self) -> Vec<SystemTime> {
        lock(&self.alarm_times).clone()
    }

    pub(crate) fn crons(&self) -> Vec<String> {
        lock(&self.crons).clone()
    }

    pub(crate) fn last_handler(&self) -> Option<ExportedHandler> {
        lock(&self.last_handler).clone()
    }

    fn record_handler(&self, handler: Option<ExportedHandler>) {
        *lock(&self.last_handler) = handler;
    }
}

#[async_trait]
impl GlobalScope for MockScope {
    async fn request(
        &self,
        _request: HttpRequest,
        response: Arc<dyn Response>,
        _cf_blob_json: Option<String>,
        handler: Option<ExportedHandler>,
    ) -> Result<DeferredProxy, Exception> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.record_handler(handler);
        match &self.on_request {
            Some(f) => f(response).await,
            None => {
                let _body = response.send(StatusCode::OK, &HeaderMap::new(), Some(0));
                Ok(DeferredProxy::ready())
            }
        }
    }

    fn start_scheduled(
        &self,
        _scheduled_time: SystemTime,
        cron: &str,
        handler: Option<ExportedHandler>,
    ) -> Result<(), Exception> {
        lock(&self.crons).push(cron.to_owned());
        self.record_handler(handler);
        self.scheduled_result.clone()
    }

    async fn run_alarm(
        &self,
        scheduled_time: SystemTime,
        handler: Option<ExportedHandler>,
    ) -> Result<AlarmResult, Exception> {
        lock(&self.alarm_times).push(scheduled_time);
        self.record_handler(handler);
        match &self.on_alarm {
            Some(f) => f(scheduled_time).await,
            None => Ok(AlarmResult::ok()),
        }
    }

    async fn test(&self, handler: Option<ExportedHandler>) -> Result<(), Exception> {
        self.tests.fetch_add(1, Ordering::SeqCst);
        self.record_handler(handler);
        self.test_result.clone()
    }
}

struct MockLock {
    scope: Arc<MockScope>,
}

impl WorkerLock for MockLock {
    fn global_scope(&self) -> Arc<dyn GlobalScope> {
        self.scope.clone()
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

pub(crate) struct MockContextBuilder {
    scope: MockScope,
    actor: Option<Arc<Actor>>,
    fail_open: Option<Arc<dyn WorkerInterface>>,
    finished: bool,
    retry: bool,
}

impl MockContextBuilder {
    pub(crate) fn actor(mut self, actor: Arc<Actor>) -> Self {
        self.actor = Some(actor);
        self
    }

    pub(crate) fn fail_open(mut self, service: Arc<dyn WorkerInterface>) -> Self {
        self.fail_open = Some(service);
        self
    }

    pub(crate) fn finished(mut self, finished: bool) -> Self {
        self.finished = finished;
        self
    }

    pub(crate) fn retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    pub(crate) fn build(self) -> Arc<MockContext> {
        Arc::new(MockContext {
            scope: Arc::new(self.scope),
            actor: self.actor,
            fail_open: self.fail_open,
            finished: self.finished,
            retry: self.retry,
            abort: CancellationToken::new(),
            abort_reason: Mutex::new(None),
            wait_until: TaskTracker::new(),
            wait_until_failed: Arc::new(AtomicBool::new(false)),
            drains: AtomicUsize::new(0),
            gcs: AtomicUsize::new(0),
            gate_waits: AtomicUsize::new(0),
            uncaught: Mutex::new(Vec::new()),
            fail_open_requests: Mutex::new(Vec::new()),
        })
    }
}

/// Execution context that records every call made on it.
pub(crate) struct MockContext {
    scope: Arc<MockScope>,
    actor: Option<Arc<Actor>>,
    fail_open: Option<Arc<dyn WorkerInterface>>,
    finished: bool,
    retry: bool,
    abort: CancellationToken,
    abort_reason: Mutex<Option<Exception>>,
    wait_until: TaskTracker,
    wait_until_failed: Arc<AtomicBool>,
    drains: AtomicUsize,
    gcs: AtomicUsize,
    gate_waits: AtomicUsize,
    uncaught: Mutex<Vec<(UncaughtExceptionSource, Exception)>>,
    fail_open_requests: Mutex<Vec<Option<String>>>,
}

impl MockContext {
    pub(crate) fn builder(scope: MockScope) -> MockContextBuilder {
        MockContextBuilder {
            scope,
            actor: None,
            fail_open: None,
            finished: true,
            retry: false,
        }
    }

    pub(crate) fn scope(&self) -> &MockScope {
        &self.scope
    }

    pub(crate) fn abort(&self, reason: Exception) {
        *lock(&self.abort_reason) = Some(reason);
        self.abort.cancel();
    }

    pub(crate) fn drain_count(&self) -> usize {
        self.drains.load(Ordering::SeqCst)
    }

    pub(crate) fn gc_count(&self) -> usize {
        self.gcs.load(Ordering::SeqCst)
    }

    pub(crate) fn output_gate_waits(&self) -> usize {
        self.gate_waits.load(Ordering::SeqCst)
    }

    pub(crate) fn uncaught_exceptions(&self) -> Vec<(UncaughtExceptionSource, Exception)> {
        lock(&self.uncaught).clone()
    }

    pub(crate) fn fail_open_requests(&self) -> Vec<Option<String>> {
        lock(&self.fail_open_requests).clone()
    }

    async fn settle_wait_until(&self) {
        self.wait_until.close();
        self.wait_until.wait().await;
        self.wait_until.reopen();
    }
}

#[async_trait]
impl ExecutionContext for MockContext {
    async fn run_locked(&self, f: LockedFn) -> Result<(), Exception> {
        let lock = MockLock {
            scope: Arc::clone(&self.scope),
        };
        f(&lock).await;
        Ok(())
    }

    async fn on_abort(&self) -> Exception {
        self.abort.cancelled().await;
        lock(&self.abort_reason)
            .clone()
            .unwrap_or_else(|| Exception::failed("aborted"))
    }

    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn add_wait_until(&self, task: BoxFuture<'static, Result<(), Exception>>) {
        let failed = Arc::clone(&self.wait_until_failed);
        self.wait_until.spawn(async move {
            if task.await.is_err() {
                failed.store(true, Ordering::SeqCst);
            }
        });
    }

    async fn wait_for_output_locks(&self) -> Result<(), Exception> {
        self.gate_waits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_fail_open(&self) -> bool {
        self.fail_open.is_some()
    }

    fn actor(&self) -> Option<Arc<Actor>> {
        self.actor.clone()
    }

    fn fail_open_service(&self, cf_blob_json: Option<String>) -> Option<Arc<dyn WorkerInterface>> {
        lock(&self.fail_open_requests).push(cf_blob_json);
        self.fail_open.clone()
    }

    fn log_uncaught_exception(&self, source: UncaughtExceptionSource, exception: &Exception) {
        lock(&self.uncaught).push((source, exception.clone()));
    }

    async fn drain(&self) {
        self.settle_wait_until().await;
        self.drains.fetch_add(1, Ordering::SeqCst);
    }

    async fn finish_scheduled(&self) -> bool {
        self.settle_wait_until().await;
        self.finished
    }

    fn wait_until_status(&self) -> EventOutcome {
        if self.wait_until_failed.load(Ordering::SeqCst) {
            EventOutcome::Exception
        } else {
            EventOutcome::Ok
        }
    }

    fn should_retry_scheduled(&self) -> bool {
        self.retry
    }

    fn request_gc_for_testing(&self) {
        self.gcs.fetch_add(1, Ordering::SeqCst);
    }
}

/// Response sink recording what was sent.
#[derive(Default)]
pub(crate) struct RecordingResponse {
    sends: Mutex<Vec<(StatusCode, Option<u64>)>>,
    web_sockets: AtomicUsize,
}

impl RecordingResponse {
    pub(crate) fn statuses(&self) -> Vec<StatusCode> {
        lock(&self.sends).iter().map(|(status, _)| *status).collect()
    }

    pub(crate) fn expected_sizes(&self) -> Vec<Option<u64>> {
        lock(&self.sends).iter().map(|(_, size)| *size).collect()
    }

    pub(crate) fn web_sockets(&self) -> usize {
        self.web_sockets.load(Ordering::SeqCst)
    }
}

impl Response for RecordingResponse {
    fn send(
        &self,
        status: StatusCode,
        _headers: &HeaderMap,
        expected_body_size: Option<u64>,
    ) -> BodyWriter {
        lock(&self.sends).push((status, expected_body_size));
        Box::new(tokio::io::sink())
    }

    fn accept_web_socket(&self, _headers: &HeaderMap) -> Box<dyn WebSocketStream> {
        self.web_sockets.fetch_add(1, Ordering::SeqCst);
        let (local, _remote) = tokio::io::duplex(64);
        Box::new(local)
    }
}

/// Observer recording every milestone.
#[derive(Default)]
pub(crate) struct RecordingObserver {
    delivered: AtomicUsize,
    prewarms: AtomicUsize,
    failures: Mutex<Vec<Exception>>,
    failed_open: Mutex<Vec<bool>>,
}

impl RecordingObserver {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn delivered_count(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    pub(crate) fn prewarm_count(&self) -> usize {
        self.prewarms.load(Ordering::SeqCst)
    }

    pub(crate) fn failures(&self) -> Vec<Exception> {
        lock(&self.failures).clone()
    }

    pub(crate) fn failed_open(&self) -> Vec<bool> {
        lock(&self.failed_open).clone()
    }
}

impl RequestObserver for RecordingObserver {
    fn delivered(&self) {
        self.delivered.fetch_add(1, Ordering::SeqCst);
    }

    fn set_is_prewarm(&self) {
        self.prewarms.fetch_add(1, Ordering::SeqCst);
    }

    fn report_failure(&self, exception: &Exception) {
        lock(&self.failures).push(exception.clone());
    }

    fn set_failed_open(&self, value: bool) {
        lock(&self.failed_open).push(value);
    }
}

/// Tracer recording every event info.
#[derive(Default)]
pub(crate) struct RecordingTracer {
    events: Mutex<Vec<EventInfo>>,
}

impl RecordingTracer {
    pub(crate) fn events(&self) -> Vec<EventInfo> {
        lock(&self.events).clone()
    }
}

impl WorkerTracer for RecordingTracer {
    fn set_event_info(&self, _timestamp: SystemTime, info: EventInfo) {
        lock(&self.events).push(info);
    }
}

/// Next-stage service answering every operation with a fixed result.
#[derive(Default)]
pub(crate) struct StaticInterface {
    failure: Option<Exception>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl StaticInterface {
    pub(crate) fn failing(exception: Exception) -> Self {
        Self {
            failure: Some(exception),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl WorkerInterface for StaticInterface {
    async fn request(
        &self,
        request: HttpRequest,
        response: Arc<dyn Response>,
    ) -> Result<(), Exception> {
        lock(&self.requests).push(request);
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        let _body = response.send(StatusCode::OK, &HeaderMap::new(), Some(0));
        Ok(())
    }

    async fn connect(&self, _host: &str, _headers: &HeaderMap) -> Result<(), Exception> {
        Err(Exception::failed("connect is not supported by this service"))
    }

    fn prewarm(&self, _url: &str) {}

    async fn run_scheduled(
        &self,
        _scheduled_time: SystemTime,
        _cron: &str,
    ) -> Result<ScheduledResult, Exception> {
        Ok(ScheduledResult {
            retry: false,
            outcome: EventOutcome::Ok,
        })
    }

    async fn run_alarm(&self, _scheduled_time: SystemTime) -> Result<AlarmResult, Exception> {
        Ok(AlarmResult::ok())
    }

    async fn test(&self) -> Result<bool, Exception> {
        Ok(true)
    }

    async fn custom_event(
        &self,
        _event: Box<dyn CustomEvent>,
    ) -> Result<CustomEventResult, Exception> {
        Ok(CustomEventResult {
            outcome: EventOutcome::Ok,
        })
    }
}

/// Builds an entrypoint over `ctx` with a fresh recording observer.
pub(crate) fn entrypoint(
    ctx: &Arc<MockContext>,
    config: EntrypointConfig,
) -> (Arc<Entrypoint>, Arc<RecordingObserver>) {
    build(ctx, config, None)
}

/// Like [`entrypoint`], with a trace recorder attached.
pub(crate) fn entrypoint_traced(
    ctx: &Arc<MockContext>,
    config: EntrypointConfig,
    tracer: Arc<RecordingTracer>,
) -> (Arc<Entrypoint>, Arc<RecordingObserver>) {
    build(ctx, config, Some(tracer))
}

fn build(
    ctx: &Arc<MockContext>,
    config: EntrypointConfig,
    tracer: Option<Arc<RecordingTracer>>,
) -> (Arc<Entrypoint>, Arc<RecordingObserver>) {
    let observer = RecordingObserver::new();
    let incoming = IncomingRequest::new(
        ctx.clone(),
        observer.clone(),
        tracer.map(|t| t as Arc<dyn WorkerTracer>),
    );
    let entrypoint = Entrypoint::new(config, incoming, BackgroundTasks::current());
    (Arc::new(entrypoint), observer)
}
