//! # Request path.
//!
//! ```text
//! run(handler) ⨯ on_abort
//!   ├─ Ok(DeferredProxy) ──────────────────────────────┐
//!   └─ Err ─► log_uncaught_exception ─► output gate ─┐ │
//!                                                    ▼ ▼
//!                                      Detach::finish (fail-open capture, drain queued)
//!                                                    │
//!                              proxy_task (context no longer pinned)
//!                                                    │
//!                                  Err ─► fail-open tree ─► Propagate | FailOpen | 5xx | Drop
//! ```

use std::sync::Arc;

use http::{HeaderMap, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::Instrument;

use super::guards::Detach;
use super::{Entrypoint, race_abort};
use crate::classify;
use crate::context::UncaughtExceptionSource;
use crate::error::{Exception, ExceptionKind};
use crate::fail_open::{FailureAction, FailureFacts, decide};
use crate::http::{HttpRequest, Response, ResponseSentTracker, canonicalize_header_map};
use crate::interface::{DeferredProxy, WorkerInterface};
use crate::observers::RequestObserver;
use crate::trace::{EventInfo, FetchEventInfo};

/// What the failure path needs once the handler has given up the context.
struct FailureScope {
    request: HttpRequest,
    response: Arc<ResponseSentTracker>,
    metrics: Arc<dyn RequestObserver>,
    is_actor: bool,
    logged_exception_earlier: bool,
    fail_open: Option<Arc<dyn WorkerInterface>>,
}

impl Entrypoint {
    pub(super) async fn handle_request(
        &self,
        request: HttpRequest,
        response: Arc<dyn Response>,
    ) -> Result<(), Exception> {
        let mut incoming = self.take_incoming("request");
        incoming.delivered();
        let context = Arc::clone(incoming.context());
        let metrics = Arc::clone(incoming.metrics());
        let tracker = Arc::new(ResponseSentTracker::new(response));
        let actor = context.actor();

        if let Some(tracer) = incoming.tracer() {
            tracer.set_event_info(
                context.now(),
                EventInfo::Fetch(FetchEventInfo {
                    method: request.method.clone(),
                    url: request.url.clone(),
                    cf_json: self.config.cf_blob_json.clone().unwrap_or_default(),
                    headers: canonicalize_header_map(&request.headers),
                }),
            );
        }

        let detach = Detach::new(
            incoming,
            self.wait_until_tasks.clone(),
            self.config.cf_blob_json.clone(),
            self.config.gc_pass_enabled(),
        );

        let handler_request = request.clone();
        let sink: Arc<dyn Response> = tracker.clone();
        let name = self.config.entrypoint_name.clone();
        let cf_blob_json = self.config.cf_blob_json.clone();
        let handler_actor = actor.clone();
        let span = tracing::info_span!("worker_entrypoint", event = "request");
        let run = context.run(move |lock| {
            let scope = lock.global_scope();
            let handler = lock.exported_handler(name.as_deref(), handler_actor.as_deref());
            Box::pin(
                async move {
                    scope
                        .request(handler_request, sink, cf_blob_json, handler)
                        .await
                }
                .instrument(span),
            )
        });

        let mut logged_exception_earlier = false;
        let primary: Result<DeferredProxy, Exception> = match race_abort(&*context, run).await {
            Ok(deferred) => Ok(deferred),
            Err(exception) => {
                logged_exception_earlier = true;
                context.log_uncaught_exception(UncaughtExceptionSource::RequestHandler, &exception);
                // The exception may not escape before buffered output effects are flushed.
                match context.wait_for_output_locks().await {
                    Ok(()) => Err(exception),
                    Err(gate) => Err(gate),
                }
            }
        };

        let fail_open = detach.finish();
        drop(context);

        let outcome = match primary {
            Ok(deferred) => deferred.proxy_task.await,
            Err(exception) => Err(exception),
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(exception) => {
                let scope = FailureScope {
                    request,
                    response: tracker,
                    metrics,
                    is_actor: actor.is_some(),
                    logged_exception_earlier,
                    fail_open,
                };
                self.handle_request_failure(exception, scope).await
            }
        }
    }

    async fn handle_request_failure(
        &self,
        exception: Exception,
        scope: FailureScope,
    ) -> Result<(), Exception> {
        let verdict = classify::classify(&exception);
        if !scope.logged_exception_earlier {
            // Failure came from the deferred proxy; the context never saw it.
            if classify::should_log(&exception) {
                tracing::error!(
                    target: "worker_entrypoint",
                    error = %exception,
                    verdict = verdict.as_label(),
                    "uncaught exception"
                );
            } else {
                tracing::info!(
                    target: "worker_entrypoint",
                    error = %exception,
                    verdict = verdict.as_label(),
                    "request failed"
                );
            }
        }

        let action = decide(FailureFacts {
            response_sent: scope.response.is_sent(),
            is_actor: scope.is_actor,
            has_fail_open: scope.fail_open.is_some(),
            tunnel_exceptions: self.config.tunnel_exceptions,
            verdict: &verdict,
        });

        match (action, scope.fail_open) {
            (FailureAction::Propagate, _) => Err(classify::sanitize(exception)),
            (FailureAction::FailOpen, Some(service)) => {
                scope.metrics.report_failure(&exception);
                fall_back(service, scope.request, scope.response, scope.metrics).await;
                Ok(())
            }
            (FailureAction::Synthesize(status), _) => {
                scope.metrics.report_failure(&exception);
                send_empty(&scope.response, status).await;
                Ok(())
            }
            // A response was already started; only the connection can be dropped.
            (FailureAction::Drop, _) | (FailureAction::FailOpen, None) => {
                scope.metrics.report_failure(&exception);
                Ok(())
            }
        }
    }
}

/// Replays the request against the fail-open service on the same response sink.
async fn fall_back(
    service: Arc<dyn WorkerInterface>,
    request: HttpRequest,
    response: Arc<ResponseSentTracker>,
    metrics: Arc<dyn RequestObserver>,
) {
    let sink: Arc<dyn Response> = response.clone();
    let replay = service.request(request, sink);
    metrics.set_failed_open(true);

    if let Err(e) = replay.await {
        metrics.set_failed_open(false);
        if e.kind() != ExceptionKind::Disconnected && classify::is_internal(e.description()) {
            tracing::error!(target: "fail_open_fallback", error = %e, "fail-open fallback failed");
        }
        if !response.is_sent() {
            send_empty(&response, StatusCode::INTERNAL_SERVER_ERROR).await;
        }
    }
}

/// Sends an empty-bodied response with `status`.
async fn send_empty(response: &ResponseSentTracker, status: StatusCode) {
    let mut body = response.send(status, &HeaderMap::new(), Some(0));
    if let Err(e) = body.shutdown().await {
        tracing::debug!(target: "worker_entrypoint", error = %e, "closing empty error body failed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::{HeaderName, HeaderValue, Method};

    use super::*;
    use crate::actor::Actor;
    use crate::classify::INTERNAL_ERROR_DESCRIPTION;
    use crate::config::EntrypointConfig;
    use crate::testing::{
        MockContext, MockScope, RecordingResponse, RecordingTracer, StaticInterface, entrypoint,
        entrypoint_traced,
    };

    fn throwing(exception: Exception) -> MockScope {
        MockScope::new().on_request(move |_sink| {
            let exception = exception.clone();
            Box::pin(async move { Err(exception) })
        })
    }

    #[tokio::test]
    async fn test_success_sends_handler_response() {
        let ctx = MockContext::builder(MockScope::new()).build();
        let (ep, observer) = entrypoint(&ctx, EntrypointConfig::default());
        let response = Arc::new(RecordingResponse::default());

        ep.request(HttpRequest::get("https://example.com/"), response.clone())
            .await
            .unwrap();

        assert_eq!(response.statuses(), vec![StatusCode::OK]);
        assert_eq!(observer.delivered_count(), 1);
        assert!(observer.failures().is_empty());
        ep.wait_until_tasks.wait().await;
        assert_eq!(ctx.drain_count(), 1);
    }

    #[tokio::test]
    async fn test_internal_error_synthesizes_500_and_logs_once() {
        let ctx = MockContext::builder(throwing(Exception::failed("db password is hunter2"))).build();
        let (ep, observer) = entrypoint(&ctx, EntrypointConfig::default());
        let response = Arc::new(RecordingResponse::default());

        ep.request(HttpRequest::get("/"), response.clone()).await.unwrap();

        assert_eq!(response.statuses(), vec![StatusCode::INTERNAL_SERVER_ERROR]);
        assert_eq!(response.expected_sizes(), vec![Some(0)]);
        assert_eq!(ctx.uncaught_exceptions().len(), 1);
        assert_eq!(ctx.output_gate_waits(), 1);
        assert_eq!(observer.failures().len(), 1);
    }

    #[tokio::test]
    async fn test_overloaded_synthesizes_503() {
        let ctx = MockContext::builder(throwing(Exception::overloaded("cpu"))).build();
        let (ep, _) = entrypoint(&ctx, EntrypointConfig::default());
        let response = Arc::new(RecordingResponse::default());

        ep.request(HttpRequest::get("/"), response.clone()).await.unwrap();
        assert_eq!(response.statuses(), vec![StatusCode::SERVICE_UNAVAILABLE]);
    }

    #[tokio::test]
    async fn test_error_after_send_drops_without_second_send() {
        let scope = MockScope::new().on_request(|sink| {
            Box::pin(async move {
                let _body = sink.send(StatusCode::OK, &HeaderMap::new(), None);
                Err(Exception::failed("mid-stream"))
            })
        });
        let ctx = MockContext::builder(scope).build();
        let (ep, observer) = entrypoint(&ctx, EntrypointConfig::default());
        let response = Arc::new(RecordingResponse::default());

        ep.request(HttpRequest::get("/"), response.clone()).await.unwrap();
        assert_eq!(response.statuses(), vec![StatusCode::OK]);
        assert_eq!(observer.failures().len(), 1);
    }

    #[tokio::test]
    async fn test_sent_response_skips_fail_open() {
        let scope = MockScope::new().on_request(|sink| {
            Box::pin(async move {
                let _body = sink.send(StatusCode::OK, &HeaderMap::new(), None);
                Err(Exception::failed("mid-stream"))
            })
        });
        let service = Arc::new(StaticInterface::default());
        let ctx = MockContext::builder(scope).fail_open(service.clone()).build();
        let (ep, observer) = entrypoint(&ctx, EntrypointConfig::default());
        let response = Arc::new(RecordingResponse::default());

        ep.request(HttpRequest::get("/"), response.clone()).await.unwrap();

        assert!(service.requests().is_empty());
        assert_eq!(response.statuses(), vec![StatusCode::OK]);
        assert!(observer.failed_open().is_empty());
        assert_eq!(observer.failures().len(), 1);
    }

    #[tokio::test]
    async fn test_gc_pass_follows_request_drain() {
        let ctx = MockContext::builder(MockScope::new()).build();
        let cfg = EntrypointConfig {
            predictable_mode_for_test: true,
            ..EntrypointConfig::default()
        };
        let (ep, _) = entrypoint(&ctx, cfg);

        ep.request(HttpRequest::get("/"), Arc::new(RecordingResponse::default()))
            .await
            .unwrap();
        ep.wait_until_tasks.wait().await;
        assert_eq!(ctx.drain_count(), 1);
        assert_eq!(ctx.gc_count(), usize::from(cfg!(debug_assertions)));

        let ctx = MockContext::builder(MockScope::new()).build();
        let (ep, _) = entrypoint(&ctx, EntrypointConfig::default());
        ep.request(HttpRequest::get("/"), Arc::new(RecordingResponse::default()))
            .await
            .unwrap();
        ep.wait_until_tasks.wait().await;
        assert_eq!(ctx.gc_count(), 0);
    }

    #[tokio::test]
    async fn test_actor_propagates_sanitized() {
        let ctx = MockContext::builder(throwing(Exception::failed("secret")))
            .actor(Arc::new(Actor::new("counter")))
            .build();
        let (ep, observer) = entrypoint(&ctx, EntrypointConfig::default());
        let response = Arc::new(RecordingResponse::default());

        let err = ep.request(HttpRequest::get("/"), response.clone()).await.unwrap_err();
        assert_eq!(err.description(), INTERNAL_ERROR_DESCRIPTION);
        assert_eq!(err.kind(), ExceptionKind::Failed);
        assert!(response.statuses().is_empty());
        assert!(observer.failures().is_empty());
    }

    #[tokio::test]
    async fn test_tunneled_exception_propagates_with_single_remote_prefix() {
        let ctx = MockContext::builder(throwing(Exception::failed(
            "remote exception: remote.jsg.Error: nope",
        )))
        .build();
        let cfg = EntrypointConfig {
            tunnel_exceptions: true,
            ..EntrypointConfig::default()
        };
        let (ep, _) = entrypoint(&ctx, cfg);

        let err = ep
            .request(HttpRequest::get("/"), Arc::new(RecordingResponse::default()))
            .await
            .unwrap_err();
        assert_eq!(err.description(), "remote.jsg.Error: nope");
    }

    #[tokio::test]
    async fn test_fail_open_replays_request() {
        let service = Arc::new(StaticInterface::default());
        let ctx = MockContext::builder(throwing(Exception::failed("boom")))
            .fail_open(service.clone())
            .build();
        let cfg = EntrypointConfig {
            tunnel_exceptions: true,
            cf_blob_json: Some(r#"{"colo":"SFO"}"#.into()),
            ..EntrypointConfig::default()
        };
        let (ep, observer) = entrypoint(&ctx, cfg);
        let response = Arc::new(RecordingResponse::default());
        let request = HttpRequest::new(Method::POST, "https://example.com/submit").with_body("a=1");

        ep.request(request, response.clone()).await.unwrap();

        let replayed = service.requests();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].method, Method::POST);
        assert_eq!(replayed[0].body, b"a=1");
        assert_eq!(response.statuses(), vec![StatusCode::OK]);
        assert_eq!(observer.failed_open(), vec![true]);
        assert_eq!(observer.failures().len(), 1);
        assert_eq!(ctx.fail_open_requests(), vec![Some(r#"{"colo":"SFO"}"#.to_string())]);
    }

    #[tokio::test]
    async fn test_failed_fallback_synthesizes_500() {
        let service = Arc::new(StaticInterface::failing(Exception::failed("origin down")));
        let ctx = MockContext::builder(throwing(Exception::failed("boom")))
            .fail_open(service)
            .build();
        let (ep, observer) = entrypoint(&ctx, EntrypointConfig::default());
        let response = Arc::new(RecordingResponse::default());

        ep.request(HttpRequest::get("/"), response.clone()).await.unwrap();
        assert_eq!(observer.failed_open(), vec![true, false]);
        assert_eq!(response.statuses(), vec![StatusCode::INTERNAL_SERVER_ERROR]);
    }

    #[tokio::test]
    async fn test_deferred_proxy_failure_is_logged_by_entrypoint() {
        let scope = MockScope::new().on_request(|sink| {
            Box::pin(async move {
                let _body = sink.send(StatusCode::OK, &HeaderMap::new(), None);
                Ok(DeferredProxy::new(async {
                    Err(Exception::disconnected("client went away"))
                }))
            })
        });
        let ctx = MockContext::builder(scope).build();
        let (ep, observer) = entrypoint(&ctx, EntrypointConfig::default());

        ep.request(HttpRequest::get("/"), Arc::new(RecordingResponse::default()))
            .await
            .unwrap();
        assert!(ctx.uncaught_exceptions().is_empty());
        assert_eq!(observer.failures().len(), 1);
    }

    #[tokio::test]
    async fn test_abort_wins_race() {
        let scope = MockScope::new().on_request(|_sink| Box::pin(futures::future::pending()));
        let ctx = MockContext::builder(scope).build();
        let (ep, _) = entrypoint(&ctx, EntrypointConfig::default());
        let response = Arc::new(RecordingResponse::default());

        let aborter = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            aborter.abort(Exception::overloaded("exceeded cpu"));
        });

        ep.request(HttpRequest::get("/"), response.clone()).await.unwrap();
        assert_eq!(response.statuses(), vec![StatusCode::SERVICE_UNAVAILABLE]);
        assert_eq!(ctx.uncaught_exceptions().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_after_detach_still_drains() {
        let scope = MockScope::new().on_request(|sink| {
            Box::pin(async move {
                let _body = sink.send(StatusCode::OK, &HeaderMap::new(), None);
                Ok(DeferredProxy::new(futures::future::pending()))
            })
        });
        let ctx = MockContext::builder(scope).build();
        let (ep, _) = entrypoint(&ctx, EntrypointConfig::default());

        let pending = ep.request(HttpRequest::get("/"), Arc::new(RecordingResponse::default()));
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());

        ep.wait_until_tasks.wait().await;
        assert_eq!(ctx.drain_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_detach_still_drains() {
        let scope = MockScope::new().on_request(|_sink| Box::pin(futures::future::pending()));
        let ctx = MockContext::builder(scope).build();
        let (ep, _) = entrypoint(&ctx, EntrypointConfig::default());

        let pending = ep.request(HttpRequest::get("/"), Arc::new(RecordingResponse::default()));
        assert!(tokio::time::timeout(Duration::from_millis(10), pending).await.is_err());

        ep.wait_until_tasks.wait().await;
        assert_eq!(ctx.drain_count(), 1);
    }

    #[tokio::test]
    async fn test_trace_records_canonical_headers() {
        let ctx = MockContext::builder(MockScope::new()).build();
        let tracer = Arc::new(RecordingTracer::default());
        let cfg = EntrypointConfig {
            cf_blob_json: Some("{}".into()),
            ..EntrypointConfig::default()
        };
        let (ep, _) = entrypoint_traced(&ctx, cfg, tracer.clone());

        let mut headers = HeaderMap::new();
        headers.append(HeaderName::from_static("x-a"), HeaderValue::from_static("1"));
        headers.append(HeaderName::from_static("x-a"), HeaderValue::from_static("2"));
        headers.append(HeaderName::from_static("x-b"), HeaderValue::from_static("3"));
        let request = HttpRequest::get("https://example.com/").with_headers(headers);

        ep.request(request, Arc::new(RecordingResponse::default()))
            .await
            .unwrap();

        match tracer.events().as_slice() {
            [EventInfo::Fetch(info)] => {
                assert_eq!(info.cf_json, "{}");
                assert_eq!(info.url, "https://example.com/");
                let pairs: Vec<_> = info
                    .headers
                    .iter()
                    .map(|h| (h.name.as_str(), h.value.as_str()))
                    .collect();
                assert_eq!(pairs, vec![("x-a", "1, 2"), ("x-b", "3")]);
            }
            other => panic!("unexpected trace events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handler_sees_entrypoint_name() {
        let ctx = MockContext::builder(MockScope::new()).build();
        let cfg = EntrypointConfig {
            entrypoint_name: Some("admin".into()),
            ..EntrypointConfig::default()
        };
        let (ep, _) = entrypoint(&ctx, cfg);

        ep.request(HttpRequest::get("/"), Arc::new(RecordingResponse::default()))
            .await
            .unwrap();
        let handler = ctx.scope().last_handler().unwrap();
        assert_eq!(handler.entrypoint.as_deref(), Some("admin"));
    }
}
