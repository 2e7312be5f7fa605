//! # Caller-visible response sink.
//!
//! [`Response`] is the sink the program writes its response to. The entrypoint wraps the
//! caller's sink in a [`ResponseSentTracker`] before handing it to the program so that the
//! failure path knows whether a response was already started.
//!
//! ## Rules
//! - The `sent` flag is monotonic: once set it is never cleared.
//! - After `is_sent()` is true, the entrypoint never calls `send`/`accept_web_socket` again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use http::{HeaderMap, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};

/// Writer for a response body.
pub type BodyWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Bidirectional stream of an accepted WebSocket.
pub trait WebSocketStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> WebSocketStream for T {}

/// Sink for the response to one request.
pub trait Response: Send + Sync {
    /// Starts the response and returns the body writer.
    fn send(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        expected_body_size: Option<u64>,
    ) -> BodyWriter;

    /// Accepts a WebSocket upgrade instead of sending a regular response.
    fn accept_web_socket(&self, headers: &HeaderMap) -> Box<dyn WebSocketStream>;
}

/// Wrapper around a [`Response`] that records whether a response was started.
pub struct ResponseSentTracker {
    inner: Arc<dyn Response>,
    sent: AtomicBool,
}

impl ResponseSentTracker {
    /// Wraps the caller's sink.
    pub fn new(inner: Arc<dyn Response>) -> Self {
        Self {
            inner,
            sent: AtomicBool::new(false),
        }
    }

    /// Returns `true` once `send` or `accept_web_socket` has been called.
    pub fn is_sent(&self) -> bool {
        self.sent.load(Ordering::Acquire)
    }
}

impl Response for ResponseSentTracker {
    fn send(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        expected_body_size: Option<u64>,
    ) -> BodyWriter {
        self.sent.store(true, Ordering::Release);
        self.inner.send(status, headers, expected_body_size)
    }

    fn accept_web_socket(&self, headers: &HeaderMap) -> Box<dyn WebSocketStream> {
        self.sent.store(true, Ordering::Release);
        self.inner.accept_web_socket(headers)
    }
}
