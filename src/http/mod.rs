//! HTTP-facing types consumed by the request path.
//!
//! ## Contents
//! - [`HttpRequest`] an owned request the entrypoint can replay against a fail-open service
//! - [`Response`] the caller-visible response sink
//! - [`ResponseSentTracker`] sink wrapper recording whether a response was started
//! - [`canonicalize_headers`] header canonicalization for trace events
//!
//! Wire-level parsing is not done here; callers hand in already-parsed values.

mod headers;
mod request;
mod response;

pub(crate) use headers::canonicalize_header_map;
pub use headers::{TraceHeader, canonicalize_headers};
pub use request::HttpRequest;
pub use response::{BodyWriter, Response, ResponseSentTracker, WebSocketStream};
