use http::{HeaderMap, Method};

/// An inbound HTTP request handed to the program.
///
/// Owned and cheaply replayable: when the handler fails and fail-open is in effect, the same
/// method/url/headers/body are proxied to the next stage.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Absolute request URL.
    pub url: String,
    /// Request headers as received.
    pub headers: HeaderMap,
    /// Buffered request body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Creates a request with empty headers and body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Creates a `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Returns the request with the given headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Returns the request with the given body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}
