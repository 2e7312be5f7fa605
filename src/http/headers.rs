//! # Header canonicalization for trace events.
//!
//! Trace consumers expect headers the way the program itself would observe them:
//! - names lower-cased,
//! - repeated headers combined into one comma-delimited value (this breaks `Set-Cookie`,
//!   which is accepted),
//! - names ordered by first occurrence.

use indexmap::IndexMap;

/// One canonicalized header recorded in a fetch trace event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHeader {
    /// Lower-cased header name.
    pub name: String,
    /// All values for this name, joined with `", "` in original order.
    pub value: String,
}

impl TraceHeader {
    /// Creates a header entry.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Canonicalizes a header multiset.
///
/// ```
/// use eventvisor::{canonicalize_headers, TraceHeader};
///
/// let out = canonicalize_headers([("X-A", "1"), ("x-a", "2"), ("X-B", "3")]);
/// assert_eq!(out, vec![TraceHeader::new("x-a", "1, 2"), TraceHeader::new("x-b", "3")]);
/// ```
pub fn canonicalize_headers<I, N, V>(headers: I) -> Vec<TraceHeader>
where
    I: IntoIterator<Item = (N, V)>,
    N: AsRef<str>,
    V: AsRef<str>,
{
    let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
    for (name, value) in headers {
        grouped
            .entry(name.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.as_ref().to_string());
    }

    grouped
        .into_iter()
        .map(|(name, values)| TraceHeader {
            name,
            value: values.join(", "),
        })
        .collect()
}

/// Canonicalizes an [`http::HeaderMap`]; non-UTF-8 values are decoded lossily.
pub(crate) fn canonicalize_header_map(headers: &http::HeaderMap) -> Vec<TraceHeader> {
    canonicalize_headers(
        headers
            .iter()
            .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes()))),
    )
}
