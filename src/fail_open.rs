//! # Fail-open decision tree for failed requests.
//!
//! Picks exactly one caller-visible action for a request whose handler (or deferred proxy)
//! failed. The tree is evaluated in a fixed order:
//!
//! ```text
//! response already sent?  ─► fail-open disabled (a response cannot be restarted)
//! stateful actor?         ─► Propagate
//! fail-open captured?     ─► FailOpen (proxy to the next stage, same response sink)
//! tunneling enabled?      ─► Propagate
//! nothing sent yet?       ─► Synthesize(503 if overloaded, else 500)
//! otherwise               ─► Drop
//! ```
//!
//! Only the request path uses this tree; the other event kinds propagate directly.

use http::StatusCode;

use crate::classify::ExceptionVerdict;

/// What the entrypoint does with a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Return the sanitized exception to the caller.
    Propagate,
    /// Replay the request against the captured fail-open service.
    FailOpen,
    /// Send an empty-bodied error response with this status.
    Synthesize(StatusCode),
    /// A response was already started; nothing else may be sent.
    Drop,
}

/// Facts the decision depends on.
#[derive(Debug, Clone, Copy)]
pub struct FailureFacts<'a> {
    /// Whether headers were already sent on the response sink.
    pub response_sent: bool,
    /// Whether the event belongs to a stateful actor.
    pub is_actor: bool,
    /// Whether a fail-open service was captured when the request detached.
    pub has_fail_open: bool,
    /// Whether the deployment tunnels exceptions to its caller.
    pub tunnel_exceptions: bool,
    /// Classification of the exception.
    pub verdict: &'a ExceptionVerdict,
}

/// Evaluates the decision tree.
pub fn decide(facts: FailureFacts<'_>) -> FailureAction {
    let fail_open = facts.has_fail_open && !facts.response_sent;

    if facts.is_actor {
        FailureAction::Propagate
    } else if fail_open {
        FailureAction::FailOpen
    } else if facts.tunnel_exceptions {
        FailureAction::Propagate
    } else if facts.response_sent {
        FailureAction::Drop
    } else {
        FailureAction::Synthesize(error_status(facts.verdict))
    }
}

/// Status code used when the failure is replaced by a synthesized response.
pub fn error_status(verdict: &ExceptionVerdict) -> StatusCode {
    match verdict {
        ExceptionVerdict::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
