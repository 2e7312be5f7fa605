//! # Entrypoint and telemetry configuration.
//!
//! [`EntrypointConfig`] defines how one entrypoint treats failures and which exported handler it
//! dispatches to. [`TelemetryConfig`] sizes the event bus.
//!
//! # Example
//! ```
//! use eventvisor::{EntrypointConfig, TelemetryConfig};
//!
//! let mut cfg = EntrypointConfig::default();
//! cfg.tunnel_exceptions = true;
//! cfg.entrypoint_name = Some("api".into());
//!
//! assert_eq!(cfg.entrypoint_name(), Some("api"));
//! assert_eq!(TelemetryConfig { bus_capacity: 0 }.bus_capacity_clamped(), 1);
//! ```

use std::sync::Arc;

/// Per-entrypoint configuration.
#[derive(Clone, Debug, Default)]
pub struct EntrypointConfig {
    /// Propagate sanitized exceptions to the caller instead of synthesizing a 5xx.
    pub tunnel_exceptions: bool,
    /// Exported handler to dispatch to (`None` = default export).
    pub entrypoint_name: Option<Arc<str>>,
    /// JSON-encoded `cf` blob attached to requests.
    pub cf_blob_json: Option<String>,
    /// Force a GC pass after each event (debug builds only).
    pub predictable_mode_for_test: bool,
}

impl EntrypointConfig {
    /// Returns the entrypoint name as `&str`.
    #[inline]
    pub fn entrypoint_name(&self) -> Option<&str> {
        self.entrypoint_name.as_deref()
    }

    /// Returns `true` when the GC test hook is active for this build.
    #[inline]
    pub fn gc_pass_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.predictable_mode_for_test
    }
}

/// Configuration of the dispatch event bus.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
}

impl TelemetryConfig {
    /// Returns bus capacity, clamped to at least 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for TelemetryConfig {
    /// Provides a default configuration:
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self { bus_capacity: 1024 }
    }
}
