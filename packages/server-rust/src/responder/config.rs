use std::time::Duration;

/// Responder configuration.
///
/// Controls handler concurrency, the per-request handler budget, and how
/// long shutdown waits for in-flight handlers.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Maximum number of handlers running at once before load shedding.
    pub max_concurrent_handlers: u32,
    /// Handler timeout in milliseconds.
    pub handler_timeout_ms: u64,
    /// Graceful shutdown budget for in-flight handlers, in milliseconds.
    pub drain_timeout_ms: u64,
}

impl ResponderConfig {
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            max_concurrent_handlers: 1000,
            handler_timeout_ms: 30_000,
            drain_timeout_ms: 10_000,
        }
    }
}
