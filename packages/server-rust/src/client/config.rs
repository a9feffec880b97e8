use std::time::Duration;

use queuecall_core::WireCodec;

use crate::readiness::ReadinessPolicy;

/// Request client configuration.
///
/// Both timeouts default to 30 seconds: the readiness wait bounds how long a
/// call can sit behind an unfinished broker setup, the reply timeout bounds
/// one request/reply exchange.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum wait on the readiness barrier per call, in milliseconds.
    pub readiness_timeout_ms: u64,
    /// Maximum wait for a reply per call, in milliseconds.
    pub reply_timeout_ms: u64,
    /// Behavior when the readiness wait times out.
    pub readiness_policy: ReadinessPolicy,
    /// Reject replies whose `uuid` does not match the request.
    pub verify_correlation: bool,
    /// Wire format; must match every responder's.
    pub codec: WireCodec,
}

impl ClientConfig {
    #[must_use]
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    #[must_use]
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            readiness_timeout_ms: 30_000,
            reply_timeout_ms: 30_000,
            readiness_policy: ReadinessPolicy::Degrade,
            verify_correlation: true,
            codec: WireCodec::Json,
        }
    }
}
