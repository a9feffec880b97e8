use queuecall_core::CodecError;

use crate::broker::BrokerError;

/// Why a call produced no result.
///
/// The wire protocol cannot tell these apart for a peer that only speaks the
/// `finished` action; [`CallError::is_absent_equivalent`] marks the cases a
/// legacy caller would have seen as an absent result.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("routing key {routing_key} is not registered")]
    UnknownRoutingKey { routing_key: String },
    #[error("broker setup not complete after {timeout_ms}ms")]
    NotReady { timeout_ms: u64 },
    #[error("no reply within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("no responder replied on {routing_key}")]
    NoResponder { routing_key: String },
    #[error("request encoding failed: {0}")]
    Encode(#[source] CodecError),
    #[error("reply decoding failed: {0}")]
    Decode(#[source] CodecError),
    #[error("responder reported failure: {0}")]
    Domain(String),
    #[error("reply correlation id {actual} does not match request {expected}")]
    CorrelationMismatch { expected: String, actual: String },
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl CallError {
    /// Stable label for the `outcome` log field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::UnknownRoutingKey { .. } => "unknown_routing_key",
            CallError::NotReady { .. } => "not_ready",
            CallError::Timeout { .. } => "timeout",
            CallError::NoResponder { .. } => "no_responder",
            CallError::Encode(_) => "encode_error",
            CallError::Decode(_) => "decode_error",
            CallError::Domain(_) => "domain_error",
            CallError::CorrelationMismatch { .. } => "correlation_mismatch",
            CallError::Broker(_) => "broker_error",
        }
    }

    /// Returns `true` for failures that reach the caller as "no value"
    /// rather than a programming error on the calling side.
    #[must_use]
    pub fn is_absent_equivalent(&self) -> bool {
        !matches!(self, CallError::UnknownRoutingKey { .. })
    }
}
