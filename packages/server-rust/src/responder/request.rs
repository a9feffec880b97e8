//! Request, response, and error types flowing through the responder pipeline.

use std::future::Future;
use std::pin::Pin;

use queuecall_core::MessageHeader;
use serde_json::Value;

/// Metadata of one inbound request, available to every layer and handler.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Queue the request arrived on.
    pub routing_key: String,
    /// The request envelope's `uuid`, echoed on the reply.
    pub correlation_id: String,
    /// Caller identity as sent by the client.
    pub header: MessageHeader,
    /// Envelope `action` of the request, if any.
    pub operation: Option<String>,
    /// Budget for the handler, enforced by the timeout layer.
    pub handler_timeout_ms: u64,
}

impl RequestContext {
    #[must_use]
    pub fn new(routing_key: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            routing_key: routing_key.into(),
            correlation_id: correlation_id.into(),
            header: MessageHeader::anonymous(),
            operation: None,
            handler_timeout_ms: 30_000,
        }
    }

    /// Returns the operation tag, or `None` when the request carried none.
    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }
}

/// A decoded request with its payload still untyped.
///
/// The payload is converted to the handler's request type at the innermost
/// layer, so middleware never depends on a particular handler.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub ctx: RequestContext,
    pub payload: Option<Value>,
}

/// Successful handler output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerResponse {
    pub payload: Option<Value>,
}

/// Errors raised inside the responder pipeline.
///
/// Every variant turns into a `failed` reply carrying its display text.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("no handler bound to routing key {routing_key}")]
    UnknownRoutingKey { routing_key: String },
    #[error("handler timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("responder overloaded, try again later")]
    Overloaded,
    #[error("malformed request: {reason}")]
    MalformedRequest { reason: String },
    #[error("{0:#}")]
    Domain(#[from] anyhow::Error),
}

impl HandlerError {
    /// Stable label for the `outcome` log field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerError::UnknownRoutingKey { .. } => "unknown_routing_key",
            HandlerError::Timeout { .. } => "timeout",
            HandlerError::Overloaded => "overloaded",
            HandlerError::MalformedRequest { .. } => "malformed_request",
            HandlerError::Domain(_) => "domain_error",
        }
    }
}

/// Boxed future returned by every service in the pipeline.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<HandlerResponse, HandlerError>> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_error_displays_full_chain() {
        let err: HandlerError = anyhow::anyhow!("row missing")
            .context("widget lookup failed")
            .into();
        assert_eq!(err.to_string(), "widget lookup failed: row missing");
        assert_eq!(err.kind(), "domain_error");
    }

    #[test]
    fn context_defaults() {
        let ctx = RequestContext::new("get-widget", "abc");
        assert!(ctx.header.is_anonymous());
        assert!(ctx.operation().is_none());
        assert_eq!(ctx.handler_timeout_ms, 30_000);
    }
}
