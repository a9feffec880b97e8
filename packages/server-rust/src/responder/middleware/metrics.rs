//! Metrics middleware for handlers.
//!
//! Records handler duration and outcome on a `tracing` span; no metrics
//! exporter is involved.

use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::responder::request::{HandlerError, HandlerFuture, HandlerResponse, InboundRequest};

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments handlers with timing via `tracing` spans.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records handler duration and outcome.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<InboundRequest> for MetricsService<S>
where
    S: Service<InboundRequest, Response = HandlerResponse, Error = HandlerError> + Send,
    S::Future: Send + 'static,
{
    type Response = HandlerResponse;
    type Error = HandlerError;
    type Future = HandlerFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: InboundRequest) -> Self::Future {
        let routing_key = req.ctx.routing_key.clone();
        let correlation_id = req.ctx.correlation_id.clone();

        let span = info_span!(
            "handler",
            routing_key = %routing_key,
            correlation_id = %correlation_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(req);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(e) => e.kind(),
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                tracing::info!(
                    routing_key = %routing_key,
                    correlation_id = %correlation_id,
                    duration_ms,
                    outcome,
                    "request handled"
                );

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;
    use crate::responder::handler::{handler_fn, HandlerService};
    use crate::responder::request::RequestContext;

    #[tokio::test]
    async fn passes_through_response_and_error() {
        let ok = MetricsLayer.layer(HandlerService::new(handler_fn(
            |_: Option<()>, _ctx| async { Ok(Some(7_u32)) },
        )));
        let req = InboundRequest {
            ctx: RequestContext::new("count", "c-1"),
            payload: None,
        };
        let resp = ok.oneshot(req.clone()).await.unwrap();
        assert_eq!(resp.payload, Some(serde_json::json!(7)));

        let failing = MetricsLayer.layer(HandlerService::new(handler_fn(
            |_: Option<()>, _ctx| async { Err::<Option<()>, _>(anyhow::anyhow!("nope")) },
        )));
        let err = failing.oneshot(req).await.unwrap_err();
        assert_eq!(err.kind(), "domain_error");
    }
}
