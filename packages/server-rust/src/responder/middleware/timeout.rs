//! Timeout middleware for handlers.
//!
//! Fails requests whose handler runs past `ctx.handler_timeout_ms` with
//! `HandlerError::Timeout`. The handler future is dropped at that point.

use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service};

use crate::responder::request::{HandlerError, HandlerFuture, HandlerResponse, InboundRequest};

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer enforcing the per-request handler budget carried in the
/// request context.
#[derive(Debug, Clone)]
pub struct TimeoutLayer;

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService { inner }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
}

impl<S> Service<InboundRequest> for TimeoutService<S>
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
        let timeout_ms = req.ctx.handler_timeout_ms;
        let fut = self.inner.call(req);
        Box::pin(async move {
            match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
                Ok(result) => result,
                Err(_elapsed) => Err(HandlerError::Timeout { timeout_ms }),
            }
        })
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

    fn slow(delay_ms: u64) -> impl Service<
        InboundRequest,
        Response = HandlerResponse,
        Error = HandlerError,
        Future = HandlerFuture,
    > + Send {
        HandlerService::new(handler_fn(move |_: Option<()>, _ctx| async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(Some("done"))
        }))
    }

    fn request(timeout_ms: u64) -> InboundRequest {
        let mut ctx = RequestContext::new("slow", "c-1");
        ctx.handler_timeout_ms = timeout_ms;
        InboundRequest { ctx, payload: None }
    }

    #[tokio::test(start_paused = true)]
    async fn completes_within_timeout() {
        let svc = TimeoutLayer.layer(slow(10));
        let resp = svc.oneshot(request(1000)).await.unwrap();
        assert_eq!(resp.payload, Some(serde_json::json!("done")));
    }

    #[tokio::test(start_paused = true)]
    async fn exceeds_timeout_returns_error() {
        let svc = TimeoutLayer.layer(slow(200));
        let err = svc.oneshot(request(50)).await.unwrap_err();
        assert!(matches!(err, HandlerError::Timeout { timeout_ms: 50 }));
    }
}
