//! Load-shedding middleware for handlers.
//!
//! Rejects requests with `HandlerError::Overloaded` once
//! `max_concurrent_handlers` are already running.

use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Semaphore;
use tower::{Layer, Service};

use crate::responder::request::{HandlerError, HandlerFuture, HandlerResponse, InboundRequest};

// ---------------------------------------------------------------------------
// LoadShedLayer
// ---------------------------------------------------------------------------

/// Tower layer that limits concurrent handlers via a semaphore.
///
/// When all permits are taken, incoming requests are rejected immediately
/// rather than queued; the caller gets a `failed` reply instead of waiting
/// out its reply timeout.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    semaphore: Arc<Semaphore>,
}

impl LoadShedLayer {
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent as usize)),
        }
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShedService {
            inner,
            semaphore: self.semaphore.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// LoadShedService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadShedService<S> {
    inner: S,
    semaphore: Arc<Semaphore>,
}

impl<S> Service<InboundRequest> for LoadShedService<S>
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
        let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
            return Box::pin(async { Err(HandlerError::Overloaded) });
        };

        let fut = self.inner.call(req);
        Box::pin(async move {
            let result = fut.await;
            drop(permit);
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tower::ServiceExt;

    use super::*;
    use crate::responder::handler::{handler_fn, HandlerService};
    use crate::responder::request::RequestContext;

    fn request() -> InboundRequest {
        InboundRequest {
            ctx: RequestContext::new("slow", "c-1"),
            payload: None,
        }
    }

    fn sleeper(delay_ms: u64) -> HandlerService<impl crate::responder::handler::DomainHandler> {
        HandlerService::new(handler_fn(move |_: Option<()>, _ctx| async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(None::<()>)
        }))
    }

    #[tokio::test]
    async fn allows_requests_under_limit() {
        let svc = LoadShedLayer::new(10).layer(sleeper(1));
        let resp = svc.oneshot(request()).await.unwrap();
        assert!(resp.payload.is_none());
    }

    #[tokio::test]
    async fn rejects_when_overloaded() {
        let mut svc = LoadShedLayer::new(1).layer(sleeper(500));

        let _ = ServiceExt::ready(&mut svc).await.unwrap();
        let in_flight = tokio::spawn(svc.call(request()));

        // Permit is taken synchronously in `call`.
        let err = svc.call(request()).await.unwrap_err();
        assert!(matches!(err, HandlerError::Overloaded));
        in_flight.abort();
    }

    #[tokio::test]
    async fn permit_is_released_after_completion() {
        let layer = LoadShedLayer::new(1);
        let svc = layer.layer(sleeper(1));
        svc.clone().oneshot(request()).await.unwrap();
        svc.oneshot(request()).await.unwrap();
    }
}
