//! Routing-key dispatch: sends each `InboundRequest` to the handler bound to
//! its queue.

use std::collections::HashMap;
use std::task::{Context, Poll};

use tower::util::BoxCloneService;
use tower::Service;

use super::handler::{DomainHandler, HandlerService};
use super::request::{HandlerError, HandlerFuture, HandlerResponse, InboundRequest};

type BoxedHandler = BoxCloneService<InboundRequest, HandlerResponse, HandlerError>;

// ---------------------------------------------------------------------------
// HandlerRouter
// ---------------------------------------------------------------------------

/// Routes requests to handlers by `ctx.routing_key`.
///
/// Requests for a key with no bound handler fail with
/// `HandlerError::UnknownRoutingKey`; that only happens if a delivery reaches
/// a queue the responder did not declare.
#[derive(Clone, Default)]
pub struct HandlerRouter {
    services: HashMap<String, BoxedHandler>,
}

impl HandlerRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `handler` to `routing_key`, replacing any previous binding.
    /// Returns `true` if the key was not bound before.
    pub fn bind<H: DomainHandler>(&mut self, routing_key: impl Into<String>, handler: H) -> bool {
        self.bind_service(routing_key, HandlerService::new(handler))
    }

    /// Binds an arbitrary tower service to `routing_key`.
    pub fn bind_service<S>(&mut self, routing_key: impl Into<String>, service: S) -> bool
    where
        S: Service<InboundRequest, Response = HandlerResponse, Error = HandlerError>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        self.services
            .insert(routing_key.into(), BoxCloneService::new(service))
            .is_none()
    }

    #[must_use]
    pub fn contains(&self, routing_key: &str) -> bool {
        self.services.contains_key(routing_key)
    }

    /// Bound routing keys, sorted.
    #[must_use]
    pub fn routing_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.services.keys().cloned().collect();
        keys.sort();
        keys
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Service<InboundRequest> for HandlerRouter {
    type Response = HandlerResponse;
    type Error = HandlerError;
    type Future = HandlerFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        for svc in self.services.values_mut() {
            match svc.poll_ready(cx) {
                Poll::Ready(Ok(())) => {}
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: InboundRequest) -> Self::Future {
        match self.services.get_mut(req.ctx.routing_key.as_str()) {
            Some(svc) => svc.call(req),
            None => {
                let routing_key = req.ctx.routing_key;
                Box::pin(async move { Err(HandlerError::UnknownRoutingKey { routing_key }) })
            }
        }
    }
}

impl std::fmt::Debug for HandlerRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRouter")
            .field("routing_keys", &self.routing_keys())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::responder::handler::handler_fn;
    use crate::responder::request::RequestContext;

    fn request(routing_key: &str) -> InboundRequest {
        InboundRequest {
            ctx: RequestContext::new(routing_key, "c-1"),
            payload: None,
        }
    }

    fn echo_key_router() -> HandlerRouter {
        let mut router = HandlerRouter::new();
        for key in ["get-widget", "put-widget"] {
            router.bind(
                key,
                handler_fn(|_: Option<()>, ctx: RequestContext| async move {
                    Ok(Some(ctx.routing_key))
                }),
            );
        }
        router
    }

    #[tokio::test]
    async fn dispatches_by_routing_key() {
        let router = echo_key_router();
        let resp = router.clone().oneshot(request("put-widget")).await.unwrap();
        assert_eq!(resp.payload, Some(json!("put-widget")));
        let resp = router.oneshot(request("get-widget")).await.unwrap();
        assert_eq!(resp.payload, Some(json!("get-widget")));
    }

    #[tokio::test]
    async fn unknown_key_is_rejected() {
        let err = echo_key_router()
            .oneshot(request("delete-widget"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HandlerError::UnknownRoutingKey { routing_key } if routing_key == "delete-widget"
        ));
    }

    #[test]
    fn rebinding_reports_replacement() {
        let mut router = echo_key_router();
        assert!(!router.bind("get-widget", handler_fn(|_: Option<()>, _ctx| async { Ok(None::<()>) })));
        assert!(router.contains("get-widget"));
        assert_eq!(router.routing_keys(), vec!["get-widget", "put-widget"]);
    }
}
