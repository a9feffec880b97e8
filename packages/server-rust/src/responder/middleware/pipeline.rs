//! Pipeline composition: wraps the handler router in the middleware stack.

use tower::util::BoxCloneService;
use tower::ServiceBuilder;

use super::load_shed::LoadShedLayer;
use super::metrics::MetricsLayer;
use super::timeout::TimeoutLayer;
use crate::responder::config::ResponderConfig;
use crate::responder::request::{HandlerError, HandlerResponse, InboundRequest};
use crate::responder::router::HandlerRouter;

/// The fully layered, cloneable service each delivery is dispatched to.
pub type ResponderPipeline = BoxCloneService<InboundRequest, HandlerResponse, HandlerError>;

/// Builds the responder pipeline.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject when overloaded before doing any work
/// 2. `TimeoutLayer` -- enforce the per-request handler budget
/// 3. `MetricsLayer` -- record timing and outcome next to the handler
#[must_use]
pub fn build_responder_pipeline(router: HandlerRouter, config: &ResponderConfig) -> ResponderPipeline {
    BoxCloneService::new(
        ServiceBuilder::new()
            .layer(LoadShedLayer::new(config.max_concurrent_handlers))
            .layer(TimeoutLayer)
            .layer(MetricsLayer)
            .service(router),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tower::{Service, ServiceExt};

    use super::*;
    use crate::responder::handler::handler_fn;
    use crate::responder::request::RequestContext;

    fn request(routing_key: &str, timeout_ms: u64) -> InboundRequest {
        let mut ctx = RequestContext::new(routing_key, "c-1");
        ctx.handler_timeout_ms = timeout_ms;
        InboundRequest {
            ctx,
            payload: Some(json!({"id": 3})),
        }
    }

    fn router() -> HandlerRouter {
        let mut router = HandlerRouter::new();
        router.bind(
            "get-widget",
            handler_fn(|query: Option<serde_json::Value>, _ctx| async move { Ok(query) }),
        );
        router.bind(
            "slow-widget",
            handler_fn(|_: Option<serde_json::Value>, _ctx| async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(None::<()>)
            }),
        );
        router
    }

    #[tokio::test]
    async fn pipeline_routes_through_all_layers() {
        let svc = build_responder_pipeline(router(), &ResponderConfig::default());
        let resp = svc.oneshot(request("get-widget", 1000)).await.unwrap();
        assert_eq!(resp.payload, Some(json!({"id": 3})));
    }

    #[tokio::test(start_paused = true)]
    async fn pipeline_enforces_handler_timeout() {
        let svc = build_responder_pipeline(router(), &ResponderConfig::default());
        let err = svc.oneshot(request("slow-widget", 100)).await.unwrap_err();
        assert!(matches!(err, HandlerError::Timeout { timeout_ms: 100 }));
    }

    #[tokio::test]
    async fn clones_share_the_concurrency_limit() {
        let config = ResponderConfig {
            max_concurrent_handlers: 1,
            ..ResponderConfig::default()
        };
        let mut first = build_responder_pipeline(router(), &config);
        let second = first.clone();

        let _ = ServiceExt::ready(&mut first).await.unwrap();
        let held = tokio::spawn(first.call(request("slow-widget", 60_000)));

        let err = second.oneshot(request("get-widget", 1000)).await.unwrap_err();
        assert!(matches!(err, HandlerError::Overloaded));
        held.abort();
    }
}
