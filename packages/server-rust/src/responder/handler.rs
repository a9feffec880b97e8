//! Domain handlers and their adaptation into tower services.
//!
//! A handler only sees typed values. [`HandlerService`] is the innermost
//! service of the pipeline: it converts the untyped payload into the
//! handler's request type, runs the handler, and converts the result back.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower::Service;

use super::request::{HandlerError, HandlerFuture, HandlerResponse, InboundRequest, RequestContext};

// ---------------------------------------------------------------------------
// DomainHandler
// ---------------------------------------------------------------------------

/// Business logic bound to one routing key.
///
/// `request` is `None` when the envelope carried no payload. Returning
/// `Ok(None)` produces a `finished` reply without a payload; returning an
/// error produces a `failed` reply with the error chain as detail.
#[async_trait]
pub trait DomainHandler: Send + Sync + 'static {
    type Request: DeserializeOwned + Send;
    type Response: Serialize + Send;

    async fn handle(
        &self,
        request: Option<Self::Request>,
        ctx: &RequestContext,
    ) -> anyhow::Result<Option<Self::Response>>;
}

// ---------------------------------------------------------------------------
// handler_fn
// ---------------------------------------------------------------------------

/// Handler backed by an async closure. Built with [`handler_fn`].
pub struct FnHandler<Req, Resp, F> {
    f: F,
    _types: PhantomData<fn(Req) -> Resp>,
}

/// Adapts an async closure into a [`DomainHandler`].
///
/// ```ignore
/// let handler = handler_fn(|query: Option<WidgetQuery>, _ctx| async move {
///     Ok(query.map(|q| Widget { id: q.id, name: "Widget".into() }))
/// });
/// ```
pub fn handler_fn<Req, Resp, F, Fut>(f: F) -> FnHandler<Req, Resp, F>
where
    F: Fn(Option<Req>, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<Resp>>> + Send + 'static,
{
    FnHandler {
        f,
        _types: PhantomData,
    }
}

#[async_trait]
impl<Req, Resp, F, Fut> DomainHandler for FnHandler<Req, Resp, F>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(Option<Req>, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<Resp>>> + Send + 'static,
{
    type Request = Req;
    type Response = Resp;

    async fn handle(
        &self,
        request: Option<Req>,
        ctx: &RequestContext,
    ) -> anyhow::Result<Option<Resp>> {
        (self.f)(request, ctx.clone()).await
    }
}

// ---------------------------------------------------------------------------
// HandlerService
// ---------------------------------------------------------------------------

/// Tower service wrapping a shared [`DomainHandler`].
pub struct HandlerService<H> {
    handler: Arc<H>,
}

impl<H: DomainHandler> HandlerService<H> {
    #[must_use]
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }
}

impl<H> Clone for HandlerService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H: DomainHandler> Service<InboundRequest> for HandlerService<H> {
    type Response = HandlerResponse;
    type Error = HandlerError;
    type Future = HandlerFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: InboundRequest) -> Self::Future {
        let handler = Arc::clone(&self.handler);
        Box::pin(async move {
            let request = match req.payload {
                None | Some(serde_json::Value::Null) => None,
                Some(value) => Some(serde_json::from_value::<H::Request>(value).map_err(|e| {
                    HandlerError::MalformedRequest {
                        reason: e.to_string(),
                    }
                })?),
            };

            let response = handler.handle(request, &req.ctx).await?;

            let payload = response
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| HandlerError::Domain(anyhow::Error::new(e).context("response encoding failed")))?;

            Ok(HandlerResponse { payload })
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct WidgetQuery {
        id: u32,
    }

    #[derive(Debug, Serialize)]
    struct Widget {
        id: u32,
        name: &'static str,
    }

    struct WidgetHandler;

    #[async_trait]
    impl DomainHandler for WidgetHandler {
        type Request = WidgetQuery;
        type Response = Widget;

        async fn handle(
            &self,
            request: Option<WidgetQuery>,
            _ctx: &RequestContext,
        ) -> anyhow::Result<Option<Widget>> {
            Ok(request.map(|q| Widget {
                id: q.id,
                name: "Widget",
            }))
        }
    }

    fn inbound(payload: Option<serde_json::Value>) -> InboundRequest {
        InboundRequest {
            ctx: RequestContext::new("get-widget", "c-1"),
            payload,
        }
    }

    #[tokio::test]
    async fn typed_handler_roundtrips_payload() {
        let svc = HandlerService::new(WidgetHandler);
        let resp = svc.oneshot(inbound(Some(json!({"id": 42})))).await.unwrap();
        assert_eq!(resp.payload, Some(json!({"id": 42, "name": "Widget"})));
    }

    #[tokio::test]
    async fn absent_and_null_payloads_reach_handler_as_none() {
        let svc = HandlerService::new(WidgetHandler);
        let resp = svc.clone().oneshot(inbound(None)).await.unwrap();
        assert!(resp.payload.is_none());
        let resp = svc.oneshot(inbound(Some(serde_json::Value::Null))).await.unwrap();
        assert!(resp.payload.is_none());
    }

    #[tokio::test]
    async fn mistyped_payload_is_malformed() {
        let svc = HandlerService::new(WidgetHandler);
        let err = svc
            .oneshot(inbound(Some(json!({"id": "forty-two"}))))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::MalformedRequest { .. }));
    }

    #[tokio::test]
    async fn closure_handler_sees_context() {
        let svc = HandlerService::new(handler_fn(|_: Option<()>, ctx: RequestContext| async move {
            Ok(Some(format!("{}:{}", ctx.routing_key, ctx.correlation_id)))
        }));
        let resp = svc.oneshot(inbound(None)).await.unwrap();
        assert_eq!(resp.payload, Some(json!("get-widget:c-1")));
    }

    #[tokio::test]
    async fn handler_error_becomes_domain_error() {
        let svc = HandlerService::new(handler_fn(|_: Option<()>, _ctx| async move {
            Err::<Option<()>, _>(anyhow::anyhow!("widget not found"))
        }));
        let err = svc.oneshot(inbound(None)).await.unwrap_err();
        assert_eq!(err.to_string(), "widget not found");
    }
}
