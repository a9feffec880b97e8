//! Request client: the producer side of a remote call.
//!
//! A call validates its routing key, waits on the readiness barrier, wraps
//! the payload in an envelope carrying the caller's identity, and blocks on
//! the broker's request/reply primitive until the responder answers or the
//! reply timeout elapses.

pub mod config;
pub mod error;

use std::sync::Arc;
use std::time::Instant;

use queuecall_core::{
    AnonymousPrincipal, Envelope, EnvelopeCodec, MessageHeader, PrincipalProvider, Route,
    RoutingKeyRegistry,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::broker::{Broker, ReplyOutcome};
use crate::readiness::{ReadinessBarrier, ReadinessPolicy};

pub use config::ClientConfig;
pub use error::CallError;

// ---------------------------------------------------------------------------
// RequestClient
// ---------------------------------------------------------------------------

/// Sends typed requests to routing keys and returns the decoded reply.
///
/// Cheap to clone; every clone shares the broker, barrier, and registry.
/// Safe for concurrent use: calls on different routing keys never wait on
/// each other.
#[derive(Clone)]
pub struct RequestClient {
    broker: Arc<dyn Broker>,
    readiness: Arc<ReadinessBarrier>,
    principals: Arc<dyn PrincipalProvider>,
    registry: Arc<RoutingKeyRegistry>,
    config: ClientConfig,
}

impl RequestClient {
    /// Creates a client with the built-in routing keys, an anonymous caller,
    /// and default timeouts.
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>, readiness: Arc<ReadinessBarrier>) -> Self {
        Self {
            broker,
            readiness,
            principals: Arc::new(AnonymousPrincipal),
            registry: Arc::new(RoutingKeyRegistry::builtin()),
            config: ClientConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Arc<RoutingKeyRegistry>) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_principals(mut self, principals: Arc<dyn PrincipalProvider>) -> Self {
        self.principals = principals;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &RoutingKeyRegistry {
        &self.registry
    }

    /// Performs one remote call.
    ///
    /// `operation` becomes the envelope `action` and lets one responder
    /// multiplex sub-operations on a single key. `Ok(None)` means the
    /// responder finished without a payload.
    ///
    /// # Errors
    ///
    /// Returns a [`CallError`] naming the failure; see its variants.
    pub async fn call<P, T>(
        &self,
        routing_key: &str,
        operation: Option<&str>,
        payload: Option<P>,
    ) -> Result<Option<T>, CallError>
    where
        P: Serialize + Send,
        T: DeserializeOwned,
    {
        let started = Instant::now();
        let result = self.exchange(routing_key, operation, payload).await;

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => debug!(routing_key, duration_ms, outcome = "ok", "call complete"),
            // The readiness warning was already emitted for this call.
            Err(CallError::NotReady { .. }) => {}
            Err(err) => error!(
                routing_key,
                duration_ms,
                outcome = err.kind(),
                error = %err,
                "call failed"
            ),
        }
        result
    }

    /// Typed variant of [`call`](Self::call) for a declared [`Route`].
    ///
    /// # Errors
    ///
    /// Same as [`call`](Self::call).
    pub async fn call_route<Req, Resp>(
        &self,
        route: &Route<Req, Resp>,
        operation: Option<&str>,
        payload: Option<Req>,
    ) -> Result<Option<Resp>, CallError>
    where
        Req: Serialize + Send,
        Resp: DeserializeOwned,
    {
        self.call(route.key(), operation, payload).await
    }

    /// Degrade-to-absent form of [`call`](Self::call): every failure is
    /// logged by `call` and reported as `None`.
    pub async fn call_or_absent<P, T>(
        &self,
        routing_key: &str,
        operation: Option<&str>,
        payload: Option<P>,
    ) -> Option<T>
    where
        P: Serialize + Send,
        T: DeserializeOwned,
    {
        self.call(routing_key, operation, payload).await.ok().flatten()
    }

    async fn exchange<P, T>(
        &self,
        routing_key: &str,
        operation: Option<&str>,
        payload: Option<P>,
    ) -> Result<Option<T>, CallError>
    where
        P: Serialize + Send,
        T: DeserializeOwned,
    {
        if !self.registry.contains(routing_key) {
            return Err(CallError::UnknownRoutingKey {
                routing_key: routing_key.to_string(),
            });
        }

        self.wait_for_readiness(routing_key).await?;

        let principal = self.principals.current_principal();
        let header = MessageHeader::from_principal(principal.as_ref());
        let request = Envelope::request(operation.map(str::to_string), payload, header);
        let codec = self.config.codec;
        let body = codec.encode(&request).map_err(CallError::Encode)?;

        debug!(
            routing_key,
            correlation_id = %request.uuid,
            operation = operation.unwrap_or(""),
            anonymous = request.header.is_anonymous(),
            "sending request"
        );

        let outcome = self
            .broker
            .send_and_receive(routing_key, body, self.config.reply_timeout())
            .await?;

        let bytes = match outcome {
            ReplyOutcome::Replied(bytes) => bytes,
            ReplyOutcome::Unroutable | ReplyOutcome::NoReply => {
                return Err(CallError::NoResponder {
                    routing_key: routing_key.to_string(),
                })
            }
            ReplyOutcome::TimedOut => {
                return Err(CallError::Timeout {
                    timeout_ms: self.config.reply_timeout_ms,
                })
            }
        };

        let reply: Envelope<T> = codec.decode(&bytes).map_err(CallError::Decode)?;

        if self.config.verify_correlation && !reply.uuid.is_empty() && reply.uuid != request.uuid {
            return Err(CallError::CorrelationMismatch {
                expected: request.uuid,
                actual: reply.uuid,
            });
        }

        if reply.is_failed() {
            return Err(CallError::Domain(
                reply
                    .detail_message
                    .unwrap_or_else(|| "no detail provided".to_string()),
            ));
        }

        Ok(reply.payload)
    }

    /// Waits on the barrier, warning once if it stays closed.
    async fn wait_for_readiness(&self, routing_key: &str) -> Result<(), CallError> {
        let timeout = self.config.readiness_timeout();
        if self.readiness.await_ready(timeout).await {
            return Ok(());
        }

        let timeout_ms = self.config.readiness_timeout_ms;
        match self.config.readiness_policy {
            ReadinessPolicy::Degrade => {
                warn!(
                    routing_key,
                    timeout_ms, "broker setup not complete within timeout, proceeding anyway"
                );
                Ok(())
            }
            ReadinessPolicy::FailFast => {
                warn!(
                    routing_key,
                    timeout_ms, "broker setup not complete within timeout, call rejected"
                );
                Err(CallError::NotReady { timeout_ms })
            }
        }
    }
}

impl std::fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestClient")
            .field("broker", &self.broker.uri())
            .field("ready", &self.readiness.is_ready())
            .field("routing_keys", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
