//! Service host: wires responders, the readiness barrier, and request
//! clients around one broker.
//!
//! Startup order is the contract: every registered service initializes
//! (responders declare their queues) before the readiness barrier opens, so
//! a caller that waited on the barrier never publishes to a queue that does
//! not exist yet.

pub mod health;
pub mod registry;
pub mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use queuecall_core::{AnonymousPrincipal, PrincipalProvider, RoutingKeyRegistry};
use tracing::{error, info, warn};

use crate::broker::Broker;
use crate::client::{ClientConfig, RequestClient};
use crate::readiness::ReadinessBarrier;

pub use health::{HealthReport, HealthStatus};
pub use registry::{ManagedService, ServiceContext, ServiceRegistry};
pub use shutdown::{HealthState, InFlightGuard, ShutdownController};

/// Host-level configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Settings for clients handed out by [`ServiceHost::client`].
    pub client: ClientConfig,
    /// Routing keys clients may address in addition to the built-in ones and
    /// those bound by registered responders.
    pub extra_routing_keys: Vec<String>,
    /// How long `shutdown` waits for in-flight deliveries, in milliseconds.
    pub drain_timeout_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            extra_routing_keys: Vec::new(),
            drain_timeout_ms: 10_000,
        }
    }
}

/// Owns the broker plumbing of one process.
pub struct ServiceHost {
    broker: Arc<dyn Broker>,
    registry: ServiceRegistry,
    readiness: Arc<ReadinessBarrier>,
    shutdown: Arc<ShutdownController>,
    principals: Arc<dyn PrincipalProvider>,
    config: HostConfig,
}

impl ServiceHost {
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>, config: HostConfig) -> Self {
        Self {
            broker,
            registry: ServiceRegistry::new(),
            readiness: Arc::new(ReadinessBarrier::new()),
            shutdown: Arc::new(ShutdownController::new()),
            principals: Arc::new(AnonymousPrincipal),
            config,
        }
    }

    /// Sets the principal source used by clients from [`client`](Self::client).
    #[must_use]
    pub fn with_principals(mut self, principals: Arc<dyn PrincipalProvider>) -> Self {
        self.principals = principals;
        self
    }

    /// Registers a service to be initialized by [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns an error if a service with the same name is already registered.
    pub fn register<T: ManagedService>(&self, service: T) -> anyhow::Result<()> {
        self.registry.register(service)
    }

    /// Initializes every service in registration order, then opens the
    /// readiness barrier.
    ///
    /// # Errors
    ///
    /// Returns the first initialization error. The barrier stays closed, so
    /// callers fall back to their readiness policy after the timeout.
    pub async fn start(&self) -> anyhow::Result<()> {
        let ctx = ServiceContext {
            broker: Arc::clone(&self.broker),
            shutdown: Arc::clone(&self.shutdown),
        };

        if let Err(e) = self.registry.init_all(&ctx).await {
            error!(error = %format!("{e:#}"), "broker setup failed, readiness barrier stays closed");
            return Err(e);
        }

        self.shutdown.set_ready();
        self.readiness.signal_ready();
        info!(
            broker = %self.broker.uri(),
            services = ?self.registry.names(),
            "service host started"
        );
        Ok(())
    }

    /// Builds a request client sharing this host's broker and barrier.
    ///
    /// The client accepts the built-in routing keys, every key bound by a
    /// registered responder, and `HostConfig::extra_routing_keys`.
    #[must_use]
    pub fn client(&self) -> RequestClient {
        let mut keys = RoutingKeyRegistry::builtin();
        for key in self
            .registry
            .routing_keys()
            .into_iter()
            .chain(self.config.extra_routing_keys.iter().cloned())
        {
            keys.register(key);
        }

        RequestClient::new(Arc::clone(&self.broker), Arc::clone(&self.readiness))
            .with_registry(Arc::new(keys))
            .with_principals(Arc::clone(&self.principals))
            .with_config(self.config.client.clone())
    }

    #[must_use]
    pub fn readiness(&self) -> Arc<ReadinessBarrier> {
        Arc::clone(&self.readiness)
    }

    #[must_use]
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        self.shutdown.health_state()
    }

    /// Current broker health snapshot.
    #[must_use]
    pub fn health(&self) -> HealthReport {
        let broker_open = self.broker.is_open();
        let ready = self.readiness.is_ready();
        let state = self.shutdown.health_state();
        HealthReport {
            status: HealthReport::status_for(broker_open, ready, state),
            broker_open,
            broker_uri: self.broker.uri(),
            ready,
            state,
            in_flight: self.shutdown.in_flight_count(),
            queues: self.broker.queue_names(),
        }
    }

    /// Stops every service in reverse registration order and waits for
    /// in-flight deliveries.
    ///
    /// Returns `true` if everything drained within the drain timeout.
    ///
    /// # Errors
    ///
    /// Returns the first service shutdown error.
    pub async fn shutdown(&self, terminate: bool) -> anyhow::Result<bool> {
        info!(terminate, "service host shutting down");
        self.shutdown.trigger_shutdown();

        self.registry.shutdown_all(terminate).await?;

        let timeout = Duration::from_millis(self.config.drain_timeout_ms);
        let drained = self.shutdown.wait_for_drain(timeout).await;
        if drained {
            info!("service host stopped");
        } else {
            warn!(
                in_flight = self.shutdown.in_flight_count(),
                "drain timeout elapsed with deliveries still in flight"
            );
        }
        Ok(drained)
    }
}

impl std::fmt::Debug for ServiceHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHost")
            .field("broker", &self.broker.uri())
            .field("services", &self.registry.names())
            .field("ready", &self.readiness.is_ready())
            .field("state", &self.shutdown.health_state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use queuecall_core::{Principal, StaticPrincipal};
    use serde_json::{json, Value};

    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::responder::{handler_fn, RequestContext, Responder};

    fn echo_responder(name: &'static str, key: &'static str) -> Responder {
        Responder::builder(name)
            .bind(
                key,
                handler_fn(|payload: Option<Value>, ctx: RequestContext| async move {
                    Ok(Some(json!({
                        "payload": payload,
                        "caller": ctx.header.external_id,
                    })))
                }),
            )
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn start_opens_barrier_after_queues_exist() {
        let broker = Arc::new(InMemoryBroker::default());
        let host = ServiceHost::new(broker.clone(), HostConfig::default());
        host.register(echo_responder("widgets", "get-widget")).unwrap();

        let mut ready = host.readiness().subscribe();
        let watcher = {
            let broker = broker.clone();
            tokio::spawn(async move {
                ready.wait_for(|r| *r).await.unwrap();
                broker.queue_names()
            })
        };

        assert!(!host.readiness().is_ready());
        assert_eq!(host.health_state(), HealthState::Starting);
        host.start().await.unwrap();

        assert_eq!(watcher.await.unwrap(), vec!["get-widget"]);
        assert_eq!(host.health_state(), HealthState::Ready);
        host.shutdown(false).await.unwrap();
    }

    #[tokio::test]
    async fn client_reaches_registered_responder_with_identity() {
        let broker = Arc::new(InMemoryBroker::default());
        let host = ServiceHost::new(broker, HostConfig::default()).with_principals(Arc::new(
            StaticPrincipal(Principal::new("sub-1", vec!["USER".to_string()])),
        ));
        host.register(echo_responder("widgets", "get-widget")).unwrap();
        host.start().await.unwrap();

        let reply: Option<Value> = host
            .client()
            .call("get-widget", None, Some(json!({"id": 42})))
            .await
            .unwrap();
        assert_eq!(
            reply,
            Some(json!({"payload": {"id": 42}, "caller": "sub-1"}))
        );
        host.shutdown(false).await.unwrap();
    }

    #[tokio::test]
    async fn failed_init_keeps_barrier_closed() {
        let broker = Arc::new(InMemoryBroker::default());
        let host = ServiceHost::new(broker, HostConfig::default());
        host.register(echo_responder("first", "get-widget")).unwrap();
        host.register(echo_responder("second", "get-widget")).unwrap();

        let err = host.start().await.unwrap_err();
        assert!(format!("{err:#}").contains("service second failed to initialize"));
        assert!(!host.readiness().is_ready());
        assert!(!host.health().is_up());
        host.shutdown(true).await.unwrap();
    }

    #[tokio::test]
    async fn health_report_tracks_lifecycle() {
        let broker = Arc::new(InMemoryBroker::default());
        let host = ServiceHost::new(broker, HostConfig::default());
        host.register(echo_responder("widgets", "get-widget")).unwrap();

        let before = host.health();
        assert_eq!(before.status, HealthStatus::Down);
        assert!(before.queues.is_empty());

        host.start().await.unwrap();
        let running = host.health();
        assert!(running.is_up());
        assert_eq!(running.queues, vec!["get-widget"]);
        assert_eq!(running.broker_uri, "amqp://guest@localhost:5672/%2f");

        assert!(host.shutdown(false).await.unwrap());
        let stopped = host.health();
        assert_eq!(stopped.state, HealthState::Stopped);
        assert!(stopped.queues.is_empty());
        assert_eq!(stopped.status, HealthStatus::Down);
    }

    #[test]
    fn client_registry_includes_bound_and_extra_keys() {
        let broker = Arc::new(InMemoryBroker::default());
        let host = ServiceHost::new(
            broker,
            HostConfig {
                extra_routing_keys: vec!["remote-only".to_string()],
                ..HostConfig::default()
            },
        );
        host.register(echo_responder("widgets", "get-widget")).unwrap();

        let client = host.client();
        assert!(client.registry().contains("get-widget"));
        assert!(client.registry().contains("remote-only"));
        assert!(client
            .registry()
            .contains(queuecall_core::routing::GET_INTERNAL_USER));
    }
}
