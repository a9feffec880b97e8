use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::shutdown::ShutdownController;
use crate::broker::Broker;

// ---------------------------------------------------------------------------
// ServiceContext
// ---------------------------------------------------------------------------

/// Context provided to services during initialization.
#[derive(Clone)]
pub struct ServiceContext {
    pub broker: Arc<dyn Broker>,
    pub shutdown: Arc<ShutdownController>,
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("broker", &self.broker.uri())
            .field("health", &self.shutdown.health_state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ManagedService trait
// ---------------------------------------------------------------------------

/// Lifecycle-managed service trait. Responders implement this.
///
/// Services are registered with a `ServiceRegistry`, initialized in
/// registration order, and shut down in reverse registration order.
#[async_trait]
pub trait ManagedService: Send + Sync + 'static {
    /// Returns the unique name of this service (e.g., `"characters"`).
    fn name(&self) -> &'static str;

    /// Initialize the service. Responders declare their queues here, before
    /// the host opens the readiness barrier.
    async fn init(&self, ctx: &ServiceContext) -> anyhow::Result<()>;

    /// Shut down the service. If `terminate` is true, skip graceful cleanup.
    async fn shutdown(&self, terminate: bool) -> anyhow::Result<()>;

    /// Routing keys this service answers on.
    fn routing_keys(&self) -> Vec<String> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// ServiceRegistry
// ---------------------------------------------------------------------------

/// Registry for lifecycle-managed services, looked up by `name()`.
pub struct ServiceRegistry {
    by_name: DashMap<&'static str, Arc<dyn ManagedService>>,
    /// Registration order for deterministic init/shutdown sequencing.
    init_order: RwLock<Vec<&'static str>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            init_order: RwLock::new(Vec::new()),
        }
    }

    /// Registers a service. Registration order determines init/shutdown
    /// sequencing.
    ///
    /// # Errors
    ///
    /// Returns an error if a service with the same name is already registered.
    pub fn register<T: ManagedService>(&self, service: T) -> anyhow::Result<()> {
        self.register_arc(Arc::new(service))
    }

    /// Registers an already shared service.
    ///
    /// # Errors
    ///
    /// Returns an error if a service with the same name is already registered.
    pub fn register_arc(&self, service: Arc<dyn ManagedService>) -> anyhow::Result<()> {
        let name = service.name();
        let mut order = self.init_order.write();
        if self.by_name.contains_key(name) {
            anyhow::bail!("service {name} is already registered");
        }
        self.by_name.insert(name, service);
        order.push(name);
        Ok(())
    }

    /// Retrieve a service by its name.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn ManagedService>> {
        self.by_name.get(name).map(|entry| entry.value().clone())
    }

    /// Service names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.init_order.read().clone()
    }

    /// Routing keys of every registered service, sorted and deduplicated.
    #[must_use]
    pub fn routing_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .by_name
            .iter()
            .flat_map(|entry| entry.value().routing_keys())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Initialize all registered services in registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if any service's `init()` call fails; later services
    /// are not initialized.
    pub async fn init_all(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        let order = self.names();
        for name in &order {
            if let Some(service) = self.get_by_name(name) {
                service
                    .init(ctx)
                    .await
                    .map_err(|e| e.context(format!("service {name} failed to initialize")))?;
            }
        }
        Ok(())
    }

    /// Shut down all registered services in reverse registration order.
    ///
    /// Every service is shut down even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first `shutdown()` error encountered.
    pub async fn shutdown_all(&self, terminate: bool) -> anyhow::Result<()> {
        let order = self.names();
        let mut first_error = None;
        for name in order.iter().rev() {
            if let Some(service) = self.get_by_name(name) {
                if let Err(e) = service.shutdown(terminate).await {
                    tracing::error!(service = name, error = %e, "service shutdown failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
