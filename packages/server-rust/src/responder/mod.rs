//! Responders: the listener side of a remote call.
//!
//! A responder binds handlers to routing keys, declares one queue per key
//! while the host is starting, and answers every delivery with a `finished`
//! or `failed` envelope. Each delivery runs in its own task, so a slow or
//! panicking handler never stalls the queue.

pub mod config;
pub mod handler;
pub mod middleware;
pub mod request;
pub mod router;

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use parking_lot::Mutex;
use queuecall_core::{Envelope, EnvelopeCodec, MessageHeader, Route, WireCodec};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::task::AbortOnDropHandle;
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

use crate::broker::{Delivery, QueueConsumer, QueueOptions};
use crate::host::registry::{ManagedService, ServiceContext};
use crate::host::shutdown::{InFlightGuard, ShutdownController};

pub use config::ResponderConfig;
pub use handler::{handler_fn, DomainHandler, HandlerService};
pub use middleware::{build_responder_pipeline, ResponderPipeline};
pub use request::{HandlerError, HandlerResponse, InboundRequest, RequestContext};
pub use router::HandlerRouter;

// ---------------------------------------------------------------------------
// ResponderBuilder
// ---------------------------------------------------------------------------

/// Collects handler bindings and settings for a [`Responder`].
pub struct ResponderBuilder {
    name: &'static str,
    router: HandlerRouter,
    config: ResponderConfig,
    codec: WireCodec,
    queue_options: QueueOptions,
}

impl ResponderBuilder {
    /// Binds `handler` to `routing_key`.
    #[must_use]
    pub fn bind<H: DomainHandler>(mut self, routing_key: impl Into<String>, handler: H) -> Self {
        let routing_key = routing_key.into();
        if !self.router.bind(routing_key.clone(), handler) {
            warn!(responder = self.name, routing_key = %routing_key, "handler rebound");
        }
        self
    }

    /// Binds `handler` to a declared route. The handler's request and
    /// response types must match the route's.
    #[must_use]
    pub fn route<H: DomainHandler>(self, route: &Route<H::Request, H::Response>, handler: H) -> Self {
        self.bind(route.key(), handler)
    }

    #[must_use]
    pub fn config(mut self, config: ResponderConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn codec(mut self, codec: WireCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Overrides the transient queue declaration.
    #[must_use]
    pub fn queue_options(mut self, options: QueueOptions) -> Self {
        self.queue_options = options;
        self
    }

    /// Builds the responder and its middleware pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if no handler is bound.
    pub fn build(self) -> anyhow::Result<Responder> {
        if self.router.is_empty() {
            anyhow::bail!("responder {} has no bound routing keys", self.name);
        }
        let routing_keys = self.router.routing_keys();
        let pipeline = build_responder_pipeline(self.router, &self.config);
        Ok(Responder {
            name: self.name,
            routing_keys,
            pipeline: Mutex::new(pipeline),
            config: self.config,
            codec: self.codec,
            queue_options: self.queue_options,
            running: Mutex::new(None),
        })
    }
}

// ---------------------------------------------------------------------------
// Responder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopMode {
    Run,
    Drain,
    Terminate,
}

struct Running {
    stop: watch::Sender<StopMode>,
    loops: Vec<JoinHandle<()>>,
}

/// Lifecycle-managed group of handlers sharing one pipeline.
pub struct Responder {
    name: &'static str,
    routing_keys: Vec<String>,
    pipeline: Mutex<ResponderPipeline>,
    config: ResponderConfig,
    codec: WireCodec,
    queue_options: QueueOptions,
    running: Mutex<Option<Running>>,
}

impl Responder {
    #[must_use]
    pub fn builder(name: &'static str) -> ResponderBuilder {
        ResponderBuilder {
            name,
            router: HandlerRouter::new(),
            config: ResponderConfig::default(),
            codec: WireCodec::default(),
            queue_options: QueueOptions::transient(),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    #[must_use]
    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }
}

#[async_trait]
impl ManagedService for Responder {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn init(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        if self.is_running() {
            anyhow::bail!("responder {} is already consuming", self.name);
        }

        // Declared queues must exist before init returns: the host opens the
        // readiness barrier right after.
        let mut consumers = Vec::with_capacity(self.routing_keys.len());
        for key in &self.routing_keys {
            let consumer = ctx
                .broker
                .declare_queue(key, self.queue_options)
                .await
                .with_context(|| format!("responder {} failed to declare queue {key}", self.name))?;
            consumers.push(consumer);
        }

        let (stop, _) = watch::channel(StopMode::Run);
        let pipeline = self.pipeline.lock().clone();
        let loops = consumers
            .into_iter()
            .map(|consumer| {
                let worker = ConsumeLoop {
                    responder: self.name,
                    consumer,
                    pipeline: pipeline.clone(),
                    codec: self.codec,
                    handler_timeout_ms: self.config.handler_timeout_ms,
                    drain_timeout: self.config.drain_timeout(),
                    shutdown: Arc::clone(&ctx.shutdown),
                    stop: stop.subscribe(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        *self.running.lock() = Some(Running { stop, loops });
        info!(
            responder = self.name,
            routing_keys = ?self.routing_keys,
            "responder consuming"
        );
        Ok(())
    }

    async fn shutdown(&self, terminate: bool) -> anyhow::Result<()> {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return Ok(());
        };

        running.stop.send_replace(if terminate {
            StopMode::Terminate
        } else {
            StopMode::Drain
        });

        for handle in running.loops {
            if let Err(e) = handle.await {
                warn!(responder = self.name, error = %e, "consume loop ended abnormally");
            }
        }
        info!(responder = self.name, terminate, "responder stopped");
        Ok(())
    }

    fn routing_keys(&self) -> Vec<String> {
        self.routing_keys.clone()
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("name", &self.name)
            .field("routing_keys", &self.routing_keys)
            .field("codec", &self.codec)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Consume loop
// ---------------------------------------------------------------------------

/// Receive loop for one queue.
struct ConsumeLoop {
    responder: &'static str,
    consumer: QueueConsumer,
    pipeline: ResponderPipeline,
    codec: WireCodec,
    handler_timeout_ms: u64,
    drain_timeout: std::time::Duration,
    shutdown: Arc<ShutdownController>,
    stop: watch::Receiver<StopMode>,
}

impl ConsumeLoop {
    async fn run(mut self) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                // Only stop modes are ever sent after Run.
                _ = self.stop.changed() => break,
                delivery = self.consumer.recv() => {
                    let Some(delivery) = delivery else {
                        warn!(
                            responder = self.responder,
                            queue = self.consumer.queue(),
                            "queue closed by broker"
                        );
                        break;
                    };
                    let guard = self.shutdown.in_flight_guard();
                    tasks.spawn(handle_delivery(
                        self.pipeline.clone(),
                        self.codec,
                        self.handler_timeout_ms,
                        delivery,
                        guard,
                    ));
                }
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        let queue = self.consumer.queue().to_string();
        // Detaching the consumer deletes a transient queue; undelivered
        // messages go with it and their callers see no reply.
        drop(self.consumer);

        let mode = *self.stop.borrow();
        if mode == StopMode::Terminate {
            tasks.abort_all();
        } else {
            let drained = tokio::time::timeout(self.drain_timeout, async {
                while tasks.join_next().await.is_some() {}
            })
            .await
            .is_ok();
            if !drained {
                warn!(
                    responder = self.responder,
                    queue = %queue,
                    remaining = tasks.len(),
                    "drain timeout elapsed, aborting handlers"
                );
                tasks.abort_all();
            }
        }
        // Wait for aborted tasks to unwind so their in-flight guards are gone.
        while tasks.join_next().await.is_some() {}
        debug!(responder = self.responder, queue = %queue, "consume loop stopped");
    }
}

/// Runs one delivery through the pipeline and replies.
///
/// The pipeline runs in its own task so a panicking handler is contained:
/// the delivery is dropped unanswered and the caller sees no reply. The
/// handler task is aborted along with this one, so the in-flight guard
/// never outlives the handler.
async fn handle_delivery(
    pipeline: ResponderPipeline,
    codec: WireCodec,
    handler_timeout_ms: u64,
    delivery: Delivery,
    _guard: InFlightGuard,
) {
    let request: Envelope<Value> = match codec.decode(&delivery.body) {
        Ok(envelope) => envelope,
        Err(e) => {
            error!(
                routing_key = %delivery.routing_key,
                message_id = %delivery.message_id,
                error = %e,
                "undecodable request"
            );
            let reply: Envelope<Value> = Envelope::failed(
                String::new(),
                format!("malformed request: {e}"),
                MessageHeader::anonymous(),
            );
            send_reply(codec, delivery, &reply);
            return;
        }
    };

    let ctx = RequestContext {
        routing_key: delivery.routing_key.clone(),
        correlation_id: request.uuid.clone(),
        header: request.header.clone(),
        operation: request.operation().map(str::to_string),
        handler_timeout_ms,
    };
    let uuid = request.uuid;
    let header = request.header;
    let inbound = InboundRequest {
        ctx,
        payload: request.payload,
    };

    // Aborting this delivery task must also abort the handler task.
    let handler = AbortOnDropHandle::new(tokio::spawn(pipeline.oneshot(inbound)));
    let reply = match handler.await {
        Ok(Ok(response)) => Envelope::finished(uuid, response.payload, header),
        Ok(Err(e)) => {
            error!(
                routing_key = %delivery.routing_key,
                correlation_id = %uuid,
                outcome = e.kind(),
                error = %e,
                "request failed"
            );
            Envelope::failed(uuid, e.to_string(), header)
        }
        Err(e) => {
            error!(
                routing_key = %delivery.routing_key,
                correlation_id = %uuid,
                panicked = e.is_panic(),
                "handler aborted, no reply sent"
            );
            return;
        }
    };

    send_reply(codec, delivery, &reply);
}

fn send_reply(codec: WireCodec, delivery: Delivery, reply: &Envelope<Value>) {
    match codec.encode(reply) {
        Ok(bytes) => {
            let routing_key = delivery.routing_key.clone();
            if !delivery.reply(bytes) {
                debug!(
                    routing_key = %routing_key,
                    correlation_id = %reply.uuid,
                    "caller gone before reply"
                );
            }
        }
        Err(e) => error!(
            routing_key = %delivery.routing_key,
            correlation_id = %reply.uuid,
            error = %e,
            "reply encoding failed"
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
