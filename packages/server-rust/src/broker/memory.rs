//! Process-local broker with routing-key-addressed queues.
//!
//! Models the broker's default exchange: a message published to a routing
//! key lands in the queue of the same name, or is dropped when no such queue
//! exists. Queue tracking uses `DashMap` so concurrent senders and declares
//! never contend on a global lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

use super::config::BrokerConfig;
use super::{Broker, BrokerError, Delivery, QueueConsumer, QueueOptions, ReplyOutcome};

/// A declared queue and the sender half feeding its consumer.
#[derive(Debug)]
struct QueueEntry {
    tx: mpsc::Sender<Delivery>,
    options: QueueOptions,
    /// Distinguishes re-declarations so a stale consumer's drop hook never
    /// removes its successor.
    generation: u64,
}

/// In-memory [`Broker`] implementation.
#[derive(Debug)]
pub struct InMemoryBroker {
    config: BrokerConfig,
    queues: Arc<DashMap<String, QueueEntry>>,
    open: AtomicBool,
    next_generation: AtomicU64,
}

impl InMemoryBroker {
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            queues: Arc::new(DashMap::new()),
            open: AtomicBool::new(true),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Closes the broker: every queue is dropped and consumers see the end of
    /// their stream. Further sends fail with `BrokerError::Closed`.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            self.queues.clear();
            info!(uri = %self.config.uri(), "in-memory broker closed");
        }
    }

    /// Returns `true` if a queue named `routing_key` is declared.
    #[must_use]
    pub fn has_queue(&self, routing_key: &str) -> bool {
        self.queues.contains_key(routing_key)
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(BrokerError::Closed)
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_queue(
        &self,
        routing_key: &str,
        options: QueueOptions,
    ) -> Result<QueueConsumer, BrokerError> {
        self.ensure_open()?;

        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        match self.queues.entry(routing_key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                // A durable queue outlives its consumer; re-attaching is allowed.
                let existing = occupied.get();
                if !existing.tx.is_closed() {
                    return Err(BrokerError::QueueExists {
                        queue: routing_key.to_string(),
                    });
                }
                if existing.options.durable != options.durable {
                    return Err(BrokerError::Declare {
                        queue: routing_key.to_string(),
                        reason: format!(
                            "inequivalent arg 'durable': existing {}, requested {}",
                            existing.options.durable, options.durable
                        ),
                    });
                }
                occupied.insert(QueueEntry {
                    tx,
                    options,
                    generation,
                });
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(QueueEntry {
                    tx,
                    options,
                    generation,
                });
            }
        }

        debug!(
            routing_key,
            durable = options.durable,
            auto_delete = options.auto_delete,
            "queue declared"
        );

        let on_drop: Option<Box<dyn FnOnce() + Send + Sync>> = if options.auto_delete {
            let queues = Arc::clone(&self.queues);
            let name = routing_key.to_string();
            Some(Box::new(move || {
                if queues
                    .remove_if(&name, |_, entry| entry.generation == generation)
                    .is_some()
                {
                    debug!(routing_key = %name, "auto-delete queue removed");
                }
            }))
        } else {
            None
        };

        Ok(QueueConsumer::new(routing_key, rx, on_drop))
    }

    async fn send_and_receive(
        &self,
        routing_key: &str,
        body: Bytes,
        timeout: Duration,
    ) -> Result<ReplyOutcome, BrokerError> {
        self.ensure_open()?;

        // Clone the sender so no map guard is held across an await point.
        let tx = match self.queues.get(routing_key) {
            Some(entry) => entry.tx.clone(),
            None => {
                debug!(routing_key, "no queue bound, message dropped");
                return Ok(ReplyOutcome::Unroutable);
            }
        };

        let message_id = Uuid::new_v4().to_string();
        let (reply_tx, reply_rx) = oneshot::channel();
        let delivery = Delivery::new(routing_key, message_id, body, Some(reply_tx));
        let deadline = tokio::time::Instant::now() + timeout;

        match tokio::time::timeout_at(deadline, tx.send(delivery)).await {
            Ok(Ok(())) => {}
            // Consumer detached from a durable queue; nobody will read it.
            Ok(Err(_)) => return Ok(ReplyOutcome::NoReply),
            Err(_) => return Ok(ReplyOutcome::TimedOut),
        }

        match tokio::time::timeout_at(deadline, reply_rx).await {
            Ok(Ok(bytes)) => Ok(ReplyOutcome::Replied(bytes)),
            Ok(Err(_)) => Ok(ReplyOutcome::NoReply),
            Err(_) => Ok(ReplyOutcome::TimedOut),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn uri(&self) -> String {
        self.config.uri()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
