//! Broker abstraction: routing-key-addressed queues with a synchronous
//! request/reply primitive.
//!
//! The request client and responders only talk to the [`Broker`] trait.
//! [`InMemoryBroker`] is the process-local implementation used by tests and
//! single-process deployments.

pub mod config;
pub mod memory;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

pub use config::BrokerConfig;
pub use memory::InMemoryBroker;

// ---------------------------------------------------------------------------
// QueueOptions
// ---------------------------------------------------------------------------

/// Queue declaration flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Survives broker restarts.
    pub durable: bool,
    /// Only the declaring connection may consume.
    pub exclusive: bool,
    /// Deleted once its last consumer goes away.
    pub auto_delete: bool,
}

impl QueueOptions {
    /// Non-durable, auto-delete queue: lives exactly as long as the process
    /// that declared it.
    #[must_use]
    pub const fn transient() -> Self {
        Self {
            durable: false,
            exclusive: false,
            auto_delete: true,
        }
    }

    #[must_use]
    pub const fn durable() -> Self {
        Self {
            durable: true,
            exclusive: false,
            auto_delete: false,
        }
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self::transient()
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// A message delivered to a queue consumer.
///
/// Carries a one-shot reply slot that routes the response back to the waiting
/// sender; the consumer never learns who sent the request.
pub struct Delivery {
    /// Queue (routing key) the message arrived on.
    pub routing_key: String,
    /// Broker-level message id, for log correlation only.
    pub message_id: String,
    /// Encoded envelope.
    pub body: Bytes,
    reply: Option<oneshot::Sender<Bytes>>,
}

impl Delivery {
    #[must_use]
    pub fn new(
        routing_key: impl Into<String>,
        message_id: impl Into<String>,
        body: Bytes,
        reply: Option<oneshot::Sender<Bytes>>,
    ) -> Self {
        Self {
            routing_key: routing_key.into(),
            message_id: message_id.into(),
            body,
            reply,
        }
    }

    /// Returns `true` if the sender is still waiting for a reply.
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        self.reply.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Sends the reply. Returns `false` if the sender already gave up or the
    /// message was published without a reply slot.
    pub fn reply(mut self, body: Bytes) -> bool {
        self.reply.take().is_some_and(|tx| tx.send(body).is_ok())
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("routing_key", &self.routing_key)
            .field("message_id", &self.message_id)
            .field("body_len", &self.body.len())
            .field("expects_reply", &self.expects_reply())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// QueueConsumer
// ---------------------------------------------------------------------------

/// Receiving end of a declared queue.
///
/// Dropping the consumer detaches it from the queue; an auto-delete queue is
/// removed from the broker at that point.
pub struct QueueConsumer {
    queue: String,
    rx: mpsc::Receiver<Delivery>,
    on_drop: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl QueueConsumer {
    #[must_use]
    pub fn new(
        queue: impl Into<String>,
        rx: mpsc::Receiver<Delivery>,
        on_drop: Option<Box<dyn FnOnce() + Send + Sync>>,
    ) -> Self {
        Self {
            queue: queue.into(),
            rx,
            on_drop,
        }
    }

    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Waits for the next delivery. `None` once the broker closed the queue.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

impl Drop for QueueConsumer {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

impl fmt::Debug for QueueConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueConsumer")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ReplyOutcome / BrokerError
// ---------------------------------------------------------------------------

/// Result of one synchronous send-and-wait exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The consumer replied.
    Replied(Bytes),
    /// No queue is bound to the routing key; the message was dropped.
    Unroutable,
    /// The message was delivered but the consumer dropped it without replying.
    NoReply,
    /// No reply arrived before the deadline.
    TimedOut,
}

/// Errors raised by broker operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection is closed")]
    Closed,
    #[error("queue {queue} already has a consumer")]
    QueueExists { queue: String },
    #[error("failed to declare queue {queue}: {reason}")]
    Declare { queue: String, reason: String },
}

// ---------------------------------------------------------------------------
// Broker trait
// ---------------------------------------------------------------------------

/// Broker client contract used by clients and responders.
///
/// Implementations must accept concurrent `send_and_receive` calls from many
/// tasks. A client library whose channel is not safe for concurrent sends has
/// to serialize them inside its `Broker` implementation.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Declares the queue named `routing_key` and attaches a consumer to it.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Closed` if the broker is shut down, or
    /// `BrokerError::QueueExists` if the queue already has a live consumer,
    /// or `BrokerError::Declare` if a surviving queue was declared with a
    /// different durability.
    async fn declare_queue(
        &self,
        routing_key: &str,
        options: QueueOptions,
    ) -> Result<QueueConsumer, BrokerError>;

    /// Publishes `body` to `routing_key` and waits up to `timeout` for the
    /// consumer's reply.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Closed` if the broker is shut down. Missing
    /// queues and missing replies are outcomes, not errors.
    async fn send_and_receive(
        &self,
        routing_key: &str,
        body: Bytes,
        timeout: Duration,
    ) -> Result<ReplyOutcome, BrokerError>;

    /// Returns `true` while the broker connection is usable.
    fn is_open(&self) -> bool;

    /// Names of the currently declared queues.
    fn queue_names(&self) -> Vec<String>;

    /// Address reported by health checks.
    fn uri(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_options_are_the_default() {
        let options = QueueOptions::default();
        assert!(!options.durable);
        assert!(!options.exclusive);
        assert!(options.auto_delete);
        assert!(QueueOptions::durable().durable);
    }

    #[tokio::test]
    async fn delivery_reply_reaches_sender() {
        let (tx, rx) = oneshot::channel();
        let delivery = Delivery::new("q", "m-1", Bytes::from_static(b"req"), Some(tx));
        assert!(delivery.expects_reply());
        assert!(delivery.reply(Bytes::from_static(b"resp")));
        assert_eq!(rx.await.unwrap(), Bytes::from_static(b"resp"));
    }

    #[test]
    fn reply_after_sender_left_returns_false() {
        let (tx, rx) = oneshot::channel();
        drop(rx);
        let delivery = Delivery::new("q", "m-2", Bytes::new(), Some(tx));
        assert!(!delivery.expects_reply());
        assert!(!delivery.reply(Bytes::new()));
    }

    #[test]
    fn consumer_drop_runs_hook() {
        let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let (_tx, rx) = mpsc::channel(1);
        let hook_flag = flag.clone();
        let consumer = QueueConsumer::new(
            "q",
            rx,
            Some(Box::new(move || {
                hook_flag.store(true, std::sync::atomic::Ordering::SeqCst);
            })),
        );
        assert_eq!(consumer.queue(), "q");
        drop(consumer);
        assert!(flag.load(std::sync::atomic::Ordering::SeqCst));
    }
}
