//! One-shot readiness barrier between broker setup and outgoing calls.
//!
//! The barrier starts closed and opens exactly once, after every responder
//! has declared its queue. Waiters use an `AtomicBool` fast path and fall
//! back to a `watch` channel so any number of tasks can block on the same
//! transition without a lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

/// What a caller does when the barrier is still closed after its timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessPolicy {
    /// Log one warning and send the call anyway.
    #[default]
    Degrade,
    /// Fail the call with `CallError::NotReady` without touching the broker.
    FailFast,
}

/// Process-wide "broker setup complete" signal.
#[derive(Debug)]
pub struct ReadinessBarrier {
    ready: AtomicBool,
    tx: watch::Sender<bool>,
}

impl ReadinessBarrier {
    /// Creates a closed barrier.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            ready: AtomicBool::new(false),
            tx,
        }
    }

    /// Opens the barrier and wakes every waiter.
    ///
    /// Idempotent. Returns `true` only for the call that performed the
    /// transition.
    pub fn signal_ready(&self) -> bool {
        if self.ready.swap(true, Ordering::AcqRel) {
            return false;
        }
        // send_replace stores the value even when nobody is subscribed yet.
        self.tx.send_replace(true);
        info!("broker setup complete, readiness barrier open");
        true
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Waits until the barrier opens or `timeout` elapses.
    ///
    /// Returns `true` if the barrier is open. Never errors; the caller decides
    /// what a `false` means.
    pub async fn await_ready(&self, timeout: Duration) -> bool {
        if self.is_ready() {
            return true;
        }

        let mut rx = self.tx.subscribe();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|ready| *ready))
            .await
            .map(|changed| changed.is_ok());
        match waited {
            Ok(true) => true,
            // The sender lives in `self`, so a closed channel cannot happen
            // while we hold `&self`; fall back to the flag regardless.
            Ok(false) | Err(_) => self.is_ready(),
        }
    }

    /// Receiver that observes the open transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ReadinessBarrier {
    fn default() -> Self {
        Self::new()
    }
}
