//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes notifications about committed stock changes to
//! consumers (push notification hubs, reporting projections, ERP sync).
//!
//! - **Transport-agnostic**: in-memory channels here; brokers elsewhere.
//! - **At-least-once delivery**: consumers must be idempotent.
//! - **No persistence**: the movement ledger is the durable history.
//!
//! Publication is a best-effort side effect. A failed publish never undoes
//! the stock mutation that produced the event.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to an event stream.
///
/// Each subscription gets a copy of all events published after it was
/// created (broadcast semantics). Intended for single-threaded consumption.
///
/// A bounded bus may skip a subscriber whose queue is full; `missed()` then
/// counts the skipped messages and the consumer must catch up from the
/// ledger instead of trusting the stream.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
    missed: Arc<AtomicU64>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self::tracked(receiver, Arc::default())
    }

    /// Subscription whose skipped-message count is kept by the publisher.
    pub fn tracked(receiver: Receiver<M>, missed: Arc<AtomicU64>) -> Self {
        Self { receiver, missed }
    }

    /// Messages the bus dropped for this subscriber.
    pub fn missed(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently queued without blocking.
    pub fn drain(&self) -> Vec<M> {
        let mut out = Vec::new();
        while let Ok(m) = self.receiver.try_recv() {
            out.push(m);
        }
        out
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// ```text
/// Orchestrator → commit scope (stock + ledger) → EventBus::publish → consumers
/// ```
///
/// Implementations must be `Send + Sync`; several request handlers publish
/// concurrently.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
