//! The broker hand-off seam.

use futures_util::future::{self, BoxFuture};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::BrokerError;
use crate::event::EventRecord;

/// One message for the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    /// Partitioning key. The dispatcher uses the entity id so that all events
    /// for one entity land on the same partition, in order.
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

/// Invoked exactly once with the outcome of a delivery. May run on any task
/// or thread.
pub type DeliveryCallback = Box<dyn FnOnce(Result<(), BrokerError>) + Send + 'static>;

/// A message-broker producer.
///
/// `produce` resolves once the message is in the producer's buffer, waiting
/// for room when the buffer is full. It never waits for the broker to
/// acknowledge: the outcome goes to `on_complete`. Messages handed over in a
/// given order must reach the broker in that order.
pub trait BrokerClient: Send + Sync {
    fn produce(&self, message: BrokerMessage, on_complete: DeliveryCallback) -> BoxFuture<'_, ()>;

    /// Flushes anything still buffered and releases the connection. Messages
    /// produced after this call fail with `BrokerError::Closed`.
    fn close(&self) -> BoxFuture<'_, Result<(), BrokerError>>;
}

#[derive(Debug, Default)]
struct MemoryState {
    delivered: Vec<BrokerMessage>,
    attempts: usize,
    fail_with: Option<BrokerError>,
    closed: bool,
}

/// In-process broker that keeps every delivered message.
///
/// Completes each delivery inline. Useful for tests and for running the
/// service without a broker.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes every following delivery fail with `error`, or succeed again
    /// when `None`.
    pub fn fail_deliveries(&self, error: Option<BrokerError>) {
        self.lock().fail_with = error;
    }

    /// Messages successfully delivered, in hand-off order.
    pub fn messages(&self) -> Vec<BrokerMessage> {
        self.lock().delivered.clone()
    }

    /// Delivered payloads decoded back into records. Payloads that do not
    /// decode are skipped.
    pub fn records(&self) -> Vec<EventRecord> {
        self.lock()
            .delivered
            .iter()
            .filter_map(|m| serde_json::from_slice(&m.payload).ok())
            .collect()
    }

    /// Every call to `produce`, successful or not.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl BrokerClient for MemoryBroker {
    fn produce(&self, message: BrokerMessage, on_complete: DeliveryCallback) -> BoxFuture<'_, ()> {
        let outcome = {
            let mut state = self.lock();
            state.attempts += 1;
            if state.closed {
                Err(BrokerError::Closed)
            } else if let Some(e) = state.fail_with.clone() {
                Err(e)
            } else {
                state.delivered.push(message);
                Ok(())
            }
        };
        on_complete(outcome);
        Box::pin(future::ready(()))
    }

    fn close(&self) -> BoxFuture<'_, Result<(), BrokerError>> {
        self.lock().closed = true;
        Box::pin(future::ready(Ok(())))
    }
}
