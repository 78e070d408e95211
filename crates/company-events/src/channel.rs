//! Bounded FIFO between request handlers and the dispatcher.
//!
//! The sending half is shared by every handler; the receiving half belongs to
//! the dispatcher alone. Closing is done through the sending half because the
//! lifecycle controller, not the consumer, decides when intake stops.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};

use crate::error::EventError;
use crate::event::EventRecord;

/// What `enqueue` does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueuePolicy {
    /// Return `QueueFull` immediately.
    FailFast,
    /// Wait up to the given duration for a free slot, then return `QueueFull`.
    Wait(Duration),
}

impl EnqueuePolicy {
    /// Maps a configured timeout to a policy; zero means fail fast.
    pub fn from_timeout_ms(ms: u64) -> Self {
        if ms == 0 {
            Self::FailFast
        } else {
            Self::Wait(Duration::from_millis(ms))
        }
    }
}

struct Shared {
    // `None` once closed. Locked only to clone or take the sender, never
    // across an await.
    tx: RwLock<Option<mpsc::Sender<EventRecord>>>,
    policy: EnqueuePolicy,
    capacity: usize,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, Option<mpsc::Sender<EventRecord>>> {
        self.tx.read().unwrap_or_else(|poisoned| {
            tracing::error!("event channel lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<mpsc::Sender<EventRecord>>> {
        self.tx.write().unwrap_or_else(|poisoned| {
            tracing::error!("event channel lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Creates the event channel.
///
/// # Errors
///
/// `EventError::ZeroCapacity` if `capacity` is zero.
pub fn event_channel(
    capacity: usize,
    policy: EnqueuePolicy,
) -> Result<(EventSender, EventReceiver), EventError> {
    if capacity == 0 {
        return Err(EventError::ZeroCapacity);
    }
    let (tx, rx) = mpsc::channel(capacity);
    let sender = EventSender {
        shared: Arc::new(Shared {
            tx: RwLock::new(Some(tx)),
            policy,
            capacity,
        }),
    };
    Ok((sender, EventReceiver { rx }))
}

/// Send-only view of the event channel. Cheap to clone.
#[derive(Clone)]
pub struct EventSender {
    shared: Arc<Shared>,
}

impl EventSender {
    /// Appends `record` to the queue.
    ///
    /// Does not wait when there is room. When the queue is full the
    /// configured [`EnqueuePolicy`] decides between waiting and failing.
    ///
    /// # Errors
    ///
    /// - `EventError::QueueFull` if no slot freed up in time.
    /// - `EventError::LifecycleMisuse` if the channel was closed, or the
    ///   dispatcher is gone. This is also logged at `error` level.
    pub async fn enqueue(&self, record: EventRecord) -> Result<(), EventError> {
        let Some(tx) = self.shared.read().clone() else {
            return Err(misuse(&record));
        };

        // `tx` is a clone that drops when this call returns; after `close`,
        // the receiver sees the end of the stream once the last in-flight
        // enqueue has finished.
        match self.shared.policy {
            EnqueuePolicy::FailFast => tx.try_send(record).map_err(|e| match e {
                TrySendError::Full(r) => full(&r),
                TrySendError::Closed(r) => misuse(&r),
            }),
            EnqueuePolicy::Wait(limit) => {
                tx.send_timeout(record, limit).await.map_err(|e| match e {
                    SendTimeoutError::Timeout(r) => full(&r),
                    SendTimeoutError::Closed(r) => misuse(&r),
                })
            }
        }
    }

    /// Stops intake. Records already queued stay queued and will be drained.
    ///
    /// Meant to be called exactly once, by the lifecycle controller. Later
    /// calls are logged and otherwise ignored.
    pub fn close(&self) {
        match self.shared.write().take() {
            Some(tx) => {
                let pending = tx.max_capacity() - tx.capacity();
                tracing::info!(pending, "event channel closed for new records");
            }
            None => tracing::warn!("event channel close requested twice"),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.read().is_none()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Records currently queued. Zero once closed.
    pub fn len(&self) -> usize {
        self.shared
            .read()
            .as_ref()
            .map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn policy(&self) -> EnqueuePolicy {
        self.shared.policy
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("capacity", &self.shared.capacity)
            .field("policy", &self.shared.policy)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn full(record: &EventRecord) -> EventError {
    tracing::warn!(
        id = %record.id(),
        kind = record.kind().as_str(),
        "event queue full, event dropped"
    );
    EventError::QueueFull {
        id: record.id(),
        kind: record.kind(),
    }
}

fn misuse(record: &EventRecord) -> EventError {
    tracing::error!(
        id = %record.id(),
        kind = record.kind().as_str(),
        "event offered after the event channel was closed; shutdown ordering is broken"
    );
    EventError::LifecycleMisuse {
        id: record.id(),
        kind: record.kind(),
    }
}

/// Receive-only view of the event channel, owned by the dispatcher.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<EventRecord>,
}

impl EventReceiver {
    /// Takes the next record, waiting while the queue is empty.
    ///
    /// Returns `None` once the channel is closed and every queued record has
    /// been taken.
    pub async fn next(&mut self) -> Option<EventRecord> {
        self.rx.recv().await
    }

    /// Number of records currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
