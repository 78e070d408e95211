//! Error types for the event pipeline.

use std::time::Duration;
use uuid::Uuid;

use crate::event::EventKind;

/// Errors raised on the producer side of the event channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// The queue stayed full for the whole allotted wait. The record was not
    /// enqueued.
    #[error("event queue full, {kind} event for entity {id} was not enqueued")]
    QueueFull { id: Uuid, kind: EventKind },

    /// A record was offered after the channel had been closed for shutdown,
    /// or after the dispatcher went away. Always a lifecycle ordering bug.
    #[error("lifecycle misuse: {kind} event for entity {id} offered to a closed event channel")]
    LifecycleMisuse { id: Uuid, kind: EventKind },

    #[error("event channel capacity must be greater than zero")]
    ZeroCapacity,
}

/// Errors reported by a [`BrokerClient`](crate::BrokerClient).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// The broker answered but refused the message.
    #[error("broker rejected message (status {status}): {reason}")]
    Rejected { status: u16, reason: String },

    /// The broker could not be reached or the exchange failed midway.
    #[error("broker transport error: {0}")]
    Transport(String),

    /// The producer has been closed.
    #[error("producer is closed")]
    Closed,

    /// The close deadline passed before the message was delivered.
    #[error("producer did not flush within {0:?}")]
    CloseTimeout(Duration),

    #[error("invalid broker configuration: {0}")]
    Config(String),
}
