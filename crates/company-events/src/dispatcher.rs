//! The single consumer of the event channel.

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::broker::{BrokerClient, BrokerMessage};
use crate::channel::EventReceiver;
use crate::event::EventRecord;

/// Counters reported when the dispatcher stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Records handed to the broker.
    pub dispatched: u64,
    /// Records that could not be serialised and were skipped.
    pub skipped: u64,
}

/// Drains the event channel into a broker.
///
/// The loop waits while the broker's buffer is full, so a slow broker backs
/// up into the event channel and from there into `enqueue`. It never waits
/// for an acknowledgement, never retries, and never puts a record back. A
/// failed delivery is logged from the broker's completion callback and the
/// record is gone.
pub struct EventDispatcher {
    receiver: EventReceiver,
    broker: Arc<dyn BrokerClient>,
    topic: String,
}

impl EventDispatcher {
    pub fn new(
        receiver: EventReceiver,
        broker: Arc<dyn BrokerClient>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            receiver,
            broker,
            topic: topic.into(),
        }
    }

    /// Runs [`run`](Self::run) on its own task.
    pub fn spawn(self) -> JoinHandle<DispatchSummary> {
        tokio::spawn(self.run())
    }

    /// Dispatches records until the channel is closed and drained.
    pub async fn run(mut self) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        tracing::info!(topic = %self.topic, "event dispatcher started");

        while let Some(record) = self.receiver.next().await {
            if self.dispatch(record).await {
                summary.dispatched += 1;
            } else {
                summary.skipped += 1;
            }
        }

        tracing::info!(
            dispatched = summary.dispatched,
            skipped = summary.skipped,
            "event channel drained, dispatcher stopped"
        );
        summary
    }

    async fn dispatch(&self, record: EventRecord) -> bool {
        tracing::info!("{record}");

        let id = record.id();
        let kind = record.kind();
        let payload = match record.to_payload() {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(%id, kind = kind.as_str(), error = %e, "failed to serialise event, skipping");
                return false;
            }
        };

        let message = BrokerMessage {
            topic: self.topic.clone(),
            key: Some(id.to_string().into_bytes()),
            payload,
        };
        self.broker.produce(
            message,
            Box::new(move |outcome| match outcome {
                Ok(()) => tracing::debug!(%id, kind = kind.as_str(), "event delivered to broker"),
                Err(e) => tracing::warn!(
                    %id,
                    kind = kind.as_str(),
                    error = %e,
                    "broker delivery failed, event dropped"
                ),
            }),
        )
        .await;
        true
    }
}
