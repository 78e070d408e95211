//! Ordered HTTP producer for a Kafka REST proxy (v2 API).
//!
//! `produce` puts the message into a bounded buffer, waiting for room when it
//! is full. A single worker task drains the buffer in order and POSTs one
//! message per request to `{endpoint}/topics/{topic}`, using the binary
//! embedded format (base64 key and value). Each outcome goes to the
//! message's callback. A message still buffered or in flight when `close`
//! gives up is completed with `BrokerError::CloseTimeout`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::broker::{BrokerClient, BrokerMessage, DeliveryCallback};
use crate::error::BrokerError;

const CONTENT_TYPE: &str = "application/vnd.kafka.binary.v2+json";
const ACCEPT: &str = "application/vnd.kafka.v2+json";

/// Connection settings for [`RestProxyBroker`].
#[derive(Debug, Clone)]
pub struct RestProxyConfig {
    /// Base URL of the REST proxy, e.g. `http://localhost:8082`.
    pub endpoint: String,
    /// Messages that may wait for the worker before `produce` blocks.
    pub buffer_capacity: usize,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// How long `close` waits for the buffer to drain.
    pub close_timeout: Duration,
}

/// A buffered message and its callback.
///
/// Dropping one that was never completed reports `CloseTimeout`, which covers
/// the buffer and the in-flight request when the worker is aborted.
struct Pending {
    message: BrokerMessage,
    on_complete: Option<DeliveryCallback>,
    close_timeout: Duration,
}

impl Pending {
    fn complete(mut self, outcome: Result<(), BrokerError>) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(outcome);
        }
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(Err(BrokerError::CloseTimeout(self.close_timeout)));
        }
    }
}

#[derive(Serialize)]
struct ProduceRequest<'a> {
    records: [ProduceRecord<'a>; 1],
}

#[derive(Serialize)]
struct ProduceRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    value: &'a str,
}

#[derive(Deserialize)]
struct ProduceResponse {
    #[serde(default)]
    offsets: Vec<PartitionOffset>,
}

#[derive(Deserialize)]
struct PartitionOffset {
    error_code: Option<i64>,
    error: Option<String>,
}

pub struct RestProxyBroker {
    endpoint: String,
    queue: Mutex<Option<mpsc::Sender<Pending>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    close_timeout: Duration,
}

impl RestProxyBroker {
    /// Builds the HTTP client and starts the delivery worker.
    ///
    /// Must be called from inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// `BrokerError::Config` if the endpoint is empty, the buffer capacity is
    /// zero, or the HTTP client cannot be built.
    pub fn new(config: RestProxyConfig) -> Result<Self, BrokerError> {
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(BrokerError::Config("broker endpoint is empty".to_string()));
        }
        if config.buffer_capacity == 0 {
            return Err(BrokerError::Config(
                "broker buffer capacity must be greater than zero".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BrokerError::Config(e.to_string()))?;

        let (tx, rx) = mpsc::channel(config.buffer_capacity);
        let worker = tokio::spawn(deliver_all(client, endpoint.clone(), rx));
        tracing::info!(endpoint = %endpoint, "kafka rest proxy producer started");

        Ok(Self {
            endpoint,
            queue: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            close_timeout: config.close_timeout,
        })
    }

    fn queue(&self) -> MutexGuard<'_, Option<mpsc::Sender<Pending>>> {
        self.queue.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl std::fmt::Debug for RestProxyBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestProxyBroker")
            .field("endpoint", &self.endpoint)
            .field("close_timeout", &self.close_timeout)
            .finish_non_exhaustive()
    }
}

impl BrokerClient for RestProxyBroker {
    fn produce(&self, message: BrokerMessage, on_complete: DeliveryCallback) -> BoxFuture<'_, ()> {
        let pending = Pending {
            message,
            on_complete: Some(on_complete),
            close_timeout: self.close_timeout,
        };
        // Clone the sender so the lock is not held while waiting for room.
        let tx = self.queue().clone();
        Box::pin(async move {
            match tx {
                Some(tx) => {
                    if let Err(mpsc::error::SendError(pending)) = tx.send(pending).await {
                        pending.complete(Err(BrokerError::Closed));
                    }
                }
                None => pending.complete(Err(BrokerError::Closed)),
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), BrokerError>> {
        Box::pin(async move {
            // Dropping the sender lets the worker finish what is buffered and exit.
            drop(self.queue().take());
            let worker = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
            let Some(mut worker) = worker else {
                return Ok(());
            };

            match tokio::time::timeout(self.close_timeout, &mut worker).await {
                Ok(Ok(())) => {
                    tracing::info!(endpoint = %self.endpoint, "kafka rest proxy producer flushed");
                    Ok(())
                }
                Ok(Err(e)) => Err(BrokerError::Transport(format!("producer worker failed: {e}"))),
                Err(_) => {
                    worker.abort();
                    // Resolves once the task is dropped, so every pending
                    // callback has run before close returns.
                    let _ = worker.await;
                    tracing::warn!(
                        endpoint = %self.endpoint,
                        timeout = ?self.close_timeout,
                        "kafka rest proxy producer did not flush in time, undelivered messages failed"
                    );
                    Err(BrokerError::CloseTimeout(self.close_timeout))
                }
            }
        })
    }
}

async fn deliver_all(client: reqwest::Client, endpoint: String, mut rx: mpsc::Receiver<Pending>) {
    while let Some(pending) = rx.recv().await {
        let outcome = post(&client, &endpoint, &pending.message).await;
        pending.complete(outcome);
    }
    tracing::debug!("kafka rest proxy worker drained");
}

async fn post(
    client: &reqwest::Client,
    endpoint: &str,
    message: &BrokerMessage,
) -> Result<(), BrokerError> {
    let value = BASE64.encode(&message.payload);
    let body = ProduceRequest {
        records: [ProduceRecord {
            key: message.key.as_ref().map(|k| BASE64.encode(k)),
            value: &value,
        }],
    };
    let body = serde_json::to_vec(&body).map_err(|e| BrokerError::Transport(e.to_string()))?;

    let response = client
        .post(format!("{endpoint}/topics/{}", message.topic))
        .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
        .header(reqwest::header::ACCEPT, ACCEPT)
        .body(body)
        .send()
        .await
        .map_err(|e| BrokerError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let reason = response.text().await.unwrap_or_default();
        return Err(BrokerError::Rejected {
            status: status.as_u16(),
            reason,
        });
    }

    // A 200 can still carry a per-partition error.
    if let Ok(parsed) = response.json::<ProduceResponse>().await {
        if let Some(offset) = parsed
            .offsets
            .into_iter()
            .find(|o| o.error_code.is_some() || o.error.is_some())
        {
            return Err(BrokerError::Rejected {
                status: status.as_u16(),
                reason: offset
                    .error
                    .unwrap_or_else(|| format!("error code {}", offset.error_code.unwrap_or(-1))),
            });
        }
    }

    Ok(())
}
