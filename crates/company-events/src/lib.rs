//! Domain-event dispatch for the company service.
//!
//! Every successful create, update or delete of a company becomes an
//! [`EventRecord`]. Request handlers push records into a bounded
//! [`EventSender`]; a single [`EventDispatcher`] drains the matching
//! [`EventReceiver`] and hands each record to a [`BrokerClient`].
//!
//! ```text
//! handlers --enqueue--> [ bounded FIFO ] --next--> dispatcher --produce--> broker
//! ```
//!
//! # Guarantees
//!
//! | Property | Behaviour |
//! |----------|-----------|
//! | Ordering | Strict FIFO over everything enqueued, as seen by the one dispatcher. |
//! | Backpressure | A full queue makes `enqueue` wait (bounded) or fail fast, per [`EnqueuePolicy`]. |
//! | Shutdown | After [`EventSender::close`] no new records are accepted; queued ones are still dispatched. |
//! | Delivery | At most once from this process. Broker failures are logged, never retried or re-queued. |
//!
//! # Usage
//!
//! ```rust,ignore
//! let (sender, receiver) = event_channel(100, EnqueuePolicy::Wait(Duration::from_millis(250)))?;
//! let dispatcher = EventDispatcher::new(receiver, broker.clone(), "companies").spawn();
//!
//! sender.enqueue(EventRecord::new(id, EventKind::Created)).await?;
//!
//! sender.close();
//! let summary = dispatcher.await?;
//! broker.close().await?;
//! ```

mod broker;
mod channel;
mod dispatcher;
mod error;
mod event;
mod rest_proxy;

pub use broker::{BrokerClient, BrokerMessage, DeliveryCallback, MemoryBroker};
pub use channel::{event_channel, EnqueuePolicy, EventReceiver, EventSender};
pub use dispatcher::{DispatchSummary, EventDispatcher};
pub use error::{BrokerError, EventError};
pub use event::{EventKind, EventRecord};
pub use rest_proxy::{RestProxyBroker, RestProxyConfig};
