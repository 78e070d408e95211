//! Process lifecycle: serve, then stop intake, drain events and close the
//! broker, in that order.
//!
//! ```text
//! Running --signal--> (grace period for in-flight requests)
//!         --> Draining (event channel closed, dispatcher drains)
//!         --> Stopped  (broker flushed and closed)
//! ```

use axum::Router;
use company_events::{BrokerClient, DispatchSummary, EventSender};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    Draining,
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        })
    }
}

/// The event side of the process, handed to [`Lifecycle::serve`] so it can
/// be shut down after the HTTP listener.
pub struct EventPipeline {
    pub events: EventSender,
    pub dispatcher: JoinHandle<DispatchSummary>,
    pub broker: Arc<dyn BrokerClient>,
}

/// What happened during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Records the dispatcher handed to the broker over the process lifetime.
    pub dispatched: u64,
    /// Whether in-flight requests were cut off when the grace period ran out.
    pub abandoned_requests: bool,
    /// Whether the broker flushed and closed without error.
    pub broker_closed_cleanly: bool,
}

pub struct Lifecycle {
    state: watch::Sender<LifecycleState>,
    grace: Duration,
}

impl Lifecycle {
    pub fn new(grace: Duration) -> Self {
        let (state, _) = watch::channel(LifecycleState::Running);
        Self { state, grace }
    }

    /// Observes state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    fn transition(&self, next: LifecycleState) {
        let prev = self.state.send_replace(next);
        tracing::info!(from = %prev, to = %next, "lifecycle transition");
    }

    /// Serves `router` on `listener` until `signal` resolves, then shuts the
    /// process down in order.
    ///
    /// Requests still running when the grace period ends are abandoned.
    /// Events they enqueued before that are still dispatched.
    pub async fn serve<S>(
        self,
        listener: TcpListener,
        router: Router,
        pipeline: EventPipeline,
        signal: S,
    ) -> ShutdownReport
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.await;
                })
                .await
        });

        let server_exited = tokio::select! {
            () = signal => {
                tracing::info!(
                    grace = ?self.grace,
                    "shutdown requested, no longer accepting connections"
                );
                false
            }
            res = &mut server => {
                log_server_exit(res);
                true
            }
        };

        let mut abandoned_requests = false;
        if !server_exited {
            let _ = stop_tx.send(());
            match tokio::time::timeout(self.grace, &mut server).await {
                Ok(res) => log_server_exit(res),
                Err(_) => {
                    tracing::warn!("grace period elapsed, abandoning in-flight requests");
                    server.abort();
                    abandoned_requests = true;
                }
            }
        }

        self.transition(LifecycleState::Draining);
        pipeline.events.close();
        let dispatched = match pipeline.dispatcher.await {
            Ok(summary) => summary.dispatched,
            Err(e) => {
                tracing::error!(error = %e, "event dispatcher task failed");
                0
            }
        };

        let broker_closed_cleanly = match pipeline.broker.close().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "broker did not close cleanly, continuing shutdown");
                false
            }
        };

        self.transition(LifecycleState::Stopped);
        ShutdownReport {
            dispatched,
            abandoned_requests,
            broker_closed_cleanly,
        }
    }
}

fn log_server_exit(res: Result<std::io::Result<()>, tokio::task::JoinError>) {
    match res {
        Ok(Ok(())) => tracing::info!("http server stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "http server failed"),
        Err(e) => tracing::error!(error = %e, "http server task failed"),
    }
}

/// Resolves on SIGINT (Ctrl+C) or, on unix, SIGTERM.
///
/// A handler that cannot be installed is logged and never fires; the other
/// one still works.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
