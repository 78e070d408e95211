//! Company service library logic.

pub mod api;
pub mod api_company;
pub mod config;
pub mod lifecycle;
pub mod locks;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    handler::Handler,
    routing::{get, post},
    Extension, Router,
};
use company_db::DbPool;
use company_events::{EventError, EventKind, EventRecord, EventSender};
use lifecycle::LifecycleState;
use locks::EntityLocks;
use middleware::JwtVerifier;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Application state shared across all request handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Send side of the domain event channel.
    pub events: EventSender,
    /// Serialises read-modify-write handlers per company.
    pub locks: EntityLocks,
    /// Bearer token verification.
    pub jwt: JwtVerifier,
    /// Deployment environment name, reported by the health check.
    pub env: String,
    /// Current process lifecycle state, reported by the health check.
    pub lifecycle: watch::Receiver<LifecycleState>,
}

/// Maximum request body size (1 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Enqueues the domain event for a mutation that has already been committed.
///
/// Never fails the caller: the write is durable whatever happens here. A
/// dropped event is logged with the entity id so it can be reconciled.
pub async fn publish_event(events: &EventSender, id: Uuid, kind: EventKind) {
    match events.enqueue(EventRecord::new(id, kind)).await {
        Ok(()) => tracing::debug!(%id, kind = kind.as_str(), "domain event enqueued"),
        Err(EventError::QueueFull { .. }) => tracing::warn!(
            %id,
            kind = kind.as_str(),
            "mutation committed but its event was dropped: event queue full"
        ),
        Err(e) => tracing::error!(
            %id,
            kind = kind.as_str(),
            error = %e,
            "mutation committed during shutdown, event not published"
        ),
    }
}

/// Builds the application router with all routes.
///
/// Reads are public; every mutation sits behind the bearer token check.
pub fn app(state: AppState) -> Router {
    let auth = axum::middleware::from_fn(middleware::auth_middleware);

    Router::new()
        .route("/v1/healthcheck", get(api::healthcheck_handler))
        .route(
            "/v1/company",
            post(api_company::create_company_handler.layer(auth.clone())),
        )
        .route(
            "/v1/company/{id}",
            get(api_company::get_company_handler)
                .patch(api_company::update_company_handler.layer(auth.clone()))
                .delete(api_company::delete_company_handler.layer(auth)),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
