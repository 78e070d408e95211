//! Company service binary.
//!
//! Starts the axum HTTP server with structured logging, database
//! initialization and the domain event pipeline, and shuts all of it down
//! in order on SIGTERM/SIGINT.

use company_events::{
    event_channel, BrokerClient, EnqueuePolicy, EventDispatcher, MemoryBroker, RestProxyBroker,
};
use company_server::config;
use company_server::lifecycle::{shutdown_signal, EventPipeline, Lifecycle};
use company_server::locks::EntityLocks;
use company_server::middleware::JwtVerifier;
use company_server::{app, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("CMPSRV_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration, the server cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        env = %config.server.env,
        "resolved startup configuration path"
    );

    let pool = company_db::create_pool(
        &config.database.path,
        company_db::DbSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool, check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied =
            company_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    let broker: Arc<dyn BrokerClient> = if config.broker.endpoint.is_empty() {
        tracing::warn!("no broker endpoint configured, events stay in process memory");
        Arc::new(MemoryBroker::new())
    } else {
        Arc::new(
            RestProxyBroker::new(config.broker.rest_proxy())
                .expect("failed to start broker producer, check the [broker] section"),
        )
    };

    let (events, receiver) = event_channel(
        config.events.capacity,
        EnqueuePolicy::from_timeout_ms(config.events.enqueue_timeout_ms),
    )
    .expect("invalid [events] configuration");
    tracing::info!(
        capacity = events.capacity(),
        policy = ?events.policy(),
        "event channel ready"
    );
    let dispatcher =
        EventDispatcher::new(receiver, broker.clone(), config.broker.topic.clone()).spawn();

    let lifecycle = Lifecycle::new(config.server.shutdown_grace());

    let state = AppState {
        pool,
        events: events.clone(),
        locks: EntityLocks::new(),
        jwt: JwtVerifier::new(&config.auth.jwt_secret),
        env: config.server.env.clone(),
        lifecycle: lifecycle.subscribe(),
    };

    let addr = SocketAddr::new(config.server.host, config.server.port);
    tracing::info!(%addr, "starting company service");
    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address, is another process using this port?");

    let report = lifecycle
        .serve(
            listener,
            app(state),
            EventPipeline {
                events,
                dispatcher,
                broker,
            },
            shutdown_signal(),
        )
        .await;

    tracing::info!(
        dispatched = report.dispatched,
        abandoned_requests = report.abandoned_requests,
        broker_closed_cleanly = report.broker_closed_cleanly,
        "company service shut down"
    );
}
