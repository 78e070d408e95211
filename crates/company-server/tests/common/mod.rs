#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use company_events::{
    event_channel, DispatchSummary, EnqueuePolicy, EventDispatcher, EventReceiver, EventSender,
    MemoryBroker,
};
use company_server::lifecycle::LifecycleState;
use company_server::{app, locks::EntityLocks, middleware::JwtVerifier, AppState};
use jsonwebtoken::{encode, get_current_timestamp, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceExt;

pub const SECRET: &str = "test-secret-for-company-service";
pub const ISSUER: &str = "api.companyservice.io";

pub struct TestApp {
    pub router: Router,
    pub pool: company_db::DbPool,
    pub events: EventSender,
    pub broker: MemoryBroker,
    pub dispatcher: Option<JoinHandle<DispatchSummary>>,
    /// Set when the app was built without a running dispatcher.
    pub receiver: Option<EventReceiver>,
    /// Drives the lifecycle state the health check reports.
    pub lifecycle: watch::Sender<LifecycleState>,
    _dir: tempfile::TempDir,
}

pub async fn setup_app() -> TestApp {
    setup_app_with(100, EnqueuePolicy::FailFast, true).await
}

pub async fn setup_app_with(
    capacity: usize,
    policy: EnqueuePolicy,
    run_dispatcher: bool,
) -> TestApp {
    // Pooled `:memory:` connections would each see a different database.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("companies.db");
    let pool = company_db::create_pool(path.to_str().unwrap(), Default::default()).unwrap();
    company_db::run_migrations(&pool.get().unwrap()).unwrap();

    let broker = MemoryBroker::new();
    let (events, receiver) = event_channel(capacity, policy).unwrap();
    let (dispatcher, receiver) = if run_dispatcher {
        let d = EventDispatcher::new(receiver, Arc::new(broker.clone()), "companies").spawn();
        (Some(d), None)
    } else {
        (None, Some(receiver))
    };

    let (lifecycle, lifecycle_rx) = watch::channel(LifecycleState::Running);
    let state = AppState {
        pool: pool.clone(),
        events: events.clone(),
        locks: EntityLocks::new(),
        jwt: JwtVerifier::new(SECRET),
        env: "testing".to_string(),
        lifecycle: lifecycle_rx,
    };

    TestApp {
        router: app(state),
        pool,
        events,
        broker,
        dispatcher,
        receiver,
        lifecycle,
        _dir: dir,
    }
}

impl TestApp {
    /// Closes the event channel and waits for the dispatcher to drain it.
    pub async fn drain(&mut self) -> DispatchSummary {
        self.events.close();
        self.dispatcher
            .take()
            .expect("app was built without a dispatcher")
            .await
            .unwrap()
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        send_request(&self.router, req).await
    }

    pub async fn create(&self, body: Value) -> String {
        let (status, json) = self
            .send(Method::POST, "/v1/company", Some(&token()), Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {json}");
        json["id"].as_str().unwrap().to_string()
    }
}

pub async fn send_request(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

pub fn company_body(name: &str) -> Value {
    json!({
        "name": name,
        "description": "Description for this company",
        "employees": 100,
        "registered": true,
        "type": "Corporations"
    })
}

/// A valid HS512 token for the test secret.
pub fn token() -> String {
    token_with(Algorithm::HS512, SECRET, claims())
}

pub fn claims() -> Value {
    let now = get_current_timestamp();
    json!({
        "sub": "john@companyservice.io",
        "iss": ISSUER,
        "aud": ISSUER,
        "iat": now,
        "nbf": now,
        "exp": now + 3600,
    })
}

pub fn token_with(alg: Algorithm, secret: &str, claims: Value) -> String {
    encode(
        &Header::new(alg),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
