mod common;

use axum::http::{Method, StatusCode};
use common::{company_body, setup_app, setup_app_with, token};
use company_events::{EnqueuePolicy, EventKind};
use company_server::lifecycle::LifecycleState;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn healthcheck_reports_environment_and_version() {
    let app = setup_app().await;
    let (status, json) = app.send(Method::GET, "/v1/healthcheck", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "available");
    assert_eq!(json["environment"], "testing");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["lifecycle"], "running");
}

#[tokio::test]
async fn healthcheck_follows_lifecycle_transitions() {
    let app = setup_app().await;
    app.lifecycle.send_replace(LifecycleState::Draining);

    let (status, json) = app.send(Method::GET, "/v1/healthcheck", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["lifecycle"], "draining");
}

#[tokio::test]
async fn create_then_get_and_publish_created_event() {
    let mut app = setup_app().await;
    let id = app.create(company_body("Company One")).await;

    let (status, json) = app
        .send(Method::GET, &format!("/v1/company/{id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["company"]["id"], id.as_str());
    assert_eq!(json["company"]["name"], "Company One");
    assert_eq!(json["company"]["type"], "Corporations");
    assert!(json["company"].get("version").is_none());

    let summary = app.drain().await;
    assert_eq!(summary.dispatched, 1);
    let records = app.broker.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id().to_string(), id);
    assert_eq!(records[0].kind(), EventKind::Created);
}

#[tokio::test]
async fn create_with_invalid_fields_is_422_without_event() {
    let mut app = setup_app().await;
    let (status, json) = app
        .send(
            Method::POST,
            "/v1/company",
            Some(&token()),
            Some(json!({
                "name": "A name that is far too long",
                "employees": 0,
                "type": "Partnership"
            })),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let errors = &json["error"];
    assert!(errors["name"].is_string());
    assert!(errors["employees"].is_string());
    assert!(errors["registered"].is_string());
    assert!(errors["type"].is_string());

    assert_eq!(app.drain().await.dispatched, 0);
}

#[tokio::test]
async fn malformed_bodies_are_400() {
    let app = setup_app().await;

    let (status, json) = app
        .send(
            Method::POST,
            "/v1/company",
            Some(&token()),
            Some(json!({"name": "Acme", "owner": "someone"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "the server could not process your request");

    let (status, _) = app
        .send(
            Method::POST,
            "/v1/company",
            Some(&token()),
            Some(json!(["not", "an", "object"])),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bad_or_unknown_id_is_404() {
    let app = setup_app().await;

    let (status, json) = app
        .send(Method::GET, "/v1/company/not-a-uuid", None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "the requested resource could not be found");

    let (status, _) = app
        .send(
            Method::GET,
            &format!("/v1/company/{}", Uuid::new_v4()),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_name_is_a_validation_error() {
    let app = setup_app().await;
    app.create(company_body("Acme")).await;

    let (status, json) = app
        .send(
            Method::POST,
            "/v1/company",
            Some(&token()),
            Some(company_body("Acme")),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"]["name"].is_string());
}

#[tokio::test]
async fn patch_updates_only_supplied_fields() {
    let mut app = setup_app().await;
    let id = app.create(company_body("Acme")).await;

    let (status, json) = app
        .send(
            Method::PATCH,
            &format!("/v1/company/{id}"),
            Some(&token()),
            Some(json!({"employees": 250, "type": "Sole Proprietorship"})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let company = &json["company"];
    assert_eq!(company["employees"], 250);
    assert_eq!(company["type"], "Sole Proprietorship");
    assert_eq!(company["name"], "Acme");
    assert_eq!(company["registered"], true);

    app.drain().await;
    let kinds: Vec<EventKind> = app.broker.records().iter().map(|r| r.kind()).collect();
    assert_eq!(kinds, vec![EventKind::Created, EventKind::Updated]);
}

#[tokio::test]
async fn invalid_patch_leaves_company_unchanged() {
    let mut app = setup_app().await;
    let id = app.create(company_body("Acme")).await;

    let (status, json) = app
        .send(
            Method::PATCH,
            &format!("/v1/company/{id}"),
            Some(&token()),
            Some(json!({"employees": -3})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"]["employees"].is_string());

    let (_, json) = app
        .send(Method::GET, &format!("/v1/company/{id}"), None, None)
        .await;
    assert_eq!(json["company"]["employees"], 100);

    assert_eq!(app.drain().await.dispatched, 1);
}

#[tokio::test]
async fn patch_of_missing_company_is_404() {
    let app = setup_app().await;
    let (status, _) = app
        .send(
            Method::PATCH,
            &format!("/v1/company/{}", Uuid::new_v4()),
            Some(&token()),
            Some(json!({"employees": 5})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_removes_company_and_publishes_deleted() {
    let mut app = setup_app().await;
    let id = app.create(company_body("Acme")).await;
    let uri = format!("/v1/company/{id}");

    let (status, json) = app.send(Method::DELETE, &uri, Some(&token()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "company successfully deleted");

    let (status, _) = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(Method::DELETE, &uri, Some(&token()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.drain().await;
    let records = app.broker.records();
    let kinds: Vec<EventKind> = records.iter().map(|r| r.kind()).collect();
    assert_eq!(kinds, vec![EventKind::Created, EventKind::Deleted]);
    assert!(records.iter().all(|r| r.id().to_string() == id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_patches_of_one_company_all_apply() {
    let app = std::sync::Arc::new(setup_app().await);
    let id = app.create(company_body("Acme")).await;

    let mut tasks = Vec::new();
    for n in 1..=10 {
        let app = app.clone();
        let uri = format!("/v1/company/{id}");
        tasks.push(tokio::spawn(async move {
            app.send(
                Method::PATCH,
                &uri,
                Some(&token()),
                Some(json!({"employees": n})),
            )
            .await
            .0
        }));
    }
    for t in tasks {
        assert_eq!(t.await.unwrap(), StatusCode::OK);
    }

    let conn = app.pool.get().unwrap();
    let stored = company_store::get_company(&conn, Uuid::parse_str(&id).unwrap()).unwrap();
    assert_eq!(stored.version, 11);
}

#[tokio::test]
async fn full_event_queue_does_not_fail_the_request() {
    let app = setup_app_with(1, EnqueuePolicy::FailFast, false).await;

    app.create(company_body("First")).await;
    // The queue is now full and nothing drains it.
    let second = app.create(company_body("Second")).await;

    let receiver = app.receiver.as_ref().unwrap();
    assert_eq!(receiver.len(), 1);

    let (status, _) = app
        .send(Method::GET, &format!("/v1/company/{second}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn mutation_after_channel_close_still_commits() {
    let mut app = setup_app().await;
    app.drain().await;

    let id = app.create(company_body("Late")).await;
    let (status, _) = app
        .send(Method::GET, &format!("/v1/company/{id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.broker.records().is_empty());
}
