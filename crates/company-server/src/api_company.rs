//! Company CRUD handlers.
//!
//! Each mutating handler publishes its domain event only after the store
//! call has returned successfully.

use crate::{api::ApiError, middleware::AuthenticatedSubject, publish_event, AppState};
use axum::{
    extract::{rejection::JsonRejection, Extension, Json, Path},
    http::StatusCode,
};
use company_events::EventKind;
use company_types::{validate_company, validate_new_company, Company, CompanyInput, ValidationErrors};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// A malformed id cannot name an existing company, so it is a 404.
fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound)
}

fn read_body(payload: Result<Json<CompanyInput>, JsonRejection>) -> Result<CompanyInput, ApiError> {
    payload
        .map(|Json(input)| input)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// Runs `f` with a pooled connection on the blocking thread pool.
async fn with_conn<T, F>(state: &Arc<AppState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> Result<T, ApiError> + Send + 'static,
{
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {e}")))?;
        f(&conn)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {e}")))?
}

/// Handler for `GET /v1/company/{id}`.
pub async fn get_company_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let company = with_conn(&state, move |conn| {
        Ok(company_store::get_company(conn, id)?)
    })
    .await?;

    Ok(Json(json!({ "company": company })))
}

/// Handler for `POST /v1/company`.
pub async fn create_company_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthenticatedSubject(subject)): Extension<AuthenticatedSubject>,
    payload: Result<Json<CompanyInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let input = read_body(payload)?;
    let new_company = validate_new_company(&input).map_err(ApiError::FailedValidation)?;

    let id = with_conn(&state, move |conn| {
        Ok(company_store::create_company(conn, &new_company)?)
    })
    .await?;

    tracing::info!(%id, %subject, "company created");
    publish_event(&state.events, id, EventKind::Created).await;

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// Handler for `PATCH /v1/company/{id}`.
///
/// Absent fields keep their stored value. The entity lock is held from the
/// read to the write, so concurrent patches of one company apply in turn
/// instead of racing into an edit conflict.
pub async fn update_company_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthenticatedSubject(subject)): Extension<AuthenticatedSubject>,
    Path(id): Path<String>,
    payload: Result<Json<CompanyInput>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let input = read_body(payload)?;

    let _guard = state.locks.lock(id).await;
    let company: Company = with_conn(&state, move |conn| {
        let mut company = company_store::get_company(conn, id)?;

        let mut errors = ValidationErrors::default();
        input.apply_to(&mut company, &mut errors);
        validate_company(&company, &mut errors);
        if !errors.is_empty() {
            return Err(ApiError::FailedValidation(errors));
        }

        Ok(company_store::update_company(conn, &company)?)
    })
    .await?;

    tracing::info!(%id, %subject, version = company.version, "company updated");
    publish_event(&state.events, id, EventKind::Updated).await;

    Ok(Json(json!({ "company": company })))
}

/// Handler for `DELETE /v1/company/{id}`.
pub async fn delete_company_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthenticatedSubject(subject)): Extension<AuthenticatedSubject>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;

    let _guard = state.locks.lock(id).await;
    with_conn(&state, move |conn| {
        Ok(company_store::delete_company(conn, id)?)
    })
    .await?;

    tracing::info!(%id, %subject, "company deleted");
    publish_event(&state.events, id, EventKind::Deleted).await;

    Ok(Json(json!({ "message": "company successfully deleted" })))
}
