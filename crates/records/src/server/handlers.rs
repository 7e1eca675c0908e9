//! Axum request handlers. Each one resolves the caller from the identity
//! headers and delegates to [`RecordAccess`](crate::access::RecordAccess).

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::{
    protocol::{AuditEventView, ErrorResponse, HealthResponse, PatientInput, VisitInput},
    ServiceError,
};
use serde::Deserialize;
use tracing::warn;

use super::state::AppState;
use crate::{access::AccessError, db};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditParams {
    pub limit: Option<u32>,
}

/// Render a [`ServiceError`] as `{code, message}` with its status.
fn error_response(err: ServiceError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        warn!(code = err.code(), "request failed");
    }
    let body = ErrorResponse::new(err.code(), err.to_string());
    (status, Json(body)).into_response()
}

fn access_error(err: AccessError) -> Response {
    error_response(ServiceError::from(err))
}

fn bad_json(rejection: JsonRejection) -> Response {
    error_response(ServiceError::BadRequest(rejection.body_text()))
}

/// `POST /session/login`
pub async fn login(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let caller = state.caller(&headers);
    match state.records.login(caller.as_ref()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => access_error(e),
    }
}

/// `POST /session/logout`
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let caller = state.caller(&headers);
    match state.records.logout(caller.as_ref()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => access_error(e),
    }
}

/// `GET /patients?q=`: name search; an absent or blank `q` lists everyone.
pub async fn search_patients(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Response {
    let caller = state.caller(&headers);
    match state.records.search_patients(caller.as_ref(), &params.q).await {
        Ok(found) => Json(found).into_response(),
        Err(e) => access_error(e),
    }
}

/// `POST /patients`
pub async fn create_patient(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PatientInput>, JsonRejection>,
) -> Response {
    let Json(input) = match body {
        Ok(b) => b,
        Err(rejection) => return bad_json(rejection),
    };
    let caller = state.caller(&headers);
    match state.records.create_patient(caller.as_ref(), input).await {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(e) => access_error(e),
    }
}

/// `GET /patients/:patient_id`
pub async fn get_patient(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(patient_id): Path<i64>,
) -> Response {
    let caller = state.caller(&headers);
    match state.records.get_patient(caller.as_ref(), patient_id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => access_error(e),
    }
}

/// `PUT /patients/:patient_id`
pub async fn update_patient(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(patient_id): Path<i64>,
    body: Result<Json<PatientInput>, JsonRejection>,
) -> Response {
    let Json(input) = match body {
        Ok(b) => b,
        Err(rejection) => return bad_json(rejection),
    };
    let caller = state.caller(&headers);
    match state
        .records
        .update_patient(caller.as_ref(), patient_id, input)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => access_error(e),
    }
}

/// `DELETE /patients/:patient_id`
pub async fn delete_patient(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(patient_id): Path<i64>,
) -> Response {
    let caller = state.caller(&headers);
    match state.records.delete_patient(caller.as_ref(), patient_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => access_error(e),
    }
}

/// `POST /patients/:patient_id/visits`
pub async fn create_visit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(patient_id): Path<i64>,
    body: Result<Json<VisitInput>, JsonRejection>,
) -> Response {
    let Json(input) = match body {
        Ok(b) => b,
        Err(rejection) => return bad_json(rejection),
    };
    let caller = state.caller(&headers);
    match state
        .records
        .create_visit(caller.as_ref(), patient_id, input)
        .await
    {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(e) => access_error(e),
    }
}

/// `GET /patients/:patient_id/visits/:visit_id`
pub async fn get_visit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((patient_id, visit_id)): Path<(i64, i64)>,
) -> Response {
    let caller = state.caller(&headers);
    match state
        .records
        .get_visit(caller.as_ref(), patient_id, visit_id)
        .await
    {
        Ok(view) => Json(view).into_response(),
        Err(e) => access_error(e),
    }
}

/// `PUT /patients/:patient_id/visits/:visit_id`
pub async fn update_visit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((patient_id, visit_id)): Path<(i64, i64)>,
    body: Result<Json<VisitInput>, JsonRejection>,
) -> Response {
    let Json(input) = match body {
        Ok(b) => b,
        Err(rejection) => return bad_json(rejection),
    };
    let caller = state.caller(&headers);
    match state
        .records
        .update_visit(caller.as_ref(), patient_id, visit_id, input)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => access_error(e),
    }
}

/// `DELETE /patients/:patient_id/visits/:visit_id`
pub async fn delete_visit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((patient_id, visit_id)): Path<(i64, i64)>,
) -> Response {
    let caller = state.caller(&headers);
    match state
        .records
        .delete_visit(caller.as_ref(), patient_id, visit_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => access_error(e),
    }
}

/// `GET /admin/audit?limit=`, newest events first.
pub async fn recent_audit_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AuditParams>,
) -> Response {
    let caller = state.caller(&headers);
    match state
        .records
        .recent_audit_events(caller.as_ref(), params.limit)
        .await
    {
        Ok(events) => {
            let views: Vec<AuditEventView> = events.into_iter().map(|e| e.into_view()).collect();
            Json(views).into_response()
        }
        Err(e) => access_error(e),
    }
}

/// `GET /admin/audit/verify`
pub async fn verify_audit_chain(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let caller = state.caller(&headers);
    match state.records.verify_audit_chain(caller.as_ref()).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => access_error(e),
    }
}

/// `GET /health`: `200` when the record store answers, `503` otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let database_ready = db::ping(state.records.pool()).await;
    let (status_code, status_str) = if database_ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: status_str.into(),
        database_ready,
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}
