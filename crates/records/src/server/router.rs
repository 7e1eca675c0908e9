//! Axum router construction.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/session/login", post(handlers::login))
        .route("/session/logout", post(handlers::logout))
        .route(
            "/patients",
            get(handlers::search_patients).post(handlers::create_patient),
        )
        .route(
            "/patients/:patient_id",
            get(handlers::get_patient)
                .put(handlers::update_patient)
                .delete(handlers::delete_patient),
        )
        .route("/patients/:patient_id/visits", post(handlers::create_visit))
        .route(
            "/patients/:patient_id/visits/:visit_id",
            get(handlers::get_visit)
                .put(handlers::update_visit)
                .delete(handlers::delete_visit),
        )
        .route("/admin/audit", get(handlers::recent_audit_events))
        .route("/admin/audit/verify", get(handlers::verify_audit_chain))
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .with_state(state)
}
