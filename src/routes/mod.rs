pub mod admin;
pub mod health;
pub mod public;

use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Json},
    routing::{get, patch, post},
    BoxError, Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};

use crate::config::get_config;
use crate::middleware::{auth::require_hr_or_admin, cors::permissive_cors, rate_limit};
use crate::AppState;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

async fn handle_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(json!({ "error": "request_timeout" })),
        )
    } else {
        tracing::error!(error = %err, "unhandled middleware error");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "internal_error" })),
        )
    }
}

pub fn admin_router() -> Router<AppState> {
    let config = get_config();
    Router::new()
        .route(
            "/api/admin/tests",
            get(admin::list_tests).post(admin::create_test),
        )
        .route(
            "/api/admin/tests/:id",
            get(admin::get_test)
                .patch(admin::update_test)
                .delete(admin::delete_test),
        )
        .route("/api/admin/tests/:id/archive", post(admin::archive_test))
        .route("/api/admin/tests/:id/duplicate", post(admin::duplicate_test))
        .route(
            "/api/admin/tests/:id/archive-and-duplicate",
            post(admin::archive_and_duplicate),
        )
        .route(
            "/api/admin/submissions",
            get(admin::list_submissions).post(admin::create_submission),
        )
        .route("/api/admin/submissions/:id", get(admin::get_submission))
        .route(
            "/api/admin/submissions/:id/approve",
            post(admin::approve_submission),
        )
        .route(
            "/api/admin/submissions/:id/cancel",
            post(admin::cancel_submission),
        )
        .route(
            "/api/admin/submissions/:id/scores",
            post(admin::update_scores),
        )
        .route("/api/admin/dashboard/stats", get(admin::dashboard_stats))
        .route("/api/admin/audit-logs", get(admin::list_audit_logs))
        .layer(from_fn(require_hr_or_admin))
        .layer(from_fn_with_state(
            rate_limit::RateLimiter::new(config.admin_rps),
            rate_limit::rps_middleware,
        ))
}

pub fn public_router() -> Router<AppState> {
    let config = get_config();
    Router::new()
        .route(
            "/api/public/submissions/:token",
            get(public::get_submission_by_token),
        )
        .route(
            "/api/public/submissions/:token/answer",
            patch(public::save_answer),
        )
        .route(
            "/api/public/submissions/:token/submit",
            post(public::submit_answers),
        )
        .route(
            "/api/public/submissions/:token/result",
            get(public::get_result),
        )
        .layer(from_fn_with_state(
            rate_limit::RateLimiter::new(config.public_rps),
            rate_limit::rps_middleware,
        ))
}

/// Full application: health check, admin API and candidate API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .merge(admin_router())
        .merge(public_router())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .timeout(REQUEST_TIMEOUT),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(permissive_cors())
        .layer(TraceLayer::new_for_http())
}
