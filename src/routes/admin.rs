use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::dto::admin_dto::{
    CreateSubmissionPayload, CreateTestPayload, ListAuditLogsQuery, ListSubmissionsQuery,
    ListTestsQuery, ManualScoresPayload, UpdateTestPayload,
};
use crate::error::{Error, Result};
use crate::middleware::auth::Claims;
use crate::models::submission::{SubmissionFilter, SubmissionStatus};
use crate::models::test::TestFilter;
use crate::AppState;

// Tests

#[axum::debug_handler]
pub async fn create_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTestPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let test = state.test_service.create_test(payload).await?;
    state
        .audit_service
        .record(
            Some(&claims.sub),
            "test.create",
            "test",
            test.id,
            Some(json!({ "name": test.name, "questions": test.questions.len() })),
        )
        .await;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "test": test })),
    ))
}

#[axum::debug_handler]
pub async fn list_tests(
    State(state): State<AppState>,
    Query(query): Query<ListTestsQuery>,
) -> Result<impl IntoResponse> {
    let filter = TestFilter {
        include_archived: query.include_archived.unwrap_or(false),
        search: query.search,
    };
    let page = state
        .test_service
        .list_tests(filter, query.page.unwrap_or(1), query.per_page.unwrap_or(20))
        .await?;
    Ok(Json(page))
}

#[axum::debug_handler]
pub async fn get_test(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let (test, submission_count) = state.test_service.get_test_with_count(id).await?;
    Ok(Json(json!({
        "total_possible_score": test.total_possible_score(),
        "submission_count": submission_count,
        "test": test,
    })))
}

#[axum::debug_handler]
pub async fn update_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTestPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let structural = payload.is_structural();
    let test = state.test_service.update_test(id, payload).await?;
    state
        .audit_service
        .record(
            Some(&claims.sub),
            "test.update",
            "test",
            test.id,
            Some(json!({ "structural": structural })),
        )
        .await;
    Ok(Json(json!({ "status": "success", "test": test })))
}

#[axum::debug_handler]
pub async fn delete_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.test_service.delete_test(id).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "test.delete", "test", id, None)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn archive_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let test = state.test_service.archive_test(id).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "test.archive", "test", id, None)
        .await;
    Ok(Json(json!({ "status": "success", "test": test })))
}

#[axum::debug_handler]
pub async fn duplicate_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let copy = state.test_service.duplicate_test(id).await?;
    state
        .audit_service
        .record(
            Some(&claims.sub),
            "test.duplicate",
            "test",
            copy.id,
            Some(json!({ "source_test_id": id })),
        )
        .await;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "test": copy })),
    ))
}

#[axum::debug_handler]
pub async fn archive_and_duplicate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let next = state.test_service.archive_and_duplicate(id).await?;
    state
        .audit_service
        .record(
            Some(&claims.sub),
            "test.archive_and_duplicate",
            "test",
            next.id,
            Some(json!({ "previous_version_id": id, "version": next.version })),
        )
        .await;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "archived_test_id": id, "test": next })),
    ))
}

// Submissions

#[axum::debug_handler]
pub async fn create_submission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateSubmissionPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let submission = state.submission_service.create_submission(payload).await?;
    state
        .audit_service
        .record(
            Some(&claims.sub),
            "submission.create",
            "submission",
            submission.id,
            Some(json!({ "test_id": submission.test_id })),
        )
        .await;
    let access_token = submission.access_token.clone();
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "submission": submission,
            "access_token": access_token,
        })),
    ))
}

#[axum::debug_handler]
pub async fn list_submissions(
    State(state): State<AppState>,
    Query(query): Query<ListSubmissionsQuery>,
) -> Result<impl IntoResponse> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().parse::<SubmissionStatus>())
        .transpose()
        .map_err(Error::BadRequest)?;
    let filter = SubmissionFilter {
        test_id: query.test_id,
        status,
        needs_review: query.needs_review,
    };
    let page = state
        .submission_service
        .list_submissions(filter, query.page.unwrap_or(1), query.limit.unwrap_or(20))
        .await?;
    Ok(Json(page))
}

#[axum::debug_handler]
pub async fn get_submission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let detail = state.submission_service.get_submission_detail(id).await?;
    Ok(Json(detail))
}

#[axum::debug_handler]
pub async fn approve_submission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let submission = state.submission_service.approve_submission(id).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "submission.approve", "submission", id, None)
        .await;
    Ok(Json(json!({ "status": "success", "submission": submission })))
}

#[axum::debug_handler]
pub async fn cancel_submission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let submission = state.submission_service.cancel_submission(id).await?;
    state
        .audit_service
        .record(Some(&claims.sub), "submission.cancel", "submission", id, None)
        .await;
    Ok(Json(json!({ "status": "success", "submission": submission })))
}

#[axum::debug_handler]
pub async fn update_scores(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ManualScoresPayload>,
) -> Result<impl IntoResponse> {
    let changes = serde_json::to_value(&payload.scores)?;
    let submission = state
        .submission_service
        .update_manual_scores(id, payload)
        .await?;
    state
        .audit_service
        .record(
            Some(&claims.sub),
            "submission.scores",
            "submission",
            id,
            Some(json!({ "scores": changes, "status": submission.status })),
        )
        .await;
    Ok(Json(json!({ "status": "success", "submission": submission })))
}

// Reporting

#[axum::debug_handler]
pub async fn dashboard_stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let stats = state.submission_service.dashboard_stats().await?;
    Ok(Json(stats))
}

#[axum::debug_handler]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<ListAuditLogsQuery>,
) -> Result<impl IntoResponse> {
    let logs = state
        .audit_service
        .list(query.entity_id, query.limit)
        .await?;
    Ok(Json(json!({ "items": logs })))
}
