use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};
use serde_json::json;
use validator::Validate;

use crate::dto::public_dto::{AnswerPayload, SaveAnswerResponse, SubmitAnswersRequest};
use crate::error::Result;
use crate::AppState;

#[axum::debug_handler]
pub async fn get_submission_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let view = state.submission_service.get_by_token(&token).await?;
    Ok(Json(view))
}

#[axum::debug_handler]
pub async fn save_answer(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<AnswerPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let question_id = payload.question_id;
    let timestamp = state.submission_service.save_answer(&token, payload).await?;
    Ok(Json(SaveAnswerResponse {
        saved: true,
        question_id,
        timestamp,
    }))
}

#[axum::debug_handler]
pub async fn submit_answers(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<SubmitAnswersRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let submission = state
        .submission_service
        .submit_answers(&token, payload)
        .await?;
    state
        .audit_service
        .record(
            None,
            "submission.submit",
            "submission",
            submission.id,
            Some(json!({ "status": submission.status })),
        )
        .await;
    Ok(Json(json!({
        "status": "success",
        "submission_id": submission.id,
        "submission_status": submission.status,
        "end_time": submission.end_time,
    })))
}

#[axum::debug_handler]
pub async fn get_result(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let result = state.submission_service.candidate_result(&token).await?;
    Ok(Json(result))
}
