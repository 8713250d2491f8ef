use axum::extract::State;
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::extract::{ApiJson, ApiPath};
use crate::api::guards::CurrentCaller;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::schemas::attempt::{
    AnswerResponse, AttemptResponse, QuestionResponse, ReviewResponse, ScoreResponse,
};

pub(super) async fn get_attempt(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    ApiPath(attempt_id): ApiPath<i64>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt = state.sessions().get_attempt(attempt_id, &caller).await?;
    Ok(Json(attempt.into()))
}

pub(super) async fn review_attempt(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    ApiPath(attempt_id): ApiPath<i64>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let review = state.sessions().review_attempt(attempt_id, &caller).await?;
    Ok(Json(review.into()))
}

pub(super) async fn get_question(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    ApiPath((attempt_id, index)): ApiPath<(i64, u32)>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let view = state.sessions().get_question(attempt_id, index, &caller).await?;
    Ok(Json(view.into()))
}

/// Body is the full list of selected option indices; an empty list clears the answer.
pub(super) async fn select_answer(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    ApiPath((attempt_id, index)): ApiPath<(i64, u32)>,
    ApiJson(options): ApiJson<Vec<i64>>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let entry = state
        .sessions()
        .select_answer(attempt_id, index, &options, &caller, primitive_now_utc())
        .await?;
    Ok(Json(AnswerResponse::new(attempt_id, index, entry)))
}

pub(super) async fn flag_question(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    ApiPath((attempt_id, index)): ApiPath<(i64, u32)>,
    ApiJson(flagged): ApiJson<bool>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let entry = state
        .sessions()
        .flag_question(attempt_id, index, flagged, &caller, primitive_now_utc())
        .await?;
    Ok(Json(AnswerResponse::new(attempt_id, index, entry)))
}

pub(super) async fn end_attempt(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    ApiPath(attempt_id): ApiPath<i64>,
) -> Result<Json<ScoreResponse>, ApiError> {
    let submitted = state.sessions().end_attempt(attempt_id, &caller, primitive_now_utc()).await?;
    Ok(Json(submitted.into()))
}
