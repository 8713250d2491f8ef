use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::extract::{ApiJson, ApiPath};
use crate::api::guards::CurrentCaller;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::schemas::attempt::{AttemptSummaryResponse, StartResponse};
use crate::schemas::exam::{ExamResponse, ExamSchedule};

pub(super) async fn schedule_exam(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    ApiJson(payload): ApiJson<ExamSchedule>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let exam =
        state.sessions().schedule_exam(&caller, payload.into_new(primitive_now_utc())).await?;

    Ok((StatusCode::CREATED, Json(exam.into())))
}

pub(super) async fn get_exam(
    State(state): State<AppState>,
    CurrentCaller(_caller): CurrentCaller,
    ApiPath(exam_id): ApiPath<i64>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = state.sessions().get_exam(exam_id).await?;
    Ok(Json(exam.into()))
}

pub(super) async fn open_exam(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    ApiPath(exam_id): ApiPath<i64>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = state.sessions().open_exam(exam_id, &caller, primitive_now_utc()).await?;
    Ok(Json(exam.into()))
}

pub(super) async fn close_exam(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    ApiPath(exam_id): ApiPath<i64>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = state.sessions().close_exam(exam_id, &caller, primitive_now_utc()).await?;
    Ok(Json(exam.into()))
}

pub(super) async fn start_attempt(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    ApiPath(exam_id): ApiPath<i64>,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    let now = primitive_now_utc();
    let started = state.sessions().start_attempt(exam_id, &caller, now).await?;

    let status = if started.resumed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(StartResponse::new(&started, now))))
}

pub(super) async fn list_attempts(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    ApiPath(exam_id): ApiPath<i64>,
) -> Result<Json<Vec<AttemptSummaryResponse>>, ApiError> {
    let attempts = state.sessions().list_attempts(exam_id, &caller).await?;
    Ok(Json(attempts.into_iter().map(AttemptSummaryResponse::from).collect()))
}
