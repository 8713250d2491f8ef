use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::extract::ApiJson;
use crate::api::guards::CurrentCaller;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::schemas::exam::{DefinitionCreate, DefinitionResponse};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/", post(create_definition))
}

async fn create_definition(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    ApiJson(payload): ApiJson<DefinitionCreate>,
) -> Result<(StatusCode, Json<DefinitionResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let definition =
        state.sessions().create_definition(&caller, payload.into_new(primitive_now_utc())).await?;

    Ok((StatusCode::CREATED, Json(definition.into())))
}
