use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::collections::HashMap;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::schemas::{HealthResponse, RootResponse};

pub(crate) async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let response = RootResponse {
        message: state.settings().api().project_name.clone(),
        version: state.settings().api().version.clone(),
        api_prefix: state.settings().api().api_v1_str.clone(),
    };

    Json(response)
}

pub(crate) async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut status = "healthy".to_string();
    let mut components = HashMap::new();

    components
        .insert("storage".to_string(), state.settings().storage().backend.as_str().to_string());

    if let Some(db) = state.db() {
        match sqlx::query("SELECT 1").execute(db).await {
            Ok(_) => {
                components.insert("database".to_string(), "healthy".to_string());
            }
            Err(err) => {
                components.insert("database".to_string(), format!("unhealthy: {err}"));
                status = "unhealthy".to_string();
            }
        }
    }

    Json(HealthResponse { service: "lms-exam".to_string(), status, components })
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
