mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::schedule_exam))
        .route("/:exam_id", get(handlers::get_exam))
        .route("/:exam_id/open", post(handlers::open_exam))
        .route("/:exam_id/close", post(handlers::close_exam))
        .route("/:exam_id/start", post(handlers::start_attempt))
        .route("/:exam_id/attempts", get(handlers::list_attempts))
}
