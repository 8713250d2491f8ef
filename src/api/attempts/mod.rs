mod handlers;

use axum::{routing::get, routing::post, routing::put, Router};

use crate::core::state::AppState;

/// Routes are nested under the same prefix as the exam routes; the static `attempt`
/// segment takes priority over `/:exam_id`.
pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/attempt/:attempt_id", get(handlers::get_attempt))
        .route("/attempt/:attempt_id/review", get(handlers::review_attempt))
        .route("/attempt/:attempt_id/question/:index", get(handlers::get_question))
        .route("/attempt/:attempt_id/question/:index/answer", put(handlers::select_answer))
        .route("/attempt/:attempt_id/question/:index/flag", put(handlers::flag_question))
        .route("/attempt/:attempt_id/end", post(handlers::end_attempt))
}
