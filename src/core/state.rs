use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::exam_session::ExamSessionService;
use crate::store::ExamStore;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: Option<PgPool>,
    sessions: ExamSessionService,
}

impl AppState {
    /// `db` is only present for the Postgres backend and is used for health reporting.
    pub(crate) fn new(settings: Settings, db: Option<PgPool>, store: Arc<dyn ExamStore>) -> Self {
        let sessions = ExamSessionService::new(
            store,
            time::Duration::seconds(settings.exam().answer_grace_seconds as i64),
        );
        Self { inner: Arc::new(InnerState { settings, db, sessions }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> Option<&PgPool> {
        self.inner.db.as_ref()
    }

    pub(crate) fn sessions(&self) -> &ExamSessionService {
        &self.inner.sessions
    }
}
