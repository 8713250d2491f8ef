use std::sync::{Arc, OnceLock};

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api;
use crate::api::guards::{USER_ID_HEADER, USER_ROLE_HEADER};
use crate::core::{config::Settings, state::AppState, time::primitive_now_utc};
use crate::db::models::ScheduledExam;
use crate::db::types::{ExamType, Role};
use crate::services::access::Caller;
use crate::store::{
    MemoryStore, NewDefinition, NewOption, NewQuestion, NewScheduledExam, PgStore,
};

/// `(account id, role header)` pairs used as gateway identities in HTTP tests.
pub(crate) type TestCaller = (i64, &'static str);

pub(crate) const ADMIN: TestCaller = (1, "ADMIN");
pub(crate) const TEACHER: TestCaller = (2, "TEACHER");
pub(crate) const STUDENT: TestCaller = (10, "STUDENT");
pub(crate) const OTHER_STUDENT: TestCaller = (11, "STUDENT");

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("LMS_ENV", "test");
    std::env::set_var("LMS_STRICT_CONFIG", "0");
    std::env::set_var("STORAGE_BACKEND", "memory");
    std::env::set_var("API_V1_STR", "/api/v1");
    std::env::set_var("ANSWER_GRACE_SECONDS", "30");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::remove_var("PROJECT_NAME");
    std::env::remove_var("BACKEND_CORS_ORIGINS");
    std::env::remove_var("DATABASE_MAX_CONNECTIONS");
}

pub(crate) async fn setup_test_context() -> TestContext {
    setup_test_context_with(&[]).await
}

/// Like [`setup_test_context`], with extra environment applied before settings load.
pub(crate) async fn setup_test_context_with(overrides: &[(&str, &str)]) -> TestContext {
    let guard = env_lock().await;
    set_test_env();
    for (key, value) in overrides {
        std::env::set_var(key, value);
    }

    let settings = Settings::load().expect("settings");
    let state = AppState::new(settings, None, Arc::new(MemoryStore::new()));
    let app = api::router::router(state.clone());

    TestContext { state, app, _guard: guard }
}

/// Postgres backend for storage tests. Returns `None`, and the caller skips, unless
/// `DATABASE_URL` is set. Tests only add rows under fresh exam ids and never truncate.
pub(crate) async fn pg_store() -> Option<(PgStore, sqlx::PgPool)> {
    let Some(database_url) =
        std::env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty())
    else {
        eprintln!("DATABASE_URL is not set; skipping Postgres store test");
        return None;
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&database_url)
        .await
        .expect("connect test database");
    crate::db::run_migrations(&pool).await.expect("migrations");

    Some((PgStore::new(pool.clone()), pool))
}

pub(crate) fn caller(identity: TestCaller) -> Caller {
    Caller::new(identity.0, Role::parse(identity.1))
}

/// Creates a two-question definition (correct sets `{1}` and `{0, 2}`) and an open exam
/// whose window spans the current time.
pub(crate) async fn seed_open_exam(state: &AppState, exam_type: ExamType) -> ScheduledExam {
    let sessions = state.sessions();
    let now = primitive_now_utc();
    let admin = caller(ADMIN);

    let question = |content: &str, correct: &[bool]| NewQuestion {
        content: content.to_string(),
        options: correct
            .iter()
            .enumerate()
            .map(|(index, is_correct)| NewOption {
                content: format!("{content} option {index}"),
                is_correct: *is_correct,
            })
            .collect(),
    };

    let definition = sessions
        .create_definition(
            &admin,
            NewDefinition {
                title: "Seeded definition".to_string(),
                questions: vec![
                    question("First", &[false, true, false]),
                    question("Second", &[true, false, true]),
                ],
                created_at: now,
            },
        )
        .await
        .expect("seed definition");

    let exam = sessions
        .schedule_exam(
            &admin,
            NewScheduledExam {
                test_id: definition.id,
                title: "Seeded exam".to_string(),
                start_date: now - Duration::hours(1),
                end_date: now + Duration::hours(2),
                duration_minutes: 60,
                exam_type,
                created_at: now,
            },
        )
        .await
        .expect("seed exam");

    sessions.open_exam(exam.id, &admin, now).await.expect("open seeded exam")
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    caller: Option<TestCaller>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some((account_id, role)) = caller {
        builder = builder
            .header(USER_ID_HEADER, account_id.to_string())
            .header(USER_ROLE_HEADER, role);
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
