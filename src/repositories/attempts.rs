use std::collections::BTreeSet;

use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{
    AnswerEntry, Attempt, AttemptSummary, OptionIndex, QuestionIndex, QuestionSlot,
};
use crate::store::AttemptDraft;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, snapshot, answer_key, answer_sheet, question_count, \
    started_at, expires_at, submitted_at, score, updated_at";

const SUMMARY_COLUMNS: &str = "\
    id, exam_id, student_id, question_count, \
    (SELECT COUNT(*) FROM jsonb_each(answer_sheet) AS entry \
      WHERE jsonb_array_length(COALESCE(entry.value -> 'selected', '[]'::jsonb)) > 0) \
      AS answered_count, \
    started_at, expires_at, submitted_at, score";

/// Answer-sheet and snapshot documents are keyed by the decimal question index.
fn index_key(index: QuestionIndex) -> String {
    index.to_string()
}

pub(crate) async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!("SELECT {COLUMNS} FROM attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_in_progress(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: i64,
    student_id: i64,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts \
         WHERE exam_id = $1 AND student_id = $2 AND submitted_at IS NULL"
    ))
    .bind(exam_id)
    .bind(student_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn has_submitted(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: i64,
    student_id: i64,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM attempts \
         WHERE exam_id = $1 AND student_id = $2 AND submitted_at IS NOT NULL)",
    )
    .bind(exam_id)
    .bind(student_id)
    .fetch_one(executor)
    .await
}

/// Transaction-scoped lock serialising attempt creation for one student and exam.
pub(crate) async fn acquire_exam_student_lock(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: i64,
    student_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("attempt:{exam_id}:{student_id}"))
        .execute(executor)
        .await?;
    Ok(())
}

/// Returns `None` when another in-progress attempt won the partial unique index.
pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    draft: &AttemptDraft,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "INSERT INTO attempts (
            exam_id, student_id, snapshot, answer_key, answer_sheet, question_count,
            started_at, expires_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $7)
        ON CONFLICT DO NOTHING
        RETURNING {COLUMNS}"
    ))
    .bind(draft.exam_id)
    .bind(draft.student_id)
    .bind(Json(&draft.snapshot))
    .bind(Json(&draft.answer_key))
    .bind(Json(&draft.answer_sheet))
    .bind(draft.snapshot.len() as i32)
    .bind(draft.started_at)
    .bind(draft.expires_at)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_question(
    pool: &PgPool,
    id: i64,
    index: QuestionIndex,
) -> Result<Option<QuestionSlot>, sqlx::Error> {
    sqlx::query_as::<_, QuestionSlot>(
        "SELECT id AS attempt_id, student_id, expires_at, submitted_at,
                snapshot -> $2::text AS question,
                answer_sheet -> $2::text AS answer
         FROM attempts WHERE id = $1",
    )
    .bind(id)
    .bind(index_key(index))
    .fetch_optional(pool)
    .await
}

/// Rewrites one `answer_sheet` entry field in place and returns the updated entry.
/// `None` means no row matched: the attempt is absent, sealed, or lacks the index.
async fn set_entry_field(
    pool: &PgPool,
    id: i64,
    index: QuestionIndex,
    field: &'static str,
    value: serde_json::Value,
    now: PrimitiveDateTime,
) -> Result<Option<AnswerEntry>, sqlx::Error> {
    let entry: Option<Json<AnswerEntry>> = sqlx::query_scalar(
        "UPDATE attempts
         SET answer_sheet = jsonb_set(answer_sheet, ARRAY[$2::text, $3::text], $4::jsonb),
             updated_at = $5
         WHERE id = $1
           AND submitted_at IS NULL
           AND answer_sheet -> $2::text IS NOT NULL
         RETURNING answer_sheet -> $2::text",
    )
    .bind(id)
    .bind(index_key(index))
    .bind(field)
    .bind(value)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    Ok(entry.map(|entry| entry.0))
}

pub(crate) async fn set_selection(
    pool: &PgPool,
    id: i64,
    index: QuestionIndex,
    selected: &BTreeSet<OptionIndex>,
    now: PrimitiveDateTime,
) -> Result<Option<AnswerEntry>, sqlx::Error> {
    let value = serde_json::Value::Array(
        selected.iter().map(|option| serde_json::Value::from(*option)).collect(),
    );
    set_entry_field(pool, id, index, "selected", value, now).await
}

pub(crate) async fn set_flag(
    pool: &PgPool,
    id: i64,
    index: QuestionIndex,
    flagged: bool,
    now: PrimitiveDateTime,
) -> Result<Option<AnswerEntry>, sqlx::Error> {
    set_entry_field(pool, id, index, "flagged", serde_json::Value::Bool(flagged), now).await
}

/// `Some(true)` when submitted, `Some(false)` when in progress, `None` when absent.
pub(crate) async fn submission_state(pool: &PgPool, id: i64) -> Result<Option<bool>, sqlx::Error> {
    sqlx::query_scalar("SELECT submitted_at IS NOT NULL FROM attempts WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn lock_for_submit(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn mark_submitted(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
    score: f64,
    now: PrimitiveDateTime,
) -> Result<Attempt, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE attempts SET score = $2, submitted_at = $3, updated_at = $3
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(score)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_summaries_by_exam(
    pool: &PgPool,
    exam_id: i64,
) -> Result<Vec<AttemptSummary>, sqlx::Error> {
    sqlx::query_as::<_, AttemptSummary>(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM attempts WHERE exam_id = $1 ORDER BY started_at, id"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}
