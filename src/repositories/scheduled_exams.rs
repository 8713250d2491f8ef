use sqlx::PgPool;

use crate::db::models::ScheduledExam;
use crate::store::NewScheduledExam;

pub(crate) const COLUMNS: &str = "\
    id, test_id, title, start_date, end_date, duration_minutes, exam_type, is_open, \
    created_at, updated_at";

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: i64,
) -> Result<Option<ScheduledExam>, sqlx::Error> {
    sqlx::query_as::<_, ScheduledExam>(&format!(
        "SELECT {COLUMNS} FROM scheduled_exams WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn create(
    pool: &PgPool,
    new: NewScheduledExam,
) -> Result<ScheduledExam, sqlx::Error> {
    sqlx::query_as::<_, ScheduledExam>(&format!(
        "INSERT INTO scheduled_exams (
            test_id, title, start_date, end_date, duration_minutes, exam_type, is_open,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7, $7)
        RETURNING {COLUMNS}"
    ))
    .bind(new.test_id)
    .bind(&new.title)
    .bind(new.start_date)
    .bind(new.end_date)
    .bind(new.duration_minutes)
    .bind(new.exam_type.as_str())
    .bind(new.created_at)
    .fetch_one(pool)
    .await
}

pub(crate) async fn set_open(
    pool: &PgPool,
    id: i64,
    open: bool,
    now: time::PrimitiveDateTime,
) -> Result<Option<ScheduledExam>, sqlx::Error> {
    // Leave updated_at alone when nothing changes so repeated opens stay no-ops.
    sqlx::query_as::<_, ScheduledExam>(&format!(
        "UPDATE scheduled_exams
         SET is_open = $2,
             updated_at = CASE WHEN is_open = $2 THEN updated_at ELSE $3 END
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(open)
    .bind(now)
    .fetch_optional(pool)
    .await
}
