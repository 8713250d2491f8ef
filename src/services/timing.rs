use time::{Duration, PrimitiveDateTime};

use crate::db::models::ScheduledExam;
use crate::services::errors::ExamError;

/// An attempt ends after the exam duration or at the end of the exam window, whichever
/// comes first.
pub(crate) fn attempt_deadline(
    started_at: PrimitiveDateTime,
    exam: &ScheduledExam,
) -> PrimitiveDateTime {
    let duration_deadline = started_at + Duration::minutes(i64::from(exam.duration_minutes));
    duration_deadline.min(exam.end_date)
}

pub(crate) fn ensure_within_window(
    exam: &ScheduledExam,
    now: PrimitiveDateTime,
) -> Result<(), ExamError> {
    if now < exam.start_date {
        return Err(ExamError::OutsideWindow("Exam has not started yet"));
    }
    if now > exam.end_date {
        return Err(ExamError::OutsideWindow("Exam has already ended"));
    }
    Ok(())
}

pub(crate) fn accepts_answers(
    expires_at: PrimitiveDateTime,
    grace: Duration,
    now: PrimitiveDateTime,
) -> bool {
    now <= expires_at + grace
}
