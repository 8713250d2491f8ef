use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use super::{
    AttemptDraft, AttemptStore, ExamCatalog, FinalizeOutcome, Grader, NewDefinition,
    NewScheduledExam, StartOutcome, StoreError, WriteOutcome,
};
use crate::db::models::{
    Attempt, AttemptSummary, ExamDefinition, OptionIndex, QuestionIndex, QuestionSlot,
    ScheduledExam,
};
use crate::db::types::RetakePolicy;
use crate::repositories::{attempts, definitions, scheduled_exams};

#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Distinguishes "already submitted" from "no such attempt/index" after a guarded write.
    async fn explain_rejected_write(&self, attempt_id: i64) -> Result<WriteOutcome, StoreError> {
        Ok(match attempts::submission_state(&self.pool, attempt_id).await? {
            Some(true) => WriteOutcome::Submitted,
            Some(false) | None => WriteOutcome::Missing,
        })
    }
}

#[async_trait]
impl ExamCatalog for PgStore {
    async fn create_definition(&self, new: NewDefinition) -> Result<ExamDefinition, StoreError> {
        Ok(definitions::create(&self.pool, new).await?)
    }

    async fn find_definition(&self, id: i64) -> Result<Option<ExamDefinition>, StoreError> {
        Ok(definitions::find_by_id(&self.pool, id).await?)
    }

    async fn create_scheduled_exam(
        &self,
        new: NewScheduledExam,
    ) -> Result<ScheduledExam, StoreError> {
        Ok(scheduled_exams::create(&self.pool, new).await?)
    }

    async fn find_scheduled_exam(&self, id: i64) -> Result<Option<ScheduledExam>, StoreError> {
        Ok(scheduled_exams::find_by_id(&self.pool, id).await?)
    }

    async fn set_exam_open(
        &self,
        id: i64,
        open: bool,
        now: PrimitiveDateTime,
    ) -> Result<Option<ScheduledExam>, StoreError> {
        Ok(scheduled_exams::set_open(&self.pool, id, open, now).await?)
    }
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn find_attempt(&self, id: i64) -> Result<Option<Attempt>, StoreError> {
        Ok(attempts::find_by_id(&self.pool, id).await?)
    }

    async fn find_in_progress(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Option<Attempt>, StoreError> {
        Ok(attempts::find_in_progress(&self.pool, exam_id, student_id).await?)
    }

    async fn start_attempt(
        &self,
        draft: AttemptDraft,
        policy: RetakePolicy,
    ) -> Result<StartOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        attempts::acquire_exam_student_lock(&mut *tx, draft.exam_id, draft.student_id).await?;

        if let Some(existing) =
            attempts::find_in_progress(&mut *tx, draft.exam_id, draft.student_id).await?
        {
            tx.commit().await?;
            return Ok(StartOutcome::Resumed(existing));
        }

        if policy == RetakePolicy::SingleSubmission
            && attempts::has_submitted(&mut *tx, draft.exam_id, draft.student_id).await?
        {
            tx.commit().await?;
            return Ok(StartOutcome::AlreadySubmitted);
        }

        let outcome = match attempts::insert(&mut *tx, &draft).await? {
            Some(created) => StartOutcome::Created(created),
            None => {
                let existing =
                    attempts::find_in_progress(&mut *tx, draft.exam_id, draft.student_id)
                        .await?
                        .ok_or(sqlx::Error::RowNotFound)?;
                StartOutcome::Resumed(existing)
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn find_question(
        &self,
        attempt_id: i64,
        index: QuestionIndex,
    ) -> Result<Option<QuestionSlot>, StoreError> {
        Ok(attempts::find_question(&self.pool, attempt_id, index).await?)
    }

    async fn write_selection(
        &self,
        attempt_id: i64,
        index: QuestionIndex,
        selected: &BTreeSet<OptionIndex>,
        now: PrimitiveDateTime,
    ) -> Result<WriteOutcome, StoreError> {
        if let Some(entry) =
            attempts::set_selection(&self.pool, attempt_id, index, selected, now).await?
        {
            return Ok(WriteOutcome::Applied(entry));
        }
        self.explain_rejected_write(attempt_id).await
    }

    async fn write_flag(
        &self,
        attempt_id: i64,
        index: QuestionIndex,
        flagged: bool,
        now: PrimitiveDateTime,
    ) -> Result<WriteOutcome, StoreError> {
        if let Some(entry) = attempts::set_flag(&self.pool, attempt_id, index, flagged, now).await?
        {
            return Ok(WriteOutcome::Applied(entry));
        }
        self.explain_rejected_write(attempt_id).await
    }

    async fn finalize_attempt(
        &self,
        attempt_id: i64,
        submitted_at: PrimitiveDateTime,
        grade: Grader,
    ) -> Result<FinalizeOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let Some(current) = attempts::lock_for_submit(&mut *tx, attempt_id).await? else {
            return Ok(FinalizeOutcome::Missing);
        };

        if current.is_submitted() {
            return Ok(FinalizeOutcome::AlreadySubmitted);
        }

        let card = grade(&current.answer_sheet, &current.answer_key);
        let attempt =
            attempts::mark_submitted(&mut *tx, attempt_id, card.score, submitted_at).await?;

        tx.commit().await?;
        Ok(FinalizeOutcome::Finalized { attempt, card })
    }

    async fn list_attempts_by_exam(
        &self,
        exam_id: i64,
    ) -> Result<Vec<AttemptSummary>, StoreError> {
        Ok(attempts::list_summaries_by_exam(&self.pool, exam_id).await?)
    }
}
