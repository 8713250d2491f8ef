//! Storage contract for the exam-session core.
//!
//! Two backends implement it: [`PgStore`] on top of the Postgres repositories and
//! [`MemoryStore`] for local runs and tests. Both must uphold the same guarantees:
//! starting an attempt is atomic per `(exam, student)`, per-question writes touch
//! exactly one answer-sheet entry, and nothing mutates an attempt once `submitted_at`
//! is set.

mod memory;
mod postgres;

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{
    AnswerEntry, AnswerKey, AnswerSheet, Attempt, AttemptSummary, ExamDefinition, OptionIndex, QuestionIndex,
    QuestionSlot, ScheduledExam, Snapshot,
};
use crate::db::types::{ExamType, RetakePolicy};
use crate::services::scoring::ScoreCard;

pub(crate) use memory::MemoryStore;
pub(crate) use postgres::PgStore;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub(crate) struct NewDefinition {
    pub(crate) title: String,
    pub(crate) questions: Vec<NewQuestion>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub(crate) struct NewQuestion {
    pub(crate) content: String,
    pub(crate) options: Vec<NewOption>,
}

#[derive(Debug, Clone)]
pub(crate) struct NewOption {
    pub(crate) content: String,
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct NewScheduledExam {
    pub(crate) test_id: i64,
    pub(crate) title: String,
    pub(crate) start_date: PrimitiveDateTime,
    pub(crate) end_date: PrimitiveDateTime,
    pub(crate) duration_minutes: i32,
    pub(crate) exam_type: ExamType,
    pub(crate) created_at: PrimitiveDateTime,
}

/// A fully materialised attempt that has not been persisted yet.
#[derive(Debug, Clone)]
pub(crate) struct AttemptDraft {
    pub(crate) exam_id: i64,
    pub(crate) student_id: i64,
    pub(crate) snapshot: Snapshot,
    pub(crate) answer_key: AnswerKey,
    pub(crate) answer_sheet: AnswerSheet,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) expires_at: PrimitiveDateTime,
}

#[derive(Debug)]
pub(crate) enum StartOutcome {
    Created(Attempt),
    /// An in-progress attempt already existed and is returned untouched.
    Resumed(Attempt),
    /// The retake policy forbids another attempt.
    AlreadySubmitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    /// Carries the entry as stored after the write, sibling field included.
    Applied(AnswerEntry),
    Submitted,
    /// Attempt or question index does not exist.
    Missing,
}

#[derive(Debug)]
pub(crate) enum FinalizeOutcome {
    Finalized { attempt: Attempt, card: ScoreCard },
    AlreadySubmitted,
    Missing,
}

pub(crate) type Grader = fn(&AnswerSheet, &AnswerKey) -> ScoreCard;

#[async_trait]
pub(crate) trait ExamCatalog: Send + Sync {
    async fn create_definition(&self, new: NewDefinition) -> Result<ExamDefinition, StoreError>;

    async fn find_definition(&self, id: i64) -> Result<Option<ExamDefinition>, StoreError>;

    async fn create_scheduled_exam(
        &self,
        new: NewScheduledExam,
    ) -> Result<ScheduledExam, StoreError>;

    async fn find_scheduled_exam(&self, id: i64) -> Result<Option<ScheduledExam>, StoreError>;

    /// Returns `None` when the exam does not exist.
    async fn set_exam_open(
        &self,
        id: i64,
        open: bool,
        now: PrimitiveDateTime,
    ) -> Result<Option<ScheduledExam>, StoreError>;
}

#[async_trait]
pub(crate) trait AttemptStore: Send + Sync {
    async fn find_attempt(&self, id: i64) -> Result<Option<Attempt>, StoreError>;

    async fn find_in_progress(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Option<Attempt>, StoreError>;

    /// Check-and-insert, serialised per `(exam_id, student_id)`.
    async fn start_attempt(
        &self,
        draft: AttemptDraft,
        policy: RetakePolicy,
    ) -> Result<StartOutcome, StoreError>;

    async fn find_question(
        &self,
        attempt_id: i64,
        index: QuestionIndex,
    ) -> Result<Option<QuestionSlot>, StoreError>;

    /// Replaces the selected options of one question.
    async fn write_selection(
        &self,
        attempt_id: i64,
        index: QuestionIndex,
        selected: &BTreeSet<OptionIndex>,
        now: PrimitiveDateTime,
    ) -> Result<WriteOutcome, StoreError>;

    async fn write_flag(
        &self,
        attempt_id: i64,
        index: QuestionIndex,
        flagged: bool,
        now: PrimitiveDateTime,
    ) -> Result<WriteOutcome, StoreError>;

    /// Grades and seals the attempt in one step, excluding concurrent writers.
    async fn finalize_attempt(
        &self,
        attempt_id: i64,
        submitted_at: PrimitiveDateTime,
        grade: Grader,
    ) -> Result<FinalizeOutcome, StoreError>;

    async fn list_attempts_by_exam(&self, exam_id: i64)
        -> Result<Vec<AttemptSummary>, StoreError>;
}

pub(crate) trait ExamStore: ExamCatalog + AttemptStore {}

impl<T: ExamCatalog + AttemptStore> ExamStore for T {}
