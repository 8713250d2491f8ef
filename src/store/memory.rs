use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use sqlx::types::Json;
use time::PrimitiveDateTime;

use super::{
    AttemptDraft, AttemptStore, ExamCatalog, FinalizeOutcome, Grader, NewDefinition,
    NewScheduledExam, StartOutcome, StoreError, WriteOutcome,
};
use crate::db::models::{
    AnswerEntry, Attempt, AttemptSummary, DefinitionOption, DefinitionQuestion, ExamDefinition,
    OptionIndex, QuestionIndex, QuestionSlot, ScheduledExam,
};
use crate::db::types::RetakePolicy;

/// In-process backend. Attempt creation runs under the table write lock; every attempt
/// carries its own mutex so writers to one attempt never block another.
#[derive(Default)]
pub(crate) struct MemoryStore {
    catalog: RwLock<Catalog>,
    attempts: RwLock<AttemptTable>,
}

#[derive(Default)]
struct Catalog {
    definitions: HashMap<i64, ExamDefinition>,
    exams: HashMap<i64, ScheduledExam>,
    last_id: i64,
}

impl Catalog {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Default)]
struct AttemptTable {
    records: HashMap<i64, Arc<Mutex<Attempt>>>,
    by_student: HashMap<(i64, i64), Vec<i64>>,
    last_id: i64,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock(record: &Mutex<Attempt>) -> MutexGuard<'_, Attempt> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn record(&self, attempt_id: i64) -> Option<Arc<Mutex<Attempt>>> {
        read(&self.attempts).records.get(&attempt_id).cloned()
    }

    fn update_entry(
        &self,
        attempt_id: i64,
        index: QuestionIndex,
        now: PrimitiveDateTime,
        apply: impl FnOnce(&mut AnswerEntry),
    ) -> WriteOutcome {
        let Some(record) = self.record(attempt_id) else {
            return WriteOutcome::Missing;
        };
        let mut attempt = lock(&record);

        if attempt.is_submitted() {
            return WriteOutcome::Submitted;
        }
        let Some(entry) = attempt.answer_sheet.0.get_mut(&index) else {
            return WriteOutcome::Missing;
        };
        apply(entry);
        let stored = entry.clone();
        attempt.updated_at = now;
        WriteOutcome::Applied(stored)
    }
}

#[async_trait]
impl ExamCatalog for MemoryStore {
    async fn create_definition(&self, new: NewDefinition) -> Result<ExamDefinition, StoreError> {
        let mut catalog = write(&self.catalog);
        let id = catalog.next_id();

        let mut questions = Vec::with_capacity(new.questions.len());
        for question in new.questions {
            let question_id = catalog.next_id();
            let options = question
                .options
                .into_iter()
                .map(|option| DefinitionOption {
                    id: catalog.next_id(),
                    content: option.content,
                    is_correct: option.is_correct,
                })
                .collect();
            questions.push(DefinitionQuestion {
                id: question_id,
                content: question.content,
                options,
            });
        }

        let definition =
            ExamDefinition { id, title: new.title, questions, created_at: new.created_at };
        catalog.definitions.insert(id, definition.clone());
        Ok(definition)
    }

    async fn find_definition(&self, id: i64) -> Result<Option<ExamDefinition>, StoreError> {
        Ok(read(&self.catalog).definitions.get(&id).cloned())
    }

    async fn create_scheduled_exam(
        &self,
        new: NewScheduledExam,
    ) -> Result<ScheduledExam, StoreError> {
        let mut catalog = write(&self.catalog);
        let id = catalog.next_id();
        let exam = ScheduledExam {
            id,
            test_id: new.test_id,
            title: new.title,
            start_date: new.start_date,
            end_date: new.end_date,
            duration_minutes: new.duration_minutes,
            exam_type: new.exam_type,
            is_open: false,
            created_at: new.created_at,
            updated_at: new.created_at,
        };
        catalog.exams.insert(id, exam.clone());
        Ok(exam)
    }

    async fn find_scheduled_exam(&self, id: i64) -> Result<Option<ScheduledExam>, StoreError> {
        Ok(read(&self.catalog).exams.get(&id).cloned())
    }

    async fn set_exam_open(
        &self,
        id: i64,
        open: bool,
        now: PrimitiveDateTime,
    ) -> Result<Option<ScheduledExam>, StoreError> {
        let mut catalog = write(&self.catalog);
        let Some(exam) = catalog.exams.get_mut(&id) else {
            return Ok(None);
        };
        if exam.is_open != open {
            exam.is_open = open;
            exam.updated_at = now;
        }
        Ok(Some(exam.clone()))
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn find_attempt(&self, id: i64) -> Result<Option<Attempt>, StoreError> {
        Ok(self.record(id).map(|record| lock(&record).clone()))
    }

    async fn find_in_progress(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Option<Attempt>, StoreError> {
        let table = read(&self.attempts);
        let Some(ids) = table.by_student.get(&(exam_id, student_id)) else {
            return Ok(None);
        };
        Ok(ids
            .iter()
            .filter_map(|id| table.records.get(id))
            .map(|record| lock(record))
            .find(|attempt| !attempt.is_submitted())
            .map(|attempt| attempt.clone()))
    }

    async fn start_attempt(
        &self,
        draft: AttemptDraft,
        policy: RetakePolicy,
    ) -> Result<StartOutcome, StoreError> {
        let mut table = write(&self.attempts);
        let key = (draft.exam_id, draft.student_id);

        let mut any_submitted = false;
        for id in table.by_student.get(&key).into_iter().flatten() {
            let Some(record) = table.records.get(id) else { continue };
            let attempt = lock(record);
            if !attempt.is_submitted() {
                return Ok(StartOutcome::Resumed(attempt.clone()));
            }
            any_submitted = true;
        }

        if any_submitted && policy == RetakePolicy::SingleSubmission {
            return Ok(StartOutcome::AlreadySubmitted);
        }

        table.last_id += 1;
        let id = table.last_id;
        let attempt = Attempt {
            id,
            exam_id: draft.exam_id,
            student_id: draft.student_id,
            question_count: draft.snapshot.len() as i32,
            snapshot: Json(draft.snapshot),
            answer_key: Json(draft.answer_key),
            answer_sheet: Json(draft.answer_sheet),
            started_at: draft.started_at,
            expires_at: draft.expires_at,
            submitted_at: None,
            score: None,
            updated_at: draft.started_at,
        };

        table.records.insert(id, Arc::new(Mutex::new(attempt.clone())));
        table.by_student.entry(key).or_default().push(id);
        Ok(StartOutcome::Created(attempt))
    }

    async fn find_question(
        &self,
        attempt_id: i64,
        index: QuestionIndex,
    ) -> Result<Option<QuestionSlot>, StoreError> {
        let Some(record) = self.record(attempt_id) else {
            return Ok(None);
        };
        let attempt = lock(&record);
        Ok(Some(QuestionSlot {
            attempt_id: attempt.id,
            student_id: attempt.student_id,
            expires_at: attempt.expires_at,
            submitted_at: attempt.submitted_at,
            question: attempt.snapshot.get(&index).cloned().map(Json),
            answer: attempt.answer_sheet.get(&index).cloned().map(Json),
        }))
    }

    async fn write_selection(
        &self,
        attempt_id: i64,
        index: QuestionIndex,
        selected: &BTreeSet<OptionIndex>,
        now: PrimitiveDateTime,
    ) -> Result<WriteOutcome, StoreError> {
        Ok(self.update_entry(attempt_id, index, now, |entry| entry.selected = selected.clone()))
    }

    async fn write_flag(
        &self,
        attempt_id: i64,
        index: QuestionIndex,
        flagged: bool,
        now: PrimitiveDateTime,
    ) -> Result<WriteOutcome, StoreError> {
        Ok(self.update_entry(attempt_id, index, now, |entry| entry.flagged = flagged))
    }

    async fn finalize_attempt(
        &self,
        attempt_id: i64,
        submitted_at: PrimitiveDateTime,
        grade: Grader,
    ) -> Result<FinalizeOutcome, StoreError> {
        let Some(record) = self.record(attempt_id) else {
            return Ok(FinalizeOutcome::Missing);
        };
        let mut attempt = lock(&record);

        if attempt.is_submitted() {
            return Ok(FinalizeOutcome::AlreadySubmitted);
        }

        let card = grade(&attempt.answer_sheet, &attempt.answer_key);
        attempt.score = Some(card.score);
        attempt.submitted_at = Some(submitted_at);
        attempt.updated_at = submitted_at;

        Ok(FinalizeOutcome::Finalized { attempt: attempt.clone(), card })
    }

    async fn list_attempts_by_exam(
        &self,
        exam_id: i64,
    ) -> Result<Vec<AttemptSummary>, StoreError> {
        let table = read(&self.attempts);
        let mut summaries: Vec<AttemptSummary> = table
            .records
            .values()
            .map(|record| lock(record))
            .filter(|attempt| attempt.exam_id == exam_id)
            .map(|attempt| attempt.summary())
            .collect();
        summaries.sort_by_key(|summary| (summary.started_at, summary.id));
        Ok(summaries)
    }
}
