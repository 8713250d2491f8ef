use std::collections::BTreeSet;
use std::sync::Arc;

use time::{Duration, PrimitiveDateTime};

use crate::core::metrics;
use crate::db::models::{
    AnswerEntry, Attempt, AttemptSummary, ExamDefinition, OptionIndex, QuestionIndex,
    ScheduledExam, SnapshotOption,
};
use crate::services::access::{self, Caller};
use crate::services::errors::ExamError;
use crate::services::scoring::{self, ScoreCard};
use crate::services::{snapshot, timing};
use crate::store::{
    AttemptDraft, ExamStore, FinalizeOutcome, NewDefinition, NewScheduledExam, StartOutcome,
    WriteOutcome,
};

#[derive(Debug)]
pub(crate) struct StartedAttempt {
    pub(crate) attempt: Attempt,
    pub(crate) resumed: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct QuestionView {
    pub(crate) attempt_id: i64,
    pub(crate) index: QuestionIndex,
    pub(crate) question_id: i64,
    pub(crate) content: String,
    pub(crate) options: Vec<SnapshotOption>,
    pub(crate) answer: AnswerEntry,
}

#[derive(Debug)]
pub(crate) struct SubmittedAttempt {
    pub(crate) attempt: Attempt,
    pub(crate) card: ScoreCard,
}

#[derive(Debug, Clone)]
pub(crate) struct QuestionReview {
    pub(crate) index: QuestionIndex,
    pub(crate) question_id: i64,
    pub(crate) content: String,
    pub(crate) options: Vec<SnapshotOption>,
    pub(crate) selected: BTreeSet<OptionIndex>,
    pub(crate) correct: BTreeSet<OptionIndex>,
    pub(crate) flagged: bool,
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct AttemptReview {
    pub(crate) summary: AttemptSummary,
    pub(crate) questions: Vec<QuestionReview>,
}

/// Runs the attempt lifecycle on top of an [`ExamStore`].
///
/// Every operation receives the caller and the current time explicitly; nothing here
/// reads the clock.
#[derive(Clone)]
pub(crate) struct ExamSessionService {
    store: Arc<dyn ExamStore>,
    answer_grace: Duration,
}

impl ExamSessionService {
    pub(crate) fn new(store: Arc<dyn ExamStore>, answer_grace: Duration) -> Self {
        Self { store, answer_grace }
    }

    pub(crate) async fn create_definition(
        &self,
        caller: &Caller,
        new: NewDefinition,
    ) -> Result<ExamDefinition, ExamError> {
        access::require_privileged(caller)?;

        if new.questions.is_empty() {
            return Err(ExamError::InvalidDefinition(
                "Exam definition must contain at least one question".to_string(),
            ));
        }
        for (position, question) in new.questions.iter().enumerate() {
            if question.options.is_empty() {
                return Err(ExamError::InvalidDefinition(format!(
                    "Question {position} must have at least one option"
                )));
            }
            if !question.options.iter().any(|option| option.is_correct) {
                return Err(ExamError::InvalidDefinition(format!(
                    "Question {position} must have at least one correct option"
                )));
            }
        }

        let definition = self.store.create_definition(new).await?;
        tracing::info!(
            definition_id = definition.id,
            questions = definition.questions.len(),
            created_by = caller.account_id,
            "Exam definition created"
        );
        Ok(definition)
    }

    pub(crate) async fn schedule_exam(
        &self,
        caller: &Caller,
        new: NewScheduledExam,
    ) -> Result<ScheduledExam, ExamError> {
        access::require_privileged(caller)?;

        if new.start_date > new.end_date {
            return Err(ExamError::Invalid("start_date must not be after end_date".to_string()));
        }
        if new.duration_minutes <= 0 {
            return Err(ExamError::Invalid("duration_minutes must be positive".to_string()));
        }
        if self.store.find_definition(new.test_id).await?.is_none() {
            return Err(ExamError::NotFound("Exam definition not found".to_string()));
        }

        let exam = self.store.create_scheduled_exam(new).await?;
        tracing::info!(
            exam_id = exam.id,
            test_id = exam.test_id,
            exam_type = %exam.exam_type,
            "Exam scheduled"
        );
        Ok(exam)
    }

    pub(crate) async fn get_exam(&self, exam_id: i64) -> Result<ScheduledExam, ExamError> {
        self.store
            .find_scheduled_exam(exam_id)
            .await?
            .ok_or_else(|| ExamError::NotFound("Exam not found".to_string()))
    }

    /// Idempotent: opening an open exam succeeds without changes.
    pub(crate) async fn open_exam(
        &self,
        exam_id: i64,
        caller: &Caller,
        now: PrimitiveDateTime,
    ) -> Result<ScheduledExam, ExamError> {
        self.set_open(exam_id, true, caller, now).await
    }

    pub(crate) async fn close_exam(
        &self,
        exam_id: i64,
        caller: &Caller,
        now: PrimitiveDateTime,
    ) -> Result<ScheduledExam, ExamError> {
        self.set_open(exam_id, false, caller, now).await
    }

    async fn set_open(
        &self,
        exam_id: i64,
        open: bool,
        caller: &Caller,
        now: PrimitiveDateTime,
    ) -> Result<ScheduledExam, ExamError> {
        access::require_privileged(caller)?;

        let exam = self
            .store
            .set_exam_open(exam_id, open, now)
            .await?
            .ok_or_else(|| ExamError::NotFound("Exam not found".to_string()))?;
        tracing::info!(
            exam_id,
            is_open = open,
            changed_by = caller.account_id,
            role = caller.role.as_str(),
            "Exam gate updated"
        );
        Ok(exam)
    }

    pub(crate) async fn start_attempt(
        &self,
        exam_id: i64,
        caller: &Caller,
        now: PrimitiveDateTime,
    ) -> Result<StartedAttempt, ExamError> {
        let exam = self.get_exam(exam_id).await?;
        if !exam.is_open {
            return Err(ExamError::NotOpen);
        }
        timing::ensure_within_window(&exam, now)?;

        let student_id = caller.account_id;
        if let Some(attempt) = self.store.find_in_progress(exam_id, student_id).await? {
            metrics::record_attempt_started(true);
            return Ok(StartedAttempt { attempt, resumed: true });
        }

        let definition = self
            .store
            .find_definition(exam.test_id)
            .await?
            .ok_or_else(|| ExamError::NotFound("Exam definition not found".to_string()))?;
        let material = snapshot::build(&definition)?;

        let draft = AttemptDraft {
            exam_id,
            student_id,
            snapshot: material.snapshot,
            answer_key: material.answer_key,
            answer_sheet: material.answer_sheet,
            started_at: now,
            expires_at: timing::attempt_deadline(now, &exam),
        };

        match self.store.start_attempt(draft, exam.exam_type.retake_policy()).await? {
            StartOutcome::Created(attempt) => {
                metrics::record_attempt_started(false);
                tracing::info!(
                    attempt_id = attempt.id,
                    exam_id,
                    student_id,
                    expires_at = %attempt.expires_at,
                    "Attempt started"
                );
                Ok(StartedAttempt { attempt, resumed: false })
            }
            StartOutcome::Resumed(attempt) => {
                metrics::record_attempt_started(true);
                Ok(StartedAttempt { attempt, resumed: true })
            }
            StartOutcome::AlreadySubmitted => Err(ExamError::AlreadySubmitted),
        }
    }

    pub(crate) async fn get_question(
        &self,
        attempt_id: i64,
        index: QuestionIndex,
        caller: &Caller,
    ) -> Result<QuestionView, ExamError> {
        let slot = self
            .store
            .find_question(attempt_id, index)
            .await?
            .ok_or_else(|| ExamError::NotFound("Attempt not found".to_string()))?;
        access::require_reader(slot.student_id, caller)?;

        let question = slot.question.ok_or_else(|| question_not_found(index))?.0;
        Ok(QuestionView {
            attempt_id,
            index,
            question_id: question.question_id,
            content: question.content,
            options: question.options,
            answer: slot.answer.map(|answer| answer.0).unwrap_or_default(),
        })
    }

    /// Replaces the selection of one question. An empty list clears it.
    pub(crate) async fn select_answer(
        &self,
        attempt_id: i64,
        index: QuestionIndex,
        options: &[i64],
        caller: &Caller,
        now: PrimitiveDateTime,
    ) -> Result<AnswerEntry, ExamError> {
        let slot = self
            .store
            .find_question(attempt_id, index)
            .await?
            .ok_or_else(|| ExamError::NotFound("Attempt not found".to_string()))?;
        access::require_owner(slot.student_id, caller)?;
        if slot.submitted_at.is_some() {
            return Err(ExamError::AlreadySubmitted);
        }
        let question = slot.question.ok_or_else(|| question_not_found(index))?.0;

        let mut selected = BTreeSet::new();
        for &option in options {
            let option_index = OptionIndex::try_from(option)
                .ok()
                .filter(|value| (*value as usize) < question.options.len())
                .ok_or_else(|| {
                    ExamError::NotFound(format!(
                        "Option {option} does not exist for question {index}"
                    ))
                })?;
            selected.insert(option_index);
        }

        if !timing::accepts_answers(slot.expires_at, self.answer_grace, now) {
            return Err(ExamError::OutsideWindow("Attempt time is over"));
        }

        match self.store.write_selection(attempt_id, index, &selected, now).await? {
            WriteOutcome::Applied(entry) => {
                metrics::record_answer("selection");
                tracing::debug!(attempt_id, index, selected = ?entry.selected, "Answer recorded");
                Ok(entry)
            }
            WriteOutcome::Submitted => Err(ExamError::AlreadySubmitted),
            WriteOutcome::Missing => Err(question_not_found(index)),
        }
    }

    /// Flags are bookmarks and are accepted until submission regardless of the deadline.
    pub(crate) async fn flag_question(
        &self,
        attempt_id: i64,
        index: QuestionIndex,
        flagged: bool,
        caller: &Caller,
        now: PrimitiveDateTime,
    ) -> Result<AnswerEntry, ExamError> {
        let slot = self
            .store
            .find_question(attempt_id, index)
            .await?
            .ok_or_else(|| ExamError::NotFound("Attempt not found".to_string()))?;
        access::require_owner(slot.student_id, caller)?;
        if slot.submitted_at.is_some() {
            return Err(ExamError::AlreadySubmitted);
        }
        if slot.question.is_none() {
            return Err(question_not_found(index));
        }

        match self.store.write_flag(attempt_id, index, flagged, now).await? {
            WriteOutcome::Applied(entry) => {
                metrics::record_answer("flag");
                Ok(entry)
            }
            WriteOutcome::Submitted => Err(ExamError::AlreadySubmitted),
            WriteOutcome::Missing => Err(question_not_found(index)),
        }
    }

    pub(crate) async fn end_attempt(
        &self,
        attempt_id: i64,
        caller: &Caller,
        now: PrimitiveDateTime,
    ) -> Result<SubmittedAttempt, ExamError> {
        let attempt = self.find_attempt(attempt_id).await?;
        access::require_owner(attempt.student_id, caller)?;
        if attempt.is_submitted() {
            return Err(ExamError::AlreadySubmitted);
        }

        match self.store.finalize_attempt(attempt_id, now, scoring::grade).await? {
            FinalizeOutcome::Finalized { attempt, card } => {
                metrics::record_attempt_submitted(card.score);
                tracing::info!(
                    attempt_id,
                    exam_id = attempt.exam_id,
                    student_id = attempt.student_id,
                    correct = card.correct,
                    total = card.total,
                    late = now > attempt.expires_at,
                    "Attempt submitted"
                );
                Ok(SubmittedAttempt { attempt, card })
            }
            FinalizeOutcome::AlreadySubmitted => Err(ExamError::AlreadySubmitted),
            FinalizeOutcome::Missing => {
                Err(ExamError::NotFound("Attempt not found".to_string()))
            }
        }
    }

    pub(crate) async fn get_attempt(
        &self,
        attempt_id: i64,
        caller: &Caller,
    ) -> Result<Attempt, ExamError> {
        let attempt = self.find_attempt(attempt_id).await?;
        access::require_reader(attempt.student_id, caller)?;
        Ok(attempt)
    }

    /// Students see the answer key only after their attempt is submitted.
    pub(crate) async fn review_attempt(
        &self,
        attempt_id: i64,
        caller: &Caller,
    ) -> Result<AttemptReview, ExamError> {
        let attempt = self.find_attempt(attempt_id).await?;
        access::require_reader(attempt.student_id, caller)?;
        if !access::is_privileged(caller.role) && !attempt.is_submitted() {
            return Err(ExamError::Forbidden("Review is available after submission"));
        }

        let questions = attempt
            .snapshot
            .iter()
            .map(|(index, question)| {
                let answer = attempt.answer_sheet.get(index).cloned().unwrap_or_default();
                let correct = attempt.answer_key.get(index).cloned().unwrap_or_default();
                QuestionReview {
                    index: *index,
                    question_id: question.question_id,
                    content: question.content.clone(),
                    options: question.options.clone(),
                    is_correct: answer.selected == correct,
                    selected: answer.selected,
                    correct,
                    flagged: answer.flagged,
                }
            })
            .collect();

        Ok(AttemptReview { summary: attempt.summary(), questions })
    }

    pub(crate) async fn list_attempts(
        &self,
        exam_id: i64,
        caller: &Caller,
    ) -> Result<Vec<AttemptSummary>, ExamError> {
        access::require_privileged(caller)?;
        self.get_exam(exam_id).await?;
        Ok(self.store.list_attempts_by_exam(exam_id).await?)
    }

    async fn find_attempt(&self, attempt_id: i64) -> Result<Attempt, ExamError> {
        self.store
            .find_attempt(attempt_id)
            .await?
            .ok_or_else(|| ExamError::NotFound("Attempt not found".to_string()))
    }
}

fn question_not_found(index: QuestionIndex) -> ExamError {
    ExamError::NotFound(format!("Question {index} not found"))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use time::macros::datetime;
    use time::{Duration, PrimitiveDateTime};

    use super::*;
    use crate::db::types::{ExamType, Role};
    use crate::store::{MemoryStore, NewOption, NewQuestion};

    const OPENS: PrimitiveDateTime = datetime!(2025-03-01 09:00);
    const CLOSES: PrimitiveDateTime = datetime!(2025-03-01 11:00);

    fn admin() -> Caller {
        Caller::new(1, Role::Admin)
    }

    fn teacher() -> Caller {
        Caller::new(2, Role::Teacher)
    }

    fn student(id: i64) -> Caller {
        Caller::new(id, Role::Student)
    }

    fn service() -> ExamSessionService {
        ExamSessionService::new(Arc::new(MemoryStore::new()), Duration::seconds(30))
    }

    fn minutes(value: i64) -> PrimitiveDateTime {
        OPENS + Duration::minutes(value)
    }

    fn new_definition(questions: &[&[bool]]) -> NewDefinition {
        NewDefinition {
            title: "Algebra".to_string(),
            questions: questions
                .iter()
                .enumerate()
                .map(|(q, options)| NewQuestion {
                    content: format!("Question {q}"),
                    options: options
                        .iter()
                        .enumerate()
                        .map(|(o, is_correct)| NewOption {
                            content: format!("Option {o}"),
                            is_correct: *is_correct,
                        })
                        .collect(),
                })
                .collect(),
            created_at: OPENS - Duration::days(1),
        }
    }

    async fn seed_exam(
        service: &ExamSessionService,
        exam_type: ExamType,
        questions: &[&[bool]],
        open: bool,
    ) -> ScheduledExam {
        let definition = service
            .create_definition(&admin(), new_definition(questions))
            .await
            .expect("definition");
        let exam = service
            .schedule_exam(
                &admin(),
                NewScheduledExam {
                    test_id: definition.id,
                    title: "Midterm".to_string(),
                    start_date: OPENS,
                    end_date: CLOSES,
                    duration_minutes: 60,
                    exam_type,
                    created_at: OPENS - Duration::days(1),
                },
            )
            .await
            .expect("exam");
        if open {
            service.open_exam(exam.id, &admin(), OPENS).await.expect("open")
        } else {
            exam
        }
    }

    /// Q0 has correct set {1}; Q1 has correct set {0, 2}.
    const TWO_QUESTIONS: &[&[bool]] = &[&[false, true, false], &[true, false, true]];

    #[tokio::test]
    async fn two_question_attempt_scores_half() {
        let service = service();
        let exam = seed_exam(&service, ExamType::Exam, TWO_QUESTIONS, true).await;
        let caller = student(10);

        let started = service.start_attempt(exam.id, &caller, minutes(5)).await.expect("start");
        assert!(!started.resumed);
        assert_eq!(started.attempt.question_count, 2);
        assert_eq!(started.attempt.expires_at, minutes(65));
        let id = started.attempt.id;

        service.select_answer(id, 0, &[1], &caller, minutes(6)).await.expect("q0");
        service.select_answer(id, 1, &[0], &caller, minutes(7)).await.expect("q1");

        let submitted = service.end_attempt(id, &caller, minutes(8)).await.expect("end");
        assert_eq!(submitted.card.correct, 1);
        assert_eq!(submitted.card.total, 2);
        assert_eq!(submitted.card.score, 0.5);
        assert_eq!(submitted.attempt.score, Some(0.5));
        assert_eq!(submitted.attempt.submitted_at, Some(minutes(8)));

        let error = service.select_answer(id, 0, &[2], &caller, minutes(9)).await.unwrap_err();
        assert!(matches!(error, ExamError::AlreadySubmitted));
        let error = service.flag_question(id, 0, true, &caller, minutes(9)).await.unwrap_err();
        assert!(matches!(error, ExamError::AlreadySubmitted));
        let error = service.end_attempt(id, &caller, minutes(9)).await.unwrap_err();
        assert!(matches!(error, ExamError::AlreadySubmitted));

        let attempt = service.get_attempt(id, &caller).await.expect("attempt");
        assert_eq!(attempt.answer_sheet[&0].selected, BTreeSet::from([1]));
        assert_eq!(attempt.score, Some(0.5));
        assert_eq!(attempt.submitted_at, Some(minutes(8)));
    }

    #[tokio::test]
    async fn start_resumes_in_progress_attempt() {
        let service = service();
        let exam = seed_exam(&service, ExamType::Exam, TWO_QUESTIONS, true).await;
        let caller = student(10);

        let first = service.start_attempt(exam.id, &caller, minutes(1)).await.expect("first");
        service.select_answer(first.attempt.id, 1, &[2], &caller, minutes(2)).await.expect("q1");

        let second = service.start_attempt(exam.id, &caller, minutes(3)).await.expect("second");
        assert!(second.resumed);
        assert_eq!(second.attempt.id, first.attempt.id);
        assert_eq!(second.attempt.started_at, first.attempt.started_at);
        assert_eq!(second.attempt.snapshot.0, first.attempt.snapshot.0);
        assert_eq!(second.attempt.answer_sheet[&1].selected, BTreeSet::from([2]));
    }

    #[tokio::test]
    async fn exam_type_allows_single_submission() {
        let service = service();
        let exam = seed_exam(&service, ExamType::Exam, TWO_QUESTIONS, true).await;
        let caller = student(10);

        let started = service.start_attempt(exam.id, &caller, minutes(1)).await.expect("start");
        service.end_attempt(started.attempt.id, &caller, minutes(2)).await.expect("end");

        let error = service.start_attempt(exam.id, &caller, minutes(3)).await.unwrap_err();
        assert!(matches!(error, ExamError::AlreadySubmitted));
    }

    #[tokio::test]
    async fn unknown_exam_type_behaves_like_exam() {
        let service = service();
        let exam =
            seed_exam(&service, ExamType::Other("QUIZ".to_string()), TWO_QUESTIONS, true).await;
        let caller = student(10);

        let started = service.start_attempt(exam.id, &caller, minutes(1)).await.expect("start");
        service.end_attempt(started.attempt.id, &caller, minutes(2)).await.expect("end");

        let error = service.start_attempt(exam.id, &caller, minutes(3)).await.unwrap_err();
        assert!(matches!(error, ExamError::AlreadySubmitted));
    }

    #[tokio::test]
    async fn practice_allows_new_attempt_after_submission() {
        let service = service();
        let exam = seed_exam(&service, ExamType::Practice, TWO_QUESTIONS, true).await;
        let caller = student(10);

        let first = service.start_attempt(exam.id, &caller, minutes(1)).await.expect("first");
        service.select_answer(first.attempt.id, 0, &[1], &caller, minutes(2)).await.expect("q0");
        service.end_attempt(first.attempt.id, &caller, minutes(3)).await.expect("end");

        let second = service.start_attempt(exam.id, &caller, minutes(4)).await.expect("second");
        assert!(!second.resumed);
        assert_ne!(second.attempt.id, first.attempt.id);
        assert!(second.attempt.answer_sheet.values().all(|entry| entry.selected.is_empty()));

        let listed = service.list_attempts(exam.id, &teacher()).await.expect("list");
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn start_checks_existence_gate_and_window() {
        let service = service();
        let caller = student(10);

        let error = service.start_attempt(999, &caller, minutes(1)).await.unwrap_err();
        assert!(matches!(error, ExamError::NotFound(_)));

        let closed = seed_exam(&service, ExamType::Exam, TWO_QUESTIONS, false).await;
        let error = service.start_attempt(closed.id, &caller, minutes(1)).await.unwrap_err();
        assert!(matches!(error, ExamError::NotOpen));

        let open = seed_exam(&service, ExamType::Exam, TWO_QUESTIONS, true).await;
        let error = service.start_attempt(open.id, &caller, minutes(-1)).await.unwrap_err();
        assert!(matches!(error, ExamError::OutsideWindow(_)));
        let error = service.start_attempt(open.id, &caller, minutes(121)).await.unwrap_err();
        assert!(matches!(error, ExamError::OutsideWindow(_)));
    }

    #[tokio::test]
    async fn late_start_expires_at_window_end() {
        let service = service();
        let exam = seed_exam(&service, ExamType::Exam, TWO_QUESTIONS, true).await;

        let started =
            service.start_attempt(exam.id, &student(10), minutes(100)).await.expect("start");
        assert_eq!(started.attempt.expires_at, CLOSES);
    }

    #[tokio::test]
    async fn open_and_close_require_privilege() {
        let service = service();
        let exam = seed_exam(&service, ExamType::Exam, TWO_QUESTIONS, false).await;

        let error = service.open_exam(exam.id, &student(10), OPENS).await.unwrap_err();
        assert!(matches!(error, ExamError::Forbidden(_)));
        let error = service.open_exam(999, &student(10), OPENS).await.unwrap_err();
        assert!(matches!(error, ExamError::Forbidden(_)));
        let error = service.open_exam(999, &teacher(), OPENS).await.unwrap_err();
        assert!(matches!(error, ExamError::NotFound(_)));

        let opened = service.open_exam(exam.id, &teacher(), OPENS).await.expect("open");
        assert!(opened.is_open);
        let again = service.open_exam(exam.id, &teacher(), minutes(1)).await.expect("reopen");
        assert!(again.is_open);

        let closed = service.close_exam(exam.id, &admin(), minutes(2)).await.expect("close");
        assert!(!closed.is_open);
        let error = service.start_attempt(exam.id, &student(10), minutes(3)).await.unwrap_err();
        assert!(matches!(error, ExamError::NotOpen));
    }

    #[tokio::test]
    async fn other_students_cannot_touch_an_attempt() {
        let service = service();
        let exam = seed_exam(&service, ExamType::Exam, TWO_QUESTIONS, true).await;
        let owner = student(10);
        let intruder = student(11);
        let id = service.start_attempt(exam.id, &owner, minutes(1)).await.expect("start").attempt.id;

        let error = service.get_question(id, 0, &intruder).await.unwrap_err();
        assert!(matches!(error, ExamError::Forbidden(_)));
        let error = service.select_answer(id, 0, &[1], &intruder, minutes(2)).await.unwrap_err();
        assert!(matches!(error, ExamError::Forbidden(_)));
        let error = service.flag_question(id, 0, true, &intruder, minutes(2)).await.unwrap_err();
        assert!(matches!(error, ExamError::Forbidden(_)));
        let error = service.end_attempt(id, &intruder, minutes(2)).await.unwrap_err();
        assert!(matches!(error, ExamError::Forbidden(_)));
        let error = service.end_attempt(id, &teacher(), minutes(2)).await.unwrap_err();
        assert!(matches!(error, ExamError::Forbidden(_)));

        let view = service.get_question(id, 0, &teacher()).await.expect("teacher read");
        assert_eq!(view.options.len(), 3);
    }

    #[tokio::test]
    async fn get_question_returns_snapshot_and_current_answer() {
        let service = service();
        let exam = seed_exam(&service, ExamType::Exam, TWO_QUESTIONS, true).await;
        let caller = student(10);
        let id = service.start_attempt(exam.id, &caller, minutes(1)).await.expect("start").attempt.id;

        let blank = service.get_question(id, 1, &caller).await.expect("blank");
        assert_eq!(blank.content, "Question 1");
        assert_eq!(blank.answer, AnswerEntry::default());
        let labels: Vec<&str> = blank.options.iter().map(|o| o.content.as_str()).collect();
        assert_eq!(labels, vec!["Option 0", "Option 1", "Option 2"]);

        service.select_answer(id, 1, &[2, 0, 2], &caller, minutes(2)).await.expect("select");
        service.flag_question(id, 1, true, &caller, minutes(3)).await.expect("flag");

        let view = service.get_question(id, 1, &caller).await.expect("view");
        assert_eq!(view.answer.selected, BTreeSet::from([0, 2]));
        assert!(view.answer.flagged);

        let error = service.get_question(id, 2, &caller).await.unwrap_err();
        assert!(matches!(error, ExamError::NotFound(_)));
        let error = service.get_question(id + 100, 0, &caller).await.unwrap_err();
        assert!(matches!(error, ExamError::NotFound(_)));
    }

    #[tokio::test]
    async fn select_rejects_bad_indices() {
        let service = service();
        let exam = seed_exam(&service, ExamType::Exam, TWO_QUESTIONS, true).await;
        let caller = student(10);
        let id = service.start_attempt(exam.id, &caller, minutes(1)).await.expect("start").attempt.id;

        let error = service.select_answer(id, 5, &[0], &caller, minutes(2)).await.unwrap_err();
        assert!(matches!(error, ExamError::NotFound(_)));
        let error = service.select_answer(id, 0, &[3], &caller, minutes(2)).await.unwrap_err();
        assert!(matches!(error, ExamError::NotFound(_)));
        let error = service.select_answer(id, 0, &[-1], &caller, minutes(2)).await.unwrap_err();
        assert!(matches!(error, ExamError::NotFound(_)));

        let view = service.get_question(id, 0, &caller).await.expect("view");
        assert!(view.answer.selected.is_empty());
    }

    #[tokio::test]
    async fn selection_replaces_and_clears() {
        let service = service();
        let exam = seed_exam(&service, ExamType::Exam, TWO_QUESTIONS, true).await;
        let caller = student(10);
        let id = service.start_attempt(exam.id, &caller, minutes(1)).await.expect("start").attempt.id;

        service.flag_question(id, 0, true, &caller, minutes(2)).await.expect("flag");
        service.select_answer(id, 0, &[0, 1], &caller, minutes(2)).await.expect("first");
        let entry = service.select_answer(id, 0, &[2], &caller, minutes(3)).await.expect("second");
        assert_eq!(entry.selected, BTreeSet::from([2]));
        assert!(entry.flagged);

        let entry = service.select_answer(id, 0, &[], &caller, minutes(4)).await.expect("clear");
        assert!(entry.selected.is_empty());

        let attempt = service.get_attempt(id, &caller).await.expect("attempt");
        assert!(attempt.answer_sheet[&0].selected.is_empty());
        assert!(attempt.answer_sheet[&0].flagged);
    }

    #[tokio::test]
    async fn answers_close_after_grace_but_submission_still_scores() {
        let service = service();
        let exam = seed_exam(&service, ExamType::Exam, TWO_QUESTIONS, true).await;
        let caller = student(10);
        let id = service.start_attempt(exam.id, &caller, minutes(0)).await.expect("start").attempt.id;

        service.select_answer(id, 0, &[1], &caller, minutes(50)).await.expect("in time");
        let within_grace = minutes(60) + Duration::seconds(30);
        service.select_answer(id, 1, &[0, 2], &caller, within_grace).await.expect("grace");

        let late = minutes(61);
        let error = service.select_answer(id, 1, &[0], &caller, late).await.unwrap_err();
        assert!(matches!(error, ExamError::OutsideWindow(_)));

        service.flag_question(id, 1, true, &caller, late).await.expect("flag after deadline");

        let submitted = service.end_attempt(id, &caller, minutes(70)).await.expect("late end");
        assert_eq!(submitted.card.score, 1.0);
    }

    #[tokio::test]
    async fn review_is_hidden_from_students_until_submission() {
        let service = service();
        let exam = seed_exam(&service, ExamType::Exam, TWO_QUESTIONS, true).await;
        let caller = student(10);
        let id = service.start_attempt(exam.id, &caller, minutes(1)).await.expect("start").attempt.id;
        service.select_answer(id, 1, &[0, 2], &caller, minutes(2)).await.expect("q1");

        let error = service.review_attempt(id, &caller).await.unwrap_err();
        assert!(matches!(error, ExamError::Forbidden(_)));
        let early = service.review_attempt(id, &teacher()).await.expect("teacher review");
        assert_eq!(early.summary.submitted_at, None);

        service.end_attempt(id, &caller, minutes(3)).await.expect("end");

        let review = service.review_attempt(id, &caller).await.expect("review");
        assert_eq!(review.summary.score, Some(0.5));
        assert_eq!(review.questions.len(), 2);
        assert!(!review.questions[0].is_correct);
        assert_eq!(review.questions[0].correct, BTreeSet::from([1]));
        assert!(review.questions[1].is_correct);

        let error = service.review_attempt(id, &student(11)).await.unwrap_err();
        assert!(matches!(error, ExamError::Forbidden(_)));
    }

    #[tokio::test]
    async fn list_attempts_is_privileged() {
        let service = service();
        let exam = seed_exam(&service, ExamType::Exam, TWO_QUESTIONS, true).await;
        service.start_attempt(exam.id, &student(10), minutes(1)).await.expect("first");
        service.start_attempt(exam.id, &student(11), minutes(1)).await.expect("second");

        let error = service.list_attempts(exam.id, &student(10)).await.unwrap_err();
        assert!(matches!(error, ExamError::Forbidden(_)));
        let error = service.list_attempts(999, &teacher()).await.unwrap_err();
        assert!(matches!(error, ExamError::NotFound(_)));

        let listed = service.list_attempts(exam.id, &teacher()).await.expect("list");
        let students: BTreeSet<i64> = listed.iter().map(|summary| summary.student_id).collect();
        assert_eq!(students, BTreeSet::from([10, 11]));
    }

    #[tokio::test]
    async fn definition_and_schedule_are_validated() {
        let service = service();

        let error = service.create_definition(&admin(), new_definition(&[])).await.unwrap_err();
        assert!(matches!(error, ExamError::InvalidDefinition(_)));
        let error = service.create_definition(&admin(), new_definition(&[&[]])).await.unwrap_err();
        assert!(matches!(error, ExamError::InvalidDefinition(_)));
        let error = service
            .create_definition(&admin(), new_definition(&[&[true], &[false, false]]))
            .await
            .unwrap_err();
        match &error {
            ExamError::InvalidDefinition(message) => assert!(message.contains("Question 1")),
            other => panic!("unexpected {other:?}"),
        }
        let error =
            service.create_definition(&student(10), new_definition(&[&[true]])).await.unwrap_err();
        assert!(matches!(error, ExamError::Forbidden(_)));

        let definition =
            service.create_definition(&teacher(), new_definition(&[&[true]])).await.expect("def");
        let schedule = |test_id: i64, start_date, end_date, duration_minutes| NewScheduledExam {
            test_id,
            title: "Quiz".to_string(),
            start_date,
            end_date,
            duration_minutes,
            exam_type: ExamType::Practice,
            created_at: OPENS,
        };

        let error = service
            .schedule_exam(&teacher(), schedule(definition.id, CLOSES, OPENS, 30))
            .await
            .unwrap_err();
        assert!(matches!(error, ExamError::Invalid(_)));
        let error = service
            .schedule_exam(&teacher(), schedule(definition.id, OPENS, CLOSES, 0))
            .await
            .unwrap_err();
        assert!(matches!(error, ExamError::Invalid(_)));
        let error = service
            .schedule_exam(&teacher(), schedule(definition.id + 50, OPENS, CLOSES, 30))
            .await
            .unwrap_err();
        assert!(matches!(error, ExamError::NotFound(_)));

        let exam = service
            .schedule_exam(&teacher(), schedule(definition.id, OPENS, CLOSES, 30))
            .await
            .expect("schedule");
        assert!(!exam.is_open);
        assert_eq!(service.get_exam(exam.id).await.expect("get").title, "Quiz");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_starts_yield_one_attempt() {
        let service = service();
        let exam = seed_exam(&service, ExamType::Exam, TWO_QUESTIONS, true).await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let service = service.clone();
            let exam_id = exam.id;
            handles.push(tokio::spawn(async move {
                service.start_attempt(exam_id, &student(10), minutes(1)).await
            }));
        }

        let mut ids = BTreeSet::new();
        let mut created = 0;
        for handle in handles {
            let started = handle.await.expect("join").expect("start");
            if !started.resumed {
                created += 1;
            }
            ids.insert(started.attempt.id);
        }

        assert_eq!(ids.len(), 1);
        assert_eq!(created, 1);
        let listed = service.list_attempts(exam.id, &admin()).await.expect("list");
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_to_distinct_questions_all_land() {
        let service = service();
        let question: &[bool] = &[true, false, false];
        let questions = vec![question; 12];
        let exam = seed_exam(&service, ExamType::Exam, &questions, true).await;
        let caller = student(10);
        let id = service.start_attempt(exam.id, &caller, minutes(1)).await.expect("start").attempt.id;

        let mut handles = Vec::new();
        for index in 0..12u32 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                let option = i64::from(index % 3);
                service.select_answer(id, index, &[option], &student(10), minutes(2)).await?;
                service.flag_question(id, index, index % 2 == 0, &student(10), minutes(2)).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("write");
        }

        let attempt = service.get_attempt(id, &caller).await.expect("attempt");
        for index in 0..12u32 {
            let entry = &attempt.answer_sheet[&index];
            assert_eq!(entry.selected, BTreeSet::from([index % 3]));
            assert_eq!(entry.flagged, index % 2 == 0);
        }
        assert_eq!(attempt.answered_count(), 12);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn writes_racing_submission_never_change_a_sealed_attempt() {
        let service = service();
        let exam = seed_exam(&service, ExamType::Exam, TWO_QUESTIONS, true).await;
        let caller = student(10);
        let id = service.start_attempt(exam.id, &caller, minutes(1)).await.expect("start").attempt.id;

        let writer = {
            let service = service.clone();
            tokio::spawn(async move {
                for round in 0..50 {
                    let option = i64::from(round % 3);
                    match service.select_answer(id, 0, &[option], &student(10), minutes(2)).await {
                        Ok(_) => continue,
                        Err(ExamError::AlreadySubmitted) => break,
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            })
        };
        let submitted = service.end_attempt(id, &caller, minutes(2)).await.expect("end");
        writer.await.expect("join");

        let sealed = service.get_attempt(id, &caller).await.expect("attempt");
        assert_eq!(sealed.answer_sheet.0, submitted.attempt.answer_sheet.0);
        assert_eq!(sealed.score, submitted.attempt.score);
    }
}
