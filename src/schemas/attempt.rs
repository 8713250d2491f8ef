use std::collections::BTreeSet;

use serde::Serialize;
use time::PrimitiveDateTime;

use crate::core::time::{format_optional, format_primitive, seconds_until};
use crate::db::models::{AnswerEntry, Attempt, AttemptSummary, OptionIndex, SnapshotOption};
use crate::services::exam_session::{
    AttemptReview, QuestionReview, QuestionView, StartedAttempt, SubmittedAttempt,
};

#[derive(Debug, Serialize)]
pub(crate) struct StartResponse {
    pub(crate) attempt_id: i64,
    pub(crate) exam_id: i64,
    pub(crate) resumed: bool,
    pub(crate) question_count: i32,
    pub(crate) started_at: String,
    pub(crate) expires_at: String,
    pub(crate) remaining_seconds: i64,
}

impl StartResponse {
    pub(crate) fn new(started: &StartedAttempt, now: PrimitiveDateTime) -> Self {
        let attempt = &started.attempt;
        Self {
            attempt_id: attempt.id,
            exam_id: attempt.exam_id,
            resumed: started.resumed,
            question_count: attempt.question_count,
            started_at: format_primitive(attempt.started_at),
            expires_at: format_primitive(attempt.expires_at),
            remaining_seconds: seconds_until(attempt.expires_at, now),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct OptionResponse {
    pub(crate) index: OptionIndex,
    pub(crate) content: String,
}

impl From<SnapshotOption> for OptionResponse {
    fn from(option: SnapshotOption) -> Self {
        Self { index: option.index, content: option.content }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) attempt_id: i64,
    pub(crate) index: u32,
    pub(crate) question_id: i64,
    pub(crate) content: String,
    pub(crate) options: Vec<OptionResponse>,
    pub(crate) selected: BTreeSet<OptionIndex>,
    pub(crate) flagged: bool,
}

impl From<QuestionView> for QuestionResponse {
    fn from(view: QuestionView) -> Self {
        Self {
            attempt_id: view.attempt_id,
            index: view.index,
            question_id: view.question_id,
            content: view.content,
            options: view.options.into_iter().map(OptionResponse::from).collect(),
            selected: view.answer.selected,
            flagged: view.answer.flagged,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResponse {
    pub(crate) attempt_id: i64,
    pub(crate) index: u32,
    pub(crate) selected: BTreeSet<OptionIndex>,
    pub(crate) flagged: bool,
}

impl AnswerResponse {
    pub(crate) fn new(attempt_id: i64, index: u32, entry: AnswerEntry) -> Self {
        Self { attempt_id, index, selected: entry.selected, flagged: entry.flagged }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ScoreResponse {
    pub(crate) attempt_id: i64,
    pub(crate) score: f64,
    pub(crate) correct: usize,
    pub(crate) total: usize,
    pub(crate) submitted_at: Option<String>,
}

impl From<SubmittedAttempt> for ScoreResponse {
    fn from(submitted: SubmittedAttempt) -> Self {
        Self {
            attempt_id: submitted.attempt.id,
            score: submitted.card.score,
            correct: submitted.card.correct,
            total: submitted.card.total,
            submitted_at: format_optional(submitted.attempt.submitted_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptSummaryResponse {
    pub(crate) id: i64,
    pub(crate) exam_id: i64,
    pub(crate) student_id: i64,
    pub(crate) question_count: i32,
    pub(crate) answered_count: i64,
    pub(crate) started_at: String,
    pub(crate) expires_at: String,
    pub(crate) submitted_at: Option<String>,
    pub(crate) score: Option<f64>,
}

impl From<AttemptSummary> for AttemptSummaryResponse {
    fn from(summary: AttemptSummary) -> Self {
        Self {
            id: summary.id,
            exam_id: summary.exam_id,
            student_id: summary.student_id,
            question_count: summary.question_count,
            answered_count: summary.answered_count,
            started_at: format_primitive(summary.started_at),
            expires_at: format_primitive(summary.expires_at),
            submitted_at: format_optional(summary.submitted_at),
            score: summary.score,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    #[serde(flatten)]
    pub(crate) summary: AttemptSummaryResponse,
    pub(crate) flagged: Vec<u32>,
}

impl From<Attempt> for AttemptResponse {
    fn from(attempt: Attempt) -> Self {
        Self { flagged: attempt.flagged_indices(), summary: attempt.summary().into() }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ReviewQuestionResponse {
    pub(crate) index: u32,
    pub(crate) question_id: i64,
    pub(crate) content: String,
    pub(crate) options: Vec<OptionResponse>,
    pub(crate) selected: BTreeSet<OptionIndex>,
    pub(crate) correct: BTreeSet<OptionIndex>,
    pub(crate) is_correct: bool,
    pub(crate) flagged: bool,
}

impl From<QuestionReview> for ReviewQuestionResponse {
    fn from(review: QuestionReview) -> Self {
        Self {
            index: review.index,
            question_id: review.question_id,
            content: review.content,
            options: review.options.into_iter().map(OptionResponse::from).collect(),
            selected: review.selected,
            correct: review.correct,
            is_correct: review.is_correct,
            flagged: review.flagged,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ReviewResponse {
    pub(crate) attempt: AttemptSummaryResponse,
    pub(crate) questions: Vec<ReviewQuestionResponse>,
}

impl From<AttemptReview> for ReviewResponse {
    fn from(review: AttemptReview) -> Self {
        Self {
            attempt: review.summary.into(),
            questions: review.questions.into_iter().map(ReviewQuestionResponse::from).collect(),
        }
    }
}
