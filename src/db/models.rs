use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::ExamType;

/// Zero-based position of a question inside one attempt's snapshot.
pub(crate) type QuestionIndex = u32;
/// Zero-based position of an answer option inside one snapshot question.
pub(crate) type OptionIndex = u32;

pub(crate) type Snapshot = BTreeMap<QuestionIndex, SnapshotQuestion>;
pub(crate) type AnswerKey = BTreeMap<QuestionIndex, BTreeSet<OptionIndex>>;
pub(crate) type AnswerSheet = BTreeMap<QuestionIndex, AnswerEntry>;

/// Reusable question set ("test") owned by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ExamDefinition {
    pub(crate) id: i64,
    pub(crate) title: String,
    /// In presentation order.
    pub(crate) questions: Vec<DefinitionQuestion>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DefinitionQuestion {
    pub(crate) id: i64,
    pub(crate) content: String,
    pub(crate) options: Vec<DefinitionOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DefinitionOption {
    pub(crate) id: i64,
    pub(crate) content: String,
    pub(crate) is_correct: bool,
}

/// A definition bound to a time window and an open/closed gate.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ScheduledExam {
    pub(crate) id: i64,
    pub(crate) test_id: i64,
    pub(crate) title: String,
    pub(crate) start_date: PrimitiveDateTime,
    pub(crate) end_date: PrimitiveDateTime,
    pub(crate) duration_minutes: i32,
    #[sqlx(try_from = "String")]
    pub(crate) exam_type: ExamType,
    pub(crate) is_open: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SnapshotQuestion {
    pub(crate) question_id: i64,
    pub(crate) content: String,
    pub(crate) options: Vec<SnapshotOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SnapshotOption {
    pub(crate) index: OptionIndex,
    pub(crate) content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AnswerEntry {
    #[serde(default)]
    pub(crate) selected: BTreeSet<OptionIndex>,
    #[serde(default)]
    pub(crate) flagged: bool,
}

/// One student's run through a scheduled exam.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Attempt {
    pub(crate) id: i64,
    pub(crate) exam_id: i64,
    pub(crate) student_id: i64,
    pub(crate) snapshot: Json<Snapshot>,
    pub(crate) answer_key: Json<AnswerKey>,
    pub(crate) answer_sheet: Json<AnswerSheet>,
    pub(crate) question_count: i32,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) expires_at: PrimitiveDateTime,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) score: Option<f64>,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Attempt {
    pub(crate) fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }

    pub(crate) fn answered_count(&self) -> usize {
        self.answer_sheet.values().filter(|entry| !entry.selected.is_empty()).count()
    }

    pub(crate) fn flagged_indices(&self) -> Vec<QuestionIndex> {
        self.answer_sheet
            .iter()
            .filter(|(_, entry)| entry.flagged)
            .map(|(index, _)| *index)
            .collect()
    }

    pub(crate) fn summary(&self) -> AttemptSummary {
        AttemptSummary {
            id: self.id,
            exam_id: self.exam_id,
            student_id: self.student_id,
            question_count: self.question_count,
            answered_count: self.answered_count() as i64,
            started_at: self.started_at,
            expires_at: self.expires_at,
            submitted_at: self.submitted_at,
            score: self.score,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub(crate) struct AttemptSummary {
    pub(crate) id: i64,
    pub(crate) exam_id: i64,
    pub(crate) student_id: i64,
    pub(crate) question_count: i32,
    pub(crate) answered_count: i64,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) expires_at: PrimitiveDateTime,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) score: Option<f64>,
}

/// Point read of a single question of an attempt, without the rest of the document.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct QuestionSlot {
    pub(crate) attempt_id: i64,
    pub(crate) student_id: i64,
    pub(crate) expires_at: PrimitiveDateTime,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) question: Option<Json<SnapshotQuestion>>,
    pub(crate) answer: Option<Json<AnswerEntry>>,
}
