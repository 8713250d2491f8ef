use serde::Serialize;

use crate::db::models::{AnswerKey, AnswerSheet};

/// Result of grading one answer sheet against its key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub(crate) struct ScoreCard {
    pub(crate) correct: usize,
    pub(crate) total: usize,
    /// `correct / total`, in `[0, 1]`.
    pub(crate) score: f64,
}

/// All-or-nothing grading: a question counts only when the selected set equals the
/// correct set exactly. Indices absent from the sheet count as incorrect.
pub(crate) fn grade(sheet: &AnswerSheet, key: &AnswerKey) -> ScoreCard {
    let total = key.len();
    let correct = key
        .iter()
        .filter(|(index, expected)| {
            sheet.get(*index).is_some_and(|entry| entry.selected == **expected)
        })
        .count();
    let score = if total == 0 { 0.0 } else { correct as f64 / total as f64 };

    ScoreCard { correct, total, score }
}
