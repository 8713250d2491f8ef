//! Freezes an exam definition into the per-attempt question list, answer key and
//! blank answer sheet. All three are keyed by the same zero-based question index.

use std::collections::BTreeSet;

use crate::db::models::{
    AnswerEntry, AnswerKey, AnswerSheet, ExamDefinition, Snapshot, SnapshotOption,
    SnapshotQuestion,
};
use crate::services::errors::ExamError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttemptMaterial {
    pub(crate) snapshot: Snapshot,
    pub(crate) answer_key: AnswerKey,
    pub(crate) answer_sheet: AnswerSheet,
}

pub(crate) fn build(definition: &ExamDefinition) -> Result<AttemptMaterial, ExamError> {
    if definition.questions.is_empty() {
        return Err(ExamError::InvalidDefinition(format!(
            "Exam definition {} has no questions",
            definition.id
        )));
    }

    let mut material = AttemptMaterial {
        snapshot: Snapshot::new(),
        answer_key: AnswerKey::new(),
        answer_sheet: AnswerSheet::new(),
    };

    for (position, question) in definition.questions.iter().enumerate() {
        let index = u32::try_from(position).map_err(|_| {
            ExamError::InvalidDefinition("Exam definition has too many questions".to_string())
        })?;

        let mut options = Vec::with_capacity(question.options.len());
        let mut correct = BTreeSet::new();
        for (option_position, option) in question.options.iter().enumerate() {
            let option_index = u32::try_from(option_position).map_err(|_| {
                ExamError::InvalidDefinition("Question has too many options".to_string())
            })?;
            if option.is_correct {
                correct.insert(option_index);
            }
            options.push(SnapshotOption { index: option_index, content: option.content.clone() });
        }
        // Every answer key entry must be non-empty.
        if correct.is_empty() {
            return Err(ExamError::InvalidDefinition(format!(
                "Question {position} of exam definition {} has no correct option",
                definition.id
            )));
        }

        material.snapshot.insert(
            index,
            SnapshotQuestion {
                question_id: question.id,
                content: question.content.clone(),
                options,
            },
        );
        material.answer_key.insert(index, correct);
        material.answer_sheet.insert(index, AnswerEntry::default());
    }

    Ok(material)
}
