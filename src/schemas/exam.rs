use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};
use validator::Validate;

use crate::core::time::{format_primitive, to_primitive_utc};
use crate::db::models::{ExamDefinition, ScheduledExam};
use crate::db::types::ExamType;
use crate::store::{NewDefinition, NewOption, NewQuestion, NewScheduledExam};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct OptionCreate {
    #[validate(length(min = 1, message = "option content must not be empty"))]
    pub(crate) content: String,
    #[serde(default)]
    #[serde(alias = "isCorrect")]
    pub(crate) is_correct: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionCreate {
    #[validate(length(min = 1, message = "question content must not be empty"))]
    pub(crate) content: String,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) options: Vec<OptionCreate>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct DefinitionCreate {
    #[validate(length(min = 1, max = 255, message = "title must be 1-255 characters"))]
    pub(crate) title: String,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) questions: Vec<QuestionCreate>,
}

impl DefinitionCreate {
    pub(crate) fn into_new(self, created_at: PrimitiveDateTime) -> NewDefinition {
        NewDefinition {
            title: self.title,
            questions: self
                .questions
                .into_iter()
                .map(|question| NewQuestion {
                    content: question.content,
                    options: question
                        .options
                        .into_iter()
                        .map(|option| NewOption {
                            content: option.content,
                            is_correct: option.is_correct,
                        })
                        .collect(),
                })
                .collect(),
            created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct DefinitionOptionResponse {
    pub(crate) id: i64,
    pub(crate) content: String,
    pub(crate) is_correct: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct DefinitionQuestionResponse {
    pub(crate) id: i64,
    pub(crate) content: String,
    pub(crate) options: Vec<DefinitionOptionResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DefinitionResponse {
    pub(crate) id: i64,
    pub(crate) title: String,
    pub(crate) questions: Vec<DefinitionQuestionResponse>,
    pub(crate) created_at: String,
}

impl From<ExamDefinition> for DefinitionResponse {
    fn from(definition: ExamDefinition) -> Self {
        Self {
            id: definition.id,
            title: definition.title,
            questions: definition
                .questions
                .into_iter()
                .map(|question| DefinitionQuestionResponse {
                    id: question.id,
                    content: question.content,
                    options: question
                        .options
                        .into_iter()
                        .map(|option| DefinitionOptionResponse {
                            id: option.id,
                            content: option.content,
                            is_correct: option.is_correct,
                        })
                        .collect(),
                })
                .collect(),
            created_at: format_primitive(definition.created_at),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamSchedule {
    #[serde(alias = "testId")]
    pub(crate) test_id: i64,
    #[validate(length(min = 1, max = 255, message = "title must be 1-255 characters"))]
    pub(crate) title: String,
    #[serde(alias = "startDate", deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) start_date: OffsetDateTime,
    #[serde(alias = "endDate", deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) end_date: OffsetDateTime,
    #[serde(alias = "durationMinutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: i32,
    #[serde(default = "default_exam_type")]
    #[serde(alias = "examType")]
    pub(crate) exam_type: ExamType,
}

impl ExamSchedule {
    pub(crate) fn into_new(self, created_at: PrimitiveDateTime) -> NewScheduledExam {
        NewScheduledExam {
            test_id: self.test_id,
            title: self.title,
            start_date: to_primitive_utc(self.start_date),
            end_date: to_primitive_utc(self.end_date),
            duration_minutes: self.duration_minutes,
            exam_type: self.exam_type,
            created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: i64,
    pub(crate) test_id: i64,
    pub(crate) title: String,
    pub(crate) start_date: String,
    pub(crate) end_date: String,
    pub(crate) duration_minutes: i32,
    pub(crate) exam_type: ExamType,
    pub(crate) is_open: bool,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl From<ScheduledExam> for ExamResponse {
    fn from(exam: ScheduledExam) -> Self {
        Self {
            id: exam.id,
            test_id: exam.test_id,
            title: exam.title,
            start_date: format_primitive(exam.start_date),
            end_date: format_primitive(exam.end_date),
            duration_minutes: exam.duration_minutes,
            exam_type: exam.exam_type,
            is_open: exam.is_open,
            created_at: format_primitive(exam.created_at),
            updated_at: format_primitive(exam.updated_at),
        }
    }
}

fn default_exam_type() -> ExamType {
    ExamType::Exam
}

fn parse_offset_datetime_flexible(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }

    // Values without an offset are taken as UTC.
    if let Ok(value) =
        PrimitiveDateTime::parse(raw, &format_description!("[year]-[month]-[day]T[hour]:[minute]"))
    {
        return Some(value.assume_utc());
    }
    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Some(value.assume_utc());
    }

    None
}

fn deserialize_offset_datetime_flexible<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_offset_datetime_flexible(&raw)
        .ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
}
