use std::collections::HashMap;

use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{DefinitionOption, DefinitionQuestion, ExamDefinition};
use crate::store::NewDefinition;

#[derive(Debug, sqlx::FromRow)]
struct DefinitionRow {
    id: i64,
    title: String,
    created_at: PrimitiveDateTime,
}

#[derive(Debug, sqlx::FromRow)]
struct QuestionRow {
    id: i64,
    content: String,
}

#[derive(Debug, sqlx::FromRow)]
struct OptionRow {
    id: i64,
    question_id: i64,
    content: String,
    is_correct: bool,
}

pub(crate) async fn create(
    pool: &PgPool,
    new: NewDefinition,
) -> Result<ExamDefinition, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let definition_id: i64 = sqlx::query_scalar(
        "INSERT INTO exam_definitions (title, created_at) VALUES ($1, $2) RETURNING id",
    )
    .bind(&new.title)
    .bind(new.created_at)
    .fetch_one(&mut *tx)
    .await?;

    let mut questions = Vec::with_capacity(new.questions.len());
    for (position, question) in new.questions.into_iter().enumerate() {
        let question_id: i64 = sqlx::query_scalar(
            "INSERT INTO definition_questions (definition_id, position, content) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(definition_id)
        .bind(position as i32)
        .bind(&question.content)
        .fetch_one(&mut *tx)
        .await?;

        let mut options = Vec::with_capacity(question.options.len());
        for (option_position, option) in question.options.into_iter().enumerate() {
            let option_id: i64 = sqlx::query_scalar(
                "INSERT INTO definition_options (question_id, position, content, is_correct) \
                 VALUES ($1, $2, $3, $4) RETURNING id",
            )
            .bind(question_id)
            .bind(option_position as i32)
            .bind(&option.content)
            .bind(option.is_correct)
            .fetch_one(&mut *tx)
            .await?;

            options.push(DefinitionOption {
                id: option_id,
                content: option.content,
                is_correct: option.is_correct,
            });
        }

        questions.push(DefinitionQuestion { id: question_id, content: question.content, options });
    }

    tx.commit().await?;

    Ok(ExamDefinition { id: definition_id, title: new.title, questions, created_at: new.created_at })
}

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: i64,
) -> Result<Option<ExamDefinition>, sqlx::Error> {
    let Some(definition) = sqlx::query_as::<_, DefinitionRow>(
        "SELECT id, title, created_at FROM exam_definitions WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let question_rows = sqlx::query_as::<_, QuestionRow>(
        "SELECT id, content FROM definition_questions \
         WHERE definition_id = $1 ORDER BY position, id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let question_ids: Vec<i64> = question_rows.iter().map(|row| row.id).collect();
    let option_rows = if question_ids.is_empty() {
        Vec::new()
    } else {
        sqlx::query_as::<_, OptionRow>(
            "SELECT id, question_id, content, is_correct FROM definition_options \
             WHERE question_id = ANY($1) ORDER BY question_id, position, id",
        )
        .bind(&question_ids)
        .fetch_all(pool)
        .await?
    };

    let mut options_by_question: HashMap<i64, Vec<DefinitionOption>> = HashMap::new();
    for row in option_rows {
        options_by_question.entry(row.question_id).or_default().push(DefinitionOption {
            id: row.id,
            content: row.content,
            is_correct: row.is_correct,
        });
    }

    let questions = question_rows
        .into_iter()
        .map(|row| DefinitionQuestion {
            id: row.id,
            content: row.content,
            options: options_by_question.remove(&row.id).unwrap_or_default(),
        })
        .collect();

    Ok(Some(ExamDefinition {
        id: definition.id,
        title: definition.title,
        questions,
        created_at: definition.created_at,
    }))
}
