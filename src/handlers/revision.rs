// src/handlers/revision.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    config::{
        DEFAULT_REVISION_TIME_LIMIT, DEFAULT_REVISION_TITLE, REVISION_QUESTION_MAX,
        REVISION_QUESTION_MIN,
    },
    error::AppError,
    handlers::exam::{load_paper, session_response},
    models::{
        attempt::Attempt,
        exam::Exam,
        question::{Question, QuestionType},
    },
    utils::jwt::Claims,
};

/// DTO for generating a revision quiz from the question bank.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRevisionRequest {
    #[serde(default)]
    pub module_ids: Vec<i64>,
    #[serde(default)]
    pub lesson_ids: Vec<i64>,
    pub question_count: i64,
    /// Restrict the draw to these question kinds, if set.
    pub question_types: Option<Vec<QuestionType>>,
    /// Restrict the draw to one difficulty, if set.
    pub difficulty: Option<String>,
    #[validate(range(min = 1, max = 480))]
    pub time_limit: Option<i64>,
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
}

/// Generates a revision quiz for the caller.
///
/// Draws `question_count` random active questions from the bank, restricted
/// to the selected modules and lessons (questions attached to a lesson of a
/// selected module count as well), creates a private REVISION exam with an
/// open attempt, and returns the same session payload as starting an exam.
/// Submission then goes through the regular exam submit endpoint.
pub async fn create_revision_quiz(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRevisionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = req.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if req.module_ids.is_empty() && req.lesson_ids.is_empty() {
        return Err(AppError::BadRequest(
            "At least one module or lesson must be selected".to_string(),
        ));
    }

    if req.question_count < REVISION_QUESTION_MIN || req.question_count > REVISION_QUESTION_MAX {
        return Err(AppError::BadRequest(format!(
            "Question count must be between {} and {}",
            REVISION_QUESTION_MIN, REVISION_QUESTION_MAX
        )));
    }

    let user_id = claims.user_id();

    // Random draw from the bank, done in SQL like the paper generators do.
    let mut query_builder = QueryBuilder::<Sqlite>::new(
        r#"
        SELECT q.id, q.module_id, q.lesson_id, q.question_type, q.text,
               q.explanation, q.difficulty, q.is_active, q.created_at
        FROM questions q
        LEFT JOIN lessons l ON q.lesson_id = l.id
        WHERE q.is_active = 1 AND (
        "#,
    );

    let mut has_scope = false;
    if !req.lesson_ids.is_empty() {
        query_builder.push("q.lesson_id IN (");
        let mut separated = query_builder.separated(",");
        for id in &req.lesson_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        has_scope = true;
    }
    if !req.module_ids.is_empty() {
        if has_scope {
            query_builder.push(" OR ");
        }
        query_builder.push("q.module_id IN (");
        let mut separated = query_builder.separated(",");
        for id in &req.module_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        query_builder.push(" OR l.module_id IN (");
        let mut separated = query_builder.separated(",");
        for id in &req.module_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
    }
    query_builder.push(")");

    if let Some(difficulty) = &req.difficulty {
        query_builder.push(" AND q.difficulty = ");
        query_builder.push_bind(difficulty);
    }

    if let Some(types) = &req.question_types {
        if !types.is_empty() {
            query_builder.push(" AND q.question_type IN (");
            let mut separated = query_builder.separated(",");
            for question_type in types {
                separated.push_bind(*question_type);
            }
            separated.push_unseparated(")");
        }
    }

    query_builder.push(" ORDER BY RANDOM() LIMIT ");
    query_builder.push_bind(req.question_count);

    let drawn: Vec<Question> = query_builder.build_query_as().fetch_all(&pool).await?;

    if drawn.is_empty() {
        return Err(AppError::BadRequest(
            "No questions found for the selected filters".to_string(),
        ));
    }
    if (drawn.len() as i64) < req.question_count {
        return Err(AppError::BadRequest(format!(
            "Only {} questions available, but {} requested",
            drawn.len(),
            req.question_count
        )));
    }

    let title = req
        .title
        .clone()
        .unwrap_or_else(|| DEFAULT_REVISION_TITLE.to_string());
    let description = format!("Revision quiz generated with {} questions", drawn.len());
    let time_limit = req.time_limit.unwrap_or(DEFAULT_REVISION_TIME_LIMIT);

    let exam = sqlx::query_as::<_, Exam>(
        r#"
        INSERT INTO exams (title, description, kind, time_limit, created_by)
        VALUES (?, ?, 'REVISION', ?, ?)
        RETURNING id, title, description, kind, module_id, lesson_id,
                  time_limit, created_by, created_at
        "#,
    )
    .bind(&title)
    .bind(&description)
    .bind(time_limit)
    .bind(user_id)
    .fetch_one(&pool)
    .await?;

    for (index, question) in drawn.iter().enumerate() {
        sqlx::query("INSERT INTO exam_questions (exam_id, question_id, position) VALUES (?, ?, ?)")
            .bind(exam.id)
            .bind(question.id)
            .bind((index + 1) as i64)
            .execute(&pool)
            .await?;
    }

    let attempt = sqlx::query_as::<_, Attempt>(
        r#"
        INSERT INTO attempts (exam_id, user_id, started_at)
        VALUES (?, ?, ?)
        RETURNING id, exam_id, user_id, started_at, finished_at, score
        "#,
    )
    .bind(exam.id)
    .bind(user_id)
    .bind(Utc::now())
    .fetch_one(&pool)
    .await?;

    tracing::info!(
        "Generated revision quiz {} with {} questions for user {}",
        exam.id,
        drawn.len(),
        user_id
    );

    let paper = load_paper(&pool, exam.id).await?;

    Ok(Json(session_response(&exam, &attempt, &paper)))
}
