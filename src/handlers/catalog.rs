// src/handlers/catalog.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::{
        exam::ExamSummary,
        module::{Lesson, Module},
    },
};

/// Query parameters for listing modules.
#[derive(Debug, Deserialize)]
pub struct ModuleListParams {
    pub year: Option<String>,
}

/// Lists modules, optionally filtered by study year.
pub async fn list_modules(
    State(pool): State<SqlitePool>,
    Query(params): Query<ModuleListParams>,
) -> Result<impl IntoResponse, AppError> {
    let modules = sqlx::query_as::<_, Module>(
        r#"
        SELECT id, name, year, created_at
        FROM modules
        WHERE (? IS NULL OR year = ?)
        ORDER BY name
        "#,
    )
    .bind(&params.year)
    .bind(&params.year)
    .fetch_all(&pool)
    .await?;

    Ok(Json(modules))
}

/// Lists the lessons of a module.
pub async fn list_lessons(
    State(pool): State<SqlitePool>,
    Path(module_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM modules WHERE id = ?")
        .bind(module_id)
        .fetch_one(&pool)
        .await?;

    if exists == 0 {
        return Err(AppError::NotFound("Module not found".to_string()));
    }

    let lessons = sqlx::query_as::<_, Lesson>(
        r#"
        SELECT id, module_id, title, position
        FROM lessons
        WHERE module_id = ?
        ORDER BY position, id
        "#,
    )
    .bind(module_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(lessons))
}

/// Query parameters for listing exams.
#[derive(Debug, Deserialize)]
pub struct ExamListParams {
    pub module_id: Option<i64>,
}

/// Lists published exams with their question counts.
/// Revision quizzes are private to their creator and never listed here.
pub async fn list_exams(
    State(pool): State<SqlitePool>,
    Query(params): Query<ExamListParams>,
) -> Result<impl IntoResponse, AppError> {
    let exams = sqlx::query_as::<_, ExamSummary>(
        r#"
        SELECT
            e.id, e.title, e.description, e.module_id, e.time_limit,
            (SELECT COUNT(*) FROM exam_questions eq WHERE eq.exam_id = e.id) AS question_count
        FROM exams e
        WHERE e.kind = 'EXAM'
          AND (? IS NULL OR e.module_id = ?)
        ORDER BY e.created_at DESC
        "#,
    )
    .bind(params.module_id)
    .bind(params.module_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(exams))
}
