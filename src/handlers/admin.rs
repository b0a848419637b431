// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        exam::CreateExamRequest,
        module::{CreateLessonRequest, CreateModuleRequest},
        question::{
            CreateQuestionRequest, OptionInput, QuestionType, UpdateQuestionRequest,
            validate_options,
        },
        user::User,
    },
    utils::{hash::hash_password, html::clean_html},
};

/// Lists all users in the system.
/// Admin only.
pub async fn list_users(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password, role, created_at
        FROM users
        ORDER BY id DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(users))
}

/// DTO for Admin creating a user (can specify role).
#[derive(Debug, Deserialize, Validate)]
pub struct AdminCreateUserRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Username length must be between 3 and 50 characters."
    ))]
    pub username: String,
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password length must be between 6 and 128 characters."
    ))]
    pub password: String,
    /// 'student' or 'admin'.
    pub role: String,
}

/// Creates a new user with a specific role.
/// Admin only.
pub async fn create_user(
    State(pool): State<SqlitePool>,
    Json(payload): Json<AdminCreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if payload.role != "student" && payload.role != "admin" {
        return Err(AppError::BadRequest(
            "Role must be 'student' or 'admin'".to_string(),
        ));
    }

    let hashed_password = hash_password(&payload.password)?;

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO users (username, password, role)
        VALUES (?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&payload.username)
    .bind(&hashed_password)
    .bind(&payload.role)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            AppError::Conflict(format!("Username '{}' already exists", payload.username))
        } else {
            tracing::error!("Failed to create user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// DTO for updating a user. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct AdminUpdateUserRequest {
    pub username: Option<String>,
    pub role: Option<String>,
    pub password: Option<String>,
}

/// Updates user information.
/// Admin only.
pub async fn update_user(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
        .bind(id)
        .fetch_one(&pool)
        .await?;
    if exists == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    if let Some(new_username) = payload.username {
        sqlx::query("UPDATE users SET username = ? WHERE id = ?")
            .bind(&new_username)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint failed") {
                    AppError::Conflict(format!("Username '{}' already exists", new_username))
                } else {
                    AppError::InternalServerError(e.to_string())
                }
            })?;
    }

    if let Some(new_role) = payload.role {
        if new_role != "student" && new_role != "admin" {
            return Err(AppError::BadRequest(
                "Role must be 'student' or 'admin'".to_string(),
            ));
        }
        sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(&new_role)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(new_password) = payload.password {
        let hashed = hash_password(&new_password)?;
        sqlx::query("UPDATE users SET password = ? WHERE id = ?")
            .bind(&hashed)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    Ok(Json(serde_json::json!({"message": "User updated"})))
}

/// Deletes a user.
/// Admin only. Refuses while the user still owns attempts.
pub async fn delete_user(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM attempts WHERE user_id = ?")
        .bind(id)
        .fetch_one(&pool)
        .await?;
    if attempts > 0 {
        return Err(AppError::Conflict(
            "User still has exam attempts".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(Json(serde_json::json!({"message": "User deleted"})))
}

/// Creates a module.
/// Admin only.
pub async fn create_module(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateModuleRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO modules (name, year) VALUES (?, ?) RETURNING id",
    )
    .bind(&payload.name)
    .bind(&payload.year)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Creates a lesson under a module.
/// Admin only.
pub async fn create_lesson(
    State(pool): State<SqlitePool>,
    Path(module_id): Path<i64>,
    Json(payload): Json<CreateLessonRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM modules WHERE id = ?")
        .bind(module_id)
        .fetch_one(&pool)
        .await?;
    if exists == 0 {
        return Err(AppError::NotFound("Module not found".to_string()));
    }

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO lessons (module_id, title, position) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(module_id)
    .bind(&payload.title)
    .bind(payload.position.unwrap_or(0))
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Ensures the option set makes sense for the question kind.
fn check_option_shape(
    question_type: QuestionType,
    options: &[OptionInput],
) -> Result<(), AppError> {
    let correct_count = options.iter().filter(|o| o.is_correct).count();
    match question_type {
        QuestionType::Qcma | QuestionType::Qcmp => {
            if correct_count == 0 {
                return Err(AppError::BadRequest(
                    "Multiple choice questions need at least one correct option".to_string(),
                ));
            }
        }
        QuestionType::Qcs => {
            if correct_count != 1 {
                return Err(AppError::BadRequest(
                    "Single choice questions need exactly one correct option".to_string(),
                ));
            }
        }
        QuestionType::Qroc => {
            if options.len() != 1 || correct_count != 1 {
                return Err(AppError::BadRequest(
                    "Open response questions need exactly one reference answer".to_string(),
                ));
            }
        }
    }
    Ok(())
}

async fn insert_options(
    pool: &SqlitePool,
    question_id: i64,
    options: &[OptionInput],
) -> Result<(), AppError> {
    for (index, option) in options.iter().enumerate() {
        sqlx::query(
            "INSERT INTO answer_options (question_id, text, is_correct, position) VALUES (?, ?, ?, ?)",
        )
        .bind(question_id)
        .bind(clean_html(&option.text))
        .bind(option.is_correct)
        .bind(index as i64)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Creates a question in the bank, with its options.
/// Admin only.
pub async fn create_question(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    check_option_shape(payload.question_type, &payload.options)?;

    if let Some(module_id) = payload.module_id {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM modules WHERE id = ?")
            .bind(module_id)
            .fetch_one(&pool)
            .await?;
        if exists == 0 {
            return Err(AppError::NotFound("Module not found".to_string()));
        }
    }
    if let Some(lesson_id) = payload.lesson_id {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM lessons WHERE id = ?")
            .bind(lesson_id)
            .fetch_one(&pool)
            .await?;
        if exists == 0 {
            return Err(AppError::NotFound("Lesson not found".to_string()));
        }
    }

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO questions (module_id, lesson_id, question_type, text, explanation, difficulty)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(payload.module_id)
    .bind(payload.lesson_id)
    .bind(payload.question_type)
    .bind(clean_html(&payload.text))
    .bind(payload.explanation.as_deref().map(clean_html))
    .bind(&payload.difficulty)
    .fetch_one(&pool)
    .await?;

    insert_options(&pool, id, &payload.options).await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Updates a question. Providing `options` replaces the whole option set,
/// which is refused once students have answered the question.
/// Admin only.
pub async fn update_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let question_type = sqlx::query_scalar::<_, QuestionType>(
        "SELECT question_type FROM questions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Question not found".to_string()))?;

    if let Some(new_text) = payload.text {
        if new_text.is_empty() || new_text.len() > 2000 {
            return Err(AppError::BadRequest("Invalid question text".to_string()));
        }
        sqlx::query("UPDATE questions SET text = ? WHERE id = ?")
            .bind(clean_html(&new_text))
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(new_explanation) = payload.explanation {
        sqlx::query("UPDATE questions SET explanation = ? WHERE id = ?")
            .bind(clean_html(&new_explanation))
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(new_difficulty) = payload.difficulty {
        if !matches!(new_difficulty.as_str(), "easy" | "medium" | "hard") {
            return Err(AppError::BadRequest("Unknown difficulty".to_string()));
        }
        sqlx::query("UPDATE questions SET difficulty = ? WHERE id = ?")
            .bind(&new_difficulty)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(is_active) = payload.is_active {
        sqlx::query("UPDATE questions SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(new_options) = payload.options {
        if let Err(e) = validate_options(&new_options) {
            return Err(AppError::BadRequest(e.to_string()));
        }
        check_option_shape(question_type, &new_options)?;

        let answered = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM attempt_answers WHERE question_id = ?",
        )
        .bind(id)
        .fetch_one(&pool)
        .await?;
        if answered > 0 {
            return Err(AppError::Conflict(
                "Question has recorded answers; its options can no longer be replaced".to_string(),
            ));
        }

        sqlx::query("DELETE FROM answer_options WHERE question_id = ?")
            .bind(id)
            .execute(&pool)
            .await?;
        insert_options(&pool, id, &new_options).await?;
    }

    Ok(Json(serde_json::json!({"message": "Question updated"})))
}

/// Deletes a question and its options.
/// Admin only. Refuses while the question is still referenced.
pub async fn delete_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let in_exams = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM exam_questions WHERE question_id = ?",
    )
    .bind(id)
    .fetch_one(&pool)
    .await?;
    if in_exams > 0 {
        return Err(AppError::Conflict(
            "Question is used by an exam".to_string(),
        ));
    }

    let answered = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM attempt_answers WHERE question_id = ?",
    )
    .bind(id)
    .fetch_one(&pool)
    .await?;
    if answered > 0 {
        return Err(AppError::Conflict(
            "Question has recorded answers".to_string(),
        ));
    }

    sqlx::query("DELETE FROM answer_options WHERE question_id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    let result = sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(Json(serde_json::json!({"message": "Question deleted"})))
}

/// Authors an exam from existing bank questions.
/// The paper order follows the submitted question id list.
/// Admin only.
pub async fn create_exam(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let mut unique_ids = payload.question_ids.clone();
    unique_ids.sort_unstable();
    unique_ids.dedup();
    if unique_ids.len() != payload.question_ids.len() {
        return Err(AppError::BadRequest(
            "Duplicate question ids in the paper".to_string(),
        ));
    }

    let mut query_builder =
        QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM questions WHERE id IN (");
    let mut separated = query_builder.separated(",");
    for id in &unique_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let found: i64 = query_builder.build_query_scalar().fetch_one(&pool).await?;
    if found != unique_ids.len() as i64 {
        return Err(AppError::BadRequest(
            "Unknown question id in the paper".to_string(),
        ));
    }

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO exams (title, description, kind, module_id, lesson_id, time_limit)
        VALUES (?, ?, 'EXAM', ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.module_id)
    .bind(payload.lesson_id)
    .bind(payload.time_limit)
    .fetch_one(&pool)
    .await?;

    for (index, question_id) in payload.question_ids.iter().enumerate() {
        sqlx::query("INSERT INTO exam_questions (exam_id, question_id, position) VALUES (?, ?, ?)")
            .bind(id)
            .bind(question_id)
            .bind((index + 1) as i64)
            .execute(&pool)
            .await?;
    }

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Deletes an exam and its question links.
/// Admin only. Refuses once attempts exist.
pub async fn delete_exam(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM attempts WHERE exam_id = ?")
        .bind(id)
        .fetch_one(&pool)
        .await?;
    if attempts > 0 {
        return Err(AppError::Conflict("Exam has recorded attempts".to_string()));
    }

    sqlx::query("DELETE FROM exam_questions WHERE exam_id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    let result = sqlx::query("DELETE FROM exams WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }

    Ok(Json(serde_json::json!({"message": "Exam deleted"})))
}
