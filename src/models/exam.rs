// src/models/exam.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::question::PublicQuestion;

/// Represents the 'exams' table.
///
/// kind = 'EXAM' for admin-authored papers, 'REVISION' for quizzes generated
/// on demand by a student (created_by is then set to that student).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub kind: String,
    pub module_id: Option<i64>,
    pub lesson_id: Option<i64>,
    /// Time limit in minutes, if any.
    pub time_limit: Option<i64>,
    pub created_by: Option<i64>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Row for the public exam catalog listing.
#[derive(Debug, Serialize, FromRow)]
pub struct ExamSummary {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub module_id: Option<i64>,
    pub time_limit: Option<i64>,
    pub question_count: i64,
}

/// Response for starting (or resuming) an attempt: the paper without
/// correctness flags.
#[derive(Debug, Serialize)]
pub struct ExamSessionResponse {
    pub attempt_id: i64,
    pub exam_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub time_limit: Option<i64>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub questions: Vec<PublicQuestion>,
}

/// DTO for authoring an exam from existing bank questions.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateExamRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub module_id: Option<i64>,
    pub lesson_id: Option<i64>,
    #[validate(range(min = 1, max = 480))]
    pub time_limit: Option<i64>,
    /// Question order in the paper follows this list.
    #[validate(length(min = 1, message = "An exam needs at least one question."))]
    pub question_ids: Vec<i64>,
}
