// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::question::QuestionType;

/// Represents the 'attempts' table: one respondent's run through an exam.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub exam_id: i64,
    pub user_id: i64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub score: Option<f64>,
}

/// Represents the 'attempt_answers' table: one row per selected option,
/// or a single row with a NULL option when nothing was selected.
#[derive(Debug, Clone, FromRow)]
pub struct AttemptAnswerRow {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub selected_option_id: Option<i64>,
    pub text_answer: Option<String>,
    pub is_correct: bool,
}

/// One submitted answer: the respondent's selections for a single question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamAnswer {
    pub question_id: i64,
    #[serde(default)]
    pub selected_option_ids: Vec<i64>,
    #[serde(default)]
    pub text_answer: Option<String>,
}

/// DTO for submitting an attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitExamRequest {
    pub attempt_id: i64,
    pub answers: Vec<ExamAnswer>,
}

/// Per-question entry of the corrected report.
#[derive(Debug, Serialize)]
pub struct QuestionResult {
    pub question_id: i64,
    pub question_text: String,
    pub question_type: QuestionType,
    /// The submitted answer rendered as option texts (or the free text).
    pub user_answer: Vec<String>,
    /// Texts of the correct options.
    pub correct_answer: Vec<String>,
    pub is_correct: bool,
    pub score: f64,
    pub max_score: f64,
    pub explanation: Option<String>,
}

/// Full corrected report for an attempt.
#[derive(Debug, Serialize)]
pub struct ExamResultResponse {
    pub id: i64,
    pub exam_id: i64,
    pub title: String,
    pub score: f64,
    pub max_score: u32,
    pub percentage: f64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub time_spent_minutes: i64,
    pub question_results: Vec<QuestionResult>,
}

/// Row for the attempt history listing.
#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub attempt_id: i64,
    pub exam_id: i64,
    pub title: String,
    pub score: f64,
    pub max_score: i64,
    pub percentage: f64,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

/// Aggregates for the student dashboard.
#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub attempts_completed: i64,
    pub average_percentage: f64,
    pub best_percentage: f64,
}
