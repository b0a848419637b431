// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Question kinds used across the question bank.
///
/// * `Qcma` - multiple choice, all-or-nothing grading.
/// * `Qcmp` - multiple choice, partial credit grading.
/// * `Qcs`  - single choice.
/// * `Qroc` - short open response, matched against a reference answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum QuestionType {
    Qcma,
    Qcmp,
    Qcs,
    Qroc,
}

/// Represents the 'questions' table (the question bank).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// Optional attachment points in the catalog.
    pub module_id: Option<i64>,
    pub lesson_id: Option<i64>,

    pub question_type: QuestionType,

    /// The text content of the question (sanitized HTML).
    pub text: String,

    /// Explanation shown alongside corrected answers.
    pub explanation: Option<String>,

    /// 'easy', 'medium' or 'hard'.
    pub difficulty: Option<String>,

    /// Inactive questions are excluded from revision quiz generation.
    pub is_active: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'answer_options' table.
/// For QROC questions the single correct option holds the reference answer.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub is_correct: bool,
    pub position: i64,
}

/// A question together with its loaded options, as the scoring engine
/// consumes it.
#[derive(Debug, Clone)]
pub struct QuestionWithOptions {
    pub question: Question,
    pub options: Vec<AnswerOption>,
}

/// DTO for sending a question to a respondent (hides correctness flags
/// and the explanation).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub question_type: QuestionType,
    pub text: String,
    pub options: Vec<PublicOption>,
}

#[derive(Debug, Serialize)]
pub struct PublicOption {
    pub id: i64,
    pub text: String,
}

impl PublicQuestion {
    pub fn from_parts(question: &Question, options: &[AnswerOption]) -> Self {
        Self {
            id: question.id,
            question_type: question.question_type,
            text: question.text.clone(),
            options: options
                .iter()
                .map(|o| PublicOption {
                    id: o.id,
                    text: o.text.clone(),
                })
                .collect(),
        }
    }
}

/// DTO for a single option when authoring a question.
#[derive(Debug, Deserialize, Serialize)]
pub struct OptionInput {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    pub question_type: QuestionType,
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    #[validate(length(max = 5000))]
    pub explanation: Option<String>,
    #[validate(custom(function = validate_difficulty))]
    pub difficulty: Option<String>,
    pub module_id: Option<i64>,
    pub lesson_id: Option<i64>,
    #[validate(custom(function = validate_options))]
    pub options: Vec<OptionInput>,
}

/// DTO for updating a question. Fields are optional; providing `options`
/// replaces the whole option set.
#[derive(Debug, Deserialize)]
pub struct UpdateQuestionRequest {
    pub text: Option<String>,
    pub explanation: Option<String>,
    pub difficulty: Option<String>,
    pub is_active: Option<bool>,
    pub options: Option<Vec<OptionInput>>,
}

pub fn validate_options(options: &[OptionInput]) -> Result<(), validator::ValidationError> {
    if options.is_empty() {
        return Err(validator::ValidationError::new("options_cannot_be_empty"));
    }
    for opt in options {
        if opt.text.is_empty() || opt.text.len() > 500 {
            return Err(validator::ValidationError::new("option_text_length"));
        }
    }
    Ok(())
}

fn validate_difficulty(difficulty: &str) -> Result<(), validator::ValidationError> {
    match difficulty {
        "easy" | "medium" | "hard" => Ok(()),
        _ => Err(validator::ValidationError::new("unknown_difficulty")),
    }
}
