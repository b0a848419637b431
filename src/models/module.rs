// src/models/module.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'modules' table: a teaching unit such as "Pharmacologie".
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    pub name: String,
    /// Study year label, e.g. "3A".
    pub year: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'lessons' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub module_id: i64,
    pub title: String,
    pub position: i64,
}

/// DTO for creating a module.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateModuleRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 20))]
    pub year: Option<String>,
}

/// DTO for creating a lesson under a module.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLessonRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub position: Option<i64>,
}
