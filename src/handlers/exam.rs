// src/handlers/exam.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::{
        attempt::{
            Attempt, AttemptAnswerRow, DashboardStats, ExamAnswer, ExamResultResponse,
            HistoryEntry, QuestionResult, SubmitExamRequest,
        },
        exam::{Exam, ExamSessionResponse},
        question::{AnswerOption, PublicQuestion, Question, QuestionType, QuestionWithOptions},
    },
    scoring::{self, AttemptScore},
    utils::jwt::Claims,
};

/// Loads an exam's questions with their options, in paper order.
pub(crate) async fn load_paper(
    pool: &SqlitePool,
    exam_id: i64,
) -> Result<Vec<QuestionWithOptions>, AppError> {
    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT q.id, q.module_id, q.lesson_id, q.question_type, q.text,
               q.explanation, q.difficulty, q.is_active, q.created_at
        FROM questions q
        JOIN exam_questions eq ON eq.question_id = q.id
        WHERE eq.exam_id = ?
        ORDER BY eq.position, q.id
        "#,
    )
    .bind(exam_id)
    .fetch_all(pool)
    .await?;

    let options = sqlx::query_as::<_, AnswerOption>(
        r#"
        SELECT o.id, o.question_id, o.text, o.is_correct, o.position
        FROM answer_options o
        JOIN exam_questions eq ON eq.question_id = o.question_id
        WHERE eq.exam_id = ?
        ORDER BY o.position, o.id
        "#,
    )
    .bind(exam_id)
    .fetch_all(pool)
    .await?;

    let mut options_by_question: HashMap<i64, Vec<AnswerOption>> = HashMap::new();
    for option in options {
        options_by_question
            .entry(option.question_id)
            .or_default()
            .push(option);
    }

    Ok(questions
        .into_iter()
        .map(|question| {
            let options = options_by_question.remove(&question.id).unwrap_or_default();
            QuestionWithOptions { question, options }
        })
        .collect())
}

pub(crate) fn session_response(
    exam: &Exam,
    attempt: &Attempt,
    paper: &[QuestionWithOptions],
) -> ExamSessionResponse {
    ExamSessionResponse {
        attempt_id: attempt.id,
        exam_id: exam.id,
        title: exam.title.clone(),
        description: exam.description.clone(),
        time_limit: exam.time_limit,
        started_at: attempt.started_at,
        questions: paper
            .iter()
            .map(|q| PublicQuestion::from_parts(&q.question, &q.options))
            .collect(),
    }
}

/// Starts an attempt on an exam, or resumes the caller's active one.
///
/// The paper is returned without correctness flags or explanations.
pub async fn start_exam(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    // Revision quizzes are only startable by the student who generated them.
    let exam = sqlx::query_as::<_, Exam>(
        r#"
        SELECT id, title, description, kind, module_id, lesson_id,
               time_limit, created_by, created_at
        FROM exams
        WHERE id = ? AND (kind = 'EXAM' OR created_by = ?)
        "#,
    )
    .bind(exam_id)
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    let existing = sqlx::query_as::<_, Attempt>(
        r#"
        SELECT id, exam_id, user_id, started_at, finished_at, score
        FROM attempts
        WHERE exam_id = ? AND user_id = ? AND finished_at IS NULL
        "#,
    )
    .bind(exam_id)
    .bind(user_id)
    .fetch_optional(&pool)
    .await?;

    let attempt = match existing {
        Some(attempt) => {
            tracing::info!(
                "Resuming active attempt {} on exam {} for user {}",
                attempt.id,
                exam_id,
                user_id
            );
            attempt
        }
        None => {
            sqlx::query_as::<_, Attempt>(
                r#"
                INSERT INTO attempts (exam_id, user_id, started_at)
                VALUES (?, ?, ?)
                RETURNING id, exam_id, user_id, started_at, finished_at, score
                "#,
            )
            .bind(exam_id)
            .bind(user_id)
            .bind(Utc::now())
            .fetch_one(&pool)
            .await?
        }
    };

    let paper = load_paper(&pool, exam_id).await?;

    Ok(Json(session_response(&exam, &attempt, &paper)))
}

/// Submits a user's answers for an attempt and grades them.
///
/// * 404 if the attempt does not exist, belongs to someone else, or belongs
///   to another exam.
/// * 400 if the attempt was already submitted.
/// * Persists the attempt score and one answer row per selected option, then
///   returns the full corrected report.
pub async fn submit_exam(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
    Json(req): Json<SubmitExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let attempt = sqlx::query_as::<_, Attempt>(
        r#"
        SELECT id, exam_id, user_id, started_at, finished_at, score
        FROM attempts
        WHERE id = ? AND exam_id = ? AND user_id = ?
        "#,
    )
    .bind(req.attempt_id)
    .bind(exam_id)
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    if attempt.finished_at.is_some() {
        return Err(AppError::BadRequest("Exam already submitted".to_string()));
    }

    let exam = sqlx::query_as::<_, Exam>(
        r#"
        SELECT id, title, description, kind, module_id, lesson_id,
               time_limit, created_by, created_at
        FROM exams
        WHERE id = ?
        "#,
    )
    .bind(exam_id)
    .fetch_one(&pool)
    .await?;

    let paper = load_paper(&pool, exam_id).await?;

    let answers_by_question: HashMap<i64, &ExamAnswer> =
        req.answers.iter().map(|a| (a.question_id, a)).collect();

    let (question_results, attempt_score) = grade_paper(&paper, &answers_by_question);

    let finished_at = Utc::now();

    sqlx::query("UPDATE attempts SET finished_at = ?, score = ? WHERE id = ?")
        .bind(finished_at)
        .bind(attempt_score.total_score)
        .bind(attempt.id)
        .execute(&pool)
        .await?;

    let verdicts: HashMap<i64, bool> = question_results
        .iter()
        .map(|r| (r.question_id, r.is_correct))
        .collect();

    for answer in &req.answers {
        let is_correct = verdicts.get(&answer.question_id).copied().unwrap_or(false);
        if answer.selected_option_ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO attempt_answers
                    (attempt_id, question_id, selected_option_id, text_answer, is_correct)
                VALUES (?, ?, NULL, ?, ?)
                "#,
            )
            .bind(attempt.id)
            .bind(answer.question_id)
            .bind(&answer.text_answer)
            .bind(is_correct)
            .execute(&pool)
            .await?;
        } else {
            for option_id in &answer.selected_option_ids {
                sqlx::query(
                    r#"
                    INSERT INTO attempt_answers
                        (attempt_id, question_id, selected_option_id, text_answer, is_correct)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(attempt.id)
                .bind(answer.question_id)
                .bind(option_id)
                .bind(&answer.text_answer)
                .bind(is_correct)
                .execute(&pool)
                .await?;
            }
        }
    }

    let time_spent_minutes =
        ((finished_at - attempt.started_at).num_seconds() as f64 / 60.0).round() as i64;

    Ok(Json(ExamResultResponse {
        id: attempt.id,
        exam_id: exam.id,
        title: exam.title,
        score: attempt_score.total_score,
        max_score: attempt_score.max_score,
        percentage: scoring::round2(attempt_score.percentage),
        started_at: attempt.started_at,
        completed_at: Some(finished_at),
        time_spent_minutes,
        question_results,
    }))
}

/// Rebuilds the corrected report for one of the caller's attempts from the
/// stored answers. The scoring engine is pure, so re-grading the stored
/// selections reproduces the submitted-time result.
pub async fn attempt_results(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let attempt = sqlx::query_as::<_, Attempt>(
        r#"
        SELECT id, exam_id, user_id, started_at, finished_at, score
        FROM attempts
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(attempt_id)
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    let exam = sqlx::query_as::<_, Exam>(
        r#"
        SELECT id, title, description, kind, module_id, lesson_id,
               time_limit, created_by, created_at
        FROM exams
        WHERE id = ?
        "#,
    )
    .bind(attempt.exam_id)
    .fetch_one(&pool)
    .await?;

    let paper = load_paper(&pool, attempt.exam_id).await?;

    let rows = sqlx::query_as::<_, AttemptAnswerRow>(
        r#"
        SELECT id, attempt_id, question_id, selected_option_id, text_answer, is_correct
        FROM attempt_answers
        WHERE attempt_id = ?
        ORDER BY id
        "#,
    )
    .bind(attempt.id)
    .fetch_all(&pool)
    .await?;

    let stored_answers = reassemble_answers(&rows);
    let answers_by_question: HashMap<i64, &ExamAnswer> =
        stored_answers.iter().map(|a| (a.question_id, a)).collect();

    let (question_results, attempt_score) = grade_paper(&paper, &answers_by_question);

    let time_spent_minutes = attempt
        .finished_at
        .map(|f| ((f - attempt.started_at).num_seconds() as f64 / 60.0).round() as i64)
        .unwrap_or(0);

    Ok(Json(ExamResultResponse {
        id: attempt.id,
        exam_id: exam.id,
        title: exam.title,
        score: attempt_score.total_score,
        max_score: attempt_score.max_score,
        percentage: scoring::round2(attempt_score.percentage),
        started_at: attempt.started_at,
        completed_at: attempt.finished_at,
        time_spent_minutes,
        question_results,
    }))
}

/// Helper struct for the history listing join.
#[derive(sqlx::FromRow)]
struct HistoryRow {
    attempt_id: i64,
    exam_id: i64,
    title: String,
    score: f64,
    max_score: i64,
    finished_at: chrono::DateTime<chrono::Utc>,
}

/// Lists the caller's finished attempts, newest first.
pub async fn exam_history(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let rows = sqlx::query_as::<_, HistoryRow>(
        r#"
        SELECT
            a.id AS attempt_id,
            e.id AS exam_id,
            e.title,
            a.score AS score,
            (SELECT COUNT(*) FROM exam_questions eq WHERE eq.exam_id = e.id) AS max_score,
            a.finished_at
        FROM attempts a
        JOIN exams e ON a.exam_id = e.id
        WHERE a.user_id = ? AND a.finished_at IS NOT NULL
        ORDER BY a.finished_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    let history: Vec<HistoryEntry> = rows
        .into_iter()
        .map(|r| {
            let percentage = if r.max_score > 0 {
                scoring::round2(r.score / r.max_score as f64 * 100.0)
            } else {
                0.0
            };
            HistoryEntry {
                attempt_id: r.attempt_id,
                exam_id: r.exam_id,
                title: r.title,
                score: r.score,
                max_score: r.max_score,
                percentage,
                finished_at: r.finished_at,
            }
        })
        .collect();

    Ok(Json(history))
}

/// Helper struct for the dashboard aggregates.
#[derive(sqlx::FromRow)]
struct StatsRow {
    attempts_completed: i64,
    average_percentage: Option<f64>,
    best_percentage: Option<f64>,
}

/// Dashboard aggregates over the caller's finished attempts.
pub async fn dashboard_stats(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let row = sqlx::query_as::<_, StatsRow>(
        r#"
        SELECT
            COUNT(*) AS attempts_completed,
            AVG(pct) AS average_percentage,
            MAX(pct) AS best_percentage
        FROM (
            SELECT a.score * 100.0 /
                (SELECT COUNT(*) FROM exam_questions eq WHERE eq.exam_id = a.exam_id) AS pct
            FROM attempts a
            WHERE a.user_id = ? AND a.finished_at IS NOT NULL
        )
        "#,
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(DashboardStats {
        attempts_completed: row.attempts_completed,
        average_percentage: scoring::round2(row.average_percentage.unwrap_or(0.0)),
        best_percentage: scoring::round2(row.best_percentage.unwrap_or(0.0)),
    }))
}

/// Grades every question of a paper against the submitted answers and builds
/// the per-question report entries alongside the aggregate score.
fn grade_paper(
    paper: &[QuestionWithOptions],
    answers_by_question: &HashMap<i64, &ExamAnswer>,
) -> (Vec<QuestionResult>, AttemptScore) {
    let pairs: Vec<(&QuestionWithOptions, Option<&ExamAnswer>)> = paper
        .iter()
        .map(|q| (q, answers_by_question.get(&q.question.id).copied()))
        .collect();

    let attempt_score = scoring::score_attempt(pairs.iter().copied());

    let question_results = pairs
        .iter()
        .map(|(question, answer)| {
            if !question.options.iter().any(|o| o.is_correct)
                && question.question.question_type != QuestionType::Qroc
            {
                tracing::warn!(
                    "Question {} has no correct option flagged; it grades 0",
                    question.question.id
                );
            }

            let graded = scoring::score_question(question, *answer);
            QuestionResult {
                question_id: question.question.id,
                question_text: question.question.text.clone(),
                question_type: question.question.question_type,
                user_answer: format_user_answer(question, *answer),
                correct_answer: format_correct_answer(question),
                is_correct: graded.is_correct,
                score: graded.score,
                max_score: 1.0,
                explanation: question.question.explanation.clone(),
            }
        })
        .collect();

    (question_results, attempt_score)
}

/// Renders a submitted answer as display strings for the report.
fn format_user_answer(question: &QuestionWithOptions, answer: Option<&ExamAnswer>) -> Vec<String> {
    let Some(answer) = answer else {
        return vec!["No answer".to_string()];
    };

    if question.question.question_type == QuestionType::Qroc {
        return vec![
            answer
                .text_answer
                .clone()
                .unwrap_or_else(|| "No answer".to_string()),
        ];
    }

    if answer.selected_option_ids.is_empty() {
        return vec!["No answer".to_string()];
    }

    answer
        .selected_option_ids
        .iter()
        .map(|option_id| {
            question
                .options
                .iter()
                .find(|o| o.id == *option_id)
                .map(|o| o.text.clone())
                .unwrap_or_else(|| "Unknown option".to_string())
        })
        .collect()
}

/// Texts of the correct options (the reference answer for QROC).
fn format_correct_answer(question: &QuestionWithOptions) -> Vec<String> {
    question
        .options
        .iter()
        .filter(|o| o.is_correct)
        .map(|o| o.text.clone())
        .collect()
}

/// Regroups stored per-option answer rows into one `ExamAnswer` per question.
fn reassemble_answers(rows: &[AttemptAnswerRow]) -> Vec<ExamAnswer> {
    let mut by_question: HashMap<i64, ExamAnswer> = HashMap::new();
    let mut order: Vec<i64> = Vec::new();

    for row in rows {
        let entry = by_question.entry(row.question_id).or_insert_with(|| {
            order.push(row.question_id);
            ExamAnswer {
                question_id: row.question_id,
                selected_option_ids: Vec::new(),
                text_answer: None,
            }
        });
        if let Some(option_id) = row.selected_option_id {
            entry.selected_option_ids.push(option_id);
        }
        if entry.text_answer.is_none() {
            entry.text_answer = row.text_answer.clone();
        }
    }

    order
        .into_iter()
        .filter_map(|question_id| by_question.remove(&question_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{AnswerOption, Question};

    fn option(id: i64, question_id: i64, text: &str, is_correct: bool) -> AnswerOption {
        AnswerOption {
            id,
            question_id,
            text: text.to_string(),
            is_correct,
            position: 0,
        }
    }

    fn qcma(id: i64) -> QuestionWithOptions {
        QuestionWithOptions {
            question: Question {
                id,
                module_id: None,
                lesson_id: None,
                question_type: QuestionType::Qcma,
                text: "Pick the beta-lactams".to_string(),
                explanation: Some("Both are beta-lactams.".to_string()),
                difficulty: None,
                is_active: true,
                created_at: None,
            },
            options: vec![
                option(1, id, "Penicillin", true),
                option(2, id, "Cefalexin", true),
                option(3, id, "Erythromycin", false),
            ],
        }
    }

    #[test]
    fn user_answer_renders_option_texts() {
        let q = qcma(1);
        let answer = ExamAnswer {
            question_id: 1,
            selected_option_ids: vec![1, 3],
            text_answer: None,
        };
        assert_eq!(
            format_user_answer(&q, Some(&answer)),
            vec!["Penicillin".to_string(), "Erythromycin".to_string()]
        );
    }

    #[test]
    fn missing_answer_renders_placeholder() {
        let q = qcma(1);
        assert_eq!(format_user_answer(&q, None), vec!["No answer".to_string()]);
    }

    #[test]
    fn unknown_option_ids_render_placeholder() {
        let q = qcma(1);
        let answer = ExamAnswer {
            question_id: 1,
            selected_option_ids: vec![99],
            text_answer: None,
        };
        assert_eq!(
            format_user_answer(&q, Some(&answer)),
            vec!["Unknown option".to_string()]
        );
    }

    #[test]
    fn correct_answer_lists_flagged_options() {
        let q = qcma(1);
        assert_eq!(
            format_correct_answer(&q),
            vec!["Penicillin".to_string(), "Cefalexin".to_string()]
        );
    }

    #[test]
    fn reassemble_groups_rows_per_question() {
        let rows = vec![
            AttemptAnswerRow {
                id: 1,
                attempt_id: 7,
                question_id: 1,
                selected_option_id: Some(1),
                text_answer: None,
                is_correct: true,
            },
            AttemptAnswerRow {
                id: 2,
                attempt_id: 7,
                question_id: 1,
                selected_option_id: Some(2),
                text_answer: None,
                is_correct: true,
            },
            AttemptAnswerRow {
                id: 3,
                attempt_id: 7,
                question_id: 2,
                selected_option_id: None,
                text_answer: Some("penicillin".to_string()),
                is_correct: false,
            },
        ];

        let answers = reassemble_answers(&rows);
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].question_id, 1);
        assert_eq!(answers[0].selected_option_ids, vec![1, 2]);
        assert_eq!(answers[1].question_id, 2);
        assert!(answers[1].selected_option_ids.is_empty());
        assert_eq!(answers[1].text_answer.as_deref(), Some("penicillin"));
    }

    #[test]
    fn grade_paper_reports_and_totals_agree() {
        let q = qcma(1);
        let answer = ExamAnswer {
            question_id: 1,
            selected_option_ids: vec![1, 2],
            text_answer: None,
        };
        let mut answers_by_question = HashMap::new();
        answers_by_question.insert(1i64, &answer);

        let paper = vec![q];
        let (results, totals) = grade_paper(&paper, &answers_by_question);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_correct);
        assert_eq!(totals.total_score, 1.0);
        assert_eq!(totals.max_score, 1);
    }
}
