// src/scoring.rs

//! Grading for exam and revision quiz attempts.
//!
//! Every handler that needs to grade an answer goes through this module, so
//! the rules live in exactly one place. All functions are pure: no I/O, no
//! clock, no randomness, and they never panic on malformed data - a question
//! that cannot be graded is worth 0.
//!
//! Each question contributes at most 1 point:
//!
//! * QCMA - 1 point iff the selected set equals the correct set.
//! * QCMP - (correct picks - incorrect picks) / number of correct options,
//!   floored at 0.
//! * QCS  - 1 point iff the first selected option is the correct one.
//! * QROC - 1 point iff the submitted text equals the reference answer after
//!   trimming and lowercasing. No fuzzy matching.

use std::collections::HashSet;

use serde::Serialize;

use crate::models::{
    attempt::ExamAnswer,
    question::{QuestionType, QuestionWithOptions},
};

/// Grade for a single question.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuestionScore {
    /// In [0, 1].
    pub score: f64,
    /// True iff `score == 1`.
    pub is_correct: bool,
}

impl QuestionScore {
    fn of(score: f64) -> Self {
        Self {
            score,
            is_correct: score == 1.0,
        }
    }

    fn zero() -> Self {
        Self::of(0.0)
    }
}

/// Aggregate grade for a whole attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttemptScore {
    /// Sum of question scores, rounded to 2 decimal places.
    pub total_score: f64,
    /// Number of questions; each is worth 1 point.
    pub max_score: u32,
    /// `total_score / max_score * 100`, or 0 for an empty attempt.
    pub percentage: f64,
}

/// Rounds to 2 decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Grades one question against its submitted answer, if any.
///
/// Unknown option ids in the answer are not an error: they fail the set
/// equality for QCMA/QCS and count as incorrect picks for QCMP. A question
/// with no correct option flagged (or no options at all) grades 0; that is
/// an authoring defect the caller should log, not a reason to fail the
/// whole submission.
pub fn score_question(question: &QuestionWithOptions, answer: Option<&ExamAnswer>) -> QuestionScore {
    let Some(answer) = answer else {
        return QuestionScore::zero();
    };

    let correct: HashSet<i64> = question
        .options
        .iter()
        .filter(|o| o.is_correct)
        .map(|o| o.id)
        .collect();

    match question.question.question_type {
        QuestionType::Qcma => {
            if correct.is_empty() {
                return QuestionScore::zero();
            }
            let selected: HashSet<i64> = answer.selected_option_ids.iter().copied().collect();
            QuestionScore::of(if selected == correct { 1.0 } else { 0.0 })
        }

        QuestionType::Qcmp => {
            let n = correct.len();
            if n == 0 {
                return QuestionScore::zero();
            }
            let mut correct_picks = 0usize;
            let mut incorrect_picks = 0usize;
            let selected: HashSet<i64> = answer.selected_option_ids.iter().copied().collect();
            for id in &selected {
                if correct.contains(id) {
                    correct_picks += 1;
                } else {
                    incorrect_picks += 1;
                }
            }
            let raw = (correct_picks as f64 - incorrect_picks as f64) / n as f64;
            QuestionScore::of(raw.max(0.0))
        }

        QuestionType::Qcs => {
            // Exactly one correct option is assumed; only the first selected
            // id is considered when the client sent several.
            let Some(correct_option) = question.options.iter().find(|o| o.is_correct) else {
                return QuestionScore::zero();
            };
            let hit = answer.selected_option_ids.first() == Some(&correct_option.id);
            QuestionScore::of(if hit { 1.0 } else { 0.0 })
        }

        QuestionType::Qroc => {
            let reference = question
                .options
                .iter()
                .find(|o| o.is_correct)
                .map(|o| o.text.as_str())
                .unwrap_or("");
            let user_text = normalize_text(answer.text_answer.as_deref().unwrap_or(""));
            let correct_text = normalize_text(reference);
            QuestionScore::of(if user_text == correct_text { 1.0 } else { 0.0 })
        }
    }
}

/// Grades a whole attempt: one pass over the pairs, in order.
pub fn score_attempt<'a, I>(pairs: I) -> AttemptScore
where
    I: IntoIterator<Item = (&'a QuestionWithOptions, Option<&'a ExamAnswer>)>,
{
    let mut sum = 0.0f64;
    let mut count = 0u32;
    for (question, answer) in pairs {
        sum += score_question(question, answer).score;
        count += 1;
    }

    let total_score = round2(sum);
    let percentage = if count > 0 {
        total_score / count as f64 * 100.0
    } else {
        0.0
    };

    AttemptScore {
        total_score,
        max_score: count,
        percentage,
    }
}

fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{AnswerOption, Question};

    fn question(id: i64, question_type: QuestionType, options: &[(i64, &str, bool)]) -> QuestionWithOptions {
        QuestionWithOptions {
            question: Question {
                id,
                module_id: None,
                lesson_id: None,
                question_type,
                text: format!("Question {}", id),
                explanation: None,
                difficulty: None,
                is_active: true,
                created_at: None,
            },
            options: options
                .iter()
                .enumerate()
                .map(|(i, (oid, text, is_correct))| AnswerOption {
                    id: *oid,
                    question_id: id,
                    text: text.to_string(),
                    is_correct: *is_correct,
                    position: i as i64,
                })
                .collect(),
        }
    }

    fn selection(question_id: i64, ids: &[i64]) -> ExamAnswer {
        ExamAnswer {
            question_id,
            selected_option_ids: ids.to_vec(),
            text_answer: None,
        }
    }

    fn text_answer(question_id: i64, text: &str) -> ExamAnswer {
        ExamAnswer {
            question_id,
            selected_option_ids: Vec::new(),
            text_answer: Some(text.to_string()),
        }
    }

    #[test]
    fn qcma_exact_set_scores_one() {
        let q = question(1, QuestionType::Qcma, &[(1, "A", true), (2, "B", true), (3, "C", false)]);
        let result = score_question(&q, Some(&selection(1, &[2, 1])));
        assert_eq!(result.score, 1.0);
        assert!(result.is_correct);
    }

    #[test]
    fn qcma_subset_superset_disjoint_score_zero() {
        let q = question(1, QuestionType::Qcma, &[(1, "A", true), (2, "B", true), (3, "C", false)]);
        for ids in [&[1][..], &[1, 2, 3][..], &[3][..]] {
            let result = score_question(&q, Some(&selection(1, ids)));
            assert_eq!(result.score, 0.0, "selection {:?}", ids);
            assert!(!result.is_correct);
        }
    }

    #[test]
    fn qcma_empty_selection_scores_zero() {
        let q = question(1, QuestionType::Qcma, &[(1, "A", true), (2, "B", true)]);
        assert_eq!(score_question(&q, Some(&selection(1, &[]))).score, 0.0);
    }

    #[test]
    fn qcma_unknown_ids_fail_the_match() {
        let q = question(1, QuestionType::Qcma, &[(1, "A", true), (2, "B", true)]);
        assert_eq!(score_question(&q, Some(&selection(1, &[1, 2, 99]))).score, 0.0);
    }

    #[test]
    fn qcmp_partial_credit() {
        // Correct {A, B, C}, selected {A, B, D}: (2 - 1) / 3.
        let q = question(
            1,
            QuestionType::Qcmp,
            &[(1, "A", true), (2, "B", true), (3, "C", true), (4, "D", false)],
        );
        let result = score_question(&q, Some(&selection(1, &[1, 2, 4])));
        assert!((result.score - 1.0 / 3.0).abs() < 1e-12);
        assert!(!result.is_correct);
    }

    #[test]
    fn qcmp_floors_at_zero() {
        // Correct {A, B}, selected {A, B, X, Y}: (2 - 2) / 2 = 0.
        let q = question(
            1,
            QuestionType::Qcmp,
            &[(1, "A", true), (2, "B", true), (3, "X", false), (4, "Y", false)],
        );
        assert_eq!(score_question(&q, Some(&selection(1, &[1, 2, 3, 4]))).score, 0.0);

        // Only wrong picks must not go negative.
        assert_eq!(score_question(&q, Some(&selection(1, &[3, 4]))).score, 0.0);
    }

    #[test]
    fn qcmp_perfect_selection_is_correct() {
        let q = question(1, QuestionType::Qcmp, &[(1, "A", true), (2, "B", true), (3, "C", false)]);
        let result = score_question(&q, Some(&selection(1, &[1, 2])));
        assert_eq!(result.score, 1.0);
        assert!(result.is_correct);
    }

    #[test]
    fn qcmp_each_extra_wrong_pick_strictly_decreases_until_floor() {
        let q = question(
            1,
            QuestionType::Qcmp,
            &[
                (1, "A", true),
                (2, "B", true),
                (3, "C", true),
                (4, "D", false),
                (5, "E", false),
                (6, "F", false),
                (7, "G", false),
            ],
        );
        let mut selected = vec![1, 2, 3];
        let mut previous = score_question(&q, Some(&selection(1, &selected))).score;
        assert_eq!(previous, 1.0);
        for wrong in [4, 5, 6, 7] {
            selected.push(wrong);
            let next = score_question(&q, Some(&selection(1, &selected))).score;
            if previous > 0.0 {
                assert!(next < previous, "adding {} should lower the score", wrong);
            } else {
                assert_eq!(next, 0.0);
            }
            previous = next;
        }
    }

    #[test]
    fn qcmp_without_correct_options_is_malformed_and_scores_zero() {
        let q = question(1, QuestionType::Qcmp, &[(1, "A", false), (2, "B", false)]);
        assert_eq!(score_question(&q, Some(&selection(1, &[1]))).score, 0.0);
    }

    #[test]
    fn qcs_first_selection_only() {
        let q = question(1, QuestionType::Qcs, &[(1, "A", true), (2, "B", false)]);

        let hit = score_question(&q, Some(&selection(1, &[1])));
        assert_eq!(hit.score, 1.0);
        assert!(hit.is_correct);

        assert_eq!(score_question(&q, Some(&selection(1, &[2]))).score, 0.0);
        assert_eq!(score_question(&q, Some(&selection(1, &[]))).score, 0.0);

        // Only the first selected id counts when several were sent.
        assert_eq!(score_question(&q, Some(&selection(1, &[2, 1]))).score, 0.0);
        assert_eq!(score_question(&q, Some(&selection(1, &[1, 2]))).score, 1.0);
    }

    #[test]
    fn qroc_normalized_exact_match() {
        let q = question(1, QuestionType::Qroc, &[(1, "Penicillin", true)]);

        let hit = score_question(&q, Some(&text_answer(1, "  penicillin ")));
        assert_eq!(hit.score, 1.0);
        assert!(hit.is_correct);

        assert_eq!(score_question(&q, Some(&text_answer(1, "Amoxicillin"))).score, 0.0);
        // Near matches get nothing.
        assert_eq!(score_question(&q, Some(&text_answer(1, "penicilin"))).score, 0.0);
    }

    #[test]
    fn qroc_missing_text_scores_zero_against_a_reference() {
        let q = question(1, QuestionType::Qroc, &[(1, "Penicillin", true)]);
        assert_eq!(score_question(&q, Some(&selection(1, &[]))).score, 0.0);
    }

    #[test]
    fn absent_answer_scores_zero_for_every_type() {
        for question_type in [
            QuestionType::Qcma,
            QuestionType::Qcmp,
            QuestionType::Qcs,
            QuestionType::Qroc,
        ] {
            let q = question(1, question_type, &[(1, "A", true), (2, "B", false)]);
            let result = score_question(&q, None);
            assert_eq!(result.score, 0.0);
            assert!(!result.is_correct);
        }
    }

    #[test]
    fn scoring_is_idempotent() {
        let q = question(
            1,
            QuestionType::Qcmp,
            &[(1, "A", true), (2, "B", true), (3, "C", false)],
        );
        let answer = selection(1, &[1, 3]);
        let first = score_question(&q, Some(&answer));
        let second = score_question(&q, Some(&answer));
        assert_eq!(first, second);
    }

    #[test]
    fn attempt_totals_are_additive_and_rounded() {
        let q1 = question(1, QuestionType::Qcs, &[(1, "A", true), (2, "B", false)]);
        let q2 = question(
            2,
            QuestionType::Qcmp,
            &[(3, "A", true), (4, "B", true), (5, "C", true), (6, "D", false)],
        );
        let q3 = question(3, QuestionType::Qroc, &[(7, "Penicillin", true)]);

        let a1 = selection(1, &[1]);
        let a2 = selection(2, &[3, 4, 6]); // (2 - 1) / 3
        let pairs = vec![(&q1, Some(&a1)), (&q2, Some(&a2)), (&q3, None)];

        let attempt = score_attempt(pairs);
        assert_eq!(attempt.max_score, 3);
        // 1 + 0.3333... + 0, rounded to 2 decimals.
        assert_eq!(attempt.total_score, 1.33);
        assert!((attempt.percentage - 1.33 / 3.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn attempt_half_points_example() {
        // Scores 1, 0.5, 0 over three questions: total 1.5, 50%.
        let q1 = question(1, QuestionType::Qcs, &[(1, "A", true), (2, "B", false)]);
        let q2 = question(2, QuestionType::Qcmp, &[(3, "A", true), (4, "B", true), (5, "C", false)]);
        let q3 = question(3, QuestionType::Qcs, &[(6, "A", true), (7, "B", false)]);

        let a1 = selection(1, &[1]);
        let a2 = selection(2, &[3]); // (1 - 0) / 2
        let a3 = selection(3, &[7]);

        let attempt = score_attempt(vec![(&q1, Some(&a1)), (&q2, Some(&a2)), (&q3, Some(&a3))]);
        assert_eq!(attempt.total_score, 1.5);
        assert_eq!(attempt.max_score, 3);
        assert_eq!(attempt.percentage, 50.0);
    }

    #[test]
    fn empty_attempt_has_zero_percentage() {
        let pairs: Vec<(&QuestionWithOptions, Option<&ExamAnswer>)> = Vec::new();
        let attempt = score_attempt(pairs);
        assert_eq!(attempt.total_score, 0.0);
        assert_eq!(attempt.max_score, 0);
        assert_eq!(attempt.percentage, 0.0);
    }
}
