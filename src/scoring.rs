// src/scoring.rs

use std::collections::HashMap;

use serde::Serialize;

use crate::models::{attempt::AttemptAnswer, question::Question};

/// Per-question outcome reported with an attempt result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOutcome {
    pub question_id: i64,
    pub selected_option_id: Option<i64>,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub score_points: i32,
    pub max_points: i32,
    /// Percentage rounded to two decimals; 0 when the exam carries no points.
    pub score_percent: f64,
    /// One entry per question, in question order.
    pub outcomes: Vec<QuestionOutcome>,
}

/// Scores an attempt against the exam's questions.
///
/// A question earns its points only when an answer exists and selects the
/// question's correct option. Answers to questions outside `questions` are ignored.
pub fn score_attempt(questions: &[Question], answers: &[AttemptAnswer]) -> Score {
    let selected: HashMap<i64, i64> = answers
        .iter()
        .map(|a| (a.question_id, a.selected_option_id))
        .collect();

    let mut score_points = 0;
    let mut max_points = 0;
    let mut outcomes = Vec::with_capacity(questions.len());

    for question in questions {
        max_points += question.points;

        let selected_option_id = selected.get(&question.id).copied();
        let correct = match (selected_option_id, question.correct_option_id()) {
            (Some(chosen), Some(key)) => chosen == key,
            _ => false,
        };

        if correct {
            score_points += question.points;
        }

        outcomes.push(QuestionOutcome {
            question_id: question.id,
            selected_option_id,
            correct,
        });
    }

    Score {
        score_points,
        max_points,
        score_percent: percent(score_points, max_points),
        outcomes,
    }
}

fn percent(points: i32, max_points: i32) -> f64 {
    if max_points <= 0 {
        return 0.0;
    }
    let raw = f64::from(points) / f64::from(max_points) * 100.0;
    (raw * 100.0).round() / 100.0
}
