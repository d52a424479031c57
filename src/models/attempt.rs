// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{error::Rule, scoring::QuestionOutcome};

/// Attempt lifecycle: `in_progress -> submitted | expired`. Both end states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attempt_status", rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
    Expired,
}

impl AttemptStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }

    /// Answers and submission are only accepted while in progress.
    pub fn ensure_in_progress(self) -> Result<(), Rule> {
        match self {
            AttemptStatus::InProgress => Ok(()),
            _ => Err(Rule::AttemptSubmitted),
        }
    }

    /// Results are only visible once the attempt is closed.
    pub fn ensure_terminal(self) -> Result<(), Rule> {
        if self.is_terminal() {
            Ok(())
        } else {
            Err(Rule::AttemptNotSubmitted)
        }
    }

    /// Terminal state for an attempt closed at `now`.
    pub fn closing(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match deadline {
            Some(deadline) if now > deadline => AttemptStatus::Expired,
            _ => AttemptStatus::Submitted,
        }
    }
}

/// Represents the 'attempts' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: i64,
    pub exam_id: i64,
    pub student_id: i64,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub score_points: Option<i32>,
    pub max_points: Option<i32>,
    pub score_percent: Option<f64>,
}

/// Represents the 'attempt_answers' table: one row per (attempt, question).
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptAnswer {
    pub attempt_id: i64,
    pub question_id: i64,
    pub selected_option_id: i64,
    pub answered_at: DateTime<Utc>,
}

/// DTO for saving (or replacing) the answer to one question.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveAnswerRequest {
    #[validate(range(min = 1))]
    pub question_id: i64,
    #[validate(range(min = 1))]
    pub selected_option_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAttemptResponse {
    pub attempt_id: i64,
}

/// The attempt as seen by its owner while taking the exam.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptView {
    #[serde(flatten)]
    pub attempt: Attempt,
    pub deadline: Option<DateTime<Utc>>,
    pub answers: Vec<AttemptAnswer>,
}

/// Scored outcome of a closed attempt.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    pub attempt_id: i64,
    pub status: AttemptStatus,
    pub score_points: i32,
    pub max_points: i32,
    pub score_percent: f64,
    pub questions: Vec<QuestionOutcome>,
}
