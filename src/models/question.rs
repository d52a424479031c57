// src/models/question.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

use crate::config::{DEFAULT_QUESTION_POINTS, MIN_OPTIONS};

/// Represents the 'question_options' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub id: i64,
    pub question_id: i64,
    pub position: i32,
    pub label: String,
    pub is_correct: bool,
}

/// A multiple-choice question together with its options (ordered by position).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    pub exam_id: i64,
    /// 1-based, contiguous within an exam.
    pub position: i32,
    pub prompt: String,
    pub points: i32,
    pub options: Vec<QuestionOption>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Question {
    pub fn correct_option_id(&self) -> Option<i64> {
        self.options.iter().find(|o| o.is_correct).map(|o| o.id)
    }

    pub fn has_option(&self, option_id: i64) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }
}

/// Option as shown to students (no correctness flag).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicOption {
    pub id: i64,
    pub position: i32,
    pub label: String,
}

/// DTO for sending a question to a student (excludes the answer key).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: i64,
    pub position: i32,
    pub prompt: String,
    pub points: i32,
    pub options: Vec<PublicOption>,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            position: q.position,
            prompt: q.prompt,
            points: q.points,
            options: q
                .options
                .into_iter()
                .map(|o| PublicOption {
                    id: o.id,
                    position: o.position,
                    label: o.label,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionInput {
    pub label: String,
    pub is_correct: bool,
}

/// Insert payload for a new question; options are positioned in input order.
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub prompt: String,
    pub points: i32,
    pub options: Vec<OptionInput>,
}

/// Partial update. When `options` is present it replaces the whole set.
#[derive(Debug, Clone, Default)]
pub struct QuestionChanges {
    pub prompt: Option<String>,
    pub points: Option<i32>,
    pub options: Option<Vec<OptionInput>>,
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 2000, message = "Question prompt is required"))]
    pub prompt: String,
    #[validate(range(min = 1, max = 1000))]
    pub points: Option<i32>,
    #[validate(custom(function = validate_options))]
    pub options: Vec<OptionInput>,
}

impl CreateQuestionRequest {
    pub fn points_or_default(&self) -> i32 {
        self.points.unwrap_or(DEFAULT_QUESTION_POINTS)
    }
}

/// DTO for updating a question. Fields are optional.
///
/// `options` is checked with [`validate_options`] by the handler when present.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub prompt: Option<String>,
    #[validate(range(min = 1, max = 1000))]
    pub points: Option<i32>,
    pub options: Option<Vec<OptionInput>>,
}

/// DTO for reordering the questions of an exam.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderQuestionsRequest {
    pub question_ids: Vec<i64>,
}

/// At least two options, each labelled, exactly one marked correct.
pub fn validate_options(options: &[OptionInput]) -> Result<(), validator::ValidationError> {
    if options.len() < MIN_OPTIONS {
        return Err(validator::ValidationError::new("at_least_two_options_required")
            .with_message("At least 2 options required".into()));
    }
    for opt in options {
        let len = opt.label.trim().chars().count();
        if len == 0 {
            return Err(validator::ValidationError::new("option_label_required")
                .with_message("Option label is required".into()));
        }
        if len > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    if options.iter().filter(|o| o.is_correct).count() != 1 {
        return Err(validator::ValidationError::new("exactly_one_correct_option")
            .with_message("Exactly one option must be marked as correct".into()));
    }
    Ok(())
}
