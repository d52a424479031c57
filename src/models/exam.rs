// src/models/exam.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::error::Rule;

/// Exam lifecycle: `draft -> published -> archived`, with `published -> draft`
/// allowed while nobody has started an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "exam_status", rename_all = "lowercase")]
pub enum ExamStatus {
    Draft,
    Published,
    Archived,
}

impl ExamStatus {
    /// Content (metadata and questions) may only change while in draft.
    pub fn ensure_editable(self) -> Result<(), Rule> {
        match self {
            ExamStatus::Draft => Ok(()),
            _ => Err(Rule::ExamNotEditable),
        }
    }

    pub fn publish(self) -> Result<Self, Rule> {
        match self {
            ExamStatus::Draft => Ok(ExamStatus::Published),
            _ => Err(Rule::AlreadyPublished),
        }
    }

    pub fn unpublish(self) -> Result<Self, Rule> {
        match self {
            ExamStatus::Published => Ok(ExamStatus::Draft),
            _ => Err(Rule::ExamNotPublished),
        }
    }

    pub fn archive(self) -> Result<Self, Rule> {
        match self {
            ExamStatus::Published => Ok(ExamStatus::Archived),
            _ => Err(Rule::ExamNotPublished),
        }
    }

    /// Students can only start attempts on published exams.
    pub fn accepts_attempts(self) -> bool {
        self == ExamStatus::Published
    }
}

/// A requested status change, applied by the repository under the exam row lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamTransition {
    Publish,
    Unpublish,
    Archive,
}

impl ExamTransition {
    pub fn apply(self, status: ExamStatus) -> Result<ExamStatus, Rule> {
        match self {
            ExamTransition::Publish => status.publish(),
            ExamTransition::Unpublish => status.unpublish(),
            ExamTransition::Archive => status.archive(),
        }
    }

    /// `published_at` after the transition: set on publish, cleared on unpublish.
    pub fn published_at(
        self,
        current: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            ExamTransition::Publish => Some(now),
            ExamTransition::Unpublish => None,
            ExamTransition::Archive => current,
        }
    }
}

/// Represents the 'exams' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: i64,
    pub teacher_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: ExamStatus,
    /// Optional per-attempt time limit.
    pub time_limit_minutes: Option<i32>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Exam {
    pub fn is_owned_by(&self, teacher_id: i64) -> bool {
        self.teacher_id == teacher_id
    }

    /// Deadline for an attempt started at `started_at`, if the exam is timed.
    pub fn deadline_for(&self, started_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.time_limit_minutes
            .map(|minutes| started_at + Duration::minutes(i64::from(minutes)))
    }
}

/// Insert payload for a new exam.
#[derive(Debug, Clone)]
pub struct NewExam {
    pub teacher_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub time_limit_minutes: Option<i32>,
}

/// Partial update of exam metadata. `None` leaves the column untouched,
/// `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default)]
pub struct ExamChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub time_limit_minutes: Option<Option<i32>>,
}

impl ExamChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.time_limit_minutes.is_none()
    }
}

/// DTO for creating a new exam.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateExamRequest {
    #[validate(length(min = 1, max = 200, message = "Title is required (max 200 chars)"))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 600))]
    pub time_limit_minutes: Option<i32>,
}

/// Tells an absent field (`None`) apart from an explicit `null` (`Some(None)`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// DTO for updating an exam. Fields are optional; `null` clears
/// `description` and `timeLimitMinutes`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExamRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 2000))]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[validate(range(min = 1, max = 600))]
    pub time_limit_minutes: Option<Option<i32>>,
}

#[derive(Debug, Serialize)]
pub struct CreateExamResponse {
    pub id: i64,
    pub status: ExamStatus,
}

/// DTO for assigning students to an exam.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AssignStudentsRequest {
    #[validate(custom(function = validate_student_ids))]
    pub student_ids: Vec<i64>,
}

fn validate_student_ids(ids: &[i64]) -> Result<(), validator::ValidationError> {
    if ids.iter().any(|id| *id <= 0) {
        return Err(validator::ValidationError::new("student_ids_must_be_positive"));
    }
    Ok(())
}
