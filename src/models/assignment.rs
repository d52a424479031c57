// src/models/assignment.rs

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::attempt::AttemptStatus;

/// Whether the student has finished the exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    Pending,
    Completed,
}

impl From<Option<AttemptStatus>> for AvailabilityStatus {
    fn from(status: Option<AttemptStatus>) -> Self {
        match status {
            Some(s) if s.is_terminal() => AvailabilityStatus::Completed,
            _ => AvailabilityStatus::Pending,
        }
    }
}

/// One published exam on a student's dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableExam {
    pub id: i64,
    pub exam_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: AvailabilityStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub attempt_id: Option<i64>,
    pub score: Option<f64>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AssignmentStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
}

#[derive(Debug, Serialize)]
pub struct AvailableExamsResponse {
    pub exams: Vec<AvailableExam>,
    pub stats: AssignmentStats,
}

impl From<Vec<AvailableExam>> for AvailableExamsResponse {
    fn from(exams: Vec<AvailableExam>) -> Self {
        let completed = exams
            .iter()
            .filter(|e| e.status == AvailabilityStatus::Completed)
            .count();
        let stats = AssignmentStats {
            total: exams.len(),
            completed,
            pending: exams.len() - completed,
        };
        Self { exams, stats }
    }
}
