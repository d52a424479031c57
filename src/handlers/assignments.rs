// src/handlers/assignments.rs

use axum::{Json, extract::State, response::IntoResponse};

use crate::{
    error::AppError,
    models::assignment::AvailableExamsResponse,
    repository::DynRepository,
    utils::jwt::StudentUser,
};

/// Student dashboard: assigned published exams with completion state and stats.
pub async fn list_assignments(
    State(repo): State<DynRepository>,
    student: StudentUser,
) -> Result<impl IntoResponse, AppError> {
    let exams = repo.list_available_exams(student.id).await?;
    Ok(Json(AvailableExamsResponse::from(exams)))
}
