// src/handlers/attempts.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::{
    error::{AppError, Rule},
    handlers::exams::owned_exam,
    models::{
        attempt::{
            Attempt, AttemptResult, AttemptStatus, AttemptView, SaveAnswerRequest,
            StartAttemptResponse,
        },
        exam::Exam,
        user::Role,
    },
    repository::DynRepository,
    scoring::score_attempt,
    utils::jwt::{AuthUser, StudentUser},
};

async fn find_exam(repo: &DynRepository, exam_id: i64) -> Result<Exam, AppError> {
    repo.find_exam(exam_id)
        .await?
        .ok_or(AppError::NotFound("Exam not found".to_string()))
}

async fn find_attempt(repo: &DynRepository, attempt_id: i64) -> Result<Attempt, AppError> {
    repo.find_attempt(attempt_id)
        .await?
        .ok_or(AppError::NotFound("Attempt not found".to_string()))
}

/// Loads an attempt belonging to the student.
async fn own_attempt(
    repo: &DynRepository,
    attempt_id: i64,
    student_id: i64,
) -> Result<Attempt, AppError> {
    let attempt = find_attempt(repo, attempt_id).await?;
    if attempt.student_id != student_id {
        return Err(AppError::Forbidden(
            "This attempt belongs to another student".to_string(),
        ));
    }
    Ok(attempt)
}

/// Scores the saved answers and moves the attempt to its terminal `status`.
async fn close_attempt(
    repo: &DynRepository,
    attempt: &Attempt,
    status: AttemptStatus,
) -> Result<Attempt, AppError> {
    let questions = repo.list_questions(attempt.exam_id).await?;
    let answers = repo.list_answers(attempt.id).await?;
    let score = score_attempt(&questions, &answers);

    let closed = repo.finish_attempt(attempt.id, status, &score).await?;
    tracing::info!(
        "Attempt {} closed as {:?}: {}/{} ({}%)",
        closed.id,
        closed.status,
        score.score_points,
        score.max_points,
        score.score_percent
    );
    Ok(closed)
}

/// Starts the caller's single attempt at a published exam.
pub async fn start_attempt(
    State(repo): State<DynRepository>,
    student: StudentUser,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = find_exam(&repo, exam_id).await?;

    if !exam.status.accepts_attempts() {
        return Err(Rule::ExamNotAvailable.into());
    }
    if !repo.is_student_assigned(exam_id, student.id).await? {
        return Err(AppError::Forbidden(
            "You are not assigned to this exam".to_string(),
        ));
    }

    let attempt = repo.create_attempt(exam_id, student.id).await?;
    tracing::info!("Student {} started attempt {} on exam {}", student.id, attempt.id, exam_id);

    Ok((
        StatusCode::CREATED,
        Json(StartAttemptResponse {
            attempt_id: attempt.id,
        }),
    ))
}

/// The attempt with its saved answers and deadline.
pub async fn get_attempt(
    State(repo): State<DynRepository>,
    student: StudentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = own_attempt(&repo, id, student.id).await?;
    let exam = find_exam(&repo, attempt.exam_id).await?;
    let answers = repo.list_answers(attempt.id).await?;

    Ok(Json(AttemptView {
        deadline: exam.deadline_for(attempt.started_at),
        attempt,
        answers,
    }))
}

/// Saves or replaces the answer to one question.
///
/// Past the deadline the attempt is closed as expired (with whatever was
/// saved so far) and the answer is rejected.
pub async fn save_answer(
    State(repo): State<DynRepository>,
    student: StudentUser,
    Path(id): Path<i64>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let attempt = own_attempt(&repo, id, student.id).await?;
    attempt.status.ensure_in_progress()?;

    let exam = find_exam(&repo, attempt.exam_id).await?;
    if let Some(deadline) = exam.deadline_for(attempt.started_at) {
        if Utc::now() > deadline {
            close_attempt(&repo, &attempt, AttemptStatus::Expired).await?;
            return Err(Rule::AttemptExpired.into());
        }
    }

    let question = repo
        .find_question(payload.question_id)
        .await?
        .filter(|q| q.exam_id == attempt.exam_id)
        .ok_or(Rule::QuestionNotInExam)?;

    if !question.has_option(payload.selected_option_id) {
        return Err(Rule::InvalidOption.into());
    }

    repo.save_answer(attempt.id, question.id, payload.selected_option_id)
        .await?;

    Ok(Json(json!({ "success": true })))
}

/// Submits the attempt. A late submission is recorded as expired.
pub async fn submit_attempt(
    State(repo): State<DynRepository>,
    student: StudentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = own_attempt(&repo, id, student.id).await?;
    attempt.status.ensure_in_progress()?;

    let exam = find_exam(&repo, attempt.exam_id).await?;
    let status = AttemptStatus::closing(exam.deadline_for(attempt.started_at), Utc::now());

    let attempt = close_attempt(&repo, &attempt, status).await?;
    Ok(Json(attempt))
}

/// Scored result of a closed attempt, readable by its student or the exam's teacher.
pub async fn attempt_result(
    State(repo): State<DynRepository>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = find_attempt(&repo, id).await?;

    match user.role {
        Role::Student if attempt.student_id != user.id => {
            return Err(AppError::Forbidden(
                "This attempt belongs to another student".to_string(),
            ));
        }
        Role::Student => {}
        Role::Teacher => {
            owned_exam(&repo, attempt.exam_id, user.id).await?;
        }
    }

    attempt.status.ensure_terminal()?;

    let questions = repo.list_questions(attempt.exam_id).await?;
    let answers = repo.list_answers(attempt.id).await?;
    let score = score_attempt(&questions, &answers);

    Ok(Json(AttemptResult {
        attempt_id: attempt.id,
        status: attempt.status,
        score_points: attempt.score_points.unwrap_or(score.score_points),
        max_points: attempt.max_points.unwrap_or(score.max_points),
        score_percent: attempt.score_percent.unwrap_or(score.score_percent),
        questions: score.outcomes,
    }))
}
