// src/handlers/questions.rs

use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::exams::{owned_exam, visible_exam},
    models::{
        question::{
            CreateQuestionRequest, NewQuestion, OptionInput, PublicQuestion, Question,
            QuestionChanges, ReorderQuestionsRequest, UpdateQuestionRequest, validate_options,
        },
        user::Role,
    },
    repository::DynRepository,
    utils::{
        html::{clean_html, clean_required},
        jwt::{AuthUser, TeacherUser},
    },
};

/// Sanitises labels, then re-checks the option rules on what will be stored.
fn clean_options(options: Vec<OptionInput>) -> Result<Vec<OptionInput>, AppError> {
    let cleaned: Vec<OptionInput> = options
        .into_iter()
        .map(|o| OptionInput {
            label: clean_html(&o.label),
            is_correct: o.is_correct,
        })
        .collect();

    validate_options(&cleaned).map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok(cleaned)
}

fn clean_prompt(prompt: &str) -> Result<String, AppError> {
    clean_required(prompt, "Question prompt", 2000)
}

/// Loads a question of a draft exam owned by the teacher.
async fn editable_question(
    repo: &DynRepository,
    question_id: i64,
    teacher_id: i64,
) -> Result<Question, AppError> {
    let question = repo
        .find_question(question_id)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    let exam = owned_exam(repo, question.exam_id, teacher_id).await?;
    exam.status.ensure_editable()?;
    Ok(question)
}

/// Lists the questions of an exam in order.
///
/// The owning teacher receives the answer key; assigned students receive
/// [`PublicQuestion`]s once the exam has been published.
pub async fn list_questions(
    State(repo): State<DynRepository>,
    user: AuthUser,
    Path(exam_id): Path<i64>,
) -> Result<Response, AppError> {
    match user.role {
        Role::Teacher => {
            owned_exam(&repo, exam_id, user.id).await?;
            let questions = repo.list_questions(exam_id).await?;
            Ok(Json(questions).into_response())
        }
        Role::Student => {
            visible_exam(&repo, exam_id, user.id).await?;
            let questions: Vec<PublicQuestion> = repo
                .list_questions(exam_id)
                .await?
                .into_iter()
                .map(PublicQuestion::from)
                .collect();
            Ok(Json(questions).into_response())
        }
    }
}

/// Appends a question to a draft exam.
pub async fn add_question(
    State(repo): State<DynRepository>,
    teacher: TeacherUser,
    Path(exam_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let exam = owned_exam(&repo, exam_id, teacher.id).await?;
    exam.status.ensure_editable()?;

    let points = payload.points_or_default();
    let question = repo
        .create_question(
            exam_id,
            NewQuestion {
                prompt: clean_prompt(&payload.prompt)?,
                points,
                options: clean_options(payload.options)?,
            },
        )
        .await?;

    tracing::debug!("Question {} added to exam {}", question.id, exam_id);
    Ok((StatusCode::CREATED, Json(question)))
}

/// Updates prompt, points or the full option set of a question.
pub async fn update_question(
    State(repo): State<DynRepository>,
    teacher: TeacherUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    editable_question(&repo, id, teacher.id).await?;

    let changes = QuestionChanges {
        prompt: payload.prompt.as_deref().map(clean_prompt).transpose()?,
        points: payload.points,
        options: payload.options.map(clean_options).transpose()?,
    };

    let question = repo.update_question(id, changes).await?;
    Ok(Json(question))
}

/// Deletes a question; later questions move up one position.
pub async fn delete_question(
    State(repo): State<DynRepository>,
    teacher: TeacherUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    editable_question(&repo, id, teacher.id).await?;
    repo.delete_question(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Reorders the questions of a draft exam.
///
/// `questionIds` must list every question of the exam exactly once.
pub async fn reorder_questions(
    State(repo): State<DynRepository>,
    teacher: TeacherUser,
    Path(exam_id): Path<i64>,
    Json(payload): Json<ReorderQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let exam = owned_exam(&repo, exam_id, teacher.id).await?;
    exam.status.ensure_editable()?;

    let current: HashSet<i64> = repo
        .list_questions(exam_id)
        .await?
        .into_iter()
        .map(|q| q.id)
        .collect();
    let requested: HashSet<i64> = payload.question_ids.iter().copied().collect();

    if requested.len() != payload.question_ids.len() || requested != current {
        return Err(AppError::BadRequest(
            "questionIds must list each question of the exam exactly once".to_string(),
        ));
    }

    let questions = repo.reorder_questions(exam_id, &payload.question_ids).await?;
    Ok(Json(questions))
}
