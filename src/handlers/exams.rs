// src/handlers/exams.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::{AppError, Rule},
    models::{
        exam::{
            AssignStudentsRequest, CreateExamRequest, CreateExamResponse, Exam, ExamChanges,
            ExamStatus, ExamTransition, NewExam, UpdateExamRequest,
        },
        user::Role,
    },
    repository::DynRepository,
    utils::{
        html::{clean_optional, clean_required},
        jwt::{AuthUser, TeacherUser},
    },
};

/// Loads an exam that the teacher owns: 404 when missing, 403 when owned by someone else.
pub(crate) async fn owned_exam(
    repo: &DynRepository,
    exam_id: i64,
    teacher_id: i64,
) -> Result<Exam, AppError> {
    let exam = repo
        .find_exam(exam_id)
        .await?
        .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    if !exam.is_owned_by(teacher_id) {
        return Err(AppError::Forbidden(
            "You do not have permission to manage this exam".to_string(),
        ));
    }
    Ok(exam)
}

/// Loads an exam visible to the student: assigned, and no longer a draft.
pub(crate) async fn visible_exam(
    repo: &DynRepository,
    exam_id: i64,
    student_id: i64,
) -> Result<Exam, AppError> {
    let exam = repo
        .find_exam(exam_id)
        .await?
        .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    if !repo.is_student_assigned(exam.id, student_id).await? {
        return Err(AppError::Forbidden(
            "You are not assigned to this exam".to_string(),
        ));
    }
    if exam.status == ExamStatus::Draft {
        return Err(Rule::ExamNotAvailable.into());
    }
    Ok(exam)
}

const TITLE_MAX: usize = 200;
const DESCRIPTION_MAX: usize = 2000;

/// Creates a draft exam owned by the caller.
pub async fn create_exam(
    State(repo): State<DynRepository>,
    teacher: TeacherUser,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let exam = repo
        .create_exam(NewExam {
            teacher_id: teacher.id,
            title: clean_required(&payload.title, "Title", TITLE_MAX)?,
            description: clean_optional(payload.description, "Description", DESCRIPTION_MAX)?,
            time_limit_minutes: payload.time_limit_minutes,
        })
        .await?;

    tracing::info!("Teacher {} created exam {}", teacher.id, exam.id);

    Ok((
        StatusCode::CREATED,
        Json(CreateExamResponse {
            id: exam.id,
            status: exam.status,
        }),
    ))
}

/// Teachers see the exams they authored; students see published exams assigned to them.
pub async fn list_exams(
    State(repo): State<DynRepository>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let exams = match user.role {
        Role::Teacher => repo.list_exams_by_teacher(user.id).await?,
        Role::Student => repo.list_exams_for_student(user.id).await?,
    };
    Ok(Json(exams))
}

pub async fn get_exam(
    State(repo): State<DynRepository>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = match user.role {
        Role::Teacher => owned_exam(&repo, id, user.id).await?,
        Role::Student => visible_exam(&repo, id, user.id).await?,
    };
    Ok(Json(exam))
}

/// Edits title, description or time limit of a draft exam. An explicit
/// `null` clears the description or the time limit.
pub async fn update_exam(
    State(repo): State<DynRepository>,
    teacher: TeacherUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let exam = owned_exam(&repo, id, teacher.id).await?;
    exam.status.ensure_editable()?;

    let changes = ExamChanges {
        title: payload
            .title
            .as_deref()
            .map(|title| clean_required(title, "Title", TITLE_MAX))
            .transpose()?,
        description: payload
            .description
            .map(|description| clean_optional(description, "Description", DESCRIPTION_MAX))
            .transpose()?,
        time_limit_minutes: payload.time_limit_minutes,
    };

    if changes.is_empty() {
        return Ok(Json(exam));
    }

    let exam = repo.update_exam(id, changes).await?;
    Ok(Json(exam))
}

/// Deletes a draft exam along with its questions and assignments.
pub async fn delete_exam(
    State(repo): State<DynRepository>,
    teacher: TeacherUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = owned_exam(&repo, id, teacher.id).await?;
    exam.status.ensure_editable()?;

    repo.delete_exam(id).await?;
    tracing::info!("Teacher {} deleted exam {}", teacher.id, id);

    Ok(StatusCode::NO_CONTENT)
}

/// draft -> published. The exam must carry at least one question.
pub async fn publish_exam(
    State(repo): State<DynRepository>,
    teacher: TeacherUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    owned_exam(&repo, id, teacher.id).await?;

    let exam = repo.transition_exam(id, ExamTransition::Publish).await?;
    tracing::info!("Exam {} published", id);
    Ok(Json(exam))
}

/// published -> draft, only while nobody has started the exam.
pub async fn unpublish_exam(
    State(repo): State<DynRepository>,
    teacher: TeacherUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    owned_exam(&repo, id, teacher.id).await?;

    let exam = repo.transition_exam(id, ExamTransition::Unpublish).await?;
    tracing::info!("Exam {} moved back to draft", id);
    Ok(Json(exam))
}

/// published -> archived. Terminal.
pub async fn archive_exam(
    State(repo): State<DynRepository>,
    teacher: TeacherUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    owned_exam(&repo, id, teacher.id).await?;

    let exam = repo.transition_exam(id, ExamTransition::Archive).await?;
    tracing::info!("Exam {} archived", id);
    Ok(Json(exam))
}

/// Assigns students to an exam. Already-assigned students are left as they are.
pub async fn assign_students(
    State(repo): State<DynRepository>,
    teacher: TeacherUser,
    Path(id): Path<i64>,
    Json(payload): Json<AssignStudentsRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let exam = owned_exam(&repo, id, teacher.id).await?;
    if exam.status == ExamStatus::Archived {
        return Err(Rule::ExamArchived.into());
    }

    let mut student_ids = payload.student_ids;
    student_ids.sort_unstable();
    student_ids.dedup();

    if repo.count_students(&student_ids).await? != student_ids.len() {
        return Err(AppError::BadRequest(
            "All ids must belong to student accounts".to_string(),
        ));
    }

    repo.assign_students(id, &student_ids).await?;
    tracing::info!("Exam {} assigned to {} students", id, student_ids.len());

    Ok(Json(serde_json::json!({ "assigned": student_ids.len() })))
}
