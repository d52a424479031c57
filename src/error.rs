// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Business-rule rejections with a stable machine-readable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    EmailExists,
    InvalidCredentials,
    ExamNotEditable,
    AlreadyPublished,
    ExamNotPublished,
    ExamHasAttempts,
    ExamArchived,
    NoQuestions,
    ExamNotAvailable,
    AlreadyAttempted,
    AttemptSubmitted,
    AttemptNotSubmitted,
    AttemptExpired,
    QuestionNotInExam,
    InvalidOption,
}

impl Rule {
    pub fn code(&self) -> &'static str {
        match self {
            Rule::EmailExists => "EMAIL_EXISTS",
            Rule::InvalidCredentials => "INVALID_CREDENTIALS",
            Rule::ExamNotEditable => "EXAM_NOT_EDITABLE",
            Rule::AlreadyPublished => "ALREADY_PUBLISHED",
            Rule::ExamNotPublished => "EXAM_NOT_PUBLISHED",
            Rule::ExamHasAttempts => "EXAM_HAS_ATTEMPTS",
            Rule::ExamArchived => "EXAM_ARCHIVED",
            Rule::NoQuestions => "NO_QUESTIONS",
            Rule::ExamNotAvailable => "EXAM_NOT_AVAILABLE",
            Rule::AlreadyAttempted => "ALREADY_ATTEMPTED",
            Rule::AttemptSubmitted => "ATTEMPT_SUBMITTED",
            Rule::AttemptNotSubmitted => "ATTEMPT_NOT_SUBMITTED",
            Rule::AttemptExpired => "ATTEMPT_EXPIRED",
            Rule::QuestionNotInExam => "QUESTION_NOT_IN_EXAM",
            Rule::InvalidOption => "INVALID_OPTION",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Rule::EmailExists => "A user with this email already exists",
            Rule::InvalidCredentials => "Invalid email or password",
            Rule::ExamNotEditable => "Only draft exams can be modified",
            Rule::AlreadyPublished => "Exam is already published",
            Rule::ExamNotPublished => "Exam is not published",
            Rule::ExamHasAttempts => "Exam already has attempts",
            Rule::ExamArchived => "Exam is archived",
            Rule::NoQuestions => "Cannot publish an exam without questions",
            Rule::ExamNotAvailable => "This exam is not available",
            Rule::AlreadyAttempted => "You have already taken this exam",
            Rule::AttemptSubmitted => "This attempt has already been submitted",
            Rule::AttemptNotSubmitted => "This attempt has not been submitted yet",
            Rule::AttemptExpired => "The time limit for this attempt has passed",
            Rule::QuestionNotInExam => "Question does not belong to this exam",
            Rule::InvalidOption => "Option does not belong to this question",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Rule::EmailExists => StatusCode::CONFLICT,
            Rule::InvalidCredentials => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request (payload validation)
    BadRequest(String),

    // Business rule rejection, status depends on the rule
    Rule(Rule),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InternalServerError(_) => "INTERNAL_ERROR",
            AppError::BadRequest(_) => "VALIDATION_ERROR",
            AppError::Rule(rule) => rule.code(),
            AppError::AuthError(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Rule(rule) => write!(f, "{}", rule),
            other => write!(f, "{:?}", other),
        }
    }
}

impl std::error::Error for AppError {}

impl From<Rule> for AppError {
    fn from(rule: Rule) -> Self {
        AppError::Rule(rule)
    }
}

/// Converts the error into a JSON response `{ "error": ..., "code": ... }`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Rule(rule) => (rule.status(), rule.message().to_string()),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };
        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
