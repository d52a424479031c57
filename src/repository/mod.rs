// src/repository/mod.rs

//! Persistence boundary used by the HTTP handlers.
//!
//! Handlers enforce ownership; implementations store and load rows. Rules
//! that race with other writers are enforced here, under the exam row lock
//! (or the store-wide lock in memory):
//! - status transitions and their preconditions (questions to publish, no
//!   attempts to unpublish);
//! - content edits only while the exam is a draft;
//! - attempts only on published exams, one per (exam, student);
//! - no writes to a closed attempt.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        assignment::AvailableExam,
        attempt::{Attempt, AttemptAnswer, AttemptStatus},
        exam::{Exam, ExamChanges, ExamTransition, NewExam},
        question::{NewQuestion, Question, QuestionChanges},
        user::{NewUser, User},
    },
    scoring::Score,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

pub type DynRepository = Arc<dyn Repository>;

#[async_trait]
pub trait Repository: Send + Sync {
    /// Fails with `Rule::EmailExists` when the email is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;
    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, AppError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    /// Number of distinct ids in `ids` that belong to student accounts.
    async fn count_students(&self, ids: &[i64]) -> Result<usize, AppError>;

    async fn create_exam(&self, exam: NewExam) -> Result<Exam, AppError>;
    async fn find_exam(&self, id: i64) -> Result<Option<Exam>, AppError>;
    /// Newest first.
    async fn list_exams_by_teacher(&self, teacher_id: i64) -> Result<Vec<Exam>, AppError>;
    /// Published exams assigned to the student, newest first.
    async fn list_exams_for_student(&self, student_id: i64) -> Result<Vec<Exam>, AppError>;
    /// Fails with `Rule::ExamNotEditable` unless the exam is a draft.
    async fn update_exam(&self, id: i64, changes: ExamChanges) -> Result<Exam, AppError>;
    /// Applies the transition to the current status. Publishing requires at
    /// least one question (`Rule::NoQuestions`); unpublishing requires that no
    /// attempt exists (`Rule::ExamHasAttempts`).
    async fn transition_exam(&self, id: i64, transition: ExamTransition) -> Result<Exam, AppError>;
    /// Removes a draft exam with its questions and assignments.
    async fn delete_exam(&self, id: i64) -> Result<(), AppError>;
    /// Idempotent: existing assignments are kept.
    async fn assign_students(&self, exam_id: i64, student_ids: &[i64]) -> Result<(), AppError>;
    async fn is_student_assigned(&self, exam_id: i64, student_id: i64) -> Result<bool, AppError>;

    /// Ordered by position, options ordered by position.
    async fn list_questions(&self, exam_id: i64) -> Result<Vec<Question>, AppError>;
    async fn find_question(&self, id: i64) -> Result<Option<Question>, AppError>;
    /// Question writes below fail with `Rule::ExamNotEditable` unless the exam is a draft.
    ///
    /// Appends the question after the current last position.
    async fn create_question(&self, exam_id: i64, question: NewQuestion) -> Result<Question, AppError>;
    async fn update_question(&self, id: i64, changes: QuestionChanges) -> Result<Question, AppError>;
    /// Deletes the question and shifts later questions up by one.
    async fn delete_question(&self, id: i64) -> Result<(), AppError>;
    /// `ordered_ids` must be a permutation of the exam's question ids.
    async fn reorder_questions(&self, exam_id: i64, ordered_ids: &[i64]) -> Result<Vec<Question>, AppError>;

    /// Fails with `Rule::ExamNotAvailable` unless the exam is published, and
    /// with `Rule::AlreadyAttempted` when the student already has one.
    async fn create_attempt(&self, exam_id: i64, student_id: i64) -> Result<Attempt, AppError>;
    async fn find_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError>;
    /// Upsert on (attempt, question). Fails with `Rule::AttemptSubmitted` when
    /// the attempt is no longer in progress.
    async fn save_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        selected_option_id: i64,
    ) -> Result<(), AppError>;
    async fn list_answers(&self, attempt_id: i64) -> Result<Vec<AttemptAnswer>, AppError>;
    /// Stores the score and moves an in-progress attempt to `status`. Fails
    /// with `Rule::AttemptSubmitted` when the attempt was already closed.
    async fn finish_attempt(
        &self,
        attempt_id: i64,
        status: AttemptStatus,
        score: &Score,
    ) -> Result<Attempt, AppError>;

    /// Student dashboard rows, most recently published first.
    async fn list_available_exams(&self, student_id: i64) -> Result<Vec<AvailableExam>, AppError>;
}
