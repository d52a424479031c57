// src/repository/postgres.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use crate::{
    error::{AppError, Rule},
    models::{
        assignment::{AvailabilityStatus, AvailableExam},
        attempt::{Attempt, AttemptAnswer, AttemptStatus},
        exam::{Exam, ExamChanges, ExamTransition, NewExam},
        question::{NewQuestion, OptionInput, Question, QuestionChanges, QuestionOption},
        user::{NewUser, User},
    },
    repository::Repository,
    scoring::Score,
};

const USER_COLUMNS: &str =
    "id, email, password_hash, display_name, role, is_active, created_at, updated_at";

const EXAM_COLUMNS: &str = "id, teacher_id, title, description, status, time_limit_minutes, \
     published_at, created_at, updated_at";

const QUESTION_COLUMNS: &str = "id, exam_id, position, prompt, points, created_at, updated_at";

const ATTEMPT_COLUMNS: &str = "id, exam_id, student_id, status, started_at, submitted_at, \
     score_points, max_points, score_percent";

/// Helper struct for the question row before its options are attached.
#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: i64,
    exam_id: i64,
    position: i32,
    prompt: String,
    points: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl QuestionRow {
    fn with_options(self, options: Vec<QuestionOption>) -> Question {
        Question {
            id: self.id,
            exam_id: self.exam_id,
            position: self.position,
            prompt: self.prompt,
            points: self.points,
            options,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Helper struct for the student dashboard join.
#[derive(sqlx::FromRow)]
struct AvailableExamRow {
    id: i64,
    title: String,
    description: Option<String>,
    published_at: Option<DateTime<Utc>>,
    attempt_id: Option<i64>,
    attempt_status: Option<AttemptStatus>,
    score: Option<f64>,
    completed_at: Option<DateTime<Utc>>,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Postgres-backed repository. Queries are checked at runtime so the crate
/// builds without a live database.
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn attach_options(&self, rows: Vec<QuestionRow>) -> Result<Vec<Question>, AppError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

        let options = sqlx::query_as::<_, QuestionOption>(
            "SELECT id, question_id, position, label, is_correct
             FROM question_options
             WHERE question_id = ANY($1)
             ORDER BY question_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_question: HashMap<i64, Vec<QuestionOption>> = HashMap::new();
        for option in options {
            by_question.entry(option.question_id).or_default().push(option);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let options = by_question.remove(&row.id).unwrap_or_default();
                row.with_options(options)
            })
            .collect())
    }

    async fn insert_options(
        tx: &mut Transaction<'_, Postgres>,
        question_id: i64,
        options: &[OptionInput],
    ) -> Result<(), AppError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO question_options (question_id, position, label, is_correct) ");
        builder.push_values(options.iter().enumerate(), |mut row, (idx, option)| {
            row.push_bind(question_id)
                .push_bind(idx as i32 + 1)
                .push_bind(option.label.clone())
                .push_bind(option.is_correct);
        });
        builder.build().execute(&mut **tx).await?;
        Ok(())
    }

    /// Locks the exam row until the transaction ends. Every write that
    /// depends on the exam's status (or keeps positions contiguous) takes it,
    /// so those writes are serialized per exam.
    async fn lock_exam(tx: &mut Transaction<'_, Postgres>, exam_id: i64) -> Result<Exam, AppError> {
        sqlx::query_as::<_, Exam>(&format!(
            "SELECT {EXAM_COLUMNS} FROM exams WHERE id = $1 FOR UPDATE"
        ))
        .bind(exam_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(AppError::NotFound("Exam not found".to_string()))
    }

    /// Locks the exam row and fails unless the exam is still a draft.
    async fn lock_draft_exam(
        tx: &mut Transaction<'_, Postgres>,
        exam_id: i64,
    ) -> Result<Exam, AppError> {
        let exam = Self::lock_exam(tx, exam_id).await?;
        exam.status.ensure_editable()?;
        Ok(exam)
    }

    async fn question_exam_id(
        tx: &mut Transaction<'_, Postgres>,
        question_id: i64,
    ) -> Result<Option<i64>, AppError> {
        let exam_id = sqlx::query_scalar("SELECT exam_id FROM questions WHERE id = $1")
            .bind(question_id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(exam_id)
    }

    async fn fetch_question(&self, id: i64) -> Result<Question, AppError> {
        self.find_question(id)
            .await?
            .ok_or(AppError::NotFound("Question not found".to_string()))
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, display_name, role)
             VALUES ($1, $2, $3, $4)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Rule(Rule::EmailExists)
            } else {
                tracing::error!("Failed to create user: {:?}", e);
                AppError::from(e)
            }
        })
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn count_students(&self, ids: &[i64]) -> Result<usize, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE role = 'student' AND id = ANY($1)",
        )
        .bind(ids)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }

    async fn create_exam(&self, exam: NewExam) -> Result<Exam, AppError> {
        let exam = sqlx::query_as::<_, Exam>(&format!(
            "INSERT INTO exams (teacher_id, title, description, time_limit_minutes)
             VALUES ($1, $2, $3, $4)
             RETURNING {EXAM_COLUMNS}"
        ))
        .bind(exam.teacher_id)
        .bind(&exam.title)
        .bind(&exam.description)
        .bind(exam.time_limit_minutes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create exam: {:?}", e);
            AppError::from(e)
        })?;
        Ok(exam)
    }

    async fn find_exam(&self, id: i64) -> Result<Option<Exam>, AppError> {
        let exam = sqlx::query_as::<_, Exam>(&format!("SELECT {EXAM_COLUMNS} FROM exams WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(exam)
    }

    async fn list_exams_by_teacher(&self, teacher_id: i64) -> Result<Vec<Exam>, AppError> {
        let exams = sqlx::query_as::<_, Exam>(&format!(
            "SELECT {EXAM_COLUMNS} FROM exams WHERE teacher_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(exams)
    }

    async fn list_exams_for_student(&self, student_id: i64) -> Result<Vec<Exam>, AppError> {
        let exams = sqlx::query_as::<_, Exam>(
            "SELECT e.id, e.teacher_id, e.title, e.description, e.status, e.time_limit_minutes,
                    e.published_at, e.created_at, e.updated_at
             FROM exams e
             JOIN exam_assignments ea ON ea.exam_id = e.id
             WHERE ea.student_id = $1 AND e.status = 'published'
             ORDER BY e.created_at DESC, e.id DESC",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(exams)
    }

    async fn update_exam(&self, id: i64, changes: ExamChanges) -> Result<Exam, AppError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_draft_exam(&mut tx, id).await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE exams SET ");
        let mut separated = builder.separated(", ");

        if let Some(title) = changes.title {
            separated.push("title = ");
            separated.push_bind_unseparated(title);
        }

        if let Some(description) = changes.description {
            separated.push("description = ");
            separated.push_bind_unseparated(description);
        }

        if let Some(limit) = changes.time_limit_minutes {
            separated.push("time_limit_minutes = ");
            separated.push_bind_unseparated(limit);
        }

        separated.push("updated_at = NOW()");

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(format!(" RETURNING {EXAM_COLUMNS}"));

        let exam = builder
            .build_query_as::<Exam>()
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!("Failed to update exam: {:?}", e);
                AppError::from(e)
            })?
            .ok_or(AppError::NotFound("Exam not found".to_string()))?;

        tx.commit().await?;
        Ok(exam)
    }

    async fn transition_exam(&self, id: i64, transition: ExamTransition) -> Result<Exam, AppError> {
        let mut tx = self.pool.begin().await?;
        let exam = Self::lock_exam(&mut tx, id).await?;
        let next = transition.apply(exam.status)?;

        // Question writes and attempt inserts take the same row lock, so
        // these counts cannot change before the commit.
        match transition {
            ExamTransition::Publish => {
                let has_questions: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM questions WHERE exam_id = $1)")
                        .bind(id)
                        .fetch_one(&mut *tx)
                        .await?;
                if !has_questions {
                    return Err(Rule::NoQuestions.into());
                }
            }
            ExamTransition::Unpublish => {
                let has_attempts: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM attempts WHERE exam_id = $1)")
                        .bind(id)
                        .fetch_one(&mut *tx)
                        .await?;
                if has_attempts {
                    return Err(Rule::ExamHasAttempts.into());
                }
            }
            ExamTransition::Archive => {}
        }

        let exam = sqlx::query_as::<_, Exam>(&format!(
            "UPDATE exams SET status = $2, published_at = $3, updated_at = NOW()
             WHERE id = $1
             RETURNING {EXAM_COLUMNS}"
        ))
        .bind(id)
        .bind(next)
        .bind(transition.published_at(exam.published_at, Utc::now()))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to change exam status: {:?}", e);
            AppError::from(e)
        })?;

        tx.commit().await?;
        Ok(exam)
    }

    async fn delete_exam(&self, id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_draft_exam(&mut tx, id).await?;

        sqlx::query("DELETE FROM exams WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!("Failed to delete exam: {:?}", e);
                AppError::from(e)
            })?;

        tx.commit().await?;
        Ok(())
    }

    async fn assign_students(&self, exam_id: i64, student_ids: &[i64]) -> Result<(), AppError> {
        if student_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "INSERT INTO exam_assignments (exam_id, student_id)
             SELECT $1, UNNEST($2::BIGINT[])
             ON CONFLICT (exam_id, student_id) DO NOTHING",
        )
        .bind(exam_id)
        .bind(student_ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_student_assigned(&self, exam_id: i64, student_id: i64) -> Result<bool, AppError> {
        let assigned: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM exam_assignments WHERE exam_id = $1 AND student_id = $2)",
        )
        .bind(exam_id)
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(assigned)
    }

    async fn list_questions(&self, exam_id: i64) -> Result<Vec<Question>, AppError> {
        let rows = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE exam_id = $1 ORDER BY position"
        ))
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;
        self.attach_options(rows).await
    }

    async fn find_question(&self, id: i64) -> Result<Option<Question>, AppError> {
        let row = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.attach_options(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn create_question(&self, exam_id: i64, question: NewQuestion) -> Result<Question, AppError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_draft_exam(&mut tx, exam_id).await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO questions (exam_id, position, prompt, points)
             VALUES ($1, (SELECT COALESCE(MAX(position), 0) + 1 FROM questions WHERE exam_id = $1), $2, $3)
             RETURNING id",
        )
        .bind(exam_id)
        .bind(&question.prompt)
        .bind(question.points)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create question: {:?}", e);
            AppError::from(e)
        })?;

        Self::insert_options(&mut tx, id, &question.options).await?;
        tx.commit().await?;

        self.fetch_question(id).await
    }

    async fn update_question(&self, id: i64, changes: QuestionChanges) -> Result<Question, AppError> {
        let mut tx = self.pool.begin().await?;
        let exam_id = Self::question_exam_id(&mut tx, id)
            .await?
            .ok_or(AppError::NotFound("Question not found".to_string()))?;
        Self::lock_draft_exam(&mut tx, exam_id).await?;

        let result = sqlx::query(
            "UPDATE questions
             SET prompt = COALESCE($2, prompt), points = COALESCE($3, points), updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(&changes.prompt)
        .bind(changes.points)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Question not found".to_string()));
        }

        if let Some(options) = &changes.options {
            sqlx::query("DELETE FROM question_options WHERE question_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            Self::insert_options(&mut tx, id, options).await?;
        }

        tx.commit().await?;
        self.fetch_question(id).await
    }

    async fn delete_question(&self, id: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let Some(exam_id) = Self::question_exam_id(&mut tx, id).await? else {
            return Ok(());
        };
        Self::lock_draft_exam(&mut tx, exam_id).await?;

        let removed: Option<(i64, i32)> =
            sqlx::query_as("DELETE FROM questions WHERE id = $1 RETURNING exam_id, position")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        if let Some((exam_id, position)) = removed {
            sqlx::query(
                "UPDATE questions SET position = position - 1, updated_at = NOW()
                 WHERE exam_id = $1 AND position > $2",
            )
            .bind(exam_id)
            .bind(position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn reorder_questions(&self, exam_id: i64, ordered_ids: &[i64]) -> Result<Vec<Question>, AppError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_draft_exam(&mut tx, exam_id).await?;

        // WITH ORDINALITY numbers the ids 1..n in the order given.
        sqlx::query(
            "UPDATE questions q
             SET position = o.ord, updated_at = NOW()
             FROM UNNEST($2::BIGINT[]) WITH ORDINALITY AS o(id, ord)
             WHERE q.id = o.id AND q.exam_id = $1",
        )
        .bind(exam_id)
        .bind(ordered_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.list_questions(exam_id).await
    }

    async fn create_attempt(&self, exam_id: i64, student_id: i64) -> Result<Attempt, AppError> {
        let mut tx = self.pool.begin().await?;

        // Holding the exam row keeps a concurrent unpublish from slipping
        // between the status check and the insert.
        let exam = Self::lock_exam(&mut tx, exam_id).await?;
        if !exam.status.accepts_attempts() {
            return Err(Rule::ExamNotAvailable.into());
        }

        let attempt = sqlx::query_as::<_, Attempt>(&format!(
            "INSERT INTO attempts (exam_id, student_id)
             VALUES ($1, $2)
             RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(exam_id)
        .bind(student_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Rule(Rule::AlreadyAttempted)
            } else {
                tracing::error!("Failed to create attempt: {:?}", e);
                AppError::from(e)
            }
        })?;

        tx.commit().await?;
        Ok(attempt)
    }

    async fn find_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError> {
        let attempt =
            sqlx::query_as::<_, Attempt>(&format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(attempt)
    }

    async fn save_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        selected_option_id: i64,
    ) -> Result<(), AppError> {
        // The EXISTS guard makes the write a no-op once the attempt is closed.
        let result = sqlx::query(
            "INSERT INTO attempt_answers (attempt_id, question_id, selected_option_id)
             SELECT $1, $2, $3
             WHERE EXISTS (SELECT 1 FROM attempts WHERE id = $1 AND status = 'in_progress')
             ON CONFLICT (attempt_id, question_id)
             DO UPDATE SET selected_option_id = EXCLUDED.selected_option_id,
                           answered_at = NOW(),
                           updated_at = NOW()",
        )
        .bind(attempt_id)
        .bind(question_id)
        .bind(selected_option_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to save answer: {:?}", e);
            AppError::from(e)
        })?;

        if result.rows_affected() == 0 {
            return Err(Rule::AttemptSubmitted.into());
        }
        Ok(())
    }

    async fn list_answers(&self, attempt_id: i64) -> Result<Vec<AttemptAnswer>, AppError> {
        let answers = sqlx::query_as::<_, AttemptAnswer>(
            "SELECT attempt_id, question_id, selected_option_id, answered_at
             FROM attempt_answers
             WHERE attempt_id = $1
             ORDER BY question_id",
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(answers)
    }

    async fn finish_attempt(
        &self,
        attempt_id: i64,
        status: AttemptStatus,
        score: &Score,
    ) -> Result<Attempt, AppError> {
        sqlx::query_as::<_, Attempt>(&format!(
            "UPDATE attempts SET
                status = $2,
                submitted_at = NOW(),
                score_points = $3,
                max_points = $4,
                score_percent = $5,
                updated_at = NOW()
             WHERE id = $1 AND status = 'in_progress'
             RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(attempt_id)
        .bind(status)
        .bind(score.score_points)
        .bind(score.max_points)
        .bind(score.score_percent)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to finish attempt: {:?}", e);
            AppError::from(e)
        })?
        .ok_or(AppError::Rule(Rule::AttemptSubmitted))
    }

    async fn list_available_exams(&self, student_id: i64) -> Result<Vec<AvailableExam>, AppError> {
        let rows = sqlx::query_as::<_, AvailableExamRow>(
            "SELECT
                e.id,
                e.title,
                e.description,
                e.published_at,
                a.id AS attempt_id,
                a.status AS attempt_status,
                a.score_percent AS score,
                a.submitted_at AS completed_at
             FROM exams e
             JOIN exam_assignments ea ON ea.exam_id = e.id AND ea.student_id = $1
             LEFT JOIN attempts a ON a.exam_id = e.id AND a.student_id = $1
             WHERE e.status = 'published'
             ORDER BY e.published_at DESC, e.id DESC",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AvailableExam {
                id: row.id,
                exam_id: row.id,
                title: row.title,
                description: row.description,
                status: AvailabilityStatus::from(row.attempt_status),
                published_at: row.published_at,
                attempt_id: row.attempt_id,
                score: row.score,
                completed_at: row.completed_at,
            })
            .collect())
    }
}
