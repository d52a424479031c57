// src/repository/memory.rs

//! In-process store used when no `DATABASE_URL` is configured, and by the tests.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::{
    error::{AppError, Rule},
    models::{
        assignment::{AvailabilityStatus, AvailableExam},
        attempt::{Attempt, AttemptAnswer, AttemptStatus},
        exam::{Exam, ExamChanges, ExamStatus, ExamTransition, NewExam},
        question::{NewQuestion, OptionInput, Question, QuestionChanges, QuestionOption},
        user::{NewUser, Role, User},
    },
    repository::Repository,
    scoring::Score,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    exams: BTreeMap<i64, Exam>,
    questions: BTreeMap<i64, Question>,
    assignments: HashSet<(i64, i64)>,
    attempts: BTreeMap<i64, Attempt>,
    /// Keyed by (attempt_id, question_id).
    answers: BTreeMap<(i64, i64), AttemptAnswer>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn build_options(&mut self, question_id: i64, inputs: Vec<OptionInput>) -> Vec<QuestionOption> {
        inputs
            .into_iter()
            .enumerate()
            .map(|(idx, input)| QuestionOption {
                id: self.next_id(),
                question_id,
                position: idx as i32 + 1,
                label: input.label,
                is_correct: input.is_correct,
            })
            .collect()
    }

    fn exam_questions(&self, exam_id: i64) -> Vec<Question> {
        let mut questions: Vec<Question> = self
            .questions
            .values()
            .filter(|q| q.exam_id == exam_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.position);
        questions
    }

    fn exam(&self, id: i64) -> Result<&Exam, AppError> {
        self.exams
            .get(&id)
            .ok_or(AppError::NotFound("Exam not found".to_string()))
    }

    fn draft_exam(&self, id: i64) -> Result<&Exam, AppError> {
        let exam = self.exam(id)?;
        exam.status.ensure_editable()?;
        Ok(exam)
    }
}

#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        self.tables
            .lock()
            .map_err(|e| AppError::InternalServerError(format!("memory store poisoned: {}", e)))
    }

    /// Moves an attempt's start time into the past, for exercising time limits.
    pub fn backdate_attempt(&self, attempt_id: i64, by: Duration) -> Result<(), AppError> {
        let mut t = self.tables()?;
        let attempt = t
            .attempts
            .get_mut(&attempt_id)
            .ok_or(AppError::NotFound("Attempt not found".to_string()))?;
        attempt.started_at -= by;
        Ok(())
    }
}

fn newest_first(exams: &mut [Exam]) {
    exams.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut t = self.tables()?;
        if t.users.values().any(|u| u.email == user.email) {
            return Err(Rule::EmailExists.into());
        }
        let now = Utc::now();
        let record = User {
            id: t.next_id(),
            email: user.email,
            password_hash: Some(user.password_hash),
            display_name: user.display_name,
            role: user.role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .tables()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn count_students(&self, ids: &[i64]) -> Result<usize, AppError> {
        let t = self.tables()?;
        let distinct: HashSet<i64> = ids.iter().copied().collect();
        Ok(distinct
            .into_iter()
            .filter(|id| t.users.get(id).is_some_and(|u| u.role == Role::Student))
            .count())
    }

    async fn create_exam(&self, exam: NewExam) -> Result<Exam, AppError> {
        let mut t = self.tables()?;
        let now = Utc::now();
        let record = Exam {
            id: t.next_id(),
            teacher_id: exam.teacher_id,
            title: exam.title,
            description: exam.description,
            status: ExamStatus::Draft,
            time_limit_minutes: exam.time_limit_minutes,
            published_at: None,
            created_at: now,
            updated_at: now,
        };
        t.exams.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_exam(&self, id: i64) -> Result<Option<Exam>, AppError> {
        Ok(self.tables()?.exams.get(&id).cloned())
    }

    async fn list_exams_by_teacher(&self, teacher_id: i64) -> Result<Vec<Exam>, AppError> {
        let t = self.tables()?;
        let mut exams: Vec<Exam> = t
            .exams
            .values()
            .filter(|e| e.teacher_id == teacher_id)
            .cloned()
            .collect();
        newest_first(&mut exams);
        Ok(exams)
    }

    async fn list_exams_for_student(&self, student_id: i64) -> Result<Vec<Exam>, AppError> {
        let t = self.tables()?;
        let mut exams: Vec<Exam> = t
            .exams
            .values()
            .filter(|e| e.status == ExamStatus::Published)
            .filter(|e| t.assignments.contains(&(e.id, student_id)))
            .cloned()
            .collect();
        newest_first(&mut exams);
        Ok(exams)
    }

    async fn update_exam(&self, id: i64, changes: ExamChanges) -> Result<Exam, AppError> {
        let mut t = self.tables()?;
        t.draft_exam(id)?;
        let exam = t
            .exams
            .get_mut(&id)
            .ok_or(AppError::NotFound("Exam not found".to_string()))?;
        if let Some(title) = changes.title {
            exam.title = title;
        }
        if let Some(description) = changes.description {
            exam.description = description;
        }
        if let Some(limit) = changes.time_limit_minutes {
            exam.time_limit_minutes = limit;
        }
        exam.updated_at = Utc::now();
        Ok(exam.clone())
    }

    async fn transition_exam(&self, id: i64, transition: ExamTransition) -> Result<Exam, AppError> {
        let mut t = self.tables()?;
        let next = transition.apply(t.exam(id)?.status)?;

        match transition {
            ExamTransition::Publish if !t.questions.values().any(|q| q.exam_id == id) => {
                return Err(Rule::NoQuestions.into());
            }
            ExamTransition::Unpublish if t.attempts.values().any(|a| a.exam_id == id) => {
                return Err(Rule::ExamHasAttempts.into());
            }
            _ => {}
        }

        let now = Utc::now();
        let exam = t
            .exams
            .get_mut(&id)
            .ok_or(AppError::NotFound("Exam not found".to_string()))?;
        exam.status = next;
        exam.published_at = transition.published_at(exam.published_at, now);
        exam.updated_at = now;
        Ok(exam.clone())
    }

    async fn delete_exam(&self, id: i64) -> Result<(), AppError> {
        let mut t = self.tables()?;
        t.draft_exam(id)?;
        t.exams.remove(&id);
        t.questions.retain(|_, q| q.exam_id != id);
        t.assignments.retain(|(exam_id, _)| *exam_id != id);
        let attempt_ids: HashSet<i64> = t
            .attempts
            .values()
            .filter(|a| a.exam_id == id)
            .map(|a| a.id)
            .collect();
        t.attempts.retain(|_, a| a.exam_id != id);
        t.answers.retain(|(attempt_id, _), _| !attempt_ids.contains(attempt_id));
        Ok(())
    }

    async fn assign_students(&self, exam_id: i64, student_ids: &[i64]) -> Result<(), AppError> {
        let mut t = self.tables()?;
        t.exam(exam_id)?;
        for student_id in student_ids {
            t.assignments.insert((exam_id, *student_id));
        }
        Ok(())
    }

    async fn is_student_assigned(&self, exam_id: i64, student_id: i64) -> Result<bool, AppError> {
        Ok(self.tables()?.assignments.contains(&(exam_id, student_id)))
    }

    async fn list_questions(&self, exam_id: i64) -> Result<Vec<Question>, AppError> {
        Ok(self.tables()?.exam_questions(exam_id))
    }

    async fn find_question(&self, id: i64) -> Result<Option<Question>, AppError> {
        Ok(self.tables()?.questions.get(&id).cloned())
    }

    async fn create_question(&self, exam_id: i64, question: NewQuestion) -> Result<Question, AppError> {
        let mut t = self.tables()?;
        t.draft_exam(exam_id)?;
        let position = t
            .questions
            .values()
            .filter(|q| q.exam_id == exam_id)
            .map(|q| q.position)
            .max()
            .unwrap_or(0)
            + 1;
        let id = t.next_id();
        let options = t.build_options(id, question.options);
        let now = Utc::now();
        let record = Question {
            id,
            exam_id,
            position,
            prompt: question.prompt,
            points: question.points,
            options,
            created_at: now,
            updated_at: now,
        };
        t.questions.insert(id, record.clone());
        Ok(record)
    }

    async fn update_question(&self, id: i64, changes: QuestionChanges) -> Result<Question, AppError> {
        let mut t = self.tables()?;
        let exam_id = t
            .questions
            .get(&id)
            .map(|q| q.exam_id)
            .ok_or(AppError::NotFound("Question not found".to_string()))?;
        t.draft_exam(exam_id)?;
        let options = changes.options.map(|inputs| t.build_options(id, inputs));
        let question = t
            .questions
            .get_mut(&id)
            .ok_or(AppError::NotFound("Question not found".to_string()))?;
        if let Some(prompt) = changes.prompt {
            question.prompt = prompt;
        }
        if let Some(points) = changes.points {
            question.points = points;
        }
        if let Some(options) = options {
            question.options = options;
        }
        question.updated_at = Utc::now();
        Ok(question.clone())
    }

    async fn delete_question(&self, id: i64) -> Result<(), AppError> {
        let mut t = self.tables()?;
        let Some(exam_id) = t.questions.get(&id).map(|q| q.exam_id) else {
            return Ok(());
        };
        t.draft_exam(exam_id)?;
        let Some(removed) = t.questions.remove(&id) else {
            return Ok(());
        };
        for q in t.questions.values_mut() {
            if q.exam_id == removed.exam_id && q.position > removed.position {
                q.position -= 1;
            }
        }
        t.answers.retain(|(_, question_id), _| *question_id != id);
        Ok(())
    }

    async fn reorder_questions(&self, exam_id: i64, ordered_ids: &[i64]) -> Result<Vec<Question>, AppError> {
        let mut t = self.tables()?;
        t.draft_exam(exam_id)?;
        let now = Utc::now();
        for (idx, id) in ordered_ids.iter().enumerate() {
            if let Some(q) = t.questions.get_mut(id).filter(|q| q.exam_id == exam_id) {
                q.position = idx as i32 + 1;
                q.updated_at = now;
            }
        }
        Ok(t.exam_questions(exam_id))
    }

    async fn create_attempt(&self, exam_id: i64, student_id: i64) -> Result<Attempt, AppError> {
        let mut t = self.tables()?;
        if !t.exam(exam_id)?.status.accepts_attempts() {
            return Err(Rule::ExamNotAvailable.into());
        }
        if t
            .attempts
            .values()
            .any(|a| a.exam_id == exam_id && a.student_id == student_id)
        {
            return Err(Rule::AlreadyAttempted.into());
        }
        let record = Attempt {
            id: t.next_id(),
            exam_id,
            student_id,
            status: AttemptStatus::InProgress,
            started_at: Utc::now(),
            submitted_at: None,
            score_points: None,
            max_points: None,
            score_percent: None,
        };
        t.attempts.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError> {
        Ok(self.tables()?.attempts.get(&id).cloned())
    }

    async fn save_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        selected_option_id: i64,
    ) -> Result<(), AppError> {
        let mut t = self.tables()?;
        let in_progress = t
            .attempts
            .get(&attempt_id)
            .is_some_and(|a| a.status == AttemptStatus::InProgress);
        if !in_progress {
            return Err(Rule::AttemptSubmitted.into());
        }
        t.answers.insert(
            (attempt_id, question_id),
            AttemptAnswer {
                attempt_id,
                question_id,
                selected_option_id,
                answered_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list_answers(&self, attempt_id: i64) -> Result<Vec<AttemptAnswer>, AppError> {
        let t = self.tables()?;
        Ok(t.answers
            .range((attempt_id, i64::MIN)..=(attempt_id, i64::MAX))
            .map(|(_, answer)| answer.clone())
            .collect())
    }

    async fn finish_attempt(
        &self,
        attempt_id: i64,
        status: AttemptStatus,
        score: &Score,
    ) -> Result<Attempt, AppError> {
        let mut t = self.tables()?;
        let attempt = t
            .attempts
            .get_mut(&attempt_id)
            .ok_or(AppError::NotFound("Attempt not found".to_string()))?;
        attempt.status.ensure_in_progress()?;
        attempt.status = status;
        attempt.submitted_at = Some(Utc::now());
        attempt.score_points = Some(score.score_points);
        attempt.max_points = Some(score.max_points);
        attempt.score_percent = Some(score.score_percent);
        Ok(attempt.clone())
    }

    async fn list_available_exams(&self, student_id: i64) -> Result<Vec<AvailableExam>, AppError> {
        let t = self.tables()?;
        let mut exams: Vec<&Exam> = t
            .exams
            .values()
            .filter(|e| e.status == ExamStatus::Published)
            .filter(|e| t.assignments.contains(&(e.id, student_id)))
            .collect();
        exams.sort_by(|a, b| b.published_at.cmp(&a.published_at).then(b.id.cmp(&a.id)));

        Ok(exams
            .into_iter()
            .map(|exam| {
                let attempt = t
                    .attempts
                    .values()
                    .find(|a| a.exam_id == exam.id && a.student_id == student_id);
                AvailableExam {
                    id: exam.id,
                    exam_id: exam.id,
                    title: exam.title.clone(),
                    description: exam.description.clone(),
                    status: AvailabilityStatus::from(attempt.map(|a| a.status)),
                    published_at: exam.published_at,
                    attempt_id: attempt.map(|a| a.id),
                    score: attempt.and_then(|a| a.score_percent),
                    completed_at: attempt.and_then(|a| a.submitted_at),
                }
            })
            .collect())
    }
}
