use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lms_core::model::{
    Course, CourseId, CourseProgress, Enrollment, Lesson, LessonId, LessonProgress, Lifecycle,
    Quiz, QuizAttempt, QuizId, QuizQuestion, QuestionId, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── INSERT RECORDS ────────────────────────────────────────────────────────────
//

/// Insert shape for a course whose ID the backend assigns.
#[derive(Debug, Clone)]
pub struct NewCourseRecord {
    pub teacher: UserId,
    pub title: String,
    pub description: Option<String>,
    pub is_published: bool,
    pub is_free: bool,
    pub price_cents: u32,
    pub created_at: DateTime<Utc>,
}

impl NewCourseRecord {
    #[must_use]
    pub fn from_course(course: &Course) -> Self {
        Self {
            teacher: course.teacher(),
            title: course.title().to_owned(),
            description: course.description().map(ToOwned::to_owned),
            is_published: course.is_published(),
            is_free: course.is_free(),
            price_cents: course.price_cents(),
            created_at: course.created_at(),
        }
    }
}

/// Insert shape for a lesson whose ID the backend assigns.
#[derive(Debug, Clone)]
pub struct NewLessonRecord {
    pub course_id: CourseId,
    pub title: String,
    pub sequence_number: u32,
    pub duration_minutes: u32,
    pub created_at: DateTime<Utc>,
}

impl NewLessonRecord {
    #[must_use]
    pub fn from_lesson(lesson: &Lesson) -> Self {
        Self {
            course_id: lesson.course_id(),
            title: lesson.title().to_owned(),
            sequence_number: lesson.sequence_number(),
            duration_minutes: lesson.duration_minutes(),
            created_at: lesson.created_at(),
        }
    }
}

/// Insert shape for a quiz whose ID the backend assigns.
#[derive(Debug, Clone)]
pub struct NewQuizRecord {
    pub course_id: CourseId,
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: u32,
    pub passing_score: u32,
    pub is_published: bool,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl NewQuizRecord {
    #[must_use]
    pub fn from_quiz(quiz: &Quiz) -> Self {
        Self {
            course_id: quiz.course_id(),
            title: quiz.title().to_owned(),
            description: quiz.description().map(ToOwned::to_owned),
            duration_minutes: quiz.duration_minutes(),
            passing_score: quiz.passing_score(),
            is_published: quiz.is_published(),
            max_attempts: quiz.max_attempts(),
            created_at: quiz.created_at(),
        }
    }
}

/// Insert shape for a quiz question whose ID the backend assigns.
#[derive(Debug, Clone)]
pub struct NewQuestionRecord {
    pub quiz_id: QuizId,
    pub text: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: Option<String>,
    pub option_d: Option<String>,
    pub correct_answer: lms_core::model::AnswerChoice,
    pub sequence_number: u32,
    pub explanation: Option<String>,
}

impl NewQuestionRecord {
    #[must_use]
    pub fn from_question(question: &QuizQuestion) -> Self {
        Self {
            quiz_id: question.quiz_id(),
            text: question.text().to_owned(),
            option_a: question.option_a().to_owned(),
            option_b: question.option_b().to_owned(),
            option_c: question.option_c().map(ToOwned::to_owned),
            option_d: question.option_d().map(ToOwned::to_owned),
            correct_answer: question.correct_answer(),
            sequence_number: question.sequence_number(),
            explanation: question.explanation().map(ToOwned::to_owned),
        }
    }
}

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// How an enrollment activation was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentChange {
    /// A fresh enrollment row was inserted.
    Created,
    /// An existing inactive row was reactivated.
    Reactivated,
}

/// Result of a lesson completion write: both progress rows after the
/// transaction committed.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    pub lesson_progress: LessonProgress,
    pub course_progress: CourseProgress,
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Catalog access: courses and lessons.
///
/// Soft delete is enforced here — listing and counting queries only ever see
/// `Lifecycle::Active` rows, while point lookups return deleted entities so
/// callers can distinguish "deleted" from "never existed".
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Persist a new course and return its assigned ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn insert_course(&self, course: NewCourseRecord) -> Result<CourseId, StorageError>;

    /// Update an existing course (publish flag, lifecycle, metadata).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the course does not exist.
    async fn update_course(&self, course: &Course) -> Result<(), StorageError>;

    /// Fetch a course by ID, including soft-deleted ones.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError>;

    /// List published, non-deleted courses ordered by ID.
    async fn list_published_courses(&self, limit: u32) -> Result<Vec<Course>, StorageError>;

    /// List a teacher's non-deleted courses ordered by ID.
    async fn courses_for_teacher(&self, teacher: UserId) -> Result<Vec<Course>, StorageError>;

    /// Persist a new lesson and return its assigned ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when the (course, sequence) pair is
    /// already taken.
    async fn insert_lesson(&self, lesson: NewLessonRecord) -> Result<LessonId, StorageError>;

    /// Fetch a lesson by ID, including soft-deleted ones.
    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError>;

    /// List active lessons for a course ordered by sequence number.
    async fn lessons_for_course(&self, course: CourseId) -> Result<Vec<Lesson>, StorageError>;

    /// Count active lessons in a course.
    async fn count_active_lessons(&self, course: CourseId) -> Result<u64, StorageError>;

    /// Soft-delete a lesson and clear any `last_lesson` references to it,
    /// atomically.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the lesson does not exist.
    async fn soft_delete_lesson(&self, id: LessonId) -> Result<(), StorageError>;
}

/// Enrollment ledger: the student↔course membership state machine.
#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Activate an enrollment: insert a fresh row or reactivate an inactive
    /// one, and lazily create the zero-percent course progress row — all in
    /// one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when an active enrollment already
    /// exists for the pair.
    async fn activate(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> Result<(EnrollmentChange, Enrollment), StorageError>;

    /// Deactivate an active enrollment, stamping `unenrolled_at`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when no active enrollment exists.
    async fn deactivate(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// True when an active enrollment exists for the pair.
    async fn is_active(&self, student: UserId, course: CourseId) -> Result<bool, StorageError>;

    /// Fetch the enrollment row for the pair, active or not.
    async fn get(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<Enrollment>, StorageError>;

    /// Course IDs the student is actively enrolled in.
    async fn active_courses_for_student(
        &self,
        student: UserId,
    ) -> Result<Vec<CourseId>, StorageError>;

    /// Students with an active enrollment in the course.
    async fn active_students_for_course(
        &self,
        course: CourseId,
    ) -> Result<Vec<UserId>, StorageError>;
}

/// Completion tracking and the derived course-progress aggregate.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Record a lesson completion and synchronously recalculate the course
    /// progress aggregate, in one transaction.
    ///
    /// Idempotent on the completion flag: repeat calls only accumulate time
    /// spent. Always updates `last_lesson` to the given lesson.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn complete_lesson(
        &self,
        student: UserId,
        lesson: LessonId,
        course: CourseId,
        time_spent_delta: u64,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, StorageError>;

    /// Recompute `progress_percentage` from current completion rows.
    ///
    /// Sole writer of the percentage; safe to call repeatedly.
    async fn recalculate(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<CourseProgress, StorageError>;

    /// Fetch the course progress row for the pair, if one exists yet.
    async fn course_progress(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError>;

    /// Per-lesson progress rows for a course, ordered by lesson sequence.
    async fn lesson_progress_for_course(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Vec<LessonProgress>, StorageError>;

    /// Total completed lessons across all courses for a student.
    async fn completed_lesson_count(&self, student: UserId) -> Result<u64, StorageError>;

    /// Cumulative time spent across all lessons, in seconds.
    async fn total_time_spent(&self, student: UserId) -> Result<u64, StorageError>;

    /// Mean progress percentage across all progress rows for a course.
    /// `None` when no student has a progress row yet.
    async fn average_progress_for_course(
        &self,
        course: CourseId,
    ) -> Result<Option<f64>, StorageError>;
}

/// Quizzes, questions, and the append-only attempt ledger.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Persist a new quiz and return its assigned ID.
    async fn insert_quiz(&self, quiz: NewQuizRecord) -> Result<QuizId, StorageError>;

    /// Update an existing quiz (publish flag, metadata).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the quiz does not exist.
    async fn update_quiz(&self, quiz: &Quiz) -> Result<(), StorageError>;

    /// Fetch a quiz by ID.
    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError>;

    /// List quizzes for a course, optionally only published ones, newest
    /// first.
    async fn quizzes_for_course(
        &self,
        course: CourseId,
        published_only: bool,
    ) -> Result<Vec<Quiz>, StorageError>;

    /// Persist a new question and return its assigned ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when the (quiz, sequence) pair is
    /// already taken.
    async fn insert_question(&self, question: NewQuestionRecord)
    -> Result<QuestionId, StorageError>;

    /// Questions for a quiz ordered by sequence number.
    async fn questions_for_quiz(&self, quiz: QuizId) -> Result<Vec<QuizQuestion>, StorageError>;

    /// Append an attempt if the student is still within `max_attempts`
    /// (zero = unlimited). The quota check and insert are atomic, so the cap
    /// holds under concurrent submissions.
    ///
    /// Returns `None` when the quota is exhausted and nothing was written.
    async fn insert_attempt_within_limit(
        &self,
        attempt: &QuizAttempt,
        max_attempts: u32,
    ) -> Result<Option<i64>, StorageError>;

    /// Attempts for a quiz, newest first, optionally scoped to one student.
    async fn attempts_for_quiz(
        &self,
        quiz: QuizId,
        student: Option<UserId>,
    ) -> Result<Vec<QuizAttempt>, StorageError>;

    /// Number of attempts a student has made at a quiz.
    async fn attempt_count(&self, student: UserId, quiz: QuizId) -> Result<u64, StorageError>;

    /// All attempts by one student across quizzes, newest first.
    async fn attempts_for_student(&self, student: UserId)
    -> Result<Vec<QuizAttempt>, StorageError>;
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

#[derive(Default)]
struct Inner {
    courses: HashMap<CourseId, Course>,
    lessons: HashMap<LessonId, Lesson>,
    enrollments: HashMap<(UserId, CourseId), Enrollment>,
    lesson_progress: HashMap<(UserId, LessonId), LessonProgress>,
    course_progress: HashMap<(UserId, CourseId), CourseProgress>,
    quizzes: HashMap<QuizId, Quiz>,
    questions: HashMap<QuestionId, QuizQuestion>,
    attempts: Vec<QuizAttempt>,
    next_course_id: u64,
    next_lesson_id: u64,
    next_quiz_id: u64,
    next_question_id: u64,
}

/// Simple in-memory backend for tests and prototyping.
///
/// A single mutex over all tables stands in for the SQLite transactions, so
/// the multi-table invariants (enroll, complete, attempt quota) hold here
/// too.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        self.inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

fn recalc_locked(inner: &mut Inner, student: UserId, course: CourseId) -> CourseProgress {
    let total = inner
        .lessons
        .values()
        .filter(|l| l.course_id() == course && l.is_active())
        .count() as u64;
    let completed = inner
        .lessons
        .values()
        .filter(|l| l.course_id() == course && l.is_active())
        .filter(|l| {
            inner
                .lesson_progress
                .get(&(student, l.id()))
                .is_some_and(LessonProgress::completed)
        })
        .count() as u64;

    let cp = inner
        .course_progress
        .entry((student, course))
        .or_insert_with(|| CourseProgress::new(student, course));
    cp.recalculate(completed, total);
    cp.clone()
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn insert_course(&self, course: NewCourseRecord) -> Result<CourseId, StorageError> {
        let mut inner = self.lock()?;
        inner.next_course_id += 1;
        let id = CourseId::new(inner.next_course_id);
        let stored = Course::from_persisted(
            id,
            course.teacher,
            course.title,
            course.description,
            course.is_published,
            course.is_free,
            course.price_cents,
            Lifecycle::Active,
            course.created_at,
        );
        inner.courses.insert(id, stored);
        Ok(id)
    }

    async fn update_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if !inner.courses.contains_key(&course.id()) {
            return Err(StorageError::NotFound);
        }
        inner.courses.insert(course.id(), course.clone());
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        Ok(self.lock()?.courses.get(&id).cloned())
    }

    async fn list_published_courses(&self, limit: u32) -> Result<Vec<Course>, StorageError> {
        let inner = self.lock()?;
        let mut out: Vec<Course> = inner
            .courses
            .values()
            .filter(|c| c.is_published() && !c.lifecycle().is_deleted())
            .cloned()
            .collect();
        out.sort_by_key(Course::id);
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn courses_for_teacher(&self, teacher: UserId) -> Result<Vec<Course>, StorageError> {
        let inner = self.lock()?;
        let mut out: Vec<Course> = inner
            .courses
            .values()
            .filter(|c| c.teacher() == teacher && !c.lifecycle().is_deleted())
            .cloned()
            .collect();
        out.sort_by_key(Course::id);
        Ok(out)
    }

    async fn insert_lesson(&self, lesson: NewLessonRecord) -> Result<LessonId, StorageError> {
        let mut inner = self.lock()?;
        let taken = inner.lessons.values().any(|l| {
            l.course_id() == lesson.course_id && l.sequence_number() == lesson.sequence_number
        });
        if taken {
            return Err(StorageError::Conflict);
        }
        inner.next_lesson_id += 1;
        let id = LessonId::new(inner.next_lesson_id);
        let stored = Lesson::from_persisted(
            id,
            lesson.course_id,
            lesson.title,
            lesson.sequence_number,
            lesson.duration_minutes,
            Lifecycle::Active,
            lesson.created_at,
        );
        inner.lessons.insert(id, stored);
        Ok(id)
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError> {
        Ok(self.lock()?.lessons.get(&id).cloned())
    }

    async fn lessons_for_course(&self, course: CourseId) -> Result<Vec<Lesson>, StorageError> {
        let inner = self.lock()?;
        let mut out: Vec<Lesson> = inner
            .lessons
            .values()
            .filter(|l| l.course_id() == course && l.is_active())
            .cloned()
            .collect();
        out.sort_by_key(Lesson::sequence_number);
        Ok(out)
    }

    async fn count_active_lessons(&self, course: CourseId) -> Result<u64, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .lessons
            .values()
            .filter(|l| l.course_id() == course && l.is_active())
            .count() as u64)
    }

    async fn soft_delete_lesson(&self, id: LessonId) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let lesson = inner.lessons.get_mut(&id).ok_or(StorageError::NotFound)?;
        lesson.mark_deleted();
        for cp in inner.course_progress.values_mut() {
            if cp.last_lesson() == Some(id) {
                cp.clear_last_lesson();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn activate(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> Result<(EnrollmentChange, Enrollment), StorageError> {
        let mut inner = self.lock()?;
        let change = match inner.enrollments.get_mut(&(student, course)) {
            Some(existing) => {
                existing
                    .reactivate()
                    .map_err(|_| StorageError::Conflict)?;
                EnrollmentChange::Reactivated
            }
            None => {
                inner
                    .enrollments
                    .insert((student, course), Enrollment::new(student, course, now));
                EnrollmentChange::Created
            }
        };
        inner
            .course_progress
            .entry((student, course))
            .or_insert_with(|| CourseProgress::new(student, course));
        let enrollment = inner.enrollments[&(student, course)].clone();
        Ok((change, enrollment))
    }

    async fn deactivate(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let enrollment = inner
            .enrollments
            .get_mut(&(student, course))
            .ok_or(StorageError::NotFound)?;
        enrollment
            .deactivate(now)
            .map_err(|_| StorageError::NotFound)
    }

    async fn is_active(&self, student: UserId, course: CourseId) -> Result<bool, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .enrollments
            .get(&(student, course))
            .is_some_and(Enrollment::is_active))
    }

    async fn get(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        Ok(self.lock()?.enrollments.get(&(student, course)).cloned())
    }

    async fn active_courses_for_student(
        &self,
        student: UserId,
    ) -> Result<Vec<CourseId>, StorageError> {
        let inner = self.lock()?;
        let mut out: Vec<CourseId> = inner
            .enrollments
            .values()
            .filter(|e| e.student() == student && e.is_active())
            .map(Enrollment::course)
            .collect();
        out.sort();
        Ok(out)
    }

    async fn active_students_for_course(
        &self,
        course: CourseId,
    ) -> Result<Vec<UserId>, StorageError> {
        let inner = self.lock()?;
        let mut out: Vec<UserId> = inner
            .enrollments
            .values()
            .filter(|e| e.course() == course && e.is_active())
            .map(Enrollment::student)
            .collect();
        out.sort();
        Ok(out)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn complete_lesson(
        &self,
        student: UserId,
        lesson: LessonId,
        course: CourseId,
        time_spent_delta: u64,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, StorageError> {
        let mut inner = self.lock()?;
        let lp = inner
            .lesson_progress
            .entry((student, lesson))
            .or_insert_with(|| LessonProgress::new(student, lesson));
        lp.mark_completed(now, time_spent_delta);
        let lesson_progress = lp.clone();

        let mut course_progress = recalc_locked(&mut inner, student, course);
        course_progress.set_last_lesson(lesson);
        inner
            .course_progress
            .insert((student, course), course_progress.clone());

        Ok(CompletionOutcome {
            lesson_progress,
            course_progress,
        })
    }

    async fn recalculate(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<CourseProgress, StorageError> {
        let mut inner = self.lock()?;
        Ok(recalc_locked(&mut inner, student, course))
    }

    async fn course_progress(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError> {
        Ok(self.lock()?.course_progress.get(&(student, course)).cloned())
    }

    async fn lesson_progress_for_course(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Vec<LessonProgress>, StorageError> {
        let inner = self.lock()?;
        let mut lessons: Vec<&Lesson> = inner
            .lessons
            .values()
            .filter(|l| l.course_id() == course && l.is_active())
            .collect();
        lessons.sort_by_key(|l| l.sequence_number());
        Ok(lessons
            .into_iter()
            .filter_map(|l| inner.lesson_progress.get(&(student, l.id())).cloned())
            .collect())
    }

    async fn completed_lesson_count(&self, student: UserId) -> Result<u64, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .lesson_progress
            .values()
            .filter(|lp| lp.student() == student && lp.completed())
            .count() as u64)
    }

    async fn total_time_spent(&self, student: UserId) -> Result<u64, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .lesson_progress
            .values()
            .filter(|lp| lp.student() == student)
            .map(LessonProgress::time_spent_secs)
            .sum())
    }

    async fn average_progress_for_course(
        &self,
        course: CourseId,
    ) -> Result<Option<f64>, StorageError> {
        let inner = self.lock()?;
        let rows: Vec<f64> = inner
            .course_progress
            .values()
            .filter(|cp| cp.course() == course)
            .map(CourseProgress::progress_percentage)
            .collect();
        if rows.is_empty() {
            return Ok(None);
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = rows.iter().sum::<f64>() / rows.len() as f64;
        Ok(Some(mean))
    }
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn insert_quiz(&self, quiz: NewQuizRecord) -> Result<QuizId, StorageError> {
        let mut inner = self.lock()?;
        inner.next_quiz_id += 1;
        let id = QuizId::new(inner.next_quiz_id);
        let stored = Quiz::from_persisted(
            id,
            quiz.course_id,
            quiz.title,
            quiz.description,
            quiz.duration_minutes,
            quiz.passing_score,
            quiz.is_published,
            quiz.max_attempts,
            quiz.created_at,
        );
        inner.quizzes.insert(id, stored);
        Ok(id)
    }

    async fn update_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if !inner.quizzes.contains_key(&quiz.id()) {
            return Err(StorageError::NotFound);
        }
        inner.quizzes.insert(quiz.id(), quiz.clone());
        Ok(())
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError> {
        Ok(self.lock()?.quizzes.get(&id).cloned())
    }

    async fn quizzes_for_course(
        &self,
        course: CourseId,
        published_only: bool,
    ) -> Result<Vec<Quiz>, StorageError> {
        let inner = self.lock()?;
        let mut out: Vec<Quiz> = inner
            .quizzes
            .values()
            .filter(|q| q.course_id() == course && (!published_only || q.is_published()))
            .cloned()
            .collect();
        out.sort_by_key(|q| std::cmp::Reverse(q.id()));
        Ok(out)
    }

    async fn insert_question(
        &self,
        question: NewQuestionRecord,
    ) -> Result<QuestionId, StorageError> {
        let mut inner = self.lock()?;
        let taken = inner.questions.values().any(|q| {
            q.quiz_id() == question.quiz_id && q.sequence_number() == question.sequence_number
        });
        if taken {
            return Err(StorageError::Conflict);
        }
        inner.next_question_id += 1;
        let id = QuestionId::new(inner.next_question_id);
        let stored = QuizQuestion::new(
            id,
            question.quiz_id,
            question.text,
            question.option_a,
            question.option_b,
            question.option_c,
            question.option_d,
            question.correct_answer,
            question.sequence_number,
            question.explanation,
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
        inner.questions.insert(id, stored);
        Ok(id)
    }

    async fn questions_for_quiz(&self, quiz: QuizId) -> Result<Vec<QuizQuestion>, StorageError> {
        let inner = self.lock()?;
        let mut out: Vec<QuizQuestion> = inner
            .questions
            .values()
            .filter(|q| q.quiz_id() == quiz)
            .cloned()
            .collect();
        out.sort_by_key(QuizQuestion::sequence_number);
        Ok(out)
    }

    async fn insert_attempt_within_limit(
        &self,
        attempt: &QuizAttempt,
        max_attempts: u32,
    ) -> Result<Option<i64>, StorageError> {
        let mut inner = self.lock()?;
        if max_attempts > 0 {
            let prior = inner
                .attempts
                .iter()
                .filter(|a| a.student() == attempt.student() && a.quiz() == attempt.quiz())
                .count() as u64;
            if prior >= u64::from(max_attempts) {
                return Ok(None);
            }
        }
        inner.attempts.push(attempt.clone());
        #[allow(clippy::cast_possible_wrap)]
        let rowid = inner.attempts.len() as i64;
        Ok(Some(rowid))
    }

    async fn attempts_for_quiz(
        &self,
        quiz: QuizId,
        student: Option<UserId>,
    ) -> Result<Vec<QuizAttempt>, StorageError> {
        let inner = self.lock()?;
        let mut out: Vec<QuizAttempt> = inner
            .attempts
            .iter()
            .filter(|a| a.quiz() == quiz && student.is_none_or(|s| a.student() == s))
            .cloned()
            .collect();
        out.sort_by_key(|a| std::cmp::Reverse(a.completed_at()));
        Ok(out)
    }

    async fn attempt_count(&self, student: UserId, quiz: QuizId) -> Result<u64, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .attempts
            .iter()
            .filter(|a| a.student() == student && a.quiz() == quiz)
            .count() as u64)
    }

    async fn attempts_for_student(
        &self,
        student: UserId,
    ) -> Result<Vec<QuizAttempt>, StorageError> {
        let inner = self.lock()?;
        let mut out: Vec<QuizAttempt> = inner
            .attempts
            .iter()
            .filter(|a| a.student() == student)
            .cloned()
            .collect();
        out.sort_by_key(|a| std::cmp::Reverse(a.completed_at()));
        Ok(out)
    }
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Bundles the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn CatalogRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub quizzes: Arc<dyn QuizRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            catalog: Arc::new(repo.clone()),
            enrollments: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            quizzes: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::model::{AnswerChoice, AnswerMap, GradedSubmission};
    use lms_core::time::fixed_now;

    async fn seed_course(repo: &InMemoryRepository, lessons: u32) -> (CourseId, Vec<LessonId>) {
        let course_id = repo
            .insert_course(NewCourseRecord {
                teacher: UserId::new(1),
                title: "Course".into(),
                description: None,
                is_published: true,
                is_free: true,
                price_cents: 0,
                created_at: fixed_now(),
            })
            .await
            .unwrap();
        let mut lesson_ids = Vec::new();
        for seq in 1..=lessons {
            let id = repo
                .insert_lesson(NewLessonRecord {
                    course_id,
                    title: format!("Lesson {seq}"),
                    sequence_number: seq,
                    duration_minutes: 10,
                    created_at: fixed_now(),
                })
                .await
                .unwrap();
            lesson_ids.push(id);
        }
        (course_id, lesson_ids)
    }

    #[tokio::test]
    async fn activate_creates_then_conflicts_then_reactivates() {
        let repo = InMemoryRepository::new();
        let student = UserId::new(7);
        let (course, _) = seed_course(&repo, 1).await;

        let (change, enrollment) = repo.activate(student, course, fixed_now()).await.unwrap();
        assert_eq!(change, EnrollmentChange::Created);
        assert!(enrollment.is_active());

        let err = repo.activate(student, course, fixed_now()).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        repo.deactivate(student, course, fixed_now()).await.unwrap();
        let (change, enrollment) = repo.activate(student, course, fixed_now()).await.unwrap();
        assert_eq!(change, EnrollmentChange::Reactivated);
        assert!(enrollment.is_active());
        assert_eq!(enrollment.unenrolled_at(), None);
    }

    #[tokio::test]
    async fn activate_lazily_creates_progress_row() {
        let repo = InMemoryRepository::new();
        let student = UserId::new(7);
        let (course, _) = seed_course(&repo, 2).await;

        repo.activate(student, course, fixed_now()).await.unwrap();
        let cp = repo.course_progress(student, course).await.unwrap().unwrap();
        assert_eq!(cp.progress_percentage(), 0.0);
    }

    #[tokio::test]
    async fn deactivate_without_active_row_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo
            .deactivate(UserId::new(7), CourseId::new(1), fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn complete_lesson_recalculates_course_progress() {
        let repo = InMemoryRepository::new();
        let student = UserId::new(7);
        let (course, lessons) = seed_course(&repo, 2).await;

        let outcome = repo
            .complete_lesson(student, lessons[0], course, 60, fixed_now())
            .await
            .unwrap();
        assert_eq!(outcome.course_progress.progress_percentage(), 50.0);
        assert_eq!(outcome.course_progress.last_lesson(), Some(lessons[0]));

        let outcome = repo
            .complete_lesson(student, lessons[1], course, 60, fixed_now())
            .await
            .unwrap();
        assert_eq!(outcome.course_progress.progress_percentage(), 100.0);
    }

    #[tokio::test]
    async fn repeat_completion_only_accumulates_time() {
        let repo = InMemoryRepository::new();
        let student = UserId::new(7);
        let (course, lessons) = seed_course(&repo, 2).await;

        let first = repo
            .complete_lesson(student, lessons[0], course, 60, fixed_now())
            .await
            .unwrap();
        let second = repo
            .complete_lesson(
                student,
                lessons[0],
                course,
                30,
                fixed_now() + chrono::Duration::hours(1),
            )
            .await
            .unwrap();

        assert_eq!(
            second.lesson_progress.completed_at(),
            first.lesson_progress.completed_at()
        );
        assert_eq!(second.lesson_progress.time_spent_secs(), 90);
        assert_eq!(second.course_progress.progress_percentage(), 50.0);
    }

    #[tokio::test]
    async fn soft_deleted_lesson_leaves_progress_but_changes_totals() {
        let repo = InMemoryRepository::new();
        let student = UserId::new(7);
        let (course, lessons) = seed_course(&repo, 2).await;

        repo.complete_lesson(student, lessons[0], course, 60, fixed_now())
            .await
            .unwrap();
        repo.soft_delete_lesson(lessons[0]).await.unwrap();

        // last_lesson reference is cleared
        let cp = repo.course_progress(student, course).await.unwrap().unwrap();
        assert_eq!(cp.last_lesson(), None);

        // the deleted lesson no longer counts toward the total
        let cp = repo.recalculate(student, course).await.unwrap();
        assert_eq!(cp.progress_percentage(), 0.0);
        assert_eq!(repo.count_active_lessons(course).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn attempt_quota_is_enforced() {
        let repo = InMemoryRepository::new();
        let student = UserId::new(7);
        let quiz = QuizId::new(1);
        let attempt = QuizAttempt::new(
            student,
            quiz,
            GradedSubmission { score: 1, total: 2 },
            AnswerMap::new(),
            30,
            fixed_now(),
        );

        assert!(
            repo.insert_attempt_within_limit(&attempt, 1)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            repo.insert_attempt_within_limit(&attempt, 1)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(repo.attempt_count(student, quiz).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn zero_max_attempts_means_unlimited() {
        let repo = InMemoryRepository::new();
        let attempt = QuizAttempt::new(
            UserId::new(7),
            QuizId::new(1),
            GradedSubmission { score: 0, total: 1 },
            AnswerMap::new(),
            5,
            fixed_now(),
        );
        for _ in 0..5 {
            assert!(
                repo.insert_attempt_within_limit(&attempt, 0)
                    .await
                    .unwrap()
                    .is_some()
            );
        }
        assert_eq!(
            repo.attempt_count(UserId::new(7), QuizId::new(1))
                .await
                .unwrap(),
            5
        );
    }

    #[tokio::test]
    async fn duplicate_lesson_sequence_conflicts() {
        let repo = InMemoryRepository::new();
        let (course, _) = seed_course(&repo, 1).await;
        let err = repo
            .insert_lesson(NewLessonRecord {
                course_id: course,
                title: "Dup".into(),
                sequence_number: 1,
                duration_minutes: 5,
                created_at: fixed_now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn question_insert_preserves_letter() {
        let repo = InMemoryRepository::new();
        let quiz_id = repo
            .insert_quiz(NewQuizRecord {
                course_id: CourseId::new(1),
                title: "Quiz".into(),
                description: None,
                duration_minutes: 30,
                passing_score: 60,
                is_published: true,
                max_attempts: 0,
                created_at: fixed_now(),
            })
            .await
            .unwrap();
        repo.insert_question(NewQuestionRecord {
            quiz_id,
            text: "Pick".into(),
            option_a: "first".into(),
            option_b: "second".into(),
            option_c: None,
            option_d: None,
            correct_answer: AnswerChoice::B,
            sequence_number: 1,
            explanation: None,
        })
        .await
        .unwrap();

        let questions = repo.questions_for_quiz(quiz_id).await.unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct_answer(), AnswerChoice::B);
    }
}
