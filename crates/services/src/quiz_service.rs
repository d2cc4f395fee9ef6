use std::sync::Arc;

use lms_core::model::{
    AnswerChoice, AnswerMap, CourseId, Principal, QuestionId, Quiz, QuizAttempt, QuizId,
    QuizQuestion, UserId, can_modify, grade,
};
use storage::repository::{
    CatalogRepository, EnrollmentRepository, NewQuestionRecord, NewQuizRecord, QuizRepository,
    StorageError,
};

use crate::Clock;
use crate::error::QuizServiceError;
use crate::notify::Notifier;

/// Result of submitting one quiz attempt.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub attempt: QuizAttempt,
    pub passed: bool,
}

/// Orchestrates quiz authoring, grading, and the append-only attempt ledger.
#[derive(Clone)]
pub struct QuizService {
    clock: Clock,
    catalog: Arc<dyn CatalogRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    quizzes: Arc<dyn QuizRepository>,
    notifier: Arc<dyn Notifier>,
}

impl QuizService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CatalogRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        quizzes: Arc<dyn QuizRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            clock,
            catalog,
            enrollments,
            quizzes,
            notifier,
        }
    }

    /// Create a new unpublished quiz on a course the caller owns.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::Forbidden` for non-owners,
    /// `QuizServiceError::Quiz` for validation failures, and
    /// `QuizServiceError::Storage` if persistence fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_quiz(
        &self,
        principal: &Principal,
        course_id: CourseId,
        title: String,
        description: Option<String>,
        duration_minutes: u32,
        passing_score: u32,
        max_attempts: u32,
    ) -> Result<QuizId, QuizServiceError> {
        self.check_course_ownership(principal, course_id).await?;
        let now = self.clock.now();
        let quiz = Quiz::new(
            QuizId::new(1),
            course_id,
            title,
            description,
            duration_minutes,
            passing_score,
            max_attempts,
            now,
        )?;
        let quiz_id = self
            .quizzes
            .insert_quiz(NewQuizRecord::from_quiz(&quiz))
            .await?;
        tracing::info!(%quiz_id, %course_id, "quiz created");
        Ok(quiz_id)
    }

    /// Make a quiz visible and submittable.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::QuizNotFound` for missing quizzes and
    /// `QuizServiceError::Forbidden` for non-owners.
    pub async fn publish_quiz(
        &self,
        principal: &Principal,
        quiz_id: QuizId,
    ) -> Result<(), QuizServiceError> {
        let mut quiz = self.owned_quiz(principal, quiz_id).await?;
        quiz.publish();
        self.quizzes.update_quiz(&quiz).await?;
        Ok(())
    }

    /// Append a question to a quiz the caller owns.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::DuplicateSequence` when the sequence number
    /// is already taken within the quiz, and `QuizServiceError::Quiz` when
    /// the question fails validation.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_question(
        &self,
        principal: &Principal,
        quiz_id: QuizId,
        text: String,
        option_a: String,
        option_b: String,
        option_c: Option<String>,
        option_d: Option<String>,
        correct_answer: AnswerChoice,
        sequence_number: u32,
        explanation: Option<String>,
    ) -> Result<QuestionId, QuizServiceError> {
        let quiz = self.owned_quiz(principal, quiz_id).await?;
        let question = QuizQuestion::new(
            QuestionId::new(1),
            quiz.id(),
            text,
            option_a,
            option_b,
            option_c,
            option_d,
            correct_answer,
            sequence_number,
            explanation,
        )?;
        let question_id = self
            .quizzes
            .insert_question(NewQuestionRecord::from_question(&question))
            .await
            .map_err(|e| match e {
                StorageError::Conflict => QuizServiceError::DuplicateSequence,
                other => QuizServiceError::Storage(other),
            })?;
        Ok(question_id)
    }

    /// Published quizzes of a course, newest first.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::Storage` if repository access fails.
    pub async fn published_quizzes(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<Quiz>, QuizServiceError> {
        let quizzes = self.quizzes.quizzes_for_course(course_id, true).await?;
        Ok(quizzes)
    }

    /// Questions of a quiz in sequence order, for taking or review.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::QuizNotFound` when the quiz does not exist
    /// or is unpublished.
    pub async fn questions(&self, quiz_id: QuizId) -> Result<Vec<QuizQuestion>, QuizServiceError> {
        self.published_quiz(quiz_id).await?;
        let questions = self.quizzes.questions_for_quiz(quiz_id).await?;
        Ok(questions)
    }

    /// Grade and record one submission.
    ///
    /// Grading is deterministic: each answer is compared to the question's
    /// correct letter case-insensitively; missing, unknown, and unparseable
    /// answers score zero for that question. The attempt is appended only if
    /// the student is still within the quiz's attempt quota, and the quota
    /// check is atomic with the insert.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::QuizNotFound` for missing or unpublished
    /// quizzes, `QuizServiceError::NotEnrolled` when the student has no
    /// active enrollment in the quiz's course, and
    /// `QuizServiceError::MaxAttemptsReached` when the quota is exhausted.
    pub async fn submit(
        &self,
        student: UserId,
        quiz_id: QuizId,
        answers: AnswerMap,
        time_taken_secs: u64,
    ) -> Result<SubmissionOutcome, QuizServiceError> {
        let quiz = self.published_quiz(quiz_id).await?;
        if !self
            .enrollments
            .is_active(student, quiz.course_id())
            .await?
        {
            return Err(QuizServiceError::NotEnrolled);
        }

        let questions = self.quizzes.questions_for_quiz(quiz_id).await?;
        let graded = grade(&questions, &answers);
        let now = self.clock.now();
        let attempt = QuizAttempt::new(student, quiz_id, graded, answers, time_taken_secs, now);

        let inserted = self
            .quizzes
            .insert_attempt_within_limit(&attempt, quiz.max_attempts())
            .await?;
        if inserted.is_none() {
            return Err(QuizServiceError::MaxAttemptsReached {
                limit: quiz.max_attempts(),
            });
        }

        let passed = attempt.passed(quiz.passing_score());
        let percentage = attempt.percentage();
        tracing::info!(%student, %quiz_id, percentage, passed, "quiz attempt recorded");
        self.notifier.quiz_graded(student, quiz_id, percentage, passed);

        Ok(SubmissionOutcome { attempt, passed })
    }

    /// Attempts at a quiz, newest first.
    ///
    /// Students see only their own attempts; the owning teacher and admins
    /// see everyone's.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::Forbidden` when a teacher who does not own
    /// the course asks for the full ledger.
    pub async fn attempts(
        &self,
        principal: &Principal,
        quiz_id: QuizId,
    ) -> Result<Vec<QuizAttempt>, QuizServiceError> {
        if principal.is_student() {
            let attempts = self
                .quizzes
                .attempts_for_quiz(quiz_id, Some(principal.user))
                .await?;
            return Ok(attempts);
        }
        self.owned_quiz(principal, quiz_id).await?;
        let attempts = self.quizzes.attempts_for_quiz(quiz_id, None).await?;
        Ok(attempts)
    }

    /// Attempts a student has left at a quiz. `None` means unlimited.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::QuizNotFound` when the quiz does not exist.
    pub async fn remaining_attempts(
        &self,
        student: UserId,
        quiz_id: QuizId,
    ) -> Result<Option<u64>, QuizServiceError> {
        let quiz = self
            .quizzes
            .get_quiz(quiz_id)
            .await?
            .ok_or(QuizServiceError::QuizNotFound)?;
        if quiz.max_attempts() == 0 {
            return Ok(None);
        }
        let used = self.quizzes.attempt_count(student, quiz_id).await?;
        Ok(Some(u64::from(quiz.max_attempts()).saturating_sub(used)))
    }

    async fn published_quiz(&self, quiz_id: QuizId) -> Result<Quiz, QuizServiceError> {
        self.quizzes
            .get_quiz(quiz_id)
            .await?
            .filter(Quiz::is_published)
            .ok_or(QuizServiceError::QuizNotFound)
    }

    async fn owned_quiz(
        &self,
        principal: &Principal,
        quiz_id: QuizId,
    ) -> Result<Quiz, QuizServiceError> {
        let quiz = self
            .quizzes
            .get_quiz(quiz_id)
            .await?
            .ok_or(QuizServiceError::QuizNotFound)?;
        self.check_course_ownership(principal, quiz.course_id())
            .await?;
        Ok(quiz)
    }

    async fn check_course_ownership(
        &self,
        principal: &Principal,
        course_id: CourseId,
    ) -> Result<(), QuizServiceError> {
        let course = self
            .catalog
            .get_course(course_id)
            .await?
            .filter(|c| !c.lifecycle().is_deleted())
            .ok_or(QuizServiceError::CourseNotFound)?;
        if !can_modify(principal, &course) {
            return Err(QuizServiceError::Forbidden);
        }
        Ok(())
    }
}
