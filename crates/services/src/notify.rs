//! Outbound notification seam.
//!
//! Services report domain events here instead of talking to mail or push
//! providers directly. The default implementation just logs; real delivery
//! backends plug in behind the same trait.

use lms_core::model::{CourseId, QuizId, UserId};

/// Receiver for student-facing domain events.
///
/// Implementations must be cheap and non-blocking; services call these inline
/// after the corresponding write has committed.
pub trait Notifier: Send + Sync {
    fn enrolled(&self, student: UserId, course: CourseId);

    fn course_completed(&self, student: UserId, course: CourseId);

    fn quiz_graded(&self, student: UserId, quiz: QuizId, percentage: f64, passed: bool);
}

/// Notifier that emits structured log events and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn enrolled(&self, student: UserId, course: CourseId) {
        tracing::info!(%student, %course, "student enrolled");
    }

    fn course_completed(&self, student: UserId, course: CourseId) {
        tracing::info!(%student, %course, "course completed");
    }

    fn quiz_graded(&self, student: UserId, quiz: QuizId, percentage: f64, passed: bool) {
        tracing::info!(%student, %quiz, percentage, passed, "quiz attempt graded");
    }
}
