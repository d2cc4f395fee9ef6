use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::course::Lifecycle;
use crate::model::ids::{CourseId, LessonId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LessonError {
    #[error("lesson title cannot be empty")]
    EmptyTitle,

    #[error("sequence number must be >= 1")]
    InvalidSequenceNumber,
}

/// A single lesson within a course.
///
/// Lessons are ordered by `sequence_number`, unique per course. Deleted
/// lessons no longer count toward course progress.
#[derive(Debug, Clone, PartialEq)]
pub struct Lesson {
    id: LessonId,
    course_id: CourseId,
    title: String,
    sequence_number: u32,
    duration_minutes: u32,
    lifecycle: Lifecycle,
    created_at: DateTime<Utc>,
}

impl Lesson {
    /// Creates a new lesson.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::EmptyTitle` for a blank title and
    /// `LessonError::InvalidSequenceNumber` when the sequence number is zero.
    pub fn new(
        id: LessonId,
        course_id: CourseId,
        title: impl Into<String>,
        sequence_number: u32,
        duration_minutes: u32,
        created_at: DateTime<Utc>,
    ) -> Result<Self, LessonError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(LessonError::EmptyTitle);
        }
        if sequence_number == 0 {
            return Err(LessonError::InvalidSequenceNumber);
        }

        Ok(Self {
            id,
            course_id,
            title: title.trim().to_owned(),
            sequence_number,
            duration_minutes,
            lifecycle: Lifecycle::Active,
            created_at,
        })
    }

    /// Rebuilds a lesson from persisted state.
    #[must_use]
    pub fn from_persisted(
        id: LessonId,
        course_id: CourseId,
        title: String,
        sequence_number: u32,
        duration_minutes: u32,
        lifecycle: Lifecycle,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            course_id,
            title,
            sequence_number,
            duration_minutes,
            lifecycle,
            created_at,
        }
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> LessonId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn sequence_number(&self) -> u32 {
        self.sequence_number
    }

    #[must_use]
    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// True when the lesson can still be completed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.lifecycle.is_deleted()
    }

    /// Soft-deletes the lesson. Completion history is retained but the
    /// lesson stops counting toward course totals.
    pub fn mark_deleted(&mut self) {
        self.lifecycle = Lifecycle::Deleted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn rejects_empty_title() {
        let err = Lesson::new(
            LessonId::new(1),
            CourseId::new(1),
            "",
            1,
            10,
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, LessonError::EmptyTitle);
    }

    #[test]
    fn rejects_zero_sequence_number() {
        let err = Lesson::new(
            LessonId::new(1),
            CourseId::new(1),
            "Intro",
            0,
            10,
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, LessonError::InvalidSequenceNumber);
    }

    #[test]
    fn new_lesson_is_active() {
        let lesson = Lesson::new(
            LessonId::new(1),
            CourseId::new(1),
            "Intro",
            1,
            10,
            fixed_now(),
        )
        .unwrap();
        assert!(lesson.is_active());
    }

    #[test]
    fn deleted_lesson_is_inactive() {
        let mut lesson = Lesson::new(
            LessonId::new(1),
            CourseId::new(1),
            "Intro",
            1,
            10,
            fixed_now(),
        )
        .unwrap();
        lesson.mark_deleted();
        assert!(!lesson.is_active());
    }
}
