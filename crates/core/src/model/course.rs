use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::access::Owned;
use crate::model::ids::{CourseId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title cannot be empty")]
    EmptyTitle,

    #[error("paid course must have a price greater than zero")]
    InvalidPrice,
}

//
// ─── LIFECYCLE ─────────────────────────────────────────────────────────────────
//

/// Two-state soft-delete lifecycle.
///
/// Deleted entities stay in storage for history but are filtered out of
/// catalog queries at the repository boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Active,
    Deleted,
}

impl Lifecycle {
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        matches!(self, Lifecycle::Deleted)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Active => "active",
            Lifecycle::Deleted => "deleted",
        }
    }
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

/// A course owned by a teacher, holding ordered lessons and quizzes.
///
/// Only published, non-deleted courses accept enrollments.
#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    id: CourseId,
    teacher: UserId,
    title: String,
    description: Option<String>,
    is_published: bool,
    is_free: bool,
    price_cents: u32,
    lifecycle: Lifecycle,
    created_at: DateTime<Utc>,
}

impl Course {
    /// Creates a new unpublished course.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyTitle` if the title is empty or
    /// whitespace-only, and `CourseError::InvalidPrice` if a paid course has
    /// a zero price.
    pub fn new(
        id: CourseId,
        teacher: UserId,
        title: impl Into<String>,
        description: Option<String>,
        is_free: bool,
        price_cents: u32,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CourseError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CourseError::EmptyTitle);
        }
        if !is_free && price_cents == 0 {
            return Err(CourseError::InvalidPrice);
        }

        let description = description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        Ok(Self {
            id,
            teacher,
            title: title.trim().to_owned(),
            description,
            is_published: false,
            is_free,
            price_cents: if is_free { 0 } else { price_cents },
            lifecycle: Lifecycle::Active,
            created_at,
        })
    }

    /// Rebuilds a course from persisted state without re-running creation
    /// defaults.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: CourseId,
        teacher: UserId,
        title: String,
        description: Option<String>,
        is_published: bool,
        is_free: bool,
        price_cents: u32,
        lifecycle: Lifecycle,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            teacher,
            title,
            description,
            is_published,
            is_free,
            price_cents,
            lifecycle,
            created_at,
        }
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn teacher(&self) -> UserId {
        self.teacher
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn is_published(&self) -> bool {
        self.is_published
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        self.is_free
    }

    #[must_use]
    pub fn price_cents(&self) -> u32 {
        self.price_cents
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// True when the course may accept enrollments.
    #[must_use]
    pub fn is_enrollable(&self) -> bool {
        self.is_published && !self.lifecycle.is_deleted()
    }

    /// Marks the course visible to students.
    pub fn publish(&mut self) {
        self.is_published = true;
    }

    /// Soft-deletes the course. History (enrollments, progress) is retained.
    pub fn mark_deleted(&mut self) {
        self.lifecycle = Lifecycle::Deleted;
    }
}

impl Owned for Course {
    fn owner_id(&self) -> UserId {
        self.teacher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn free_course(id: u64) -> Course {
        Course::new(
            CourseId::new(id),
            UserId::new(10),
            "Rust Basics",
            None,
            true,
            0,
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_empty_title() {
        let err = Course::new(
            CourseId::new(1),
            UserId::new(10),
            "   ",
            None,
            true,
            0,
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, CourseError::EmptyTitle);
    }

    #[test]
    fn rejects_paid_course_without_price() {
        let err = Course::new(
            CourseId::new(1),
            UserId::new(10),
            "Paid",
            None,
            false,
            0,
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, CourseError::InvalidPrice);
    }

    #[test]
    fn free_course_zeroes_price() {
        let course = Course::new(
            CourseId::new(1),
            UserId::new(10),
            "Free",
            None,
            true,
            500,
            fixed_now(),
        )
        .unwrap();
        assert_eq!(course.price_cents(), 0);
    }

    #[test]
    fn new_course_starts_unpublished_and_not_enrollable() {
        let course = free_course(1);
        assert!(!course.is_published());
        assert!(!course.is_enrollable());
    }

    #[test]
    fn publish_makes_course_enrollable() {
        let mut course = free_course(1);
        course.publish();
        assert!(course.is_enrollable());
    }

    #[test]
    fn deleted_course_is_not_enrollable_even_when_published() {
        let mut course = free_course(1);
        course.publish();
        course.mark_deleted();
        assert!(!course.is_enrollable());
        assert!(course.lifecycle().is_deleted());
    }

    #[test]
    fn trims_title_and_filters_empty_description() {
        let course = Course::new(
            CourseId::new(1),
            UserId::new(10),
            "  Algebra  ",
            Some("   ".into()),
            true,
            0,
            fixed_now(),
        )
        .unwrap();
        assert_eq!(course.title(), "Algebra");
        assert_eq!(course.description(), None);
    }

    #[test]
    fn course_owner_is_teacher() {
        let course = free_course(1);
        assert_eq!(course.owner_id(), UserId::new(10));
    }
}
