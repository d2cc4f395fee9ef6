use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{CourseId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EnrollmentError {
    #[error("already enrolled in this course")]
    AlreadyActive,

    #[error("not enrolled in this course")]
    NotActive,
}

//
// ─── ENROLLMENT ────────────────────────────────────────────────────────────────
//

/// Membership record linking a student to a course.
///
/// At most one enrollment exists per (student, course) pair. The record moves
/// between active and inactive; re-enrolling reactivates the same row rather
/// than inserting a duplicate. There is no terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrollment {
    student: UserId,
    course: CourseId,
    is_active: bool,
    enrolled_at: DateTime<Utc>,
    unenrolled_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    /// Creates a fresh active enrollment.
    #[must_use]
    pub fn new(student: UserId, course: CourseId, enrolled_at: DateTime<Utc>) -> Self {
        Self {
            student,
            course,
            is_active: true,
            enrolled_at,
            unenrolled_at: None,
        }
    }

    /// Rebuilds an enrollment from persisted state.
    #[must_use]
    pub fn from_persisted(
        student: UserId,
        course: CourseId,
        is_active: bool,
        enrolled_at: DateTime<Utc>,
        unenrolled_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            student,
            course,
            is_active,
            enrolled_at,
            unenrolled_at,
        }
    }

    // Accessors
    #[must_use]
    pub fn student(&self) -> UserId {
        self.student
    }

    #[must_use]
    pub fn course(&self) -> CourseId {
        self.course
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    #[must_use]
    pub fn enrolled_at(&self) -> DateTime<Utc> {
        self.enrolled_at
    }

    #[must_use]
    pub fn unenrolled_at(&self) -> Option<DateTime<Utc>> {
        self.unenrolled_at
    }

    /// Reactivates an inactive enrollment, clearing `unenrolled_at`.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentError::AlreadyActive` if the enrollment is already
    /// active.
    pub fn reactivate(&mut self) -> Result<(), EnrollmentError> {
        if self.is_active {
            return Err(EnrollmentError::AlreadyActive);
        }
        self.is_active = true;
        self.unenrolled_at = None;
        Ok(())
    }

    /// Deactivates an active enrollment, stamping `unenrolled_at`.
    ///
    /// Progress history is untouched; only membership changes.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentError::NotActive` if the enrollment is already
    /// inactive.
    pub fn deactivate(&mut self, now: DateTime<Utc>) -> Result<(), EnrollmentError> {
        if !self.is_active {
            return Err(EnrollmentError::NotActive);
        }
        self.is_active = false;
        self.unenrolled_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn new_enrollment_is_active() {
        let e = Enrollment::new(UserId::new(1), CourseId::new(2), fixed_now());
        assert!(e.is_active());
        assert_eq!(e.unenrolled_at(), None);
    }

    #[test]
    fn deactivate_stamps_unenrolled_at() {
        let mut e = Enrollment::new(UserId::new(1), CourseId::new(2), fixed_now());
        let later = fixed_now() + Duration::hours(1);
        e.deactivate(later).unwrap();
        assert!(!e.is_active());
        assert_eq!(e.unenrolled_at(), Some(later));
    }

    #[test]
    fn deactivate_twice_fails() {
        let mut e = Enrollment::new(UserId::new(1), CourseId::new(2), fixed_now());
        e.deactivate(fixed_now()).unwrap();
        assert_eq!(e.deactivate(fixed_now()).unwrap_err(), EnrollmentError::NotActive);
    }

    #[test]
    fn reactivate_clears_unenrolled_at() {
        let mut e = Enrollment::new(UserId::new(1), CourseId::new(2), fixed_now());
        e.deactivate(fixed_now() + Duration::hours(1)).unwrap();
        e.reactivate().unwrap();
        assert!(e.is_active());
        assert_eq!(e.unenrolled_at(), None);
    }

    #[test]
    fn reactivate_active_fails() {
        let mut e = Enrollment::new(UserId::new(1), CourseId::new(2), fixed_now());
        assert_eq!(e.reactivate().unwrap_err(), EnrollmentError::AlreadyActive);
    }

    #[test]
    fn full_cycle_returns_to_active() {
        let mut e = Enrollment::new(UserId::new(1), CourseId::new(2), fixed_now());
        e.deactivate(fixed_now()).unwrap();
        e.reactivate().unwrap();
        e.deactivate(fixed_now()).unwrap();
        e.reactivate().unwrap();
        assert!(e.is_active());
    }
}
