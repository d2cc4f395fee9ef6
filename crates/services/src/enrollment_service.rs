use std::sync::Arc;

use lms_core::model::{Course, CourseId, Enrollment, UserId};
use storage::repository::{
    CatalogRepository, EnrollmentChange, EnrollmentRepository, StorageError,
};

use crate::Clock;
use crate::error::EnrollmentServiceError;
use crate::notify::Notifier;

/// Orchestrates the enrollment ledger.
///
/// Enrollment is a state machine on one row per (student, course) pair:
/// enrolling inserts or reactivates, unenrolling deactivates, and progress
/// history survives both directions.
#[derive(Clone)]
pub struct EnrollmentService {
    clock: Clock,
    catalog: Arc<dyn CatalogRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    notifier: Arc<dyn Notifier>,
}

impl EnrollmentService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CatalogRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            clock,
            catalog,
            enrollments,
            notifier,
        }
    }

    /// Enroll a student in a course.
    ///
    /// Re-enrolling after unenrollment reactivates the original row, keeping
    /// the first `enrolled_at` and any accumulated progress.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentServiceError::CourseNotFound` when the course is
    /// missing, deleted, or unpublished, and
    /// `EnrollmentServiceError::AlreadyEnrolled` when an active enrollment
    /// already exists.
    pub async fn enroll(
        &self,
        student: UserId,
        course_id: CourseId,
    ) -> Result<(EnrollmentChange, Enrollment), EnrollmentServiceError> {
        let course = self
            .catalog
            .get_course(course_id)
            .await?
            .filter(Course::is_enrollable)
            .ok_or(EnrollmentServiceError::CourseNotFound)?;

        let now = self.clock.now();
        let (change, enrollment) = self
            .enrollments
            .activate(student, course.id(), now)
            .await
            .map_err(|e| match e {
                StorageError::Conflict => EnrollmentServiceError::AlreadyEnrolled,
                other => EnrollmentServiceError::Storage(other),
            })?;

        tracing::info!(%student, %course_id, ?change, "enrollment activated");
        self.notifier.enrolled(student, course_id);
        Ok((change, enrollment))
    }

    /// Unenroll a student from a course.
    ///
    /// Progress and attempt history are untouched; only membership changes.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentServiceError::NotEnrolled` when no active
    /// enrollment exists.
    pub async fn unenroll(
        &self,
        student: UserId,
        course_id: CourseId,
    ) -> Result<(), EnrollmentServiceError> {
        let now = self.clock.now();
        self.enrollments
            .deactivate(student, course_id, now)
            .await
            .map_err(|e| match e {
                StorageError::NotFound => EnrollmentServiceError::NotEnrolled,
                other => EnrollmentServiceError::Storage(other),
            })?;
        tracing::info!(%student, %course_id, "enrollment deactivated");
        Ok(())
    }

    /// Fetch the enrollment row for the pair, active or not.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentServiceError::Storage` if repository access fails.
    pub async fn status(
        &self,
        student: UserId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, EnrollmentServiceError> {
        let enrollment = self.enrollments.get(student, course_id).await?;
        Ok(enrollment)
    }

    /// Courses the student is actively enrolled in.
    ///
    /// Deleted courses are filtered out even when the enrollment row still
    /// points at them.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentServiceError::Storage` if repository access fails.
    pub async fn active_courses(
        &self,
        student: UserId,
    ) -> Result<Vec<Course>, EnrollmentServiceError> {
        let course_ids = self.enrollments.active_courses_for_student(student).await?;
        let mut courses = Vec::with_capacity(course_ids.len());
        for course_id in course_ids {
            if let Some(course) = self.catalog.get_course(course_id).await?
                && !course.lifecycle().is_deleted()
            {
                courses.push(course);
            }
        }
        Ok(courses)
    }
}
