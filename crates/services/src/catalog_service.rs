use std::sync::Arc;

use lms_core::model::{Course, CourseId, Lesson, LessonId, Principal, can_modify};
use storage::repository::{CatalogRepository, NewCourseRecord, NewLessonRecord, StorageError};

use crate::Clock;
use crate::error::CatalogServiceError;

/// Orchestrates course and lesson authoring.
///
/// All mutations are ownership-checked: a course can only be changed by its
/// owning teacher or an admin.
#[derive(Clone)]
pub struct CatalogService {
    clock: Clock,
    catalog: Arc<dyn CatalogRepository>,
}

impl CatalogService {
    #[must_use]
    pub fn new(clock: Clock, catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { clock, catalog }
    }

    /// Create a new unpublished course owned by the caller.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::Forbidden` when the caller is a student,
    /// `CatalogServiceError::Course` for validation failures, and
    /// `CatalogServiceError::Storage` if persistence fails.
    pub async fn create_course(
        &self,
        principal: &Principal,
        title: String,
        description: Option<String>,
        is_free: bool,
        price_cents: u32,
    ) -> Result<CourseId, CatalogServiceError> {
        if principal.is_student() {
            return Err(CatalogServiceError::Forbidden);
        }
        let now = self.clock.now();
        let course = Course::new(
            CourseId::new(1),
            principal.user,
            title,
            description,
            is_free,
            price_cents,
            now,
        )?;
        let course_id = self
            .catalog
            .insert_course(NewCourseRecord::from_course(&course))
            .await?;
        tracing::info!(%course_id, teacher = %principal.user, "course created");
        Ok(course_id)
    }

    /// Make a course visible and enrollable.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::CourseNotFound` for missing or deleted
    /// courses and `CatalogServiceError::Forbidden` for non-owners.
    pub async fn publish_course(
        &self,
        principal: &Principal,
        course_id: CourseId,
    ) -> Result<(), CatalogServiceError> {
        let mut course = self.owned_course(principal, course_id).await?;
        course.publish();
        self.catalog.update_course(&course).await?;
        Ok(())
    }

    /// Soft-delete a course. Enrollments and progress history are retained.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::CourseNotFound` for missing or deleted
    /// courses and `CatalogServiceError::Forbidden` for non-owners.
    pub async fn delete_course(
        &self,
        principal: &Principal,
        course_id: CourseId,
    ) -> Result<(), CatalogServiceError> {
        let mut course = self.owned_course(principal, course_id).await?;
        course.mark_deleted();
        self.catalog.update_course(&course).await?;
        tracing::info!(%course_id, "course deleted");
        Ok(())
    }

    /// Append a lesson to a course.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::DuplicateSequence` when the sequence
    /// number is already taken within the course.
    pub async fn add_lesson(
        &self,
        principal: &Principal,
        course_id: CourseId,
        title: String,
        sequence_number: u32,
        duration_minutes: u32,
    ) -> Result<LessonId, CatalogServiceError> {
        let course = self.owned_course(principal, course_id).await?;
        let now = self.clock.now();
        let lesson = Lesson::new(
            LessonId::new(1),
            course.id(),
            title,
            sequence_number,
            duration_minutes,
            now,
        )?;
        let lesson_id = self
            .catalog
            .insert_lesson(NewLessonRecord::from_lesson(&lesson))
            .await
            .map_err(|e| match e {
                StorageError::Conflict => CatalogServiceError::DuplicateSequence,
                other => CatalogServiceError::Storage(other),
            })?;
        Ok(lesson_id)
    }

    /// Soft-delete a lesson.
    ///
    /// The lesson drops out of lesson listings and progress totals; stored
    /// percentages catch up on the next recalculation.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::LessonNotFound` for missing or already
    /// deleted lessons and `CatalogServiceError::Forbidden` for non-owners.
    pub async fn remove_lesson(
        &self,
        principal: &Principal,
        lesson_id: LessonId,
    ) -> Result<(), CatalogServiceError> {
        let lesson = self
            .catalog
            .get_lesson(lesson_id)
            .await?
            .filter(Lesson::is_active)
            .ok_or(CatalogServiceError::LessonNotFound)?;
        let course = self
            .catalog
            .get_course(lesson.course_id())
            .await?
            .ok_or(CatalogServiceError::CourseNotFound)?;
        if !can_modify(principal, &course) {
            return Err(CatalogServiceError::Forbidden);
        }
        self.catalog.soft_delete_lesson(lesson_id).await?;
        tracing::info!(%lesson_id, course_id = %course.id(), "lesson deleted");
        Ok(())
    }

    /// List published courses, up to the given limit.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::Storage` if repository access fails.
    pub async fn list_courses(&self, limit: u32) -> Result<Vec<Course>, CatalogServiceError> {
        let courses = self.catalog.list_published_courses(limit).await?;
        Ok(courses)
    }

    /// Fetch a non-deleted course by ID.
    ///
    /// Returns `Ok(None)` when the course does not exist or was deleted.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::Storage` if repository access fails.
    pub async fn get_course(
        &self,
        course_id: CourseId,
    ) -> Result<Option<Course>, CatalogServiceError> {
        let course = self
            .catalog
            .get_course(course_id)
            .await?
            .filter(|c| !c.lifecycle().is_deleted());
        Ok(course)
    }

    /// Active lessons of a course, in sequence order.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::Storage` if repository access fails.
    pub async fn lessons(&self, course_id: CourseId) -> Result<Vec<Lesson>, CatalogServiceError> {
        let lessons = self.catalog.lessons_for_course(course_id).await?;
        Ok(lessons)
    }

    async fn owned_course(
        &self,
        principal: &Principal,
        course_id: CourseId,
    ) -> Result<Course, CatalogServiceError> {
        let course = self
            .catalog
            .get_course(course_id)
            .await?
            .filter(|c| !c.lifecycle().is_deleted())
            .ok_or(CatalogServiceError::CourseNotFound)?;
        if !can_modify(principal, &course) {
            return Err(CatalogServiceError::Forbidden);
        }
        Ok(course)
    }
}
