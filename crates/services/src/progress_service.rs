use std::collections::HashMap;
use std::sync::Arc;

use lms_core::model::{
    CourseId, CourseProgress, Lesson, LessonId, LessonProgress, UserId,
};
use storage::repository::{
    CatalogRepository, CompletionOutcome, EnrollmentRepository, ProgressRepository,
};

use crate::Clock;
use crate::error::ProgressServiceError;
use crate::notify::Notifier;

/// One lesson of a course paired with the student's progress row, if any.
#[derive(Debug, Clone)]
pub struct LessonStatus {
    pub lesson: Lesson,
    pub progress: Option<LessonProgress>,
}

/// A student's view of one course: the stored aggregate plus per-lesson
/// detail.
#[derive(Debug, Clone)]
pub struct CourseProgressView {
    pub progress: CourseProgress,
    pub completed_lessons: u64,
    pub total_lessons: u64,
    pub lessons: Vec<LessonStatus>,
}

/// Orchestrates lesson completion and the derived course aggregate.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    catalog: Arc<dyn CatalogRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    progress: Arc<dyn ProgressRepository>,
    notifier: Arc<dyn Notifier>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CatalogRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        progress: Arc<dyn ProgressRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            clock,
            catalog,
            enrollments,
            progress,
            notifier,
        }
    }

    /// Record a lesson completion for an enrolled student.
    ///
    /// Idempotent on the completion flag: repeat calls keep the original
    /// completion timestamp and only accumulate `time_spent_secs`. The course
    /// aggregate is recalculated in the same transaction as the completion
    /// write.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::LessonNotFound` for missing or deleted
    /// lessons and `ProgressServiceError::NotEnrolled` when the student has
    /// no active enrollment in the lesson's course.
    pub async fn mark_complete(
        &self,
        student: UserId,
        lesson_id: LessonId,
        time_spent_secs: u64,
    ) -> Result<CompletionOutcome, ProgressServiceError> {
        let lesson = self
            .catalog
            .get_lesson(lesson_id)
            .await?
            .filter(Lesson::is_active)
            .ok_or(ProgressServiceError::LessonNotFound)?;

        let course_id = lesson.course_id();
        if !self.enrollments.is_active(student, course_id).await? {
            return Err(ProgressServiceError::NotEnrolled);
        }

        let now = self.clock.now();
        let outcome = self
            .progress
            .complete_lesson(student, lesson_id, course_id, time_spent_secs, now)
            .await?;

        let percentage = outcome.course_progress.progress_percentage();
        tracing::info!(%student, %lesson_id, %course_id, percentage, "lesson completed");
        if percentage >= 100.0 {
            self.notifier.course_completed(student, course_id);
        }
        Ok(outcome)
    }

    /// A student's detailed progress through one course.
    ///
    /// Lessons the student has not touched appear with `progress: None`. The
    /// aggregate row is zero-percent when none exists yet.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn course_overview(
        &self,
        student: UserId,
        course_id: CourseId,
    ) -> Result<CourseProgressView, ProgressServiceError> {
        let lessons = self.catalog.lessons_for_course(course_id).await?;
        let rows = self
            .progress
            .lesson_progress_for_course(student, course_id)
            .await?;
        let mut by_lesson: HashMap<LessonId, LessonProgress> =
            rows.into_iter().map(|lp| (lp.lesson(), lp)).collect();

        let total_lessons = lessons.len() as u64;
        let mut completed_lessons = 0;
        let mut statuses = Vec::with_capacity(lessons.len());
        for lesson in lessons {
            let progress = by_lesson.remove(&lesson.id());
            if progress.as_ref().is_some_and(LessonProgress::completed) {
                completed_lessons += 1;
            }
            statuses.push(LessonStatus { lesson, progress });
        }

        let progress = match self.progress.course_progress(student, course_id).await? {
            Some(cp) => cp,
            None => CourseProgress::new(student, course_id),
        };

        Ok(CourseProgressView {
            progress,
            completed_lessons,
            total_lessons,
            lessons: statuses,
        })
    }

    /// Recompute the stored percentage for the pair from current completion
    /// rows, picking up catalog changes such as lesson deletions.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn recalculate(
        &self,
        student: UserId,
        course_id: CourseId,
    ) -> Result<CourseProgress, ProgressServiceError> {
        let progress = self.progress.recalculate(student, course_id).await?;
        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use lms_core::time::fixed_now;
    use storage::repository::{
        EnrollmentRepository as _, InMemoryRepository, NewCourseRecord, NewLessonRecord,
    };

    use crate::notify::LogNotifier;

    async fn seed(repo: &InMemoryRepository, lessons: u32) -> (CourseId, Vec<LessonId>) {
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
            lesson_ids.push(
                repo.insert_lesson(NewLessonRecord {
                    course_id,
                    title: format!("Lesson {seq}"),
                    sequence_number: seq,
                    duration_minutes: 10,
                    created_at: fixed_now(),
                })
                .await
                .unwrap(),
            );
        }
        (course_id, lesson_ids)
    }

    fn service(repo: &InMemoryRepository) -> ProgressService {
        ProgressService::new(
            Clock::Fixed(fixed_now()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(LogNotifier),
        )
    }

    #[tokio::test]
    async fn completion_requires_active_enrollment() {
        let repo = InMemoryRepository::new();
        let (_, lessons) = seed(&repo, 1).await;
        let service = service(&repo);

        let err = service
            .mark_complete(UserId::new(7), lessons[0], 60)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressServiceError::NotEnrolled));
    }

    #[tokio::test]
    async fn completion_moves_percentage() {
        let repo = InMemoryRepository::new();
        let (course, lessons) = seed(&repo, 2).await;
        let student = UserId::new(7);
        repo.activate(student, course, fixed_now()).await.unwrap();
        let service = service(&repo);

        let outcome = service.mark_complete(student, lessons[0], 60).await.unwrap();
        assert_eq!(outcome.course_progress.progress_percentage(), 50.0);

        let outcome = service.mark_complete(student, lessons[1], 60).await.unwrap();
        assert_eq!(outcome.course_progress.progress_percentage(), 100.0);
    }

    #[tokio::test]
    async fn missing_lesson_is_not_found() {
        let repo = InMemoryRepository::new();
        let service = service(&repo);
        let err = service
            .mark_complete(UserId::new(7), LessonId::new(99), 60)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressServiceError::LessonNotFound));
    }

    #[tokio::test]
    async fn overview_pairs_lessons_with_progress() {
        let repo = InMemoryRepository::new();
        let (course, lessons) = seed(&repo, 3).await;
        let student = UserId::new(7);
        repo.activate(student, course, fixed_now()).await.unwrap();
        let service = service(&repo);

        service.mark_complete(student, lessons[0], 60).await.unwrap();

        let view = service.course_overview(student, course).await.unwrap();
        assert_eq!(view.total_lessons, 3);
        assert_eq!(view.completed_lessons, 1);
        assert_eq!(view.progress.progress_percentage(), 33.3);
        assert_eq!(view.lessons.len(), 3);
        assert!(view.lessons[0].progress.is_some());
        assert!(view.lessons[1].progress.is_none());
    }

    #[tokio::test]
    async fn overview_without_any_progress_is_zero_percent() {
        let repo = InMemoryRepository::new();
        let (course, _) = seed(&repo, 2).await;
        let service = service(&repo);

        let view = service
            .course_overview(UserId::new(7), course)
            .await
            .unwrap();
        assert_eq!(view.progress.progress_percentage(), 0.0);
        assert_eq!(view.completed_lessons, 0);
    }
}
