use std::collections::HashSet;
use std::sync::Arc;

use lms_core::model::{Course, CourseProgress, QuizAttempt, UserId};
use storage::repository::{
    CatalogRepository, EnrollmentRepository, ProgressRepository, QuizRepository,
};

use crate::error::DashboardServiceError;

/// One actively-enrolled course with the student's stored aggregate.
#[derive(Debug, Clone)]
pub struct EnrolledCourse {
    pub course: Course,
    pub progress: Option<CourseProgress>,
}

/// Cross-course summary for one student.
#[derive(Debug, Clone)]
pub struct StudentDashboard {
    pub courses: Vec<EnrolledCourse>,
    pub completed_lessons: u64,
    pub total_time_spent_secs: u64,
    pub quiz_attempts: u64,
    pub average_quiz_percentage: Option<f64>,
}

/// Cross-course summary for one teacher.
#[derive(Debug, Clone)]
pub struct TeacherDashboard {
    pub course_count: u64,
    pub active_students: u64,
    pub average_progress: Option<f64>,
    pub quiz_attempts: u64,
}

/// Read-only aggregation over the other modules' state.
///
/// Dashboards never write; they combine stored aggregates with counts
/// computed at read time.
#[derive(Clone)]
pub struct DashboardService {
    catalog: Arc<dyn CatalogRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    progress: Arc<dyn ProgressRepository>,
    quizzes: Arc<dyn QuizRepository>,
}

impl DashboardService {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        progress: Arc<dyn ProgressRepository>,
        quizzes: Arc<dyn QuizRepository>,
    ) -> Self {
        Self {
            catalog,
            enrollments,
            progress,
            quizzes,
        }
    }

    /// A student's view across everything they are enrolled in.
    ///
    /// # Errors
    ///
    /// Returns `DashboardServiceError::Storage` if repository access fails.
    pub async fn student_dashboard(
        &self,
        student: UserId,
    ) -> Result<StudentDashboard, DashboardServiceError> {
        let course_ids = self.enrollments.active_courses_for_student(student).await?;
        let mut courses = Vec::with_capacity(course_ids.len());
        for course_id in course_ids {
            let Some(course) = self.catalog.get_course(course_id).await? else {
                continue;
            };
            if course.lifecycle().is_deleted() {
                continue;
            }
            let progress = self.progress.course_progress(student, course_id).await?;
            courses.push(EnrolledCourse { course, progress });
        }

        let completed_lessons = self.progress.completed_lesson_count(student).await?;
        let total_time_spent_secs = self.progress.total_time_spent(student).await?;

        let attempts = self.quizzes.attempts_for_student(student).await?;
        let quiz_attempts = attempts.len() as u64;
        let average_quiz_percentage = mean(attempts.iter().map(QuizAttempt::percentage));

        Ok(StudentDashboard {
            courses,
            completed_lessons,
            total_time_spent_secs,
            quiz_attempts,
            average_quiz_percentage,
        })
    }

    /// A teacher's view across the courses they own.
    ///
    /// `active_students` counts distinct students; a student enrolled in two
    /// of the teacher's courses counts once. `average_progress` is the mean
    /// over each course's mean, ignoring courses nobody has progress in yet.
    ///
    /// # Errors
    ///
    /// Returns `DashboardServiceError::Storage` if repository access fails.
    pub async fn teacher_dashboard(
        &self,
        teacher: UserId,
    ) -> Result<TeacherDashboard, DashboardServiceError> {
        let courses = self.catalog.courses_for_teacher(teacher).await?;

        let mut students: HashSet<UserId> = HashSet::new();
        let mut course_means = Vec::new();
        let mut quiz_attempts: u64 = 0;
        for course in &courses {
            students.extend(
                self.enrollments
                    .active_students_for_course(course.id())
                    .await?,
            );
            if let Some(mean) = self
                .progress
                .average_progress_for_course(course.id())
                .await?
            {
                course_means.push(mean);
            }
            for quiz in self.quizzes.quizzes_for_course(course.id(), false).await? {
                let attempts = self.quizzes.attempts_for_quiz(quiz.id(), None).await?;
                quiz_attempts += attempts.len() as u64;
            }
        }

        Ok(TeacherDashboard {
            course_count: courses.len() as u64,
            active_students: students.len() as u64,
            average_progress: mean(course_means.iter().copied()),
            quiz_attempts,
        })
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    #[allow(clippy::cast_precision_loss)]
    let mean = sum / values.len() as f64;
    Some(mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    use lms_core::model::{AnswerMap, CourseId, GradedSubmission, LessonId};
    use lms_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, NewCourseRecord, NewLessonRecord};

    async fn seed(repo: &InMemoryRepository, teacher: u64, lessons: u32) -> (CourseId, Vec<LessonId>) {
        let course_id = repo
            .insert_course(NewCourseRecord {
                teacher: UserId::new(teacher),
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

    fn service(repo: &InMemoryRepository) -> DashboardService {
        DashboardService::new(
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    #[tokio::test]
    async fn empty_student_dashboard() {
        let repo = InMemoryRepository::new();
        let dashboard = service(&repo)
            .student_dashboard(UserId::new(7))
            .await
            .unwrap();
        assert!(dashboard.courses.is_empty());
        assert_eq!(dashboard.completed_lessons, 0);
        assert_eq!(dashboard.quiz_attempts, 0);
        assert_eq!(dashboard.average_quiz_percentage, None);
    }

    #[tokio::test]
    async fn student_dashboard_aggregates_progress_and_attempts() {
        let repo = InMemoryRepository::new();
        let (course, lessons) = seed(&repo, 1, 2).await;
        let student = UserId::new(7);
        repo.activate(student, course, fixed_now()).await.unwrap();
        repo.complete_lesson(student, lessons[0], course, 300, fixed_now())
            .await
            .unwrap();
        let attempt = lms_core::model::QuizAttempt::new(
            student,
            lms_core::model::QuizId::new(1),
            GradedSubmission { score: 1, total: 2 },
            AnswerMap::new(),
            60,
            fixed_now(),
        );
        repo.insert_attempt_within_limit(&attempt, 0).await.unwrap();

        let dashboard = service(&repo).student_dashboard(student).await.unwrap();
        assert_eq!(dashboard.courses.len(), 1);
        assert_eq!(
            dashboard.courses[0]
                .progress
                .as_ref()
                .unwrap()
                .progress_percentage(),
            50.0
        );
        assert_eq!(dashboard.completed_lessons, 1);
        assert_eq!(dashboard.total_time_spent_secs, 300);
        assert_eq!(dashboard.quiz_attempts, 1);
        assert_eq!(dashboard.average_quiz_percentage, Some(50.0));
    }

    #[tokio::test]
    async fn teacher_dashboard_counts_distinct_students() {
        let repo = InMemoryRepository::new();
        let (first, _) = seed(&repo, 1, 1).await;
        let (second, _) = seed(&repo, 1, 1).await;
        let student_a = UserId::new(7);
        let student_b = UserId::new(8);
        repo.activate(student_a, first, fixed_now()).await.unwrap();
        repo.activate(student_a, second, fixed_now()).await.unwrap();
        repo.activate(student_b, first, fixed_now()).await.unwrap();

        let dashboard = service(&repo)
            .teacher_dashboard(UserId::new(1))
            .await
            .unwrap();
        assert_eq!(dashboard.course_count, 2);
        assert_eq!(dashboard.active_students, 2);
    }

    #[tokio::test]
    async fn teacher_dashboard_averages_course_progress() {
        let repo = InMemoryRepository::new();
        let (course, lessons) = seed(&repo, 1, 2).await;
        let student_a = UserId::new(7);
        let student_b = UserId::new(8);
        repo.activate(student_a, course, fixed_now()).await.unwrap();
        repo.activate(student_b, course, fixed_now()).await.unwrap();
        repo.complete_lesson(student_a, lessons[0], course, 60, fixed_now())
            .await
            .unwrap();

        // one student at 50%, one at 0%
        let dashboard = service(&repo)
            .teacher_dashboard(UserId::new(1))
            .await
            .unwrap();
        assert_eq!(dashboard.average_progress, Some(25.0));
    }
}
