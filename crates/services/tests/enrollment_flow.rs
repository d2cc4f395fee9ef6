//! End-to-end walk through the enrollment and progress pipeline over the
//! in-memory backend.

use lms_core::model::{Principal, UserId};
use lms_core::time::fixed_now;
use services::{AppServices, Clock, EnrollmentServiceError};
use storage::repository::EnrollmentChange;

#[tokio::test]
async fn enroll_complete_unenroll_cycle() {
    let services = AppServices::new_in_memory(Clock::Fixed(fixed_now()));
    let teacher = Principal::teacher(UserId::new(1));
    let student = UserId::new(42);

    let course_id = services
        .catalog()
        .create_course(&teacher, "Rust Backend".into(), None, true, 0)
        .await
        .unwrap();
    let lesson_one = services
        .catalog()
        .add_lesson(&teacher, course_id, "Ownership".into(), 1, 20)
        .await
        .unwrap();
    let lesson_two = services
        .catalog()
        .add_lesson(&teacher, course_id, "Borrowing".into(), 2, 25)
        .await
        .unwrap();

    // unpublished course does not accept enrollments
    let err = services
        .enrollments()
        .enroll(student, course_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EnrollmentServiceError::CourseNotFound));

    services
        .catalog()
        .publish_course(&teacher, course_id)
        .await
        .unwrap();

    let (change, enrollment) = services
        .enrollments()
        .enroll(student, course_id)
        .await
        .unwrap();
    assert_eq!(change, EnrollmentChange::Created);
    assert!(enrollment.is_active());

    // fresh enrollment starts at zero percent
    let view = services
        .progress()
        .course_overview(student, course_id)
        .await
        .unwrap();
    assert_eq!(view.progress.progress_percentage(), 0.0);
    assert_eq!(view.total_lessons, 2);

    // 1 of 2 lessons -> 50%, 2 of 2 -> 100%
    let outcome = services
        .progress()
        .mark_complete(student, lesson_one, 600)
        .await
        .unwrap();
    assert_eq!(outcome.course_progress.progress_percentage(), 50.0);

    let outcome = services
        .progress()
        .mark_complete(student, lesson_two, 700)
        .await
        .unwrap();
    assert_eq!(outcome.course_progress.progress_percentage(), 100.0);
    assert_eq!(outcome.course_progress.last_lesson(), Some(lesson_two));

    // unenrolling keeps all progress
    services
        .enrollments()
        .unenroll(student, course_id)
        .await
        .unwrap();
    let view = services
        .progress()
        .course_overview(student, course_id)
        .await
        .unwrap();
    assert_eq!(view.progress.progress_percentage(), 100.0);
    assert_eq!(view.completed_lessons, 2);

    // re-enrolling reactivates the original row
    let (change, enrollment) = services
        .enrollments()
        .enroll(student, course_id)
        .await
        .unwrap();
    assert_eq!(change, EnrollmentChange::Reactivated);
    assert_eq!(enrollment.unenrolled_at(), None);

    // dashboard reflects the completed course
    let dashboard = services.dashboards().student_dashboard(student).await.unwrap();
    assert_eq!(dashboard.courses.len(), 1);
    assert_eq!(dashboard.completed_lessons, 2);
    assert_eq!(dashboard.total_time_spent_secs, 1300);
}

#[tokio::test]
async fn lesson_removal_shifts_percentages() {
    let services = AppServices::new_in_memory(Clock::Fixed(fixed_now()));
    let teacher = Principal::teacher(UserId::new(1));
    let student = UserId::new(42);

    let course_id = services
        .catalog()
        .create_course(&teacher, "Shrinking".into(), None, true, 0)
        .await
        .unwrap();
    let lesson_one = services
        .catalog()
        .add_lesson(&teacher, course_id, "Keep".into(), 1, 10)
        .await
        .unwrap();
    let lesson_two = services
        .catalog()
        .add_lesson(&teacher, course_id, "Drop".into(), 2, 10)
        .await
        .unwrap();
    services
        .catalog()
        .publish_course(&teacher, course_id)
        .await
        .unwrap();
    services
        .enrollments()
        .enroll(student, course_id)
        .await
        .unwrap();
    services
        .progress()
        .mark_complete(student, lesson_one, 60)
        .await
        .unwrap();

    services
        .catalog()
        .remove_lesson(&teacher, lesson_two)
        .await
        .unwrap();

    // 1 of 1 remaining lessons after recalculation
    let progress = services
        .progress()
        .recalculate(student, course_id)
        .await
        .unwrap();
    assert_eq!(progress.progress_percentage(), 100.0);
}
