//! End-to-end walk through quiz authoring, grading, and the attempt quota.

use lms_core::model::{AnswerChoice, AnswerMap, Principal, UserId};
use lms_core::time::fixed_now;
use services::{AppServices, Clock, ProgressServiceError, QuizServiceError};

#[tokio::test]
async fn author_submit_and_exhaust_quota() {
    let services = AppServices::new_in_memory(Clock::Fixed(fixed_now()));
    let teacher = Principal::teacher(UserId::new(1));
    let student = UserId::new(42);

    let course_id = services
        .catalog()
        .create_course(&teacher, "Quizzed".into(), None, true, 0)
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

    let quiz_id = services
        .quizzes()
        .create_quiz(&teacher, course_id, "Midterm".into(), None, 30, 60, 1)
        .await
        .unwrap();
    let q1 = services
        .quizzes()
        .add_question(
            &teacher,
            quiz_id,
            "2 + 2?".into(),
            "4".into(),
            "5".into(),
            None,
            None,
            AnswerChoice::A,
            1,
            None,
        )
        .await
        .unwrap();
    let q2 = services
        .quizzes()
        .add_question(
            &teacher,
            quiz_id,
            "3 * 3?".into(),
            "6".into(),
            "9".into(),
            None,
            None,
            AnswerChoice::B,
            2,
            None,
        )
        .await
        .unwrap();
    services.quizzes().publish_quiz(&teacher, quiz_id).await.unwrap();

    // uppercase letters grade the same as lowercase
    let mut answers = AnswerMap::new();
    answers.insert(q1, "A".to_owned());
    answers.insert(q2, "B".to_owned());
    let outcome = services
        .quizzes()
        .submit(student, quiz_id, answers, 120)
        .await
        .unwrap();
    assert_eq!(outcome.attempt.percentage(), 100.0);
    assert!(outcome.passed);

    // max_attempts = 1: the second submission is refused and nothing is
    // appended to the ledger
    let err = services
        .quizzes()
        .submit(student, quiz_id, AnswerMap::new(), 10)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QuizServiceError::MaxAttemptsReached { limit: 1 }
    ));

    let attempts = services
        .quizzes()
        .attempts(&Principal::student(student), quiz_id)
        .await
        .unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].score(), 2);

    // teacher dashboard sees the single attempt
    let dashboard = services
        .dashboards()
        .teacher_dashboard(UserId::new(1))
        .await
        .unwrap();
    assert_eq!(dashboard.quiz_attempts, 1);
    assert_eq!(dashboard.active_students, 1);
}

#[tokio::test]
async fn unenrolled_student_cannot_record_work() {
    let services = AppServices::new_in_memory(Clock::Fixed(fixed_now()));
    let teacher = Principal::teacher(UserId::new(1));
    let outsider = UserId::new(77);

    let course_id = services
        .catalog()
        .create_course(&teacher, "Gated".into(), None, true, 0)
        .await
        .unwrap();
    let lesson = services
        .catalog()
        .add_lesson(&teacher, course_id, "Intro".into(), 1, 10)
        .await
        .unwrap();
    services
        .catalog()
        .publish_course(&teacher, course_id)
        .await
        .unwrap();
    let quiz_id = services
        .quizzes()
        .create_quiz(&teacher, course_id, "Entry".into(), None, 10, 60, 0)
        .await
        .unwrap();
    services
        .quizzes()
        .add_question(
            &teacher,
            quiz_id,
            "1 + 1?".into(),
            "2".into(),
            "3".into(),
            None,
            None,
            AnswerChoice::A,
            1,
            None,
        )
        .await
        .unwrap();
    services.quizzes().publish_quiz(&teacher, quiz_id).await.unwrap();

    // both write paths require an active enrollment
    let err = services
        .progress()
        .mark_complete(outsider, lesson, 60)
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressServiceError::NotEnrolled));

    let err = services
        .quizzes()
        .submit(outsider, quiz_id, AnswerMap::new(), 10)
        .await
        .unwrap_err();
    assert!(matches!(err, QuizServiceError::NotEnrolled));

    // nothing was recorded for the outsider
    let attempts = services.quizzes().attempts(&teacher, quiz_id).await.unwrap();
    assert!(attempts.is_empty());
    let view = services
        .progress()
        .course_overview(outsider, course_id)
        .await
        .unwrap();
    assert_eq!(view.completed_lessons, 0);
}
