mod access;
mod course;
mod enrollment;
mod ids;
mod lesson;
mod progress;
mod quiz;

pub use access::{Owned, Principal, Role, can_modify};
pub use course::{Course, CourseError, Lifecycle};
pub use enrollment::{Enrollment, EnrollmentError};
pub use ids::{CourseId, LessonId, ParseIdError, QuestionId, QuizId, UserId};
pub use lesson::{Lesson, LessonError};
pub use progress::{
    CourseProgress, LessonProgress, completion_percentage, round_one_decimal,
};
pub use quiz::{
    AnswerChoice, AnswerMap, GradedSubmission, Quiz, QuizAttempt, QuizError, QuizQuestion, grade,
};
