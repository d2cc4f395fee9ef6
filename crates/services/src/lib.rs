#![forbid(unsafe_code)]

pub mod app_services;
pub mod catalog_service;
pub mod dashboard_service;
pub mod enrollment_service;
pub mod error;
pub mod notify;
pub mod progress_service;
pub mod quiz_service;

pub use lms_core::Clock;

pub use app_services::AppServices;
pub use catalog_service::CatalogService;
pub use dashboard_service::{DashboardService, EnrolledCourse, StudentDashboard, TeacherDashboard};
pub use enrollment_service::EnrollmentService;
pub use error::{
    AppServicesError, CatalogServiceError, DashboardServiceError, EnrollmentServiceError,
    ProgressServiceError, QuizServiceError,
};
pub use notify::{LogNotifier, Notifier};
pub use progress_service::{CourseProgressView, LessonStatus, ProgressService};
pub use quiz_service::{QuizService, SubmissionOutcome};
