//! Demo driver for the learning platform services.
//!
//! Seeds a small catalog, then walks a student through the
//! enroll -> complete -> quiz pipeline and prints both dashboards.

use std::fmt;

use lms_core::model::{AnswerChoice, AnswerMap, Principal, UserId};
use services::{AppServices, Clock};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

struct Args {
    db_url: String,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("LMS_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://lms.sqlite3".into(), normalize_sqlite_url);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = args.next().ok_or(ArgsError::MissingValue { flag: "--db" })?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self { db_url })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://lms.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LMS_DB_URL, RUST_LOG");
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }
    let trimmed = raw.trim().to_string();
    let path = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed.as_str());
    format!("sqlite://{path}?mode=rwc")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse(&mut std::env::args().skip(1))?;
    let services = AppServices::new_sqlite(&args.db_url, Clock::Default).await?;

    run_demo(&services).await?;
    Ok(())
}

async fn run_demo(services: &AppServices) -> Result<(), Box<dyn std::error::Error>> {
    let teacher = Principal::teacher(UserId::new(1));
    let student = UserId::new(42);

    // catalog: one course, two lessons, one quiz
    let course_id = services
        .catalog()
        .create_course(
            &teacher,
            "Rust for Backend Engineers".into(),
            Some("Ownership, borrowing, and async services".into()),
            true,
            0,
        )
        .await?;
    let lesson_one = services
        .catalog()
        .add_lesson(&teacher, course_id, "Ownership".into(), 1, 20)
        .await?;
    let lesson_two = services
        .catalog()
        .add_lesson(&teacher, course_id, "Borrowing".into(), 2, 25)
        .await?;
    services.catalog().publish_course(&teacher, course_id).await?;

    let quiz_id = services
        .quizzes()
        .create_quiz(&teacher, course_id, "Checkpoint".into(), None, 15, 60, 3)
        .await?;
    let q1 = services
        .quizzes()
        .add_question(
            &teacher,
            quiz_id,
            "Who owns a moved value?".into(),
            "The new binding".into(),
            "The old binding".into(),
            Some("Both".into()),
            None,
            AnswerChoice::A,
            1,
            None,
        )
        .await?;
    let q2 = services
        .quizzes()
        .add_question(
            &teacher,
            quiz_id,
            "How many mutable borrows may coexist?".into(),
            "Two".into(),
            "One".into(),
            Some("Unlimited".into()),
            None,
            AnswerChoice::B,
            2,
            None,
        )
        .await?;
    services.quizzes().publish_quiz(&teacher, quiz_id).await?;

    // student pipeline: enroll, complete, take the quiz
    services.enrollments().enroll(student, course_id).await?;
    services
        .progress()
        .mark_complete(student, lesson_one, 1200)
        .await?;
    let outcome = services
        .progress()
        .mark_complete(student, lesson_two, 1500)
        .await?;
    println!(
        "course progress: {:.1}%",
        outcome.course_progress.progress_percentage()
    );

    let mut answers = AnswerMap::new();
    answers.insert(q1, "a".to_owned());
    answers.insert(q2, "b".to_owned());
    let submission = services
        .quizzes()
        .submit(student, quiz_id, answers, 90)
        .await?;
    println!(
        "quiz: {:.1}% ({})",
        submission.attempt.percentage(),
        if submission.passed { "passed" } else { "failed" }
    );

    let dashboard = services.dashboards().student_dashboard(student).await?;
    println!(
        "student: {} course(s), {} lesson(s) completed, {}s studied, {} quiz attempt(s)",
        dashboard.courses.len(),
        dashboard.completed_lessons,
        dashboard.total_time_spent_secs,
        dashboard.quiz_attempts,
    );

    let dashboard = services.dashboards().teacher_dashboard(teacher.user).await?;
    println!(
        "teacher: {} course(s), {} active student(s), average progress {:?}",
        dashboard.course_count, dashboard.active_students, dashboard.average_progress,
    );

    Ok(())
}
