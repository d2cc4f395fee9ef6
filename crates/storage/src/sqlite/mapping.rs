use lms_core::model::{
    AnswerChoice, AnswerMap, Course, CourseId, CourseProgress, Enrollment, Lesson, LessonId,
    LessonProgress, Lifecycle, Quiz, QuizAttempt, QuizId, QuizQuestion, QuestionId, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(i64_to_u64("course_id", v)?))
}

pub(crate) fn lesson_id_from_i64(v: i64) -> Result<LessonId, StorageError> {
    Ok(LessonId::new(i64_to_u64("lesson_id", v)?))
}

pub(crate) fn quiz_id_from_i64(v: i64) -> Result<QuizId, StorageError> {
    Ok(QuizId::new(i64_to_u64("quiz_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn parse_lifecycle(s: &str) -> Result<Lifecycle, StorageError> {
    match s {
        "active" => Ok(Lifecycle::Active),
        "deleted" => Ok(Lifecycle::Deleted),
        _ => Err(StorageError::Serialization(format!(
            "invalid lifecycle: {s}"
        ))),
    }
}

pub(crate) fn parse_letter(s: &str) -> Result<AnswerChoice, StorageError> {
    AnswerChoice::parse(s).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Encodes a submitted answer map as the JSON stored in `quiz_attempts.answers`.
pub(crate) fn answers_to_json(answers: &AnswerMap) -> Result<String, StorageError> {
    serde_json::to_string(answers).map_err(ser)
}

pub(crate) fn answers_from_json(raw: &str) -> Result<AnswerMap, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) fn map_course_row(row: &SqliteRow) -> Result<Course, StorageError> {
    let lifecycle: String = row.try_get("lifecycle").map_err(ser)?;
    Ok(Course::from_persisted(
        course_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        user_id_from_i64(row.try_get::<i64, _>("teacher_id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get::<Option<String>, _>("description").map_err(ser)?,
        row.try_get::<i64, _>("is_published").map_err(ser)? != 0,
        row.try_get::<i64, _>("is_free").map_err(ser)? != 0,
        i64_to_u32(
            "price_cents",
            row.try_get::<i64, _>("price_cents").map_err(ser)?,
        )?,
        parse_lifecycle(&lifecycle)?,
        row.try_get("created_at").map_err(ser)?,
    ))
}

pub(crate) fn map_lesson_row(row: &SqliteRow) -> Result<Lesson, StorageError> {
    let lifecycle: String = row.try_get("lifecycle").map_err(ser)?;
    Ok(Lesson::from_persisted(
        lesson_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        i64_to_u32(
            "sequence_number",
            row.try_get::<i64, _>("sequence_number").map_err(ser)?,
        )?,
        i64_to_u32(
            "duration_minutes",
            row.try_get::<i64, _>("duration_minutes").map_err(ser)?,
        )?,
        parse_lifecycle(&lifecycle)?,
        row.try_get("created_at").map_err(ser)?,
    ))
}

pub(crate) fn map_enrollment_row(row: &SqliteRow) -> Result<Enrollment, StorageError> {
    Ok(Enrollment::from_persisted(
        user_id_from_i64(row.try_get::<i64, _>("student_id").map_err(ser)?)?,
        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        row.try_get::<i64, _>("is_active").map_err(ser)? != 0,
        row.try_get("enrolled_at").map_err(ser)?,
        row.try_get("unenrolled_at").map_err(ser)?,
    ))
}

pub(crate) fn map_lesson_progress_row(row: &SqliteRow) -> Result<LessonProgress, StorageError> {
    Ok(LessonProgress::from_persisted(
        user_id_from_i64(row.try_get::<i64, _>("student_id").map_err(ser)?)?,
        lesson_id_from_i64(row.try_get::<i64, _>("lesson_id").map_err(ser)?)?,
        row.try_get::<i64, _>("completed").map_err(ser)? != 0,
        row.try_get("completed_at").map_err(ser)?,
        i64_to_u64(
            "time_spent_secs",
            row.try_get::<i64, _>("time_spent_secs").map_err(ser)?,
        )?,
    ))
}

pub(crate) fn map_course_progress_row(row: &SqliteRow) -> Result<CourseProgress, StorageError> {
    Ok(CourseProgress::from_persisted(
        user_id_from_i64(row.try_get::<i64, _>("student_id").map_err(ser)?)?,
        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        row.try_get::<f64, _>("progress_percentage").map_err(ser)?,
        row.try_get::<Option<i64>, _>("last_lesson_id")
            .map_err(ser)?
            .map(lesson_id_from_i64)
            .transpose()?,
    ))
}

pub(crate) fn map_quiz_row(row: &SqliteRow) -> Result<Quiz, StorageError> {
    Ok(Quiz::from_persisted(
        quiz_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get::<Option<String>, _>("description").map_err(ser)?,
        i64_to_u32(
            "duration_minutes",
            row.try_get::<i64, _>("duration_minutes").map_err(ser)?,
        )?,
        i64_to_u32(
            "passing_score",
            row.try_get::<i64, _>("passing_score").map_err(ser)?,
        )?,
        row.try_get::<i64, _>("is_published").map_err(ser)? != 0,
        i64_to_u32(
            "max_attempts",
            row.try_get::<i64, _>("max_attempts").map_err(ser)?,
        )?,
        row.try_get("created_at").map_err(ser)?,
    ))
}

pub(crate) fn map_question_row(row: &SqliteRow) -> Result<QuizQuestion, StorageError> {
    let letter: String = row.try_get("correct_answer").map_err(ser)?;
    QuizQuestion::new(
        question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        quiz_id_from_i64(row.try_get::<i64, _>("quiz_id").map_err(ser)?)?,
        row.try_get::<String, _>("question_text").map_err(ser)?,
        row.try_get::<String, _>("option_a").map_err(ser)?,
        row.try_get::<String, _>("option_b").map_err(ser)?,
        row.try_get::<Option<String>, _>("option_c").map_err(ser)?,
        row.try_get::<Option<String>, _>("option_d").map_err(ser)?,
        parse_letter(&letter)?,
        i64_to_u32(
            "sequence_number",
            row.try_get::<i64, _>("sequence_number").map_err(ser)?,
        )?,
        row.try_get::<Option<String>, _>("explanation").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_attempt_row(row: &SqliteRow) -> Result<QuizAttempt, StorageError> {
    let answers_raw: String = row.try_get("answers").map_err(ser)?;
    Ok(QuizAttempt::from_persisted(
        user_id_from_i64(row.try_get::<i64, _>("student_id").map_err(ser)?)?,
        quiz_id_from_i64(row.try_get::<i64, _>("quiz_id").map_err(ser)?)?,
        i64_to_u32("score", row.try_get::<i64, _>("score").map_err(ser)?)?,
        i64_to_u32(
            "total_questions",
            row.try_get::<i64, _>("total_questions").map_err(ser)?,
        )?,
        answers_from_json(&answers_raw)?,
        i64_to_u64(
            "time_taken_secs",
            row.try_get::<i64, _>("time_taken_secs").map_err(ser)?,
        )?,
        row.try_get("completed_at").map_err(ser)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::model::QuestionId;

    #[test]
    fn lifecycle_roundtrip() {
        assert_eq!(parse_lifecycle("active").unwrap(), Lifecycle::Active);
        assert_eq!(parse_lifecycle("deleted").unwrap(), Lifecycle::Deleted);
        assert!(parse_lifecycle("archived").is_err());
    }

    #[test]
    fn answers_json_roundtrip() {
        let mut answers = AnswerMap::new();
        answers.insert(QuestionId::new(1), "a".to_owned());
        answers.insert(QuestionId::new(2), "C".to_owned());

        let json = answers_to_json(&answers).unwrap();
        let back = answers_from_json(&json).unwrap();
        assert_eq!(answers, back);
    }

    #[test]
    fn letter_parse_maps_errors() {
        assert_eq!(parse_letter("a").unwrap(), AnswerChoice::A);
        assert!(matches!(
            parse_letter("z").unwrap_err(),
            StorageError::Serialization(_)
        ));
    }
}
