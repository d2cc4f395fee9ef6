use lms_core::model::{Quiz, QuizAttempt, QuizId, QuizQuestion, QuestionId, CourseId, UserId};

use super::SqliteRepository;
use super::mapping::{
    answers_to_json, id_i64, map_attempt_row, map_question_row, map_quiz_row, question_id_from_i64,
    quiz_id_from_i64,
};
use crate::repository::{NewQuestionRecord, NewQuizRecord, QuizRepository, StorageError};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait::async_trait]
impl QuizRepository for SqliteRepository {
    async fn insert_quiz(&self, quiz: NewQuizRecord) -> Result<QuizId, StorageError> {
        let course_id = id_i64("course_id", quiz.course_id.value())?;

        let res = sqlx::query(
            r"
            INSERT INTO quizzes (course_id, title, description, duration_minutes, passing_score, is_published, max_attempts, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(course_id)
        .bind(quiz.title)
        .bind(quiz.description)
        .bind(i64::from(quiz.duration_minutes))
        .bind(i64::from(quiz.passing_score))
        .bind(i64::from(quiz.is_published))
        .bind(i64::from(quiz.max_attempts))
        .bind(quiz.created_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        quiz_id_from_i64(res.last_insert_rowid())
    }

    async fn update_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE quizzes SET
                title = ?2,
                description = ?3,
                duration_minutes = ?4,
                passing_score = ?5,
                is_published = ?6,
                max_attempts = ?7
            WHERE id = ?1
            ",
        )
        .bind(id_i64("quiz_id", quiz.id().value())?)
        .bind(quiz.title().to_owned())
        .bind(quiz.description().map(ToOwned::to_owned))
        .bind(i64::from(quiz.duration_minutes()))
        .bind(i64::from(quiz.passing_score()))
        .bind(i64::from(quiz.is_published()))
        .bind(i64::from(quiz.max_attempts()))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, course_id, title, description, duration_minutes, passing_score, is_published, max_attempts, created_at
            FROM quizzes WHERE id = ?1
            ",
        )
        .bind(id_i64("quiz_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => map_quiz_row(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn quizzes_for_course(
        &self,
        course: CourseId,
        published_only: bool,
    ) -> Result<Vec<Quiz>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, course_id, title, description, duration_minutes, passing_score, is_published, max_attempts, created_at
            FROM quizzes
            WHERE course_id = ?1 AND (?2 = 0 OR is_published = 1)
            ORDER BY id DESC
            ",
        )
        .bind(id_i64("course_id", course.value())?)
        .bind(i64::from(published_only))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut quizzes = Vec::with_capacity(rows.len());
        for row in rows {
            quizzes.push(map_quiz_row(&row)?);
        }
        Ok(quizzes)
    }

    async fn insert_question(
        &self,
        question: NewQuestionRecord,
    ) -> Result<QuestionId, StorageError> {
        let quiz_id = id_i64("quiz_id", question.quiz_id.value())?;

        let res = sqlx::query(
            r"
            INSERT INTO quiz_questions (quiz_id, question_text, option_a, option_b, option_c, option_d, correct_answer, sequence_number, explanation)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(quiz_id)
        .bind(question.text)
        .bind(question.option_a)
        .bind(question.option_b)
        .bind(question.option_c)
        .bind(question.option_d)
        .bind(question.correct_answer.as_str())
        .bind(i64::from(question.sequence_number))
        .bind(question.explanation)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::Conflict
            } else {
                conn(e)
            }
        })?;

        question_id_from_i64(res.last_insert_rowid())
    }

    async fn questions_for_quiz(&self, quiz: QuizId) -> Result<Vec<QuizQuestion>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, quiz_id, question_text, option_a, option_b, option_c, option_d, correct_answer, sequence_number, explanation
            FROM quiz_questions
            WHERE quiz_id = ?1
            ORDER BY sequence_number ASC
            ",
        )
        .bind(id_i64("quiz_id", quiz.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            questions.push(map_question_row(&row)?);
        }
        Ok(questions)
    }

    async fn insert_attempt_within_limit(
        &self,
        attempt: &QuizAttempt,
        max_attempts: u32,
    ) -> Result<Option<i64>, StorageError> {
        let quiz_id = id_i64("quiz_id", attempt.quiz().value())?;
        let student_id = id_i64("student_id", attempt.student().value())?;
        let time_taken = i64::try_from(attempt.time_taken_secs())
            .map_err(|_| StorageError::Serialization("time_taken_secs overflow".into()))?;
        let answers = answers_to_json(attempt.answers())?;

        // The quota check rides inside the INSERT itself, so two concurrent
        // submissions cannot both pass a stale count.
        let res = sqlx::query(
            r"
            INSERT INTO quiz_attempts (quiz_id, student_id, score, total_questions, answers, time_taken_secs, completed_at)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
            WHERE ?8 = 0 OR (
                SELECT COUNT(*) FROM quiz_attempts
                WHERE quiz_id = ?1 AND student_id = ?2
            ) < ?8
            ",
        )
        .bind(quiz_id)
        .bind(student_id)
        .bind(i64::from(attempt.score()))
        .bind(i64::from(attempt.total_questions()))
        .bind(answers)
        .bind(time_taken)
        .bind(attempt.completed_at())
        .bind(i64::from(max_attempts))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(res.last_insert_rowid()))
    }

    async fn attempts_for_quiz(
        &self,
        quiz: QuizId,
        student: Option<UserId>,
    ) -> Result<Vec<QuizAttempt>, StorageError> {
        let student_id = student
            .map(|s| id_i64("student_id", s.value()))
            .transpose()?;

        let rows = sqlx::query(
            r"
            SELECT id, quiz_id, student_id, score, total_questions, answers, time_taken_secs, completed_at
            FROM quiz_attempts
            WHERE quiz_id = ?1 AND (?2 IS NULL OR student_id = ?2)
            ORDER BY completed_at DESC, id DESC
            ",
        )
        .bind(id_i64("quiz_id", quiz.value())?)
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut attempts = Vec::with_capacity(rows.len());
        for row in rows {
            attempts.push(map_attempt_row(&row)?);
        }
        Ok(attempts)
    }

    async fn attempt_count(&self, student: UserId, quiz: QuizId) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM quiz_attempts
            WHERE student_id = ?1 AND quiz_id = ?2
            ",
        )
        .bind(id_i64("student_id", student.value())?)
        .bind(id_i64("quiz_id", quiz.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        u64::try_from(count).map_err(super::mapping::ser)
    }

    async fn attempts_for_student(
        &self,
        student: UserId,
    ) -> Result<Vec<QuizAttempt>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, quiz_id, student_id, score, total_questions, answers, time_taken_secs, completed_at
            FROM quiz_attempts
            WHERE student_id = ?1
            ORDER BY completed_at DESC, id DESC
            ",
        )
        .bind(id_i64("student_id", student.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut attempts = Vec::with_capacity(rows.len());
        for row in rows {
            attempts.push(map_attempt_row(&row)?);
        }
        Ok(attempts)
    }
}
