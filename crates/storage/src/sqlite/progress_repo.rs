use chrono::{DateTime, Utc};
use lms_core::model::{
    CourseId, CourseProgress, LessonId, LessonProgress, UserId, completion_percentage,
};
use sqlx::{Sqlite, Transaction};

use super::SqliteRepository;
use super::mapping::{id_i64, map_course_progress_row, map_lesson_progress_row, ser};
use crate::repository::{CompletionOutcome, ProgressRepository, StorageError};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Recomputes the derived percentage inside an open transaction.
///
/// Counts only active lessons, on both sides of the ratio, so soft-deleted
/// lessons neither inflate nor deflate progress.
async fn recalculate_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    student_id: i64,
    course_id: i64,
    last_lesson_id: Option<i64>,
) -> Result<(), StorageError> {
    let total: i64 = sqlx::query_scalar(
        r"
        SELECT COUNT(*) FROM lessons
        WHERE course_id = ?1 AND lifecycle = 'active'
        ",
    )
    .bind(course_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(conn)?;

    let completed: i64 = sqlx::query_scalar(
        r"
        SELECT COUNT(*)
        FROM lesson_progress lp
        JOIN lessons l ON l.id = lp.lesson_id
        WHERE lp.student_id = ?1
          AND l.course_id = ?2
          AND l.lifecycle = 'active'
          AND lp.completed = 1
        ",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(conn)?;

    let percentage = completion_percentage(
        u64::try_from(completed).map_err(ser)?,
        u64::try_from(total).map_err(ser)?,
    );

    match last_lesson_id {
        Some(lesson_id) => {
            sqlx::query(
                r"
                INSERT INTO course_progress (student_id, course_id, progress_percentage, last_lesson_id)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT (student_id, course_id) DO UPDATE SET
                    progress_percentage = excluded.progress_percentage,
                    last_lesson_id = excluded.last_lesson_id
                ",
            )
            .bind(student_id)
            .bind(course_id)
            .bind(percentage)
            .bind(lesson_id)
            .execute(&mut **tx)
            .await
            .map_err(conn)?;
        }
        None => {
            // plain recalculation keeps the existing last_lesson reference
            sqlx::query(
                r"
                INSERT INTO course_progress (student_id, course_id, progress_percentage, last_lesson_id)
                VALUES (?1, ?2, ?3, NULL)
                ON CONFLICT (student_id, course_id) DO UPDATE SET
                    progress_percentage = excluded.progress_percentage
                ",
            )
            .bind(student_id)
            .bind(course_id)
            .bind(percentage)
            .execute(&mut **tx)
            .await
            .map_err(conn)?;
        }
    }

    Ok(())
}

async fn fetch_course_progress_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    student_id: i64,
    course_id: i64,
) -> Result<CourseProgress, StorageError> {
    let row = sqlx::query(
        r"
        SELECT student_id, course_id, progress_percentage, last_lesson_id
        FROM course_progress
        WHERE student_id = ?1 AND course_id = ?2
        ",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(conn)?;
    map_course_progress_row(&row)
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn complete_lesson(
        &self,
        student: UserId,
        lesson: LessonId,
        course: CourseId,
        time_spent_delta: u64,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, StorageError> {
        let student_id = id_i64("student_id", student.value())?;
        let lesson_id = id_i64("lesson_id", lesson.value())?;
        let course_id = id_i64("course_id", course.value())?;
        let delta = i64::try_from(time_spent_delta)
            .map_err(|_| StorageError::Serialization("time_spent_delta overflow".into()))?;

        // Completion upsert and the aggregate recompute share one
        // transaction so concurrent completions cannot race on the
        // percentage.
        let mut tx = self.pool.begin().await.map_err(conn)?;

        // Idempotent on completion: completed_at keeps its first value,
        // time_spent accumulates on every call.
        sqlx::query(
            r"
            INSERT INTO lesson_progress (student_id, lesson_id, completed, completed_at, time_spent_secs)
            VALUES (?1, ?2, 1, ?3, ?4)
            ON CONFLICT (student_id, lesson_id) DO UPDATE SET
                completed = 1,
                completed_at = COALESCE(lesson_progress.completed_at, excluded.completed_at),
                time_spent_secs = lesson_progress.time_spent_secs + excluded.time_spent_secs
            ",
        )
        .bind(student_id)
        .bind(lesson_id)
        .bind(now)
        .bind(delta)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        recalculate_in_tx(&mut tx, student_id, course_id, Some(lesson_id)).await?;

        let lp_row = sqlx::query(
            r"
            SELECT student_id, lesson_id, completed, completed_at, time_spent_secs
            FROM lesson_progress
            WHERE student_id = ?1 AND lesson_id = ?2
            ",
        )
        .bind(student_id)
        .bind(lesson_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(conn)?;
        let lesson_progress = map_lesson_progress_row(&lp_row)?;

        let course_progress = fetch_course_progress_in_tx(&mut tx, student_id, course_id).await?;

        tx.commit().await.map_err(conn)?;

        Ok(CompletionOutcome {
            lesson_progress,
            course_progress,
        })
    }

    async fn recalculate(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<CourseProgress, StorageError> {
        let student_id = id_i64("student_id", student.value())?;
        let course_id = id_i64("course_id", course.value())?;

        let mut tx = self.pool.begin().await.map_err(conn)?;
        recalculate_in_tx(&mut tx, student_id, course_id, None).await?;
        let course_progress = fetch_course_progress_in_tx(&mut tx, student_id, course_id).await?;
        tx.commit().await.map_err(conn)?;

        Ok(course_progress)
    }

    async fn course_progress(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT student_id, course_id, progress_percentage, last_lesson_id
            FROM course_progress
            WHERE student_id = ?1 AND course_id = ?2
            ",
        )
        .bind(id_i64("student_id", student.value())?)
        .bind(id_i64("course_id", course.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => map_course_progress_row(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn lesson_progress_for_course(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Vec<LessonProgress>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT lp.student_id, lp.lesson_id, lp.completed, lp.completed_at, lp.time_spent_secs
            FROM lesson_progress lp
            JOIN lessons l ON l.id = lp.lesson_id
            WHERE lp.student_id = ?1 AND l.course_id = ?2 AND l.lifecycle = 'active'
            ORDER BY l.sequence_number ASC
            ",
        )
        .bind(id_i64("student_id", student.value())?)
        .bind(id_i64("course_id", course.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_lesson_progress_row(&row)?);
        }
        Ok(out)
    }

    async fn completed_lesson_count(&self, student: UserId) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM lesson_progress
            WHERE student_id = ?1 AND completed = 1
            ",
        )
        .bind(id_i64("student_id", student.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        u64::try_from(count).map_err(ser)
    }

    async fn total_time_spent(&self, student: UserId) -> Result<u64, StorageError> {
        let total: i64 = sqlx::query_scalar(
            r"
            SELECT COALESCE(SUM(time_spent_secs), 0) FROM lesson_progress
            WHERE student_id = ?1
            ",
        )
        .bind(id_i64("student_id", student.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        u64::try_from(total).map_err(ser)
    }

    async fn average_progress_for_course(
        &self,
        course: CourseId,
    ) -> Result<Option<f64>, StorageError> {
        let mean: Option<f64> = sqlx::query_scalar(
            r"
            SELECT AVG(progress_percentage) FROM course_progress
            WHERE course_id = ?1
            ",
        )
        .bind(id_i64("course_id", course.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        Ok(mean)
    }
}
