use chrono::{DateTime, Utc};
use lms_core::model::{CourseId, Enrollment, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{course_id_from_i64, id_i64, map_enrollment_row, ser, user_id_from_i64};
use crate::repository::{EnrollmentChange, EnrollmentRepository, StorageError};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn activate(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> Result<(EnrollmentChange, Enrollment), StorageError> {
        let student_id = id_i64("student_id", student.value())?;
        let course_id = id_i64("course_id", course.value())?;

        // The existence check, the insert/reactivate, and the lazy progress
        // row all commit together or not at all.
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let existing = sqlx::query(
            r"
            SELECT is_active FROM enrollments
            WHERE student_id = ?1 AND course_id = ?2
            ",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(conn)?;

        let change = match existing {
            Some(row) => {
                let is_active: i64 = row.try_get("is_active").map_err(ser)?;
                if is_active != 0 {
                    return Err(StorageError::Conflict);
                }
                sqlx::query(
                    r"
                    UPDATE enrollments SET is_active = 1, unenrolled_at = NULL
                    WHERE student_id = ?1 AND course_id = ?2
                    ",
                )
                .bind(student_id)
                .bind(course_id)
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
                EnrollmentChange::Reactivated
            }
            None => {
                sqlx::query(
                    r"
                    INSERT INTO enrollments (student_id, course_id, is_active, enrolled_at, unenrolled_at)
                    VALUES (?1, ?2, 1, ?3, NULL)
                    ",
                )
                .bind(student_id)
                .bind(course_id)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
                EnrollmentChange::Created
            }
        };

        sqlx::query(
            r"
            INSERT INTO course_progress (student_id, course_id, progress_percentage, last_lesson_id)
            VALUES (?1, ?2, 0, NULL)
            ON CONFLICT (student_id, course_id) DO NOTHING
            ",
        )
        .bind(student_id)
        .bind(course_id)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        let row = sqlx::query(
            r"
            SELECT student_id, course_id, is_active, enrolled_at, unenrolled_at
            FROM enrollments
            WHERE student_id = ?1 AND course_id = ?2
            ",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(conn)?;
        let enrollment = map_enrollment_row(&row)?;

        tx.commit().await.map_err(conn)?;
        Ok((change, enrollment))
    }

    async fn deactivate(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE enrollments SET is_active = 0, unenrolled_at = ?3
            WHERE student_id = ?1 AND course_id = ?2 AND is_active = 1
            ",
        )
        .bind(id_i64("student_id", student.value())?)
        .bind(id_i64("course_id", course.value())?)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn is_active(&self, student: UserId, course: CourseId) -> Result<bool, StorageError> {
        let row = sqlx::query(
            r"
            SELECT 1 FROM enrollments
            WHERE student_id = ?1 AND course_id = ?2 AND is_active = 1
            ",
        )
        .bind(id_i64("student_id", student.value())?)
        .bind(id_i64("course_id", course.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        Ok(row.is_some())
    }

    async fn get(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT student_id, course_id, is_active, enrolled_at, unenrolled_at
            FROM enrollments
            WHERE student_id = ?1 AND course_id = ?2
            ",
        )
        .bind(id_i64("student_id", student.value())?)
        .bind(id_i64("course_id", course.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => map_enrollment_row(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn active_courses_for_student(
        &self,
        student: UserId,
    ) -> Result<Vec<CourseId>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT course_id FROM enrollments
            WHERE student_id = ?1 AND is_active = 1
            ORDER BY course_id ASC
            ",
        )
        .bind(id_i64("student_id", student.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(course_id_from_i64(
                row.try_get::<i64, _>("course_id").map_err(ser)?,
            )?);
        }
        Ok(out)
    }

    async fn active_students_for_course(
        &self,
        course: CourseId,
    ) -> Result<Vec<UserId>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT student_id FROM enrollments
            WHERE course_id = ?1 AND is_active = 1
            ORDER BY student_id ASC
            ",
        )
        .bind(id_i64("course_id", course.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(user_id_from_i64(
                row.try_get::<i64, _>("student_id").map_err(ser)?,
            )?);
        }
        Ok(out)
    }
}
