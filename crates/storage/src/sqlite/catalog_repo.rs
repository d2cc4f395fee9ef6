use lms_core::model::{Course, CourseId, Lesson, LessonId, UserId};

use super::SqliteRepository;
use super::mapping::{
    course_id_from_i64, id_i64, lesson_id_from_i64, map_course_row, map_lesson_row, ser,
};
use crate::repository::{CatalogRepository, NewCourseRecord, NewLessonRecord, StorageError};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait::async_trait]
impl CatalogRepository for SqliteRepository {
    async fn insert_course(&self, course: NewCourseRecord) -> Result<CourseId, StorageError> {
        let teacher = id_i64("teacher_id", course.teacher.value())?;

        let res = sqlx::query(
            r"
            INSERT INTO courses (teacher_id, title, description, is_published, is_free, price_cents, lifecycle, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7)
            ",
        )
        .bind(teacher)
        .bind(course.title)
        .bind(course.description)
        .bind(i64::from(course.is_published))
        .bind(i64::from(course.is_free))
        .bind(i64::from(course.price_cents))
        .bind(course.created_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        course_id_from_i64(res.last_insert_rowid())
    }

    async fn update_course(&self, course: &Course) -> Result<(), StorageError> {
        let id = id_i64("course_id", course.id().value())?;

        let res = sqlx::query(
            r"
            UPDATE courses SET
                title = ?2,
                description = ?3,
                is_published = ?4,
                is_free = ?5,
                price_cents = ?6,
                lifecycle = ?7
            WHERE id = ?1
            ",
        )
        .bind(id)
        .bind(course.title().to_owned())
        .bind(course.description().map(ToOwned::to_owned))
        .bind(i64::from(course.is_published()))
        .bind(i64::from(course.is_free()))
        .bind(i64::from(course.price_cents()))
        .bind(course.lifecycle().as_str())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, teacher_id, title, description, is_published, is_free, price_cents, lifecycle, created_at
            FROM courses WHERE id = ?1
            ",
        )
        .bind(id_i64("course_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => map_course_row(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn list_published_courses(&self, limit: u32) -> Result<Vec<Course>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, teacher_id, title, description, is_published, is_free, price_cents, lifecycle, created_at
            FROM courses
            WHERE is_published = 1 AND lifecycle = 'active'
            ORDER BY id ASC
            LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut courses = Vec::with_capacity(rows.len());
        for row in rows {
            courses.push(map_course_row(&row)?);
        }
        Ok(courses)
    }

    async fn courses_for_teacher(&self, teacher: UserId) -> Result<Vec<Course>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, teacher_id, title, description, is_published, is_free, price_cents, lifecycle, created_at
            FROM courses
            WHERE teacher_id = ?1 AND lifecycle = 'active'
            ORDER BY id ASC
            ",
        )
        .bind(id_i64("teacher_id", teacher.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut courses = Vec::with_capacity(rows.len());
        for row in rows {
            courses.push(map_course_row(&row)?);
        }
        Ok(courses)
    }

    async fn insert_lesson(&self, lesson: NewLessonRecord) -> Result<LessonId, StorageError> {
        let course_id = id_i64("course_id", lesson.course_id.value())?;

        let res = sqlx::query(
            r"
            INSERT INTO lessons (course_id, title, sequence_number, duration_minutes, lifecycle, created_at)
            VALUES (?1, ?2, ?3, ?4, 'active', ?5)
            ",
        )
        .bind(course_id)
        .bind(lesson.title)
        .bind(i64::from(lesson.sequence_number))
        .bind(i64::from(lesson.duration_minutes))
        .bind(lesson.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::Conflict
            } else {
                conn(e)
            }
        })?;

        lesson_id_from_i64(res.last_insert_rowid())
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, course_id, title, sequence_number, duration_minutes, lifecycle, created_at
            FROM lessons WHERE id = ?1
            ",
        )
        .bind(id_i64("lesson_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => map_lesson_row(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn lessons_for_course(&self, course: CourseId) -> Result<Vec<Lesson>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, course_id, title, sequence_number, duration_minutes, lifecycle, created_at
            FROM lessons
            WHERE course_id = ?1 AND lifecycle = 'active'
            ORDER BY sequence_number ASC
            ",
        )
        .bind(id_i64("course_id", course.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut lessons = Vec::with_capacity(rows.len());
        for row in rows {
            lessons.push(map_lesson_row(&row)?);
        }
        Ok(lessons)
    }

    async fn count_active_lessons(&self, course: CourseId) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM lessons
            WHERE course_id = ?1 AND lifecycle = 'active'
            ",
        )
        .bind(id_i64("course_id", course.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        u64::try_from(count).map_err(ser)
    }

    async fn soft_delete_lesson(&self, id: LessonId) -> Result<(), StorageError> {
        let lesson_id = id_i64("lesson_id", id.value())?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query("UPDATE lessons SET lifecycle = 'deleted' WHERE id = ?1")
            .bind(lesson_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        // weak reference: deleting a lesson nulls it out of course_progress
        sqlx::query("UPDATE course_progress SET last_lesson_id = NULL WHERE last_lesson_id = ?1")
            .bind(lesson_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
