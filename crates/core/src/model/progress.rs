use chrono::{DateTime, Utc};

use crate::model::ids::{CourseId, LessonId, UserId};

//
// ─── PERCENTAGE ────────────────────────────────────────────────────────────────
//

/// Derives a course completion percentage from completion counts.
///
/// Returns `100 × completed / total`, rounded to one decimal place, and `0.0`
/// when the course has no active lessons. This is the sole definition of
/// course progress; everything else stores or displays its result.
#[must_use]
pub fn completion_percentage(completed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let raw = (completed as f64 / total as f64) * 100.0;
    round_one_decimal(raw)
}

/// Rounds to one decimal place.
#[must_use]
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

//
// ─── LESSON PROGRESS ───────────────────────────────────────────────────────────
//

/// Per-student completion state for one lesson.
///
/// Completion is idempotent: once completed, repeat calls only accumulate
/// time spent and never reset `completed_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonProgress {
    student: UserId,
    lesson: LessonId,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
    time_spent_secs: u64,
}

impl LessonProgress {
    /// Creates an untouched progress row.
    #[must_use]
    pub fn new(student: UserId, lesson: LessonId) -> Self {
        Self {
            student,
            lesson,
            completed: false,
            completed_at: None,
            time_spent_secs: 0,
        }
    }

    /// Rebuilds a progress row from persisted state.
    #[must_use]
    pub fn from_persisted(
        student: UserId,
        lesson: LessonId,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
        time_spent_secs: u64,
    ) -> Self {
        Self {
            student,
            lesson,
            completed,
            completed_at,
            time_spent_secs,
        }
    }

    // Accessors
    #[must_use]
    pub fn student(&self) -> UserId {
        self.student
    }

    #[must_use]
    pub fn lesson(&self) -> LessonId {
        self.lesson
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn time_spent_secs(&self) -> u64 {
        self.time_spent_secs
    }

    /// Records a completion event.
    ///
    /// First completion sets the flag and timestamp; every call adds
    /// `time_spent_delta` to the cumulative counter. Returns true if this
    /// call transitioned the row to completed.
    pub fn mark_completed(&mut self, now: DateTime<Utc>, time_spent_delta: u64) -> bool {
        self.time_spent_secs = self.time_spent_secs.saturating_add(time_spent_delta);
        if self.completed {
            return false;
        }
        self.completed = true;
        self.completed_at = Some(now);
        true
    }
}

//
// ─── COURSE PROGRESS ───────────────────────────────────────────────────────────
//

/// Aggregated course-level progress for one student.
///
/// `progress_percentage` is derived state; it is only ever written by the
/// recalculation path, never updated incrementally.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseProgress {
    student: UserId,
    course: CourseId,
    progress_percentage: f64,
    last_lesson: Option<LessonId>,
}

impl CourseProgress {
    /// Creates a zero-percent progress row (lazily, on first enrollment or
    /// first completion event).
    #[must_use]
    pub fn new(student: UserId, course: CourseId) -> Self {
        Self {
            student,
            course,
            progress_percentage: 0.0,
            last_lesson: None,
        }
    }

    /// Rebuilds a progress row from persisted state.
    #[must_use]
    pub fn from_persisted(
        student: UserId,
        course: CourseId,
        progress_percentage: f64,
        last_lesson: Option<LessonId>,
    ) -> Self {
        Self {
            student,
            course,
            progress_percentage,
            last_lesson,
        }
    }

    // Accessors
    #[must_use]
    pub fn student(&self) -> UserId {
        self.student
    }

    #[must_use]
    pub fn course(&self) -> CourseId {
        self.course
    }

    #[must_use]
    pub fn progress_percentage(&self) -> f64 {
        self.progress_percentage
    }

    #[must_use]
    pub fn last_lesson(&self) -> Option<LessonId> {
        self.last_lesson
    }

    /// Recomputes the stored percentage from completion counts.
    ///
    /// Safe to call repeatedly; the result depends only on the inputs.
    pub fn recalculate(&mut self, completed: u64, total: u64) {
        self.progress_percentage = completion_percentage(completed, total);
    }

    /// Records the most recently completed lesson.
    pub fn set_last_lesson(&mut self, lesson: LessonId) {
        self.last_lesson = Some(lesson);
    }

    /// Clears the last-lesson reference (set-null on lesson deletion).
    pub fn clear_last_lesson(&mut self) {
        self.last_lesson = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn percentage_of_empty_course_is_zero() {
        assert_eq!(completion_percentage(0, 0), 0.0);
        assert_eq!(completion_percentage(5, 0), 0.0);
    }

    #[test]
    fn percentage_rounds_to_one_decimal() {
        assert_eq!(completion_percentage(1, 3), 33.3);
        assert_eq!(completion_percentage(2, 3), 66.7);
        assert_eq!(completion_percentage(1, 2), 50.0);
        assert_eq!(completion_percentage(2, 2), 100.0);
    }

    #[test]
    fn first_completion_sets_flag_and_timestamp() {
        let mut lp = LessonProgress::new(UserId::new(1), LessonId::new(2));
        let transitioned = lp.mark_completed(fixed_now(), 120);
        assert!(transitioned);
        assert!(lp.completed());
        assert_eq!(lp.completed_at(), Some(fixed_now()));
        assert_eq!(lp.time_spent_secs(), 120);
    }

    #[test]
    fn repeat_completion_is_idempotent_but_additive_on_time() {
        let mut lp = LessonProgress::new(UserId::new(1), LessonId::new(2));
        lp.mark_completed(fixed_now(), 120);

        let later = fixed_now() + Duration::minutes(30);
        let transitioned = lp.mark_completed(later, 60);
        assert!(!transitioned);
        assert_eq!(lp.completed_at(), Some(fixed_now()));
        assert_eq!(lp.time_spent_secs(), 180);
    }

    #[test]
    fn time_spent_saturates_instead_of_overflowing() {
        let mut lp =
            LessonProgress::from_persisted(UserId::new(1), LessonId::new(2), true, None, u64::MAX);
        lp.mark_completed(fixed_now(), 10);
        assert_eq!(lp.time_spent_secs(), u64::MAX);
    }

    #[test]
    fn new_course_progress_is_zero_percent() {
        let cp = CourseProgress::new(UserId::new(1), CourseId::new(2));
        assert_eq!(cp.progress_percentage(), 0.0);
        assert_eq!(cp.last_lesson(), None);
    }

    #[test]
    fn recalculate_is_idempotent() {
        let mut cp = CourseProgress::new(UserId::new(1), CourseId::new(2));
        cp.recalculate(1, 2);
        cp.recalculate(1, 2);
        assert_eq!(cp.progress_percentage(), 50.0);
    }

    #[test]
    fn last_lesson_tracks_and_clears() {
        let mut cp = CourseProgress::new(UserId::new(1), CourseId::new(2));
        cp.set_last_lesson(LessonId::new(7));
        assert_eq!(cp.last_lesson(), Some(LessonId::new(7)));
        cp.clear_last_lesson();
        assert_eq!(cp.last_lesson(), None);
    }
}
