use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, QuestionId, QuizId, UserId};
use crate::model::progress::round_one_decimal;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("quiz title cannot be empty")]
    EmptyTitle,

    #[error("passing score must be between 0 and 100")]
    InvalidPassingScore,

    #[error("question text cannot be empty")]
    EmptyQuestionText,

    #[error("question sequence number must be >= 1")]
    InvalidSequenceNumber,

    #[error("invalid answer letter: {0}")]
    InvalidAnswerLetter(String),

    #[error("correct answer refers to an option the question does not have")]
    MissingCorrectOption,
}

//
// ─── ANSWER CHOICE ─────────────────────────────────────────────────────────────
//

/// One of the four multiple-choice option letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerChoice {
    A,
    B,
    C,
    D,
}

impl AnswerChoice {
    /// Parses a single-letter answer, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::InvalidAnswerLetter` for anything other than
    /// a/b/c/d in either case.
    pub fn parse(s: &str) -> Result<Self, QuizError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(Self::A),
            "b" => Ok(Self::B),
            "c" => Ok(Self::C),
            "d" => Ok(Self::D),
            other => Err(QuizError::InvalidAnswerLetter(other.to_owned())),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
            Self::C => "c",
            Self::D => "d",
        }
    }
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

/// A quiz attached to a course.
///
/// Only published quizzes accept submissions. `max_attempts` of zero means
/// unlimited; `duration_minutes` of zero means untimed.
#[derive(Debug, Clone, PartialEq)]
pub struct Quiz {
    id: QuizId,
    course_id: CourseId,
    title: String,
    description: Option<String>,
    duration_minutes: u32,
    passing_score: u32,
    is_published: bool,
    max_attempts: u32,
    created_at: DateTime<Utc>,
}

impl Quiz {
    /// Creates a new unpublished quiz.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::EmptyTitle` for a blank title and
    /// `QuizError::InvalidPassingScore` when the passing score exceeds 100.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: QuizId,
        course_id: CourseId,
        title: impl Into<String>,
        description: Option<String>,
        duration_minutes: u32,
        passing_score: u32,
        max_attempts: u32,
        created_at: DateTime<Utc>,
    ) -> Result<Self, QuizError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(QuizError::EmptyTitle);
        }
        if passing_score > 100 {
            return Err(QuizError::InvalidPassingScore);
        }

        let description = description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        Ok(Self {
            id,
            course_id,
            title: title.trim().to_owned(),
            description,
            duration_minutes,
            passing_score,
            is_published: false,
            max_attempts,
            created_at,
        })
    }

    /// Rebuilds a quiz from persisted state.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: QuizId,
        course_id: CourseId,
        title: String,
        description: Option<String>,
        duration_minutes: u32,
        passing_score: u32,
        is_published: bool,
        max_attempts: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            course_id,
            title,
            description,
            duration_minutes,
            passing_score,
            is_published,
            max_attempts,
            created_at,
        }
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> QuizId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    #[must_use]
    pub fn passing_score(&self) -> u32 {
        self.passing_score
    }

    #[must_use]
    pub fn is_published(&self) -> bool {
        self.is_published
    }

    /// Maximum graded attempts per student. Zero means unlimited.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Makes the quiz visible and submittable.
    pub fn publish(&mut self) {
        self.is_published = true;
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A multiple-choice question within a quiz.
///
/// Options c and d are optional; a and b are always present.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizQuestion {
    id: QuestionId,
    quiz_id: QuizId,
    text: String,
    option_a: String,
    option_b: String,
    option_c: Option<String>,
    option_d: Option<String>,
    correct_answer: AnswerChoice,
    sequence_number: u32,
    explanation: Option<String>,
}

impl QuizQuestion {
    /// Creates a new question.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::EmptyQuestionText` for blank text,
    /// `QuizError::InvalidSequenceNumber` for a zero sequence number, and
    /// `QuizError::MissingCorrectOption` when the correct answer points at an
    /// option the question does not define.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: QuestionId,
        quiz_id: QuizId,
        text: impl Into<String>,
        option_a: impl Into<String>,
        option_b: impl Into<String>,
        option_c: Option<String>,
        option_d: Option<String>,
        correct_answer: AnswerChoice,
        sequence_number: u32,
        explanation: Option<String>,
    ) -> Result<Self, QuizError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuizError::EmptyQuestionText);
        }
        if sequence_number == 0 {
            return Err(QuizError::InvalidSequenceNumber);
        }

        let option_c = option_c.filter(|o| !o.trim().is_empty());
        let option_d = option_d.filter(|o| !o.trim().is_empty());

        let has_option = match correct_answer {
            AnswerChoice::A | AnswerChoice::B => true,
            AnswerChoice::C => option_c.is_some(),
            AnswerChoice::D => option_d.is_some(),
        };
        if !has_option {
            return Err(QuizError::MissingCorrectOption);
        }

        Ok(Self {
            id,
            quiz_id,
            text: text.trim().to_owned(),
            option_a: option_a.into(),
            option_b: option_b.into(),
            option_c,
            option_d,
            correct_answer,
            sequence_number,
            explanation,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        self.quiz_id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn option_a(&self) -> &str {
        &self.option_a
    }

    #[must_use]
    pub fn option_b(&self) -> &str {
        &self.option_b
    }

    #[must_use]
    pub fn option_c(&self) -> Option<&str> {
        self.option_c.as_deref()
    }

    #[must_use]
    pub fn option_d(&self) -> Option<&str> {
        self.option_d.as_deref()
    }

    #[must_use]
    pub fn correct_answer(&self) -> AnswerChoice {
        self.correct_answer
    }

    #[must_use]
    pub fn sequence_number(&self) -> u32 {
        self.sequence_number
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    /// Option letters and texts, without revealing the correct answer.
    #[must_use]
    pub fn options(&self) -> Vec<(AnswerChoice, &str)> {
        let mut opts = vec![
            (AnswerChoice::A, self.option_a.as_str()),
            (AnswerChoice::B, self.option_b.as_str()),
        ];
        if let Some(c) = self.option_c.as_deref() {
            opts.push((AnswerChoice::C, c));
        }
        if let Some(d) = self.option_d.as_deref() {
            opts.push((AnswerChoice::D, d));
        }
        opts
    }
}

//
// ─── GRADING ───────────────────────────────────────────────────────────────────
//

/// A map of submitted answers, keyed by question ID. Values are the raw
/// submitted strings; grading parses them leniently.
pub type AnswerMap = BTreeMap<QuestionId, String>;

/// Result of grading one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradedSubmission {
    pub score: u32,
    pub total: u32,
}

/// Grades a submission against a quiz's questions.
///
/// Deterministic and stateless: each question is compared against the
/// submitted letter case-insensitively. Missing answers, unknown question
/// ids, and unparseable letters all score as incorrect — grading never
/// fails on bad input.
#[must_use]
pub fn grade(questions: &[QuizQuestion], answers: &AnswerMap) -> GradedSubmission {
    let mut score: u32 = 0;
    for question in questions {
        let Some(submitted) = answers.get(&question.id()) else {
            continue;
        };
        if let Ok(choice) = AnswerChoice::parse(submitted)
            && choice == question.correct_answer()
        {
            score += 1;
        }
    }
    #[allow(clippy::cast_possible_truncation)]
    let total = questions.len() as u32;
    GradedSubmission { score, total }
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// Immutable record of one graded quiz submission.
///
/// Attempts are append-only; each submission creates a new record and prior
/// records are never mutated. Percentage and pass state are derived on read.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizAttempt {
    student: UserId,
    quiz: QuizId,
    score: u32,
    total_questions: u32,
    answers: AnswerMap,
    time_taken_secs: u64,
    completed_at: DateTime<Utc>,
}

impl QuizAttempt {
    #[must_use]
    pub fn new(
        student: UserId,
        quiz: QuizId,
        graded: GradedSubmission,
        answers: AnswerMap,
        time_taken_secs: u64,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            student,
            quiz,
            score: graded.score,
            total_questions: graded.total,
            answers,
            time_taken_secs,
            completed_at,
        }
    }

    /// Rebuilds an attempt from persisted state.
    #[must_use]
    pub fn from_persisted(
        student: UserId,
        quiz: QuizId,
        score: u32,
        total_questions: u32,
        answers: AnswerMap,
        time_taken_secs: u64,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            student,
            quiz,
            score,
            total_questions,
            answers,
            time_taken_secs,
            completed_at,
        }
    }

    // Accessors
    #[must_use]
    pub fn student(&self) -> UserId {
        self.student
    }

    #[must_use]
    pub fn quiz(&self) -> QuizId {
        self.quiz
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    #[must_use]
    pub fn time_taken_secs(&self) -> u64 {
        self.time_taken_secs
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Score as a percentage, rounded to one decimal. Zero when the quiz had
    /// no questions.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total_questions == 0 {
            return 0.0;
        }
        round_one_decimal(f64::from(self.score) / f64::from(self.total_questions) * 100.0)
    }

    /// True when the attempt's percentage meets the quiz's passing score.
    #[must_use]
    pub fn passed(&self, passing_score: u32) -> bool {
        self.percentage() >= f64::from(passing_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn question(id: u64, correct: AnswerChoice) -> QuizQuestion {
        QuizQuestion::new(
            QuestionId::new(id),
            QuizId::new(1),
            format!("Question {id}"),
            "first",
            "second",
            Some("third".into()),
            Some("fourth".into()),
            correct,
            u32::try_from(id).unwrap(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn quiz_rejects_empty_title() {
        let err = Quiz::new(
            QuizId::new(1),
            CourseId::new(1),
            " ",
            None,
            30,
            60,
            0,
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, QuizError::EmptyTitle);
    }

    #[test]
    fn quiz_rejects_passing_score_over_100() {
        let err = Quiz::new(
            QuizId::new(1),
            CourseId::new(1),
            "Final",
            None,
            30,
            101,
            0,
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, QuizError::InvalidPassingScore);
    }

    #[test]
    fn question_rejects_correct_answer_without_option() {
        let err = QuizQuestion::new(
            QuestionId::new(1),
            QuizId::new(1),
            "Pick one",
            "first",
            "second",
            None,
            None,
            AnswerChoice::C,
            1,
            None,
        )
        .unwrap_err();
        assert_eq!(err, QuizError::MissingCorrectOption);
    }

    #[test]
    fn answer_choice_parses_case_insensitively() {
        assert_eq!(AnswerChoice::parse("a").unwrap(), AnswerChoice::A);
        assert_eq!(AnswerChoice::parse("B").unwrap(), AnswerChoice::B);
        assert_eq!(AnswerChoice::parse(" c ").unwrap(), AnswerChoice::C);
        assert!(AnswerChoice::parse("e").is_err());
        assert!(AnswerChoice::parse("ab").is_err());
    }

    #[test]
    fn grading_is_deterministic() {
        let questions = vec![question(1, AnswerChoice::A), question(2, AnswerChoice::B)];
        let mut answers = AnswerMap::new();
        answers.insert(QuestionId::new(1), "a".into());
        answers.insert(QuestionId::new(2), "c".into());

        let graded = grade(&questions, &answers);
        assert_eq!(graded.score, 1);
        assert_eq!(graded.total, 2);
    }

    #[test]
    fn grading_accepts_uppercase_letters() {
        let questions = vec![question(1, AnswerChoice::A)];
        let mut answers = AnswerMap::new();
        answers.insert(QuestionId::new(1), "A".into());
        assert_eq!(grade(&questions, &answers).score, 1);
    }

    #[test]
    fn unanswered_and_unknown_questions_score_zero_without_error() {
        let questions = vec![question(1, AnswerChoice::A), question(2, AnswerChoice::B)];
        let mut answers = AnswerMap::new();
        answers.insert(QuestionId::new(99), "a".into());
        answers.insert(QuestionId::new(2), "not-a-letter".into());

        let graded = grade(&questions, &answers);
        assert_eq!(graded.score, 0);
        assert_eq!(graded.total, 2);
    }

    #[test]
    fn empty_quiz_grades_to_zero_total() {
        let graded = grade(&[], &AnswerMap::new());
        assert_eq!(graded.score, 0);
        assert_eq!(graded.total, 0);
    }

    #[test]
    fn attempt_percentage_and_pass() {
        let attempt = QuizAttempt::from_persisted(
            UserId::new(1),
            QuizId::new(1),
            1,
            2,
            AnswerMap::new(),
            45,
            fixed_now(),
        );
        assert_eq!(attempt.percentage(), 50.0);
        assert!(attempt.passed(50));
        assert!(!attempt.passed(60));
    }

    #[test]
    fn empty_attempt_percentage_is_zero() {
        let attempt = QuizAttempt::from_persisted(
            UserId::new(1),
            QuizId::new(1),
            0,
            0,
            AnswerMap::new(),
            0,
            fixed_now(),
        );
        assert_eq!(attempt.percentage(), 0.0);
        assert!(!attempt.passed(60));
        assert!(attempt.passed(0));
    }

    #[test]
    fn thirds_round_to_one_decimal() {
        let attempt = QuizAttempt::from_persisted(
            UserId::new(1),
            QuizId::new(1),
            2,
            3,
            AnswerMap::new(),
            0,
            fixed_now(),
        );
        assert_eq!(attempt.percentage(), 66.7);
    }
}
