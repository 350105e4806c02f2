// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

/// One selectable option of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    /// Stable option identifier submitted by the client (e.g. "A").
    pub id: String,
    pub text: String,
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    pub certification_id: i64,

    /// The text content of the question.
    pub content: String,

    /// Stored as a JSON array in the database.
    pub options: Json<Vec<QuestionOption>>,

    /// Option ids that together form the correct answer.
    /// A single entry means single choice, several mean multi-select.
    pub correct_answers: Json<Vec<String>>,

    /// Topic category used for per-domain scoring.
    pub domain: String,
}

/// DTO for sending a question to the client (excludes the correct answers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub content: String,
    pub options: Vec<QuestionOption>,
    pub domain: String,
    pub multiple: bool,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            content: q.content.clone(),
            options: q.options.0.clone(),
            domain: q.domain.clone(),
            multiple: q.correct_answers.0.len() > 1,
        }
    }
}

/// Weighted topic category of a certification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainWeight {
    pub name: String,
    pub weight: f64,
}

/// Represents the 'certifications' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Certification {
    pub id: i64,
    pub name: String,

    /// Inclusive pass mark on the 0-100 scale.
    pub passing_score: f64,

    /// `None` means the exam is untimed.
    pub time_limit_seconds: Option<i64>,

    /// Number of questions drawn per attempt. `None` delivers the whole bank.
    pub question_count: Option<i64>,

    pub domains: Json<Vec<DomainWeight>>,
}
