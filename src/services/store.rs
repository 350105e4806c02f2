// src/services/store.rs

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ExamError,
    models::{
        attempt::ExamAttempt,
        question::{Certification, Question},
    },
};

/// Read access to certifications and their question banks.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    async fn get_certification(&self, id: i64) -> Result<Option<Certification>, ExamError>;

    /// All questions of a certification, ordered by id.
    async fn get_questions(&self, certification_id: i64) -> Result<Vec<Question>, ExamError>;
}

/// Durable storage for attempts.
///
/// `save_attempt` is a compare-and-swap on `version`: it fails with
/// `ExamError::Conflict` when the stored version moved since the attempt was
/// loaded, and bumps `attempt.version` on success.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn create_attempt(&self, attempt: &ExamAttempt) -> Result<(), ExamError>;

    async fn load_attempt(&self, id: Uuid) -> Result<Option<ExamAttempt>, ExamError>;

    async fn save_attempt(&self, attempt: &mut ExamAttempt) -> Result<(), ExamError>;

    /// The open (not yet terminal) attempt of a user for an exam, if any.
    async fn find_open_attempt(
        &self,
        user_id: i64,
        exam_id: i64,
    ) -> Result<Option<ExamAttempt>, ExamError>;

    /// Ids of every attempt that has not reached a terminal state.
    async fn list_open_attempts(&self) -> Result<Vec<Uuid>, ExamError>;
}

/// JSON layout accepted by `InMemoryQuestionBank::from_json`.
#[derive(Debug, Deserialize)]
struct BankFile {
    certifications: Vec<Certification>,
    #[serde(default)]
    questions: Vec<Question>,
}

/// Question bank held in memory. Used by tests and local runs without a database.
#[derive(Default)]
pub struct InMemoryQuestionBank {
    certifications: DashMap<i64, Certification>,
    questions: DashMap<i64, Vec<Question>>,
}

impl InMemoryQuestionBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `{"certifications": [...], "questions": [...]}`.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let file: BankFile = serde_json::from_str(raw)?;
        let bank = Self::new();
        for certification in file.certifications {
            bank.insert_certification(certification);
        }
        for question in file.questions {
            bank.insert_question(question);
        }
        Ok(bank)
    }

    pub fn insert_certification(&self, certification: Certification) {
        self.certifications.insert(certification.id, certification);
    }

    pub fn insert_question(&self, question: Question) {
        let mut bank = self.questions.entry(question.certification_id).or_default();
        bank.retain(|q| q.id != question.id);
        bank.push(question);
        bank.sort_by_key(|q| q.id);
    }
}

#[async_trait]
impl QuestionBank for InMemoryQuestionBank {
    async fn get_certification(&self, id: i64) -> Result<Option<Certification>, ExamError> {
        Ok(self.certifications.get(&id).map(|c| c.clone()))
    }

    async fn get_questions(&self, certification_id: i64) -> Result<Vec<Question>, ExamError> {
        Ok(self
            .questions
            .get(&certification_id)
            .map(|q| q.clone())
            .unwrap_or_default())
    }
}

/// Attempt store held in memory.
#[derive(Default)]
pub struct InMemoryAttemptStore {
    attempts: DashMap<Uuid, ExamAttempt>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn create_attempt(&self, attempt: &ExamAttempt) -> Result<(), ExamError> {
        let conflict = self.attempts.iter().any(|a| {
            a.user_id == attempt.user_id && a.exam_id == attempt.exam_id && a.status.is_open()
        });
        if conflict || self.attempts.contains_key(&attempt.id) {
            return Err(ExamError::Conflict(attempt.id));
        }
        self.attempts.insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn load_attempt(&self, id: Uuid) -> Result<Option<ExamAttempt>, ExamError> {
        Ok(self.attempts.get(&id).map(|a| a.clone()))
    }

    async fn save_attempt(&self, attempt: &mut ExamAttempt) -> Result<(), ExamError> {
        let mut stored = self
            .attempts
            .get_mut(&attempt.id)
            .ok_or_else(|| ExamError::NotFound(format!("attempt {}", attempt.id)))?;
        if stored.version != attempt.version {
            return Err(ExamError::Conflict(attempt.id));
        }
        attempt.version += 1;
        *stored = attempt.clone();
        Ok(())
    }

    async fn find_open_attempt(
        &self,
        user_id: i64,
        exam_id: i64,
    ) -> Result<Option<ExamAttempt>, ExamError> {
        Ok(self
            .attempts
            .iter()
            .find(|a| a.user_id == user_id && a.exam_id == exam_id && a.status.is_open())
            .map(|a| a.clone()))
    }

    async fn list_open_attempts(&self) -> Result<Vec<Uuid>, ExamError> {
        Ok(self
            .attempts
            .iter()
            .filter(|a| a.status.is_open())
            .map(|a| a.id)
            .collect())
    }
}
