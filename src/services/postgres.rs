// src/services/postgres.rs

use async_trait::async_trait;
use sqlx::{PgPool, types::Json};
use uuid::Uuid;

use crate::{
    error::ExamError,
    models::{
        attempt::ExamAttempt,
        question::{Certification, Question},
    },
    services::store::{AttemptStore, QuestionBank},
};

const OPEN_STATUSES: [&str; 3] = ["initializing", "active", "warned"];

/// Helper struct for reading attempt rows.
#[derive(sqlx::FromRow)]
struct AttemptRow {
    body: Json<ExamAttempt>,
    version: i64,
}

impl AttemptRow {
    fn into_attempt(self) -> ExamAttempt {
        let mut attempt = self.body.0;
        attempt.version = self.version;
        attempt
    }
}

/// `QuestionBank` and `AttemptStore` backed by PostgreSQL.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionBank for PgStore {
    async fn get_certification(&self, id: i64) -> Result<Option<Certification>, ExamError> {
        let certification = sqlx::query_as::<_, Certification>(
            r#"
            SELECT id, name, passing_score, time_limit_seconds, question_count, domains
            FROM certifications
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch certification {}: {:?}", id, e);
            ExamError::from(e)
        })?;

        Ok(certification)
    }

    async fn get_questions(&self, certification_id: i64) -> Result<Vec<Question>, ExamError> {
        let questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT id, certification_id, content, options, correct_answers, domain
            FROM questions
            WHERE certification_id = $1
            ORDER BY id
            "#,
        )
        .bind(certification_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch questions for {}: {:?}", certification_id, e);
            ExamError::from(e)
        })?;

        Ok(questions)
    }
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn create_attempt(&self, attempt: &ExamAttempt) -> Result<(), ExamError> {
        sqlx::query(
            r#"
            INSERT INTO exam_attempts (id, user_id, exam_id, status, version, body)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.user_id)
        .bind(attempt.exam_id)
        .bind(attempt.status.as_str())
        .bind(attempt.version)
        .bind(Json(attempt))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            // Partial unique index on open attempts per (user, exam)
            if e.to_string().contains("unique constraint") {
                return ExamError::Conflict(attempt.id);
            }
            tracing::error!("Failed to insert attempt {}: {:?}", attempt.id, e);
            ExamError::from(e)
        })?;

        Ok(())
    }

    async fn load_attempt(&self, id: Uuid) -> Result<Option<ExamAttempt>, ExamError> {
        let row = sqlx::query_as::<_, AttemptRow>(
            "SELECT body, version FROM exam_attempts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AttemptRow::into_attempt))
    }

    async fn save_attempt(&self, attempt: &mut ExamAttempt) -> Result<(), ExamError> {
        let expected = attempt.version;
        attempt.version = expected + 1;

        let updated = sqlx::query(
            r#"
            UPDATE exam_attempts
            SET status = $1, version = $2, body = $3, updated_at = NOW()
            WHERE id = $4 AND version = $5
            "#,
        )
        .bind(attempt.status.as_str())
        .bind(attempt.version)
        .bind(Json(&*attempt))
        .bind(attempt.id)
        .bind(expected)
        .execute(&self.pool)
        .await;

        match updated {
            Ok(done) if done.rows_affected() == 1 => Ok(()),
            Ok(_) => {
                attempt.version = expected;
                tracing::warn!("Version conflict while saving attempt {}", attempt.id);
                Err(ExamError::Conflict(attempt.id))
            }
            Err(e) => {
                attempt.version = expected;
                tracing::error!("Failed to save attempt {}: {:?}", attempt.id, e);
                Err(e.into())
            }
        }
    }

    async fn find_open_attempt(
        &self,
        user_id: i64,
        exam_id: i64,
    ) -> Result<Option<ExamAttempt>, ExamError> {
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT body, version FROM exam_attempts
            WHERE user_id = $1 AND exam_id = $2 AND status = ANY($3)
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(exam_id)
        .bind(&OPEN_STATUSES[..])
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AttemptRow::into_attempt))
    }

    async fn list_open_attempts(&self) -> Result<Vec<Uuid>, ExamError> {
        let ids: Vec<(Uuid,)> =
            sqlx::query_as("SELECT id FROM exam_attempts WHERE status = ANY($1)")
                .bind(&OPEN_STATUSES[..])
                .fetch_all(&self.pool)
                .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
