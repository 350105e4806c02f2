// src/services/exam_service.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    config::ExamPolicy,
    engine::{
        attempt::{AttemptMachine, prepare_paper},
        monitor::ProctorMonitor,
    },
    error::ExamError,
    models::{
        attempt::{
            AnswerRecorded, AttemptStarted, AttemptStatusView, ExamAttempt, FlagToggled,
            PaperView, ProctorEventAck, ResultView, SubmitOutcome,
        },
        proctor::{ProctorAudit, ProctorSummary},
        question::Question,
        violation::RawProctorSignal,
    },
    services::store::{AttemptStore, QuestionBank},
};

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub expired: usize,
    pub failed: usize,
}

/// Serializes all work on one attempt and persists the result.
///
/// Each attempt gets its own async mutex; attempts never contend with each other.
/// `owner` arguments restrict access to the candidate's own attempts; `None`
/// skips the check (admin and sweeper paths).
pub struct ExamService {
    store: Arc<dyn AttemptStore>,
    bank: Arc<dyn QuestionBank>,
    policy: ExamPolicy,
    attempt_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    start_locks: DashMap<(i64, i64), Arc<Mutex<()>>>,
}

impl ExamService {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        bank: Arc<dyn QuestionBank>,
        policy: ExamPolicy,
    ) -> Self {
        Self {
            store,
            bank,
            policy,
            attempt_locks: DashMap::new(),
            start_locks: DashMap::new(),
        }
    }

    fn attempt_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.attempt_locks.entry(id).or_default().clone()
    }

    /// Drops the map entry unless another task still holds or waits on the lock.
    ///
    /// The caller must have released its own clone first.
    fn release_attempt_lock(&self, id: Uuid) {
        self.attempt_locks
            .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn load(&self, id: Uuid, owner: Option<i64>) -> Result<ExamAttempt, ExamError> {
        let attempt = self
            .store
            .load_attempt(id)
            .await?
            .ok_or_else(|| ExamError::NotFound(format!("attempt {}", id)))?;

        // Someone else's attempt looks exactly like a missing one.
        if owner.is_some_and(|user| user != attempt.user_id) {
            return Err(ExamError::NotFound(format!("attempt {}", id)));
        }
        Ok(attempt)
    }

    /// Runs `op` on the attempt under its lock and saves it if anything changed,
    /// including when `op` itself fails after an expiry.
    async fn with_attempt<T, F>(
        &self,
        id: Uuid,
        owner: Option<i64>,
        op: F,
    ) -> Result<T, ExamError>
    where
        T: Send,
        F: FnOnce(&mut AttemptMachine<'_>) -> Result<T, ExamError> + Send,
    {
        let lock = self.attempt_lock(id);
        let outcome = {
            let _guard = lock.lock().await;
            self.run_locked(id, owner, op).await
        };
        drop(lock);
        self.release_attempt_lock(id);
        outcome
    }

    async fn run_locked<T, F>(&self, id: Uuid, owner: Option<i64>, op: F) -> Result<T, ExamError>
    where
        T: Send,
        F: FnOnce(&mut AttemptMachine<'_>) -> Result<T, ExamError> + Send,
    {
        let mut attempt = self.load(id, owner).await?;
        let before = attempt.clone();

        let outcome = {
            let mut machine = AttemptMachine::new(&mut attempt, &self.policy);
            op(&mut machine)
        };

        if attempt != before {
            self.store.save_attempt(&mut attempt).await?;
        }
        outcome
    }

    /// Starts a new attempt for `user_id` on certification `exam_id`.
    pub async fn initialize(
        &self,
        user_id: i64,
        exam_id: i64,
        now: DateTime<Utc>,
    ) -> Result<AttemptStarted, ExamError> {
        let key = (user_id, exam_id);
        let lock = self.start_locks.entry(key).or_default().clone();
        let started = {
            let _guard = lock.lock().await;
            self.start_locked(user_id, exam_id, now).await
        };
        drop(lock);
        self.start_locks
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        started
    }

    async fn start_locked(
        &self,
        user_id: i64,
        exam_id: i64,
        now: DateTime<Utc>,
    ) -> Result<AttemptStarted, ExamError> {
        let certification = self
            .bank
            .get_certification(exam_id)
            .await?
            .ok_or_else(|| ExamError::NotFound(format!("certification {}", exam_id)))?;

        if let Some(open) = self.store.find_open_attempt(user_id, exam_id).await? {
            if !open.timer().has_expired(now) {
                return Err(ExamError::ConcurrentAttemptConflict {
                    attempt_id: open.id,
                });
            }
            // Stale attempt nobody swept yet: close it first.
            self.check_timer(open.id, now).await?;
        }

        let bank = self.bank.get_questions(exam_id).await?;
        if bank.is_empty() {
            return Err(ExamError::NotFound(format!(
                "questions for certification {}",
                exam_id
            )));
        }
        let paper = self.draw_paper(bank, certification.question_count);

        let attempt = ExamAttempt::initialize(Uuid::new_v4(), user_id, &certification, paper, now)?;
        if let Err(err) = self.store.create_attempt(&attempt).await {
            return Err(match err {
                ExamError::Conflict(_) => {
                    let existing = self.store.find_open_attempt(user_id, exam_id).await?;
                    ExamError::ConcurrentAttemptConflict {
                        attempt_id: existing.map(|a| a.id).unwrap_or(attempt.id),
                    }
                }
                other => other,
            });
        }

        tracing::info!(
            attempt = %attempt.id,
            user = user_id,
            exam = exam_id,
            questions = attempt.questions.len(),
            time_limit = ?attempt.time_limit_seconds,
            "Attempt started"
        );

        Ok(AttemptStarted {
            attempt_id: attempt.id,
            exam_id,
            status: attempt.status,
            start_time: attempt.start_time,
            time_limit_seconds: attempt.time_limit_seconds,
            remaining_seconds: attempt.timer().remaining(now),
            questions: attempt.questions,
        })
    }

    fn draw_paper(&self, bank: Vec<Question>, count: Option<i64>) -> Vec<Question> {
        let count = count
            .filter(|c| *c > 0)
            .map(|c| usize::try_from(c).unwrap_or(usize::MAX));
        if self.policy.shuffle_questions {
            let mut rng = rand::thread_rng();
            prepare_paper(bank, count, Some(&mut rng))
        } else {
            prepare_paper::<rand::rngs::ThreadRng>(bank, count, None)
        }
    }

    pub async fn record_answer(
        &self,
        id: Uuid,
        owner: Option<i64>,
        question_id: i64,
        selection: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<AnswerRecorded, ExamError> {
        self.with_attempt(id, owner, move |m| {
            m.record_answer(question_id, selection, now)
        })
        .await
    }

    pub async fn toggle_flag(
        &self,
        id: Uuid,
        owner: Option<i64>,
        question_id: i64,
        now: DateTime<Utc>,
    ) -> Result<FlagToggled, ExamError> {
        self.with_attempt(id, owner, move |m| m.toggle_flag(question_id, now))
            .await
    }

    pub async fn ingest_proctor_event(
        &self,
        id: Uuid,
        owner: Option<i64>,
        raw: RawProctorSignal,
        now: DateTime<Utc>,
    ) -> Result<ProctorEventAck, ExamError> {
        self.with_attempt(id, owner, move |m| m.ingest_proctor_event(raw, now))
            .await
    }

    pub async fn submit(
        &self,
        id: Uuid,
        owner: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, ExamError> {
        self.with_attempt(id, owner, move |m| m.submit(now)).await
    }

    /// Applies the timer to one attempt. Returns true when this call expired it.
    pub async fn check_timer(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, ExamError> {
        self.with_attempt(id, None, move |m| m.check_timer(now)).await
    }

    pub async fn get_status(
        &self,
        id: Uuid,
        owner: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<AttemptStatusView, ExamError> {
        self.with_attempt(id, owner, move |m| {
            m.check_timer(now)?;
            Ok(m.status_view(now))
        })
        .await
    }

    pub async fn get_paper(
        &self,
        id: Uuid,
        owner: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<PaperView, ExamError> {
        self.with_attempt(id, owner, move |m| {
            m.check_timer(now)?;
            Ok(m.paper_view(now))
        })
        .await
    }

    pub async fn get_result(
        &self,
        id: Uuid,
        owner: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ResultView, ExamError> {
        self.with_attempt(id, owner, move |m| {
            m.check_timer(now)?;
            Ok(m.result_view())
        })
        .await
    }

    /// Current proctoring counters. Never mutates the attempt.
    pub async fn proctor_summary(
        &self,
        id: Uuid,
        owner: Option<i64>,
    ) -> Result<ProctorSummary, ExamError> {
        let attempt = self.load(id, owner).await?;
        Ok(ProctorMonitor::summary(&attempt.proctor))
    }

    /// Summary plus the full event log, for auditors.
    pub async fn proctor_audit(&self, id: Uuid) -> Result<ProctorAudit, ExamError> {
        let attempt = self.load(id, None).await?;
        Ok(ProctorAudit {
            summary: ProctorMonitor::summary(&attempt.proctor),
            events: attempt.proctor.events,
        })
    }

    /// Expires every open attempt whose time has run out.
    ///
    /// Failures on one attempt are logged and left for the next sweep.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport, ExamError> {
        let open = self.store.list_open_attempts().await?;
        let mut report = SweepReport {
            checked: open.len(),
            ..SweepReport::default()
        };

        for id in open {
            match self.check_timer(id, now).await {
                Ok(true) => report.expired += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Expiry check failed for attempt {}: {}", id, e);
                }
            }
        }

        if report.expired > 0 || report.failed > 0 {
            tracing::info!(
                checked = report.checked,
                expired = report.expired,
                failed = report.failed,
                "Expiry sweep finished"
            );
        }
        Ok(report)
    }
}
