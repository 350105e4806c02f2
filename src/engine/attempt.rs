// src/engine/attempt.rs

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rand::{Rng, seq::SliceRandom};
use uuid::Uuid;

use crate::{
    config::ExamPolicy,
    engine::{classifier, monitor::ProctorMonitor, scoring, timer::ExamTimer},
    error::ExamError,
    models::{
        attempt::{
            AnswerKey, AnswerRecorded, AttemptStatus, AttemptStatusView, EndReason, ExamAttempt,
            FlagToggled, KeyEntry, PaperView, ProctorEventAck, ResultView, SubmitOutcome,
        },
        proctor::{ProctorDecision, ProctorState, ProctorSummary},
        question::{Certification, PublicQuestion, Question},
        result::ScoredResult,
        violation::RawProctorSignal,
    },
};

/// Orders the bank for delivery and keeps the first `count` questions.
///
/// With an RNG the order (and therefore the drawn subset) is shuffled.
pub fn prepare_paper<R: Rng + ?Sized>(
    mut bank: Vec<Question>,
    count: Option<usize>,
    rng: Option<&mut R>,
) -> Vec<Question> {
    match rng {
        Some(rng) => bank.shuffle(rng),
        None => bank.sort_by_key(|q| q.id),
    }
    if let Some(count) = count {
        bank.truncate(count);
    }
    bank
}

impl ExamAttempt {
    /// Creates an attempt over an already ordered question set and moves it to `active`.
    pub fn initialize(
        id: Uuid,
        user_id: i64,
        certification: &Certification,
        questions: Vec<Question>,
        now: DateTime<Utc>,
    ) -> Result<Self, ExamError> {
        let entries: BTreeMap<i64, KeyEntry> = questions
            .iter()
            .map(|q| {
                (
                    q.id,
                    KeyEntry {
                        domain: q.domain.clone(),
                        correct: q.correct_answers.0.iter().cloned().collect(),
                    },
                )
            })
            .collect();

        let time_limit_seconds = certification
            .time_limit_seconds
            .filter(|s| *s > 0)
            .map(|s| u32::try_from(s).unwrap_or(u32::MAX));

        let mut attempt = ExamAttempt {
            id,
            exam_id: certification.id,
            user_id,
            status: AttemptStatus::Initializing,
            ended_by: None,
            start_time: now,
            time_limit_seconds,
            questions: questions.iter().map(PublicQuestion::from).collect(),
            answer_key: AnswerKey {
                passing_score: certification.passing_score,
                domains: certification.domains.0.clone(),
                entries,
            },
            answers: BTreeMap::new(),
            time_per_question_ms: BTreeMap::new(),
            last_interaction_at: now,
            flagged_question_ids: BTreeSet::new(),
            proctor: ProctorState::default(),
            end_time: None,
            result: None,
            version: 0,
        };
        attempt.advance(AttemptStatus::Active)?;
        Ok(attempt)
    }

    /// Moves along one edge of the lifecycle graph.
    pub fn advance(&mut self, next: AttemptStatus) -> Result<(), ExamError> {
        if !self.status.can_transition_to(next) {
            return Err(ExamError::InvalidStateTransition {
                status: self.status,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn timer(&self) -> ExamTimer {
        ExamTimer::start(self.start_time, self.time_limit_seconds)
    }
}

/// Drives one attempt through its lifecycle.
///
/// Every mutating operation first applies the timer, then refuses to touch an
/// attempt that no longer accepts input.
pub struct AttemptMachine<'a> {
    attempt: &'a mut ExamAttempt,
    policy: &'a ExamPolicy,
}

impl<'a> AttemptMachine<'a> {
    pub fn new(attempt: &'a mut ExamAttempt, policy: &'a ExamPolicy) -> Self {
        Self { attempt, policy }
    }

    pub fn attempt(&self) -> &ExamAttempt {
        self.attempt
    }

    fn guard_input(&self) -> Result<(), ExamError> {
        if self.attempt.status.accepts_input() {
            Ok(())
        } else {
            Err(ExamError::InvalidStateTransition {
                status: self.attempt.status,
            })
        }
    }

    /// Expires the attempt if its time is up. Returns true when this call expired it.
    pub fn check_timer(&mut self, now: DateTime<Utc>) -> Result<bool, ExamError> {
        if !self.attempt.status.accepts_input() {
            return Ok(false);
        }
        let timer = self.attempt.timer();
        if !timer.has_expired(now) {
            return Ok(false);
        }
        let end_time = timer.deadline().unwrap_or(now);
        self.finish(EndReason::Expired, end_time, now)?;
        Ok(true)
    }

    /// Enters the terminal branch: stamps end time, scores, then advertises `scored`.
    fn finish(
        &mut self,
        reason: EndReason,
        end_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<&ScoredResult, ExamError> {
        self.attempt.advance(reason.status())?;
        self.attempt.end_time = Some(end_time);
        self.attempt.ended_by = Some(reason);

        let result = scoring::score(
            &*self.attempt,
            &self.attempt.answer_key,
            &self.policy.scoring,
            reason,
            now,
        );
        tracing::info!(
            attempt = %self.attempt.id,
            user = self.attempt.user_id,
            exam = self.attempt.exam_id,
            ended_by = ?reason,
            score = result.total_score,
            passed = result.passed,
            "Attempt finished"
        );
        self.attempt.advance(AttemptStatus::Scored)?;
        Ok(self.attempt.result.insert(result))
    }

    fn advance_clock(&mut self, question_id: i64, now: DateTime<Utc>) -> u64 {
        let delta = (now - self.attempt.last_interaction_at)
            .num_milliseconds()
            .max(0) as u64;
        let spent = self
            .attempt
            .time_per_question_ms
            .entry(question_id)
            .or_insert(0);
        *spent = spent.saturating_add(delta);
        let spent = *spent;
        if now > self.attempt.last_interaction_at {
            self.attempt.last_interaction_at = now;
        }
        spent
    }

    fn question(&self, question_id: i64) -> Result<&PublicQuestion, ExamError> {
        self.attempt
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| ExamError::NotFound(format!("question {}", question_id)))
    }

    /// Upserts the selection for a question. The latest selection wins.
    pub fn record_answer(
        &mut self,
        question_id: i64,
        selection: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<AnswerRecorded, ExamError> {
        self.check_timer(now)?;
        self.guard_input()?;

        let question = self.question(question_id)?;
        let selection: BTreeSet<String> = selection.into_iter().collect();
        if selection.is_empty() {
            return Err(ExamError::InvalidSelection(
                "at least one option must be selected".to_string(),
            ));
        }
        if let Some(unknown) = selection
            .iter()
            .find(|id| !question.options.iter().any(|o| &o.id == *id))
        {
            return Err(ExamError::InvalidSelection(format!(
                "question {} has no option {:?}",
                question_id, unknown
            )));
        }
        if !question.multiple && selection.len() > 1 {
            return Err(ExamError::InvalidSelection(format!(
                "question {} accepts a single option",
                question_id
            )));
        }

        let time_spent_ms = self.advance_clock(question_id, now);
        self.attempt.answers.insert(question_id, selection.clone());

        Ok(AnswerRecorded {
            question_id,
            selection,
            time_spent_ms,
        })
    }

    pub fn toggle_flag(
        &mut self,
        question_id: i64,
        now: DateTime<Utc>,
    ) -> Result<FlagToggled, ExamError> {
        self.check_timer(now)?;
        self.guard_input()?;
        self.question(question_id)?;

        self.advance_clock(question_id, now);
        let flagged = if self.attempt.flagged_question_ids.remove(&question_id) {
            false
        } else {
            self.attempt.flagged_question_ids.insert(question_id);
            true
        };

        Ok(FlagToggled {
            question_id,
            flagged,
        })
    }

    /// Classifies a raw signal, feeds it to the monitor and applies the decision.
    pub fn ingest_proctor_event(
        &mut self,
        raw: RawProctorSignal,
        now: DateTime<Utc>,
    ) -> Result<ProctorEventAck, ExamError> {
        self.check_timer(now)?;
        self.guard_input()?;

        let sequence_number = raw.sequence_number;
        let event = classifier::classify(self.attempt.id, raw, now);
        let (kind, severity) = (event.kind, event.severity);
        let monitor = ProctorMonitor::new(&self.policy.proctor);
        let outcome = monitor.ingest(&mut self.attempt.proctor, event);

        match outcome.decision {
            ProctorDecision::None => {}
            ProctorDecision::Warn => {
                tracing::warn!(
                    attempt = %self.attempt.id,
                    seq = sequence_number,
                    ?kind,
                    ?severity,
                    weighted_score = self.attempt.proctor.weighted_score,
                    violations = self.attempt.proctor.counts.total(),
                    "Proctor warning issued"
                );
                if self.attempt.status == AttemptStatus::Active {
                    self.attempt.advance(AttemptStatus::Warned)?;
                }
            }
            ProctorDecision::Terminate => {
                tracing::warn!(
                    attempt = %self.attempt.id,
                    seq = sequence_number,
                    ?kind,
                    ?severity,
                    reason = ?self.attempt.proctor.termination_reason,
                    violations = self.attempt.proctor.counts.total(),
                    "Proctor terminated attempt"
                );
                self.finish(EndReason::Terminated, now, now)?;
            }
        }

        Ok(ProctorEventAck::new(
            sequence_number,
            outcome,
            self.attempt.status,
            self.attempt.proctor.warning_level,
        ))
    }

    /// Submits the attempt. On an attempt that already ended this returns the
    /// existing result instead of failing.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<SubmitOutcome, ExamError> {
        self.check_timer(now)?;

        if self.attempt.status.is_terminal() {
            return match &self.attempt.result {
                Some(result) => Ok(SubmitOutcome {
                    already_terminal: true,
                    result: result.clone(),
                }),
                None => Err(ExamError::InvalidStateTransition {
                    status: self.attempt.status,
                }),
            };
        }
        self.guard_input()?;

        let result = self.finish(EndReason::Submitted, now, now)?.clone();
        Ok(SubmitOutcome {
            already_terminal: false,
            result,
        })
    }

    pub fn status_view(&self, now: DateTime<Utc>) -> AttemptStatusView {
        let attempt = &*self.attempt;
        let timer = attempt.timer();
        let remaining_seconds = if attempt.status.accepts_input() {
            timer.remaining(now)
        } else {
            timer.is_timed().then_some(0)
        };
        AttemptStatusView {
            attempt_id: attempt.id,
            status: attempt.status,
            ended_by: attempt.ended_by,
            remaining_seconds,
            warning_level: attempt.proctor.warning_level,
            answered_count: attempt.answers.len(),
            flagged_count: attempt.flagged_question_ids.len(),
            total_questions: attempt.questions.len(),
        }
    }

    pub fn paper_view(&self, now: DateTime<Utc>) -> PaperView {
        let attempt = &*self.attempt;
        PaperView {
            attempt_id: attempt.id,
            status: attempt.status,
            remaining_seconds: self.status_view(now).remaining_seconds,
            questions: attempt.questions.clone(),
            answers: attempt.answers.clone(),
            flagged_question_ids: attempt.flagged_question_ids.clone(),
        }
    }

    pub fn result_view(&self) -> ResultView {
        match &self.attempt.result {
            Some(result) => ResultView::Ready(result.clone()),
            None => ResultView::Pending {
                status: self.attempt.status,
            },
        }
    }

    pub fn proctor_summary(&self) -> ProctorSummary {
        ProctorMonitor::summary(&self.attempt.proctor)
    }
}
