// src/models/attempt.rs

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    proctor::{IngestOutcome, ProctorDecision, ProctorState},
    question::{DomainWeight, PublicQuestion},
    result::ScoredResult,
};

/// Lifecycle status of an attempt.
///
/// ```text
/// initializing -> active -> warned
/// {active, warned} -> {terminated | submitted | expired} -> scored
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Initializing,
    Active,
    Warned,
    Terminated,
    Submitted,
    Expired,
    Scored,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::Initializing => "initializing",
            AttemptStatus::Active => "active",
            AttemptStatus::Warned => "warned",
            AttemptStatus::Terminated => "terminated",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::Expired => "expired",
            AttemptStatus::Scored => "scored",
        }
    }

    /// Answers, flags and proctor events are accepted only in these states.
    pub fn accepts_input(self) -> bool {
        matches!(self, AttemptStatus::Active | AttemptStatus::Warned)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptStatus::Terminated
                | AttemptStatus::Submitted
                | AttemptStatus::Expired
                | AttemptStatus::Scored
        )
    }

    /// Open attempts block a second attempt for the same user and exam.
    pub fn is_open(self) -> bool {
        !self.is_terminal()
    }

    /// Edges of the lifecycle graph. Nothing ever goes backwards.
    pub fn can_transition_to(self, next: AttemptStatus) -> bool {
        use AttemptStatus::*;
        matches!(
            (self, next),
            (Initializing, Active)
                | (Active, Warned)
                | (Active | Warned, Terminated | Submitted | Expired)
                | (Terminated | Submitted | Expired, Scored)
        )
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which terminal path ended the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    Submitted,
    Terminated,
    Expired,
}

impl EndReason {
    pub fn status(self) -> AttemptStatus {
        match self {
            EndReason::Submitted => AttemptStatus::Submitted,
            EndReason::Terminated => AttemptStatus::Terminated,
            EndReason::Expired => AttemptStatus::Expired,
        }
    }
}

/// Correct answers of one delivered question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub domain: String,
    pub correct: BTreeSet<String>,
}

/// Snapshot of everything scoring needs, frozen at initialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerKey {
    pub passing_score: f64,
    pub domains: Vec<DomainWeight>,
    pub entries: BTreeMap<i64, KeyEntry>,
}

/// One candidate's run of one exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub id: Uuid,
    pub exam_id: i64,
    pub user_id: i64,
    pub status: AttemptStatus,
    pub ended_by: Option<EndReason>,

    pub start_time: DateTime<Utc>,
    /// `None` means untimed.
    pub time_limit_seconds: Option<u32>,

    /// Questions in delivery order.
    pub questions: Vec<PublicQuestion>,
    pub answer_key: AnswerKey,

    pub answers: BTreeMap<i64, BTreeSet<String>>,
    pub time_per_question_ms: BTreeMap<i64, u64>,
    pub last_interaction_at: DateTime<Utc>,
    pub flagged_question_ids: BTreeSet<i64>,

    pub proctor: ProctorState,

    pub end_time: Option<DateTime<Utc>>,
    pub result: Option<ScoredResult>,

    /// Optimistic concurrency counter, bumped by the store on every save.
    #[serde(default)]
    pub version: i64,
}

/// Response of `initialize`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AttemptStarted {
    pub attempt_id: Uuid,
    pub exam_id: i64,
    pub status: AttemptStatus,
    pub start_time: DateTime<Utc>,
    pub time_limit_seconds: Option<u32>,
    pub remaining_seconds: Option<u64>,
    pub questions: Vec<PublicQuestion>,
}

/// Response of `getStatus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptStatusView {
    pub attempt_id: Uuid,
    pub status: AttemptStatus,
    pub ended_by: Option<EndReason>,
    pub remaining_seconds: Option<u64>,
    pub warning_level: u8,
    pub answered_count: usize,
    pub flagged_count: usize,
    pub total_questions: usize,
}

/// Everything a client needs to resume after a dropped connection.
#[derive(Debug, Serialize, Deserialize)]
pub struct PaperView {
    pub attempt_id: Uuid,
    pub status: AttemptStatus,
    pub remaining_seconds: Option<u64>,
    pub questions: Vec<PublicQuestion>,
    pub answers: BTreeMap<i64, BTreeSet<String>>,
    pub flagged_question_ids: BTreeSet<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecorded {
    pub question_id: i64,
    pub selection: BTreeSet<String>,
    pub time_spent_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagToggled {
    pub question_id: i64,
    pub flagged: bool,
}

/// Response of `ingestProctorEvent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProctorEventAck {
    pub sequence_number: u64,
    pub duplicate: bool,
    pub decision: ProctorDecision,
    pub status: AttemptStatus,
    pub warning_level: u8,
}

impl ProctorEventAck {
    pub fn new(
        sequence_number: u64,
        outcome: IngestOutcome,
        status: AttemptStatus,
        warning_level: u8,
    ) -> Self {
        Self {
            sequence_number,
            duplicate: outcome.duplicate,
            decision: outcome.decision,
            status,
            warning_level,
        }
    }
}

/// Response of `submit`. Repeated calls return the same result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub already_terminal: bool,
    pub result: ScoredResult,
}

/// Response of `getResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ResultView {
    Pending { status: AttemptStatus },
    Ready(ScoredResult),
}

/// DTO for recording an answer.
#[derive(Debug, Deserialize, Validate)]
pub struct RecordAnswerRequest {
    pub question_id: i64,
    #[validate(length(min = 1, max = 26))]
    pub selection: Vec<String>,
}
