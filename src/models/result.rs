// src/models/result.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::attempt::EndReason;

/// Final, immutable outcome of an attempt.
/// Produced once when the attempt enters a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub attempt_id: Uuid,

    /// Weighted overall score on a 0-100 scale, two decimals.
    pub total_score: f64,

    /// Domain name -> percentage of that domain's questions answered correctly.
    pub per_domain_score: BTreeMap<String, f64>,

    pub passed: bool,
    pub passing_score: f64,
    pub correct_count: usize,
    pub total_questions: usize,
    pub ended_by: EndReason,
    pub produced_at: DateTime<Utc>,
}
