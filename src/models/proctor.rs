// src/models/proctor.rs

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::violation::{Severity, ViolationEvent, ViolationKind};

/// Warning level reached once the warn threshold is crossed.
pub const LEVEL_WARNED: u8 = 1;
/// Warning level reached once the attempt must be terminated.
pub const LEVEL_TERMINATE: u8 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub minor: u32,
    pub major: u32,
    pub critical: u32,
}

impl SeverityCounts {
    pub fn bump(&mut self, severity: Severity) {
        let slot = match severity {
            Severity::Minor => &mut self.minor,
            Severity::Major => &mut self.major,
            Severity::Critical => &mut self.critical,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn total(&self) -> u32 {
        self.minor + self.major + self.critical
    }
}

/// Why the proctor ended an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum TerminationReason {
    ViolationThreshold { weighted_score: u32, threshold: u32 },
    CriticalViolation { kind: ViolationKind, sequence_number: u64 },
}

/// Accumulated proctoring state of one attempt.
///
/// Only `engine::monitor` mutates this.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProctorState {
    pub counts: SeverityCounts,
    pub counts_by_kind: BTreeMap<ViolationKind, u32>,
    pub weighted_score: u32,
    pub warning_level: u8,
    pub last_violation_at: Option<DateTime<Utc>>,
    pub termination_reason: Option<TerminationReason>,
    pub seen_sequences: BTreeSet<u64>,

    /// Audit trail, kept sorted by sequence number.
    pub events: Vec<ViolationEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProctorDecision {
    None,
    Warn,
    Terminate,
}

/// Result of feeding one event to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub decision: ProctorDecision,
    pub duplicate: bool,
}

/// Read-only view of a proctor state for display and audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProctorSummary {
    pub counts: SeverityCounts,
    pub counts_by_kind: BTreeMap<ViolationKind, u32>,
    pub weighted_score: u32,
    pub warning_level: u8,
    pub last_violation_at: Option<DateTime<Utc>>,
    pub termination_reason: Option<TerminationReason>,
    pub event_count: usize,
}

/// Full audit record: the summary plus every accepted event.
#[derive(Debug, Clone, Serialize)]
pub struct ProctorAudit {
    #[serde(flatten)]
    pub summary: ProctorSummary,
    pub events: Vec<ViolationEvent>,
}
