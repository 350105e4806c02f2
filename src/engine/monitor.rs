// src/engine/monitor.rs

use crate::{
    config::ProctorPolicy,
    models::{
        proctor::{
            IngestOutcome, LEVEL_TERMINATE, LEVEL_WARNED, ProctorDecision, ProctorState,
            ProctorSummary, TerminationReason,
        },
        violation::{Severity, ViolationEvent},
    },
};

/// Applies a `ProctorPolicy` to the proctor state of one attempt.
#[derive(Debug, Clone, Copy)]
pub struct ProctorMonitor<'a> {
    policy: &'a ProctorPolicy,
}

impl<'a> ProctorMonitor<'a> {
    pub fn new(policy: &'a ProctorPolicy) -> Self {
        Self { policy }
    }

    fn weight(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Minor => self.policy.weights.minor,
            Severity::Major => self.policy.weights.major,
            Severity::Critical => self.policy.weights.critical,
        }
    }

    fn level_for(&self, weighted_score: u32) -> u8 {
        if weighted_score >= self.policy.terminate_threshold {
            LEVEL_TERMINATE
        } else if weighted_score >= self.policy.warn_threshold {
            LEVEL_WARNED
        } else {
            0
        }
    }

    /// Accumulates one classified event and returns the escalation decision.
    ///
    /// An already-seen sequence number leaves the state untouched.
    /// `Warn` and `Terminate` are each emitted once, on the crossing.
    pub fn ingest(&self, state: &mut ProctorState, event: ViolationEvent) -> IngestOutcome {
        if !state.seen_sequences.insert(event.sequence_number) {
            tracing::debug!(
                attempt = %event.attempt_id,
                seq = event.sequence_number,
                "Discarding duplicate proctor event"
            );
            return IngestOutcome {
                decision: ProctorDecision::None,
                duplicate: true,
            };
        }

        state.counts.bump(event.severity);
        *state.counts_by_kind.entry(event.kind).or_insert(0) += 1;
        state.weighted_score = state
            .weighted_score
            .saturating_add(self.weight(event.severity));
        state.last_violation_at = match state.last_violation_at {
            Some(last) if last >= event.observed_at => Some(last),
            _ => Some(event.observed_at),
        };

        let short_circuit =
            self.policy.critical_short_circuit && event.severity == Severity::Critical;
        let mut level = self.level_for(state.weighted_score);
        if short_circuit {
            level = LEVEL_TERMINATE;
        }
        let previous = state.warning_level;
        let level = level.max(previous);

        let decision = if level >= LEVEL_TERMINATE && previous < LEVEL_TERMINATE {
            if state.termination_reason.is_none() {
                state.termination_reason = Some(if short_circuit
                    && state.weighted_score < self.policy.terminate_threshold
                {
                    TerminationReason::CriticalViolation {
                        kind: event.kind,
                        sequence_number: event.sequence_number,
                    }
                } else {
                    TerminationReason::ViolationThreshold {
                        weighted_score: state.weighted_score,
                        threshold: self.policy.terminate_threshold,
                    }
                });
            }
            ProctorDecision::Terminate
        } else if level >= LEVEL_WARNED && previous < LEVEL_WARNED {
            ProctorDecision::Warn
        } else {
            ProctorDecision::None
        };
        state.warning_level = level;

        let pos = state
            .events
            .partition_point(|e| e.sequence_number < event.sequence_number);
        state.events.insert(pos, event);

        IngestOutcome {
            decision,
            duplicate: false,
        }
    }

    pub fn summary(state: &ProctorState) -> ProctorSummary {
        ProctorSummary {
            counts: state.counts.clone(),
            counts_by_kind: state.counts_by_kind.clone(),
            weighted_score: state.weighted_score,
            warning_level: state.warning_level,
            last_violation_at: state.last_violation_at,
            termination_reason: state.termination_reason.clone(),
            event_count: state.events.len(),
        }
    }
}
