// src/engine/scoring.rs

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::{
    config::ScoringPolicy,
    models::{
        attempt::{AnswerKey, EndReason, ExamAttempt},
        result::ScoredResult,
    },
};

/// Credit earned by one answer, in `[0, 1]`.
///
/// Exact set match earns 1. With partial credit enabled, a multi-select answer
/// containing no wrong option earns the fraction of correct options picked.
pub fn answer_credit(
    selection: Option<&BTreeSet<String>>,
    correct: &BTreeSet<String>,
    policy: &ScoringPolicy,
) -> f64 {
    let Some(selection) = selection else {
        return 0.0;
    };
    if selection == correct {
        return 1.0;
    }
    if !policy.partial_credit || correct.len() < 2 || !selection.is_subset(correct) {
        return 0.0;
    }
    selection.len() as f64 / correct.len() as f64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Default)]
struct DomainTally {
    credit: f64,
    total: usize,
}

/// Scores an attempt against its answer key. Pure and deterministic.
///
/// Every delivered question counts toward its domain's denominator, answered or not.
pub fn score(
    attempt: &ExamAttempt,
    key: &AnswerKey,
    policy: &ScoringPolicy,
    ended_by: EndReason,
    produced_at: DateTime<Utc>,
) -> ScoredResult {
    let mut tallies: BTreeMap<&str, DomainTally> = BTreeMap::new();
    let mut correct_count = 0;

    for question in &attempt.questions {
        let Some(entry) = key.entries.get(&question.id) else {
            continue;
        };
        let credit = answer_credit(attempt.answers.get(&question.id), &entry.correct, policy);
        if credit >= 1.0 {
            correct_count += 1;
        }
        let tally = tallies.entry(entry.domain.as_str()).or_default();
        tally.credit += credit;
        tally.total += 1;
    }

    let per_domain_score: BTreeMap<String, f64> = tallies
        .iter()
        .map(|(domain, t)| (domain.to_string(), round2(t.credit * 100.0 / t.total as f64)))
        .collect();

    let total_questions: usize = tallies.values().map(|t| t.total).sum();

    let total_score = if total_questions == 0 {
        0.0
    } else if key.domains.is_empty() {
        let credit: f64 = tallies.values().map(|t| t.credit).sum();
        credit * 100.0 / total_questions as f64
    } else {
        let mut weighted = 0.0;
        let mut weight_sum = 0.0;
        for (domain, tally) in &tallies {
            let weight = key
                .domains
                .iter()
                .find(|d| d.name == *domain)
                .map(|d| d.weight.max(0.0))
                .unwrap_or(0.0);
            weighted += weight * tally.credit / tally.total as f64;
            weight_sum += weight;
        }
        if weight_sum > 0.0 {
            weighted * 100.0 / weight_sum
        } else {
            tracing::warn!(
                attempt = %attempt.id,
                exam = attempt.exam_id,
                delivered = ?tallies.keys().collect::<Vec<_>>(),
                weighted = ?key.domains.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
                "No delivered domain carries weight, total score is 0"
            );
            0.0
        }
    };
    // Pass on the exact score; rounding is for display only.
    let total_score = total_score.clamp(0.0, 100.0);
    let passed = total_score >= key.passing_score;
    let total_score = round2(total_score);

    ScoredResult {
        attempt_id: attempt.id,
        total_score,
        per_domain_score,
        passed,
        passing_score: key.passing_score,
        correct_count,
        total_questions,
        ended_by,
        produced_at,
    }
}
