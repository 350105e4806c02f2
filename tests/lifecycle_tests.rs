// tests/lifecycle_tests.rs

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use exam_proctor::{
    config::ExamPolicy,
    error::ExamError,
    models::{
        attempt::{AttemptStatus, EndReason, ResultView},
        proctor::{ProctorDecision, TerminationReason},
        violation::RawProctorSignal,
    },
    services::{
        exam_service::ExamService,
        store::{AttemptStore, InMemoryAttemptStore, InMemoryQuestionBank, QuestionBank},
    },
};
use serde_json::json;
use uuid::Uuid;

const CANDIDATE: i64 = 42;
const OTHER_CANDIDATE: i64 = 43;

/// Two certifications: 1 is timed at 30 minutes, 2 is timed at 60 seconds.
fn question_bank() -> InMemoryQuestionBank {
    let mut questions = Vec::new();
    for certification_id in [1, 2] {
        for n in 1..=5 {
            let id = certification_id * 100 + n;
            let domain = if n <= 3 { "security" } else { "networking" };
            questions.push(json!({
                "id": id,
                "certification_id": certification_id,
                "content": format!("Question {}", id),
                "domain": domain,
                "options": [
                    {"id": "A", "text": "first"},
                    {"id": "B", "text": "second"},
                    {"id": "C", "text": "third"}
                ],
                "correct_answers": if n == 5 { json!(["A", "C"]) } else { json!(["B"]) }
            }));
        }
    }

    let raw = json!({
        "certifications": [
            {"id": 1, "name": "Security Fundamentals", "passing_score": 70.0,
             "time_limit_seconds": 1800, "question_count": null,
             "domains": [{"name": "security", "weight": 0.6}, {"name": "networking", "weight": 0.4}]},
            {"id": 2, "name": "Speed Round", "passing_score": 70.0,
             "time_limit_seconds": 60, "question_count": null,
             "domains": [{"name": "security", "weight": 0.6}, {"name": "networking", "weight": 0.4}]},
            {"id": 3, "name": "Empty", "passing_score": 50.0,
             "time_limit_seconds": null, "question_count": null, "domains": []}
        ],
        "questions": questions
    });

    InMemoryQuestionBank::from_json(&raw.to_string()).unwrap()
}

fn service() -> ExamService {
    let policy = ExamPolicy {
        shuffle_questions: false,
        ..ExamPolicy::default()
    };
    let store: Arc<dyn AttemptStore> = Arc::new(InMemoryAttemptStore::new());
    let bank: Arc<dyn QuestionBank> = Arc::new(question_bank());
    ExamService::new(store, bank, policy)
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

fn signal(sequence_number: u64, kind: &str) -> RawProctorSignal {
    RawProctorSignal {
        sequence_number,
        kind: Some(kind.to_string()),
        observed_at: None,
        payload: serde_json::Value::Null,
    }
}

fn correct_selection(question_id: i64) -> Vec<String> {
    if question_id % 100 == 5 {
        vec!["A".to_string(), "C".to_string()]
    } else {
        vec!["B".to_string()]
    }
}

#[tokio::test]
async fn submitted_attempt_with_all_correct_answers_passes() {
    let service = service();
    let started = service.initialize(CANDIDATE, 1, t0()).await.unwrap();
    assert_eq!(started.status, AttemptStatus::Active);
    assert_eq!(started.remaining_seconds, Some(1800));
    assert_eq!(started.questions.len(), 5);

    let id = started.attempt_id;
    for (i, question) in started.questions.iter().enumerate() {
        let at = t0() + Duration::seconds(30 * (i as i64 + 1));
        service
            .record_answer(id, Some(CANDIDATE), question.id, correct_selection(question.id), at)
            .await
            .unwrap();
    }

    let outcome = service
        .submit(id, Some(CANDIDATE), t0() + Duration::minutes(5))
        .await
        .unwrap();
    assert!(!outcome.already_terminal);
    assert_eq!(outcome.result.ended_by, EndReason::Submitted);
    assert_eq!(outcome.result.total_score, 100.0);
    assert_eq!(outcome.result.correct_count, 5);
    assert!(outcome.result.passed);
    assert_eq!(outcome.result.per_domain_score.get("security"), Some(&100.0));
    assert_eq!(outcome.result.per_domain_score.get("networking"), Some(&100.0));

    let status = service
        .get_status(id, Some(CANDIDATE), t0() + Duration::minutes(6))
        .await
        .unwrap();
    assert_eq!(status.status, AttemptStatus::Scored);
    assert_eq!(status.ended_by, Some(EndReason::Submitted));
    assert_eq!(status.answered_count, 5);
}

#[tokio::test]
async fn critical_violations_terminate_the_attempt() {
    let service = service();
    let id = service
        .initialize(CANDIDATE, 1, t0())
        .await
        .unwrap()
        .attempt_id;

    let first = service
        .ingest_proctor_event(id, Some(CANDIDATE), signal(1, "multiple_faces"), t0())
        .await
        .unwrap();
    assert_eq!(first.decision, ProctorDecision::Warn);
    assert_eq!(first.status, AttemptStatus::Warned);

    let second = service
        .ingest_proctor_event(id, Some(CANDIDATE), signal(2, "multi-face"), t0())
        .await
        .unwrap();
    assert_eq!(second.decision, ProctorDecision::None);
    assert_eq!(second.status, AttemptStatus::Warned);

    let third = service
        .ingest_proctor_event(id, Some(CANDIDATE), signal(3, "extra-person"), t0())
        .await
        .unwrap();
    assert_eq!(third.decision, ProctorDecision::Terminate);
    assert!(third.status.is_terminal());

    let err = service
        .record_answer(id, Some(CANDIDATE), 101, vec!["B".to_string()], t0())
        .await
        .unwrap_err();
    assert!(matches!(err, ExamError::InvalidStateTransition { .. }));

    let summary = service.proctor_summary(id, Some(CANDIDATE)).await.unwrap();
    assert_eq!(summary.counts.critical, 3);
    assert_eq!(summary.weighted_score, 21);
    assert!(matches!(
        summary.termination_reason,
        Some(TerminationReason::ViolationThreshold { .. })
    ));

    match service.get_result(id, Some(CANDIDATE), t0()).await.unwrap() {
        ResultView::Ready(result) => {
            assert_eq!(result.ended_by, EndReason::Terminated);
            assert_eq!(result.total_score, 0.0);
            assert!(!result.passed);
        }
        other => panic!("expected a scored result, got {:?}", other),
    }
}

#[tokio::test]
async fn sweep_expires_attempts_past_their_deadline() {
    let service = service();
    let id = service
        .initialize(CANDIDATE, 2, t0())
        .await
        .unwrap()
        .attempt_id;

    service
        .record_answer(id, Some(CANDIDATE), 201, vec!["B".to_string()], t0() + Duration::seconds(10))
        .await
        .unwrap();

    let early = service.sweep_expired(t0() + Duration::seconds(59)).await.unwrap();
    assert_eq!(early.expired, 0);

    let report = service.sweep_expired(t0() + Duration::seconds(61)).await.unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.expired, 1);
    assert_eq!(report.failed, 0);

    let status = service
        .get_status(id, Some(CANDIDATE), t0() + Duration::seconds(62))
        .await
        .unwrap();
    assert_eq!(status.ended_by, Some(EndReason::Expired));
    assert_eq!(status.remaining_seconds, Some(0));

    match service.get_result(id, None, t0() + Duration::seconds(62)).await.unwrap() {
        ResultView::Ready(result) => {
            assert_eq!(result.ended_by, EndReason::Expired);
            assert_eq!(result.correct_count, 1);
            // One of three security questions right, nothing in networking.
            assert_eq!(result.per_domain_score.get("security"), Some(&33.33));
            assert_eq!(result.per_domain_score.get("networking"), Some(&0.0));
        }
        other => panic!("expected a scored result, got {:?}", other),
    }

    // Nothing left to sweep.
    let again = service.sweep_expired(t0() + Duration::seconds(120)).await.unwrap();
    assert_eq!(again.checked, 0);
}

#[tokio::test]
async fn answer_after_deadline_expires_instead_of_recording() {
    let service = service();
    let id = service
        .initialize(CANDIDATE, 2, t0())
        .await
        .unwrap()
        .attempt_id;

    let err = service
        .record_answer(id, Some(CANDIDATE), 201, vec!["B".to_string()], t0() + Duration::seconds(60))
        .await
        .unwrap_err();
    assert!(matches!(err, ExamError::InvalidStateTransition { .. }));

    let paper = service
        .get_paper(id, Some(CANDIDATE), t0() + Duration::seconds(61))
        .await
        .unwrap();
    assert!(paper.answers.is_empty());
    assert!(paper.status.is_terminal());
}

#[tokio::test]
async fn latest_answer_wins_and_time_accumulates() {
    let service = service();
    let id = service
        .initialize(CANDIDATE, 1, t0())
        .await
        .unwrap()
        .attempt_id;

    let first = service
        .record_answer(id, Some(CANDIDATE), 101, vec!["A".to_string()], t0() + Duration::seconds(20))
        .await
        .unwrap();
    assert_eq!(first.time_spent_ms, 20_000);

    let second = service
        .record_answer(id, Some(CANDIDATE), 101, vec!["B".to_string()], t0() + Duration::seconds(50))
        .await
        .unwrap();
    assert_eq!(second.time_spent_ms, 50_000);
    assert_eq!(second.selection.len(), 1);
    assert!(second.selection.contains("B"));

    let paper = service
        .get_paper(id, Some(CANDIDATE), t0() + Duration::seconds(51))
        .await
        .unwrap();
    assert_eq!(paper.answers.len(), 1);
    assert!(paper.answers[&101].contains("B"));

    let outcome = service
        .submit(id, Some(CANDIDATE), t0() + Duration::seconds(60))
        .await
        .unwrap();
    assert_eq!(outcome.result.correct_count, 1);
}

#[tokio::test]
async fn invalid_selections_are_rejected() {
    let service = service();
    let id = service
        .initialize(CANDIDATE, 1, t0())
        .await
        .unwrap()
        .attempt_id;

    let unknown_option = service
        .record_answer(id, Some(CANDIDATE), 101, vec!["Z".to_string()], t0())
        .await
        .unwrap_err();
    assert!(matches!(unknown_option, ExamError::InvalidSelection(_)));

    let too_many = service
        .record_answer(id, Some(CANDIDATE), 101, vec!["A".to_string(), "B".to_string()], t0())
        .await
        .unwrap_err();
    assert!(matches!(too_many, ExamError::InvalidSelection(_)));

    let unknown_question = service
        .record_answer(id, Some(CANDIDATE), 999, vec!["A".to_string()], t0())
        .await
        .unwrap_err();
    assert!(matches!(unknown_question, ExamError::NotFound(_)));
}

#[tokio::test]
async fn repeated_submit_and_duplicate_events_change_nothing() {
    let service = service();
    let id = service
        .initialize(CANDIDATE, 1, t0())
        .await
        .unwrap()
        .attempt_id;

    let first = service
        .ingest_proctor_event(id, Some(CANDIDATE), signal(7, "tab-switch"), t0())
        .await
        .unwrap();
    assert!(!first.duplicate);
    let retry = service
        .ingest_proctor_event(id, Some(CANDIDATE), signal(7, "tab-switch"), t0())
        .await
        .unwrap();
    assert!(retry.duplicate);

    let summary = service.proctor_summary(id, None).await.unwrap();
    assert_eq!(summary.counts.total(), 1);
    assert_eq!(summary.event_count, 1);

    let submitted = service
        .submit(id, Some(CANDIDATE), t0() + Duration::seconds(30))
        .await
        .unwrap();
    let again = service
        .submit(id, Some(CANDIDATE), t0() + Duration::seconds(90))
        .await
        .unwrap();
    assert!(!submitted.already_terminal);
    assert!(again.already_terminal);
    assert_eq!(submitted.result, again.result);
}

#[tokio::test]
async fn second_open_attempt_is_rejected() {
    let service = service();
    let started = service.initialize(CANDIDATE, 1, t0()).await.unwrap();

    let err = service.initialize(CANDIDATE, 1, t0()).await.unwrap_err();
    match err {
        ExamError::ConcurrentAttemptConflict { attempt_id } => {
            assert_eq!(attempt_id, started.attempt_id)
        }
        other => panic!("expected a conflict, got {:?}", other),
    }

    // Another user, or another exam, is unaffected.
    assert!(service.initialize(OTHER_CANDIDATE, 1, t0()).await.is_ok());
    assert!(service.initialize(CANDIDATE, 2, t0()).await.is_ok());

    // Once finished, a new attempt may start.
    service
        .submit(started.attempt_id, Some(CANDIDATE), t0())
        .await
        .unwrap();
    assert!(service.initialize(CANDIDATE, 1, t0()).await.is_ok());
}

#[tokio::test]
async fn stale_attempt_is_expired_on_restart() {
    let service = service();
    let stale = service
        .initialize(CANDIDATE, 2, t0())
        .await
        .unwrap()
        .attempt_id;

    let fresh = service
        .initialize(CANDIDATE, 2, t0() + Duration::minutes(5))
        .await
        .unwrap();
    assert_ne!(fresh.attempt_id, stale);

    let status = service
        .get_status(stale, Some(CANDIDATE), t0() + Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(status.ended_by, Some(EndReason::Expired));
}

#[tokio::test]
async fn concurrent_starts_create_one_attempt() {
    let service = Arc::new(service());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.initialize(CANDIDATE, 1, t0()).await })
        })
        .collect();

    let mut started = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => started += 1,
            Err(ExamError::ConcurrentAttemptConflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!(started, 1);
    assert_eq!(conflicts, 7);
}

#[tokio::test]
async fn submit_racing_termination_reaches_one_end_state() {
    let service = Arc::new(service());
    let id = service
        .initialize(CANDIDATE, 1, t0())
        .await
        .unwrap()
        .attempt_id;

    let proctor = {
        let service = service.clone();
        tokio::spawn(async move {
            for seq in 1..=3 {
                // Late events land on a finished attempt and are refused.
                let _ = service
                    .ingest_proctor_event(id, Some(CANDIDATE), signal(seq, "multi-face"), t0())
                    .await;
            }
        })
    };
    let submit = {
        let service = service.clone();
        tokio::spawn(async move { service.submit(id, Some(CANDIDATE), t0()).await })
    };

    proctor.await.unwrap();
    let submitted = submit.await.unwrap();

    let status = service.get_status(id, None, t0()).await.unwrap();
    assert_eq!(status.status, AttemptStatus::Scored);
    let ended_by = status.ended_by.unwrap();
    assert!(matches!(ended_by, EndReason::Submitted | EndReason::Terminated));

    // Whichever path won, everyone sees the same stored result.
    let stored = match service.get_result(id, None, t0()).await.unwrap() {
        ResultView::Ready(result) => result,
        other => panic!("expected a scored result, got {:?}", other),
    };
    assert_eq!(stored.ended_by, ended_by);
    if let Ok(outcome) = submitted {
        assert_eq!(outcome.result, stored);
    }
}

#[tokio::test]
async fn attempts_of_other_users_are_not_visible() {
    let service = service();
    let id = service
        .initialize(CANDIDATE, 1, t0())
        .await
        .unwrap()
        .attempt_id;

    let err = service
        .get_status(id, Some(OTHER_CANDIDATE), t0())
        .await
        .unwrap_err();
    assert!(matches!(err, ExamError::NotFound(_)));

    let err = service
        .submit(id, Some(OTHER_CANDIDATE), t0())
        .await
        .unwrap_err();
    assert!(matches!(err, ExamError::NotFound(_)));

    let err = service
        .get_status(Uuid::new_v4(), None, t0())
        .await
        .unwrap_err();
    assert!(matches!(err, ExamError::NotFound(_)));

    // Admin paths pass no owner and can still read it.
    assert!(service.proctor_audit(id).await.is_ok());
}

#[tokio::test]
async fn exams_without_questions_cannot_start() {
    let service = service();

    let err = service.initialize(CANDIDATE, 3, t0()).await.unwrap_err();
    assert!(matches!(err, ExamError::NotFound(_)));

    let err = service.initialize(CANDIDATE, 99, t0()).await.unwrap_err();
    assert!(matches!(err, ExamError::NotFound(_)));
}
