// tests/postgres_tests.rs

use chrono::Utc;
use exam_proctor::{
    config::ExamPolicy,
    engine::attempt::AttemptMachine,
    error::ExamError,
    models::attempt::{AttemptStatus, ExamAttempt},
    services::{
        postgres::PgStore,
        store::{AttemptStore, QuestionBank},
    },
};
use serde_json::json;
use sqlx::{PgPool, postgres::PgPoolOptions, types::Json};
use uuid::Uuid;

const USER_ID: i64 = 501;

/// Connects to the database named by DATABASE_URL and applies migrations.
/// Returns None (and the test is skipped) when no database is configured.
async fn connect() -> Option<PgPool> {
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.is_empty() => url,
        _ => {
            eprintln!("DATABASE_URL not set, skipping Postgres store test");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    Some(pool)
}

/// Inserts a fresh certification with one question, so every test owns its exam id.
async fn seed_exam(pool: &PgPool) -> i64 {
    let (exam_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO certifications (name, passing_score, time_limit_seconds, domains)
        VALUES ($1, 70.0, 1800, $2)
        RETURNING id
        "#,
    )
    .bind(format!("Store test {}", Uuid::new_v4()))
    .bind(Json(json!([{"name": "storage", "weight": 1.0}])))
    .fetch_one(pool)
    .await
    .expect("Failed to insert certification");

    sqlx::query(
        r#"
        INSERT INTO questions (certification_id, content, options, correct_answers, domain)
        VALUES ($1, 'Which one?', $2, $3, 'storage')
        "#,
    )
    .bind(exam_id)
    .bind(Json(json!([{"id": "A", "text": "a"}, {"id": "B", "text": "b"}])))
    .bind(Json(json!(["A"])))
    .execute(pool)
    .await
    .expect("Failed to insert question");

    exam_id
}

async fn new_attempt(store: &PgStore, exam_id: i64) -> ExamAttempt {
    let certification = store
        .get_certification(exam_id)
        .await
        .unwrap()
        .expect("Seeded certification is missing");
    let questions = store.get_questions(exam_id).await.unwrap();
    assert_eq!(questions.len(), 1);

    ExamAttempt::initialize(Uuid::new_v4(), USER_ID, &certification, questions, Utc::now())
        .unwrap()
}

#[tokio::test]
async fn stale_save_is_rejected_and_keeps_version() {
    let Some(pool) = connect().await else {
        return;
    };
    let exam_id = seed_exam(&pool).await;
    let store = PgStore::new(pool);

    let attempt = new_attempt(&store, exam_id).await;
    store.create_attempt(&attempt).await.unwrap();

    let mut first = store.load_attempt(attempt.id).await.unwrap().unwrap();
    let mut stale = first.clone();
    assert_eq!(first.version, 0);

    first.flagged_question_ids.insert(1);
    store.save_attempt(&mut first).await.unwrap();
    assert_eq!(first.version, 1);

    stale.flagged_question_ids.insert(2);
    let err = store.save_attempt(&mut stale).await.unwrap_err();
    assert!(matches!(err, ExamError::Conflict(id) if id == attempt.id));
    assert_eq!(stale.version, 0);

    let stored = store.load_attempt(attempt.id).await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert!(stored.flagged_question_ids.contains(&1));
    assert!(!stored.flagged_question_ids.contains(&2));
}

#[tokio::test]
async fn second_open_attempt_is_a_conflict() {
    let Some(pool) = connect().await else {
        return;
    };
    let exam_id = seed_exam(&pool).await;
    let store = PgStore::new(pool);

    let first = new_attempt(&store, exam_id).await;
    store.create_attempt(&first).await.unwrap();

    let second = new_attempt(&store, exam_id).await;
    let err = store.create_attempt(&second).await.unwrap_err();
    assert!(matches!(err, ExamError::Conflict(_)));

    let open = store.find_open_attempt(USER_ID, exam_id).await.unwrap();
    assert_eq!(open.map(|a| a.id), Some(first.id));
}

#[tokio::test]
async fn scored_attempts_are_not_open() {
    let Some(pool) = connect().await else {
        return;
    };
    let exam_id = seed_exam(&pool).await;
    let store = PgStore::new(pool);
    let policy = ExamPolicy::default();

    let mut attempt = new_attempt(&store, exam_id).await;
    store.create_attempt(&attempt).await.unwrap();
    assert!(store.list_open_attempts().await.unwrap().contains(&attempt.id));

    AttemptMachine::new(&mut attempt, &policy)
        .submit(Utc::now())
        .unwrap();
    assert_eq!(attempt.status, AttemptStatus::Scored);
    store.save_attempt(&mut attempt).await.unwrap();

    assert!(!store.list_open_attempts().await.unwrap().contains(&attempt.id));
    assert!(store.find_open_attempt(USER_ID, exam_id).await.unwrap().is_none());

    // The open-attempt index no longer blocks a new start.
    let next = new_attempt(&store, exam_id).await;
    store.create_attempt(&next).await.unwrap();
    let open = store.find_open_attempt(USER_ID, exam_id).await.unwrap();
    assert_eq!(open.map(|a| a.id), Some(next.id));
}
