// src/handlers/attempt.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        attempt::{RecordAnswerRequest, ResultView},
        violation::RawProctorSignal,
    },
    services::exam_service::ExamService,
    utils::jwt::Claims,
};

/// Owner filter for read-only endpoints: admins may look at any attempt.
fn viewer(claims: &Claims) -> Result<Option<i64>, AppError> {
    if claims.is_admin() {
        Ok(None)
    } else {
        claims.user_id().map(Some)
    }
}

/// Starts an attempt of the given exam for the authenticated user.
///
/// * Rejects with 409 if the user already has an attempt in progress.
/// * Returns the question paper without correct answers.
pub async fn start_attempt(
    State(service): State<Arc<ExamService>>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let started = service.initialize(user_id, exam_id, Utc::now()).await?;

    Ok((StatusCode::CREATED, Json(started)))
}

/// Status, remaining time and warning level of an attempt.
pub async fn get_status(
    State(service): State<Arc<ExamService>>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let status = service
        .get_status(attempt_id, viewer(&claims)?, Utc::now())
        .await?;

    Ok(Json(status))
}

/// Questions, answers and flags of an attempt, for resuming after a reconnect.
pub async fn get_paper(
    State(service): State<Arc<ExamService>>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let paper = service
        .get_paper(attempt_id, Some(claims.user_id()?), Utc::now())
        .await?;

    Ok(Json(paper))
}

/// Records (or replaces) the answer to one question.
pub async fn record_answer(
    State(service): State<Arc<ExamService>>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<RecordAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let recorded = service
        .record_answer(
            attempt_id,
            Some(claims.user_id()?),
            req.question_id,
            req.selection,
            Utc::now(),
        )
        .await?;

    Ok(Json(recorded))
}

/// Flags or unflags a question for review.
pub async fn toggle_flag(
    State(service): State<Arc<ExamService>>,
    Extension(claims): Extension<Claims>,
    Path((attempt_id, question_id)): Path<(Uuid, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let toggled = service
        .toggle_flag(attempt_id, Some(claims.user_id()?), question_id, Utc::now())
        .await?;

    Ok(Json(toggled))
}

/// Ingests one signal from the client-side proctor.
///
/// Retried deliveries with a known sequence number are acknowledged with
/// `duplicate: true` and change nothing.
pub async fn ingest_proctor_event(
    State(service): State<Arc<ExamService>>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(signal): Json<RawProctorSignal>,
) -> Result<impl IntoResponse, AppError> {
    signal.validate()?;

    let ack = service
        .ingest_proctor_event(attempt_id, Some(claims.user_id()?), signal, Utc::now())
        .await?;

    Ok(Json(ack))
}

/// Current proctoring counters of an attempt.
pub async fn get_proctor_summary(
    State(service): State<Arc<ExamService>>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let summary = service
        .proctor_summary(attempt_id, viewer(&claims)?)
        .await?;

    Ok(Json(summary))
}

/// Submits the attempt for scoring.
///
/// Safe to retry: a second call returns the same result with `already_terminal: true`.
pub async fn submit_attempt(
    State(service): State<Arc<ExamService>>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = service
        .submit(attempt_id, Some(claims.user_id()?), Utc::now())
        .await?;

    Ok(Json(outcome))
}

/// Scored result of a finished attempt, or 202 while it is still running.
pub async fn get_result(
    State(service): State<Arc<ExamService>>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let view = service
        .get_result(attempt_id, viewer(&claims)?, Utc::now())
        .await?;

    let status = match view {
        ResultView::Ready(_) => StatusCode::OK,
        ResultView::Pending { .. } => StatusCode::ACCEPTED,
    };
    Ok((status, Json(view)))
}
