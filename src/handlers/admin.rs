// src/handlers/admin.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{error::AppError, services::exam_service::ExamService};

/// Full proctoring record of an attempt, including every accepted event.
/// Admin only.
pub async fn get_proctor_audit(
    State(service): State<Arc<ExamService>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let audit = service.proctor_audit(attempt_id).await?;

    Ok(Json(audit))
}

/// Runs the expiry sweep immediately instead of waiting for the next tick.
/// Admin only.
pub async fn run_sweep(
    State(service): State<Arc<ExamService>>,
) -> Result<impl IntoResponse, AppError> {
    let report = service.sweep_expired(Utc::now()).await.map_err(|e| {
        tracing::error!("Manual expiry sweep failed: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(report))
}
