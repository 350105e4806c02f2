// src/services/sweeper.rs

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::services::exam_service::ExamService;

/// Spawns the periodic expiry sweep.
///
/// Attempts whose candidate went silent still end on time, within one `interval`.
pub fn spawn_expiry_sweeper(service: Arc<ExamService>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("Expiry sweeper running every {:?}", interval);

        loop {
            ticker.tick().await;
            if let Err(e) = service.sweep_expired(Utc::now()).await {
                tracing::warn!("Expiry sweep failed, retrying next tick: {}", e);
            }
        }
    })
}
