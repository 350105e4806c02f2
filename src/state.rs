use std::sync::Arc;

use axum::extract::FromRef;

use crate::{config::Config, services::exam_service::ExamService};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ExamService>,
    pub config: Config,
}

impl FromRef<AppState> for Arc<ExamService> {
    fn from_ref(state: &AppState) -> Self {
        state.service.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
