// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, attempt},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Every route requires a bearer token; `/api/admin` additionally requires the admin role.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (exam service, config).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let exam_routes = Router::new().route("/{exam_id}/attempts", post(attempt::start_attempt));

    let attempt_routes = Router::new()
        .route("/{attempt_id}", get(attempt::get_status))
        .route("/{attempt_id}/paper", get(attempt::get_paper))
        .route("/{attempt_id}/answers", put(attempt::record_answer))
        .route(
            "/{attempt_id}/flags/{question_id}",
            post(attempt::toggle_flag),
        )
        .route(
            "/{attempt_id}/proctor-events",
            post(attempt::ingest_proctor_event),
        )
        .route("/{attempt_id}/proctor", get(attempt::get_proctor_summary))
        .route("/{attempt_id}/submit", post(attempt::submit_attempt))
        .route("/{attempt_id}/result", get(attempt::get_result));

    let admin_routes = Router::new()
        .route(
            "/attempts/{attempt_id}/proctor",
            get(admin::get_proctor_audit),
        )
        .route("/sweep", post(admin::run_sweep))
        .layer(middleware::from_fn(admin_middleware));

    let api = Router::new()
        .nest("/exams", exam_routes)
        .nest("/attempts", attempt_routes)
        .nest("/admin", admin_routes)
        // Auth runs before admin_middleware (layers apply from outside in)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
