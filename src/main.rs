// src/main.rs

use std::{path::Path, sync::Arc, time::Duration};

use exam_proctor::{
    config::Config,
    routes,
    services::{
        exam_service::ExamService,
        postgres::PgStore,
        store::{AttemptStore, InMemoryAttemptStore, InMemoryQuestionBank, QuestionBank},
        sweeper::spawn_expiry_sweeper,
    },
    state::AppState,
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load configuration from environment (.env included)
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let (store, bank): (Arc<dyn AttemptStore>, Arc<dyn QuestionBank>) =
        match &config.database_url {
            Some(url) => {
                let pool = match connect_with_retry(url).await {
                    Ok(pool) => pool,
                    Err(e) => {
                        tracing::error!("Failed to connect to database after 5 retries: {}", e);
                        std::process::exit(1);
                    }
                };
                tracing::info!("Database connected...");

                // Run Migrations Automatically
                tracing::info!("Running migrations...");
                if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                    tracing::error!("Failed to run database migrations: {}", e);
                    std::process::exit(1);
                }
                tracing::info!("Migrations applied successfully.");

                let pg = Arc::new(PgStore::new(pool));
                let store: Arc<dyn AttemptStore> = pg.clone();
                let bank: Arc<dyn QuestionBank> = pg;
                (store, bank)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, attempts are kept in memory only");
                let bank = match &config.question_bank_path {
                    Some(path) => match load_question_bank(path) {
                        Ok(bank) => bank,
                        Err(e) => {
                            tracing::error!("Failed to load question bank {:?}: {}", path, e);
                            std::process::exit(1);
                        }
                    },
                    None => InMemoryQuestionBank::new(),
                };
                let store: Arc<dyn AttemptStore> = Arc::new(InMemoryAttemptStore::new());
                let bank: Arc<dyn QuestionBank> = Arc::new(bank);
                (store, bank)
            }
        };

    let service = Arc::new(ExamService::new(store, bank, config.policy));
    let _sweeper = spawn_expiry_sweeper(service.clone(), config.sweep_interval);

    let addr = config.bind_addr;
    let state = AppState {
        service,
        config: config.clone(),
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    // Start the server
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}

fn load_question_bank(path: &Path) -> Result<InMemoryQuestionBank, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let bank = InMemoryQuestionBank::from_json(&raw)?;
    tracing::info!("Loaded question bank from {:?}", path);
    Ok(bank)
}

/// Connects to Postgres, retrying while the database comes up.
async fn connect_with_retry(url: &str) -> Result<PgPool, sqlx::Error> {
    let mut retry_count = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    return Err(e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
