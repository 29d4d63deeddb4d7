use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use captrivia::{api, broadcast, config::ServerConfig, questions::QuestionBank, state::AppState};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "captrivia=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting captrivia...");

    let config = ServerConfig::from_env();

    let bank = match &config.questions_file {
        Some(path) => QuestionBank::from_file(path),
        None => QuestionBank::builtin(),
    };
    let bank = match bank {
        Ok(bank) => {
            tracing::info!("Loaded {} questions", bank.len());
            bank
        }
        Err(e) => {
            tracing::error!("Failed to load question bank: {}", e);
            std::process::exit(1);
        }
    };

    let addr = config.bind_addr;
    let state = Arc::new(AppState::new(bank, config));

    // Spawn background task for archiving completed sessions
    broadcast::spawn_session_reaper(state.clone());

    let app = api::router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
