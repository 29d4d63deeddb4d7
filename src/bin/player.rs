//! Headless trivia player.
//!
//! `player [SESSION_ID]` joins the given session, or starts a new one and
//! logs its shareable link, then plays it through answering at random.

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use captrivia::client::{
    ChannelStatus, ConnectionManager, HttpApi, ResultsState, SessionController, SessionPhase,
    TriviaApi, Update,
};
use captrivia::config::ClientConfig;

/// Pause before retrying a failed fetch
const RETRY_DELAY: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "captrivia=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env();

    let api = match HttpApi::new(&config.api_base, config.request_timeout) {
        Ok(api) => Arc::new(api),
        Err(e) => {
            tracing::error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let session_id = match std::env::args().nth(1) {
        Some(id) => id,
        None => match api.start_game(None).await {
            Ok(started) => {
                tracing::info!("Started session, share {}", started.shareable_link);
                started.session_id
            }
            Err(e) => {
                tracing::error!("Failed to start a game: {}", e);
                std::process::exit(1);
            }
        },
    };

    let mut manager = ConnectionManager::connect(&config.ws_url, config.backoff()).await;
    if manager.status() != ChannelStatus::Open && manager.reconnect().await != ChannelStatus::Open
    {
        tracing::error!("Push channel unavailable at {}", config.ws_url);
        std::process::exit(1);
    }

    let mut controller =
        SessionController::new(api.clone(), manager.handle(), session_id, config.redirect_grace);
    if let Err(e) = controller.watch_lobby() {
        tracing::warn!("Could not watch the lobby: {}", e);
    }

    match controller.join().await {
        Ok(player) => tracing::info!("Playing as {}", player.player_name),
        Err(e) => {
            tracing::error!("{}", e);
            manager.close().await;
            std::process::exit(1);
        }
    }

    play(&mut controller, &mut manager).await;
    manager.close().await;
}

async fn play(controller: &mut SessionController<HttpApi>, manager: &mut ConnectionManager) {
    loop {
        match controller.phase() {
            SessionPhase::InProgress => {
                if let Some(options) = controller.current_question().map(|q| q.options.len()) {
                    let choice = rand::random_range(0..options);
                    match controller.submit_answer(choice).await {
                        Ok(result) => tracing::info!(
                            "Answered question {}: {} (score {})",
                            result.index,
                            if result.correct { "correct" } else { "wrong" },
                            result.score
                        ),
                        Err(e) => {
                            tracing::warn!("{}", e);
                            tokio::time::sleep(RETRY_DELAY).await;
                        }
                    }
                    continue;
                }
            }
            SessionPhase::FinishedLocal => {
                // No-op once the finish report went through
                if let Err(e) = controller.retry().await {
                    tracing::warn!("{}", e);
                }
            }
            SessionPhase::SessionComplete => {
                match controller.results().clone() {
                    ResultsState::Loaded(scores) => {
                        for entry in &scores.scores {
                            tracing::info!("{}: {}", entry.player_name, entry.score);
                        }
                        tracing::info!("Winners: {}", scores.winners.join(", "));
                    }
                    ResultsState::Failed(e) => {
                        tracing::warn!("{}", e);
                        tokio::time::sleep(RETRY_DELAY).await;
                        let _ = controller.retry().await;
                        continue;
                    }
                    _ => tracing::info!("No scores available"),
                }
                return;
            }
            SessionPhase::FailedToJoin if controller.redirected() => {
                tracing::warn!("Could not join in time; leaving");
                return;
            }
            _ => {}
        }

        match controller.next_update().await {
            Update::Countdown(t) => tracing::info!("Starting in {}...", t),
            Update::PlayerCount(n) => tracing::info!("{} player(s) in session", n),
            Update::Error(e) => {
                tracing::warn!("{}", e);
                tokio::time::sleep(RETRY_DELAY).await;
                if let Err(e) = controller.retry().await {
                    tracing::warn!("Retry failed: {}", e);
                }
            }
            Update::Offline => {
                if manager.reconnect().await != ChannelStatus::Open {
                    tracing::error!("Lost the push channel for good");
                    return;
                }
                if let Err(e) = controller.on_reconnected() {
                    tracing::warn!("{}", e);
                }
            }
            _ => {}
        }
    }
}
