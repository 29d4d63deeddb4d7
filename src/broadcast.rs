use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;

/// Spacing between countdown ticks
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// How often the reaper sweeps the session map
const REAP_INTERVAL: Duration = Duration::from_secs(30);

/// Spawn the lobby countdown for a session.
///
/// Broadcasts the remaining seconds once per second down to zero; the zero
/// tick activates the session, after which the session timeout is armed.
pub fn spawn_countdown(state: Arc<AppState>, session_id: String) {
    tokio::spawn(async move {
        tracing::info!("Countdown started for session {}", session_id);

        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;

            match state.countdown_tick(&session_id).await {
                Some(0) => {
                    spawn_session_timeout(state.clone(), session_id.clone());
                    break;
                }
                Some(remaining) => {
                    tracing::debug!("Session {} countdown: {}", session_id, remaining);
                }
                // Session vanished or was moved on by someone else
                None => break,
            }
        }
    });
}

/// Complete a session if it is still ACTIVE once the timeout elapses
pub fn spawn_session_timeout(state: Arc<AppState>, session_id: String) {
    let timeout = state.config.session_timeout;
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        state.expire_session(&session_id).await;
    });
}

/// Spawn a background task that drops completed sessions after the retention
/// window and lobbies nobody joined in time
pub fn spawn_session_reaper(state: Arc<AppState>) {
    let retention = state.config.session_retention;
    let lobby_ttl = state.config.lobby_ttl;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REAP_INTERVAL);
        loop {
            interval.tick().await;
            state.reap_sessions(retention, lobby_ttl).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::protocol::PushMessage;
    use crate::state::test_support::bank;
    use crate::types::SessionLifecycle;

    #[tokio::test(start_paused = true)]
    async fn test_countdown_task_activates_then_times_out() {
        let config = ServerConfig {
            countdown_seconds: 2,
            session_timeout: Duration::from_secs(60),
            ..ServerConfig::default()
        };
        let state = Arc::new(AppState::new(bank(), config));
        let sid = state.create_session(Some(2)).await;
        let (mut rx, _) = state.bind_channel(&sid).await.unwrap();
        rx.recv().await.unwrap();
        state.join_session(&sid, None).await.unwrap();
        rx.recv().await.unwrap();

        spawn_countdown(state.clone(), sid.clone());
        for expected in [2, 1, 0] {
            assert_eq!(
                rx.recv().await.unwrap(),
                PushMessage::Countdown { time: expected }
            );
        }
        assert_eq!(
            state.get_lifecycle(&sid).await,
            Some(SessionLifecycle::Active)
        );

        assert_eq!(rx.recv().await.unwrap(), PushMessage::SessionComplete);
        assert_eq!(
            state.get_lifecycle(&sid).await,
            Some(SessionLifecycle::Complete)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_clears_unjoined_lobby() {
        let config = ServerConfig {
            lobby_ttl: Duration::from_secs(45),
            ..ServerConfig::default()
        };
        let state = Arc::new(AppState::new(bank(), config));
        let sid = state.create_session(None).await;

        spawn_session_reaper(state.clone());
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(state.get_lifecycle(&sid).await.is_some());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(state.get_lifecycle(&sid).await.is_none());
    }
}
