use super::{AppState, StateError};
use crate::types::*;
use std::collections::HashMap;

/// Result of a player reporting they are done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishOutcome {
    /// True when this report completed the session
    pub session_complete: bool,
}

impl AppState {
    /// Mark a player finished. Repeat reports are no-ops.
    ///
    /// Only accepted once the game has started; a session still in its lobby
    /// or countdown cannot be finished. When the last player finishes the
    /// session completes and `sessionComplete` goes out to every bound socket
    /// exactly once.
    pub async fn mark_finished(
        &self,
        session_id: &str,
        player_id: &str,
    ) -> Result<FinishOutcome, StateError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StateError::SessionNotFound(session_id.to_string()))?;

        if !matches!(
            session.lifecycle,
            SessionLifecycle::Active | SessionLifecycle::Complete
        ) {
            return Err(StateError::SessionNotActive);
        }

        let player = session
            .player_mut(player_id)
            .ok_or_else(|| StateError::PlayerNotFound(player_id.to_string()))?;

        if player.finished {
            return Ok(FinishOutcome {
                session_complete: false,
            });
        }
        player.finished = true;
        let settled = player.score;
        tracing::info!(
            "{} finished session {} with {} points",
            player.name,
            session_id,
            settled
        );

        *self
            .leaderboard
            .write()
            .await
            .entry(player_id.to_string())
            .or_insert(0) += settled;

        let session_complete = session.all_finished() && session.complete();
        if session_complete {
            tracing::info!("All players finished session {}", session_id);
        }

        Ok(FinishOutcome { session_complete })
    }

    /// Settled scoreboard, in join order. Only available once COMPLETE.
    pub async fn final_scores(&self, session_id: &str) -> Result<FinalScores, StateError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| StateError::SessionNotFound(session_id.to_string()))?;

        if session.lifecycle != SessionLifecycle::Complete {
            return Err(StateError::SessionNotComplete);
        }

        let entries = session
            .players
            .iter()
            .map(|p| ScoreEntry {
                player_name: p.name.clone(),
                score: p.score,
            })
            .collect();
        Ok(FinalScores::from_entries(entries))
    }

    /// Cumulative settled score per player id
    pub async fn leaderboard(&self) -> HashMap<PlayerId, u32> {
        self.leaderboard.read().await.clone()
    }
}
