use super::api::TriviaApi;
use super::error::ClientError;
use crate::types::{FinalScores, SessionId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultsState {
    Idle,
    Loaded(FinalScores),
    /// The session settled with nobody on the scoreboard
    Empty,
    Failed(ClientError),
}

/// Settled scoreboard for one session
#[derive(Debug)]
pub struct FinalResults {
    session_id: SessionId,
    state: ResultsState,
}

impl FinalResults {
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            state: ResultsState::Idle,
        }
    }

    pub fn state(&self) -> &ResultsState {
        &self.state
    }

    pub fn scores(&self) -> Option<&FinalScores> {
        match &self.state {
            ResultsState::Loaded(scores) => Some(scores),
            _ => None,
        }
    }

    pub async fn fetch(&mut self, api: &dyn TriviaApi) -> &ResultsState {
        self.state = match api.final_scores(&self.session_id).await {
            Ok(scores) if scores.is_empty() => {
                tracing::info!("No scores available for session {}", self.session_id);
                ResultsState::Empty
            }
            Ok(scores) => {
                tracing::info!(
                    "Final scores for {}: high score {}, winners {:?}",
                    self.session_id,
                    scores.high_score,
                    scores.winners
                );
                ResultsState::Loaded(scores)
            }
            Err(e) => {
                tracing::warn!("Failed to fetch final scores for {}: {}", self.session_id, e);
                ResultsState::Failed(ClientError::FetchFailed(e.to_string()))
            }
        };
        &self.state
    }

    /// Fetch again after a failure. No-op in any other state.
    pub async fn retry(&mut self, api: &dyn TriviaApi) -> &ResultsState {
        if matches!(self.state, ResultsState::Failed(_)) {
            return self.fetch(api).await;
        }
        &self.state
    }
}
