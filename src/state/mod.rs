mod answer;
mod score;
mod session;

pub use answer::AnswerOutcome;
pub use score::FinishOutcome;
pub use session::{JoinOutcome, Session};

use crate::config::ServerConfig;
use crate::protocol::*;
use crate::questions::QuestionBank;
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Errors surfaced by session operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Player not found: {0}")]
    PlayerNotFound(PlayerId),

    #[error("Question not found: {0}")]
    QuestionNotFound(QuestionId),

    #[error("Session has already started")]
    SessionStarted,

    #[error("Session is not active")]
    SessionNotActive,

    #[error("Session is not complete yet")]
    SessionNotComplete,

    #[error("Answer already submitted for question {0}")]
    AnswerAlreadySubmitted(QuestionId),
}

impl StateError {
    /// Stable machine-readable name sent alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            StateError::SessionNotFound(_) => CODE_SESSION_NOT_FOUND,
            StateError::PlayerNotFound(_) => CODE_PLAYER_NOT_FOUND,
            StateError::QuestionNotFound(_) => CODE_QUESTION_NOT_FOUND,
            StateError::SessionStarted => CODE_SESSION_STARTED,
            StateError::SessionNotActive => CODE_SESSION_NOT_ACTIVE,
            StateError::SessionNotComplete => CODE_SESSION_NOT_COMPLETE,
            StateError::AnswerAlreadySubmitted(_) => CODE_ANSWER_ALREADY_SUBMITTED,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    /// Cumulative settled score per player across sessions
    pub leaderboard: Arc<RwLock<HashMap<PlayerId, u32>>>,
    pub bank: Arc<QuestionBank>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(bank: QuestionBank, config: ServerConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            leaderboard: Arc::new(RwLock::new(HashMap::new())),
            bank: Arc::new(bank),
            config: Arc::new(config),
        }
    }

    pub async fn get_lifecycle(&self, session_id: &str) -> Option<SessionLifecycle> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.lifecycle)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn bank() -> QuestionBank {
        let questions = (1..=6)
            .map(|i| QuestionRecord {
                id: format!("q{}", i),
                question_text: format!("Question {}", i),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_index: i % 4,
            })
            .collect();
        QuestionBank::new(questions).unwrap()
    }

    pub fn state() -> AppState {
        AppState::new(bank(), ServerConfig::default())
    }

    /// Drive a fresh session with `players` joined straight to ACTIVE
    pub async fn active_session(
        state: &AppState,
        num_questions: usize,
        players: usize,
    ) -> (SessionId, Vec<Player>) {
        let session_id = state.create_session(Some(num_questions)).await;
        let mut joined = Vec::new();
        for _ in 0..players {
            let outcome = state.join_session(&session_id, None).await.unwrap();
            joined.push(outcome.player);
        }
        while let Some(remaining) = state.countdown_tick(&session_id).await {
            if remaining == 0 {
                break;
            }
        }
        (session_id, joined)
    }

    /// Correct option for a question in a session
    pub async fn answer_key(state: &AppState, session_id: &str, question_id: &str) -> usize {
        let sessions = state.sessions.read().await;
        sessions[session_id]
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .map(|q| q.correct_index)
            .unwrap()
    }
}
