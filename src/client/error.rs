use crate::types::{QuestionId, SessionId};

/// Failures the client surfaces as visible state. None of them are fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to join session {session_id}: {reason}")]
    JoinFailed {
        session_id: SessionId,
        reason: String,
    },

    #[error("Answer submission failed: {0}")]
    AnswerSubmitFailed(String),

    #[error("Answer already submitted for question {0}")]
    AnswerAlreadySubmitted(QuestionId),

    #[error("Push channel closed")]
    ChannelClosed,

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Failed to report finish: {0}")]
    ReportFailed(String),

    #[error("Failed to start game: {0}")]
    StartFailed(String),

    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Not allowed in current state: {0}")]
    InvalidState(&'static str),
}

pub type ClientResult<T> = Result<T, ClientError>;
