use crate::types::*;
use serde::{Deserialize, Serialize};

// ========== Push channel ==========

/// Messages pushed by the server to every socket bound to a session.
///
/// Tags the server may add later decode to [`PushMessage::Unknown`] so that
/// older clients keep working.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PushMessage {
    PlayerCount {
        count: usize,
    },
    /// Remaining lobby seconds; zero is sent once and starts the game
    Countdown {
        time: u32,
    },
    HighScore {
        score: u32,
    },
    /// Every player finished, or the session timed out
    SessionComplete,
    #[serde(other)]
    Unknown,
}

impl PushMessage {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            PushMessage::PlayerCount { .. } => "playerCount",
            PushMessage::Countdown { .. } => "countdown",
            PushMessage::HighScore { .. } => "highScore",
            PushMessage::SessionComplete => "sessionComplete",
            PushMessage::Unknown => "unknown",
        }
    }
}

/// Messages sent by clients over the push channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClientAction {
    /// Attach this socket to the session's broadcast group
    #[serde(rename_all = "camelCase")]
    JoinSession { session_id: SessionId },
    #[serde(other)]
    Unknown,
}

// ========== REST bodies ==========

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_questions: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartGameResponse {
    pub session_id: SessionId,
    pub shareable_link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGameRequest {
    pub session_id: SessionId,
    /// Rejoin as an existing player instead of creating a new one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinGameResponse {
    pub player_id: PlayerId,
    pub player_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionsResponse {
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub session_id: SessionId,
    pub player_id: PlayerId,
    pub question_id: QuestionId,
    /// Index into the question's option list
    pub answer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    pub correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_score: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerFinishedRequest {
    pub session_id: SessionId,
    pub player_id: PlayerId,
}

/// Final scores as read off the wire. Older servers send `null` for empty
/// lists, so every field is optional here and normalized by the `From` impl.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalScoresResponse {
    #[serde(default)]
    pub scores: Option<Vec<ScoreEntry>>,
    #[serde(default)]
    pub winners: Option<Vec<String>>,
    #[serde(default)]
    pub high_score: Option<u32>,
}

impl From<FinalScoresResponse> for FinalScores {
    fn from(r: FinalScoresResponse) -> Self {
        Self {
            scores: r.scores.unwrap_or_default(),
            winners: r.winners.unwrap_or_default(),
            high_score: r.high_score.unwrap_or(0),
        }
    }
}

/// Error body of every failed REST call.
///
/// `code` names the failure so clients can tell conflicts apart without
/// parsing `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

// ========== Error codes ==========

pub const CODE_SESSION_NOT_FOUND: &str = "sessionNotFound";
pub const CODE_PLAYER_NOT_FOUND: &str = "playerNotFound";
pub const CODE_QUESTION_NOT_FOUND: &str = "questionNotFound";
pub const CODE_SESSION_STARTED: &str = "sessionStarted";
pub const CODE_SESSION_NOT_ACTIVE: &str = "sessionNotActive";
pub const CODE_SESSION_NOT_COMPLETE: &str = "sessionNotComplete";
pub const CODE_ANSWER_ALREADY_SUBMITTED: &str = "answerAlreadySubmitted";
