use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type SessionId = String;
pub type PlayerId = String;
pub type QuestionId = String;

/// Flat reward for a correct answer. The server awards it, clients mirror it.
pub const POINTS_PER_CORRECT: u32 = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionLifecycle {
    Lobby,
    Countdown,
    Active,
    Complete,
}

/// A question as stored in the bank, including its answer key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub id: QuestionId,
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_index: usize,
}

impl QuestionRecord {
    /// The client-facing view (never carries the answer key)
    pub fn public(&self) -> Question {
        Question {
            id: self.id.clone(),
            question_text: self.question_text.clone(),
            options: self.options.clone(),
        }
    }
}

/// A question as delivered to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub question_text: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
    pub finished: bool,
    /// Questions this player has answered, in submission order
    #[serde(default)]
    pub answered: Vec<QuestionId>,
}

impl Player {
    pub fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            score: 0,
            finished: false,
            answered: Vec::new(),
        }
    }

    /// Index of the next question this player will answer
    pub fn current_index(&self) -> usize {
        self.answered.len()
    }

    pub fn has_answered(&self, question_id: &str) -> bool {
        self.answered.iter().any(|q| q == question_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub player_name: String,
    pub score: u32,
}

/// Settled result of a completed session
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FinalScores {
    pub scores: Vec<ScoreEntry>,
    pub winners: Vec<String>,
    pub high_score: u32,
}

impl FinalScores {
    /// Build the scoreboard from settled entries; every entry sharing the
    /// maximal score is a winner.
    pub fn from_entries(scores: Vec<ScoreEntry>) -> Self {
        let high_score = scores.iter().map(|s| s.score).max().unwrap_or(0);
        let winners = scores
            .iter()
            .filter(|s| s.score == high_score)
            .map(|s| s.player_name.clone())
            .collect();
        Self {
            scores,
            winners,
            high_score,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn is_winner(&self, player_name: &str) -> bool {
        self.winners.iter().any(|w| w == player_name)
    }
}
