//! Question bank loading and per-session sampling

use std::collections::HashSet;
use std::path::Path;

use rand::seq::IndexedRandom;

use crate::types::QuestionRecord;

const BUILTIN_QUESTIONS: &str = include_str!("../data/questions.json");

#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("Failed to read question bank: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse question bank: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Question bank is empty")]
    Empty,

    #[error("Invalid question {id}: {reason}")]
    Invalid { id: String, reason: String },
}

/// Immutable pool of questions sessions draw from
#[derive(Debug, Clone)]
pub struct QuestionBank {
    questions: Vec<QuestionRecord>,
}

impl QuestionBank {
    pub fn new(questions: Vec<QuestionRecord>) -> Result<Self, BankError> {
        if questions.is_empty() {
            return Err(BankError::Empty);
        }

        let mut seen = HashSet::new();
        for q in &questions {
            if !seen.insert(q.id.as_str()) {
                return Err(BankError::Invalid {
                    id: q.id.clone(),
                    reason: "duplicate id".to_string(),
                });
            }
            if q.options.len() < 2 {
                return Err(BankError::Invalid {
                    id: q.id.clone(),
                    reason: "needs at least two options".to_string(),
                });
            }
            if q.correct_index >= q.options.len() {
                return Err(BankError::Invalid {
                    id: q.id.clone(),
                    reason: format!(
                        "correctIndex {} out of range for {} options",
                        q.correct_index,
                        q.options.len()
                    ),
                });
            }
        }

        Ok(Self { questions })
    }

    pub fn from_json(raw: &str) -> Result<Self, BankError> {
        Self::new(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, BankError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// The bank compiled into the binary
    pub fn builtin() -> Result<Self, BankError> {
        Self::from_json(BUILTIN_QUESTIONS)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Draw `count` distinct questions in random order.
    /// `count` is clamped to `1..=len`.
    pub fn sample(&self, count: usize) -> Vec<QuestionRecord> {
        let count = count.clamp(1, self.questions.len());
        let mut rng = rand::rng();
        self.questions
            .choose_multiple(&mut rng, count)
            .cloned()
            .collect()
    }
}
