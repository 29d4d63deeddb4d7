//! Per-player progression through a session's questions

use super::error::{ClientError, ClientResult};
use crate::protocol::{AnswerRequest, AnswerResponse};
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    AwaitingQuestions,
    InProgress,
    /// This player answered everything; the session may still be running
    FinishedLocal,
    SessionComplete,
}

/// An answer that has been handed out for sending but not yet resolved.
///
/// Only one exists at a time and it cannot be cloned, so a question is never
/// submitted twice from the same flow.
#[derive(Debug)]
pub struct PendingAnswer {
    pub request: AnswerRequest,
    index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerResult {
    pub correct: bool,
    pub score: u32,
    /// Index of the next question
    pub index: usize,
    pub finished: bool,
}

#[derive(Debug)]
pub struct GameFlow {
    session_id: SessionId,
    player_id: PlayerId,
    questions: Vec<Question>,
    index: usize,
    score: u32,
    state: FlowState,
    in_flight: bool,
    finish_reported: bool,
}

impl GameFlow {
    pub fn new(session_id: impl Into<SessionId>, player_id: impl Into<PlayerId>) -> Self {
        Self {
            session_id: session_id.into(),
            player_id: player_id.into(),
            questions: Vec::new(),
            index: 0,
            score: 0,
            state: FlowState::AwaitingQuestions,
            in_flight: false,
            finish_reported: false,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn current_question(&self) -> Option<&Question> {
        match self.state {
            FlowState::InProgress => self.questions.get(self.index),
            _ => None,
        }
    }

    /// Install the session's question sequence. An empty sequence finishes
    /// the player straight away.
    pub fn questions_loaded(&mut self, questions: Vec<Question>) -> ClientResult<FlowState> {
        if self.state != FlowState::AwaitingQuestions {
            return Err(ClientError::InvalidState("questions already loaded"));
        }
        tracing::info!("Loaded {} question(s) for {}", questions.len(), self.session_id);
        self.questions = questions;
        self.state = if self.questions.is_empty() {
            FlowState::FinishedLocal
        } else {
            FlowState::InProgress
        };
        Ok(self.state)
    }

    /// Prepare the submission for the current question
    pub fn begin_answer(&mut self, selected: usize) -> ClientResult<PendingAnswer> {
        let question = self
            .current_question()
            .ok_or(ClientError::InvalidState("no question to answer"))?;
        if self.in_flight {
            return Err(ClientError::AnswerAlreadySubmitted(question.id.clone()));
        }
        if selected >= question.options.len() {
            return Err(ClientError::InvalidState("option index out of range"));
        }

        let request = AnswerRequest {
            session_id: self.session_id.clone(),
            player_id: self.player_id.clone(),
            question_id: question.id.clone(),
            answer: selected,
        };
        self.in_flight = true;
        Ok(PendingAnswer {
            request,
            index: self.index,
        })
    }

    /// Apply the server's verdict and move to the next question
    pub fn complete_answer(&mut self, pending: PendingAnswer, response: &AnswerResponse) -> AnswerResult {
        debug_assert_eq!(pending.index, self.index);
        if response.correct {
            self.score += POINTS_PER_CORRECT;
        }
        if let Some(server_score) = response.current_score {
            if server_score != self.score {
                tracing::warn!(
                    "Local score {} disagrees with server score {}; taking the server's",
                    self.score,
                    server_score
                );
                self.score = server_score;
            }
        }
        self.advance(response.correct)
    }

    /// The submission never reached a verdict; the same question may be retried
    pub fn abort_answer(&mut self, pending: PendingAnswer) {
        debug_assert_eq!(pending.index, self.index);
        self.in_flight = false;
    }

    /// The server already holds an answer for this question: move on without scoring
    pub fn resolve_duplicate(&mut self, pending: PendingAnswer) -> AnswerResult {
        debug_assert_eq!(pending.index, self.index);
        self.advance(false)
    }

    fn advance(&mut self, correct: bool) -> AnswerResult {
        self.in_flight = false;
        self.index = (self.index + 1).min(self.questions.len());
        if self.index == self.questions.len() && self.state == FlowState::InProgress {
            self.state = FlowState::FinishedLocal;
        }
        AnswerResult {
            correct,
            score: self.score,
            index: self.index,
            finished: self.state != FlowState::InProgress,
        }
    }

    /// Claim the one-shot finish report. True at most once per success.
    pub fn take_finish_report(&mut self) -> bool {
        if self.state == FlowState::InProgress
            || self.state == FlowState::AwaitingQuestions
            || self.finish_reported
        {
            return false;
        }
        self.finish_reported = true;
        true
    }

    /// The finish report failed; allow another attempt
    pub fn finish_report_failed(&mut self) {
        self.finish_reported = false;
    }

    pub fn finish_reported(&self) -> bool {
        self.finish_reported
    }

    /// Session-wide completion. True if this call made the transition.
    pub fn complete_session(&mut self) -> bool {
        if self.state == FlowState::SessionComplete {
            return false;
        }
        self.state = FlowState::SessionComplete;
        self.in_flight = false;
        true
    }
}
