use super::{AppState, StateError};
use crate::protocol::{AnswerRequest, PushMessage};
use crate::types::*;

/// Result of grading one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub correct: bool,
    /// Player's score after this submission
    pub current_score: u32,
}

impl AppState {
    /// Grade an answer and credit the player
    ///
    /// Each player answers each question at most once; a second submission is
    /// rejected without touching the score.
    pub async fn submit_answer(&self, req: &AnswerRequest) -> Result<AnswerOutcome, StateError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&req.session_id)
            .ok_or_else(|| StateError::SessionNotFound(req.session_id.clone()))?;

        if session.lifecycle != SessionLifecycle::Active {
            return Err(StateError::SessionNotActive);
        }

        let correct_index = session
            .question(&req.question_id)
            .map(|q| q.correct_index)
            .ok_or_else(|| StateError::QuestionNotFound(req.question_id.clone()))?;

        let player = session
            .player_mut(&req.player_id)
            .ok_or_else(|| StateError::PlayerNotFound(req.player_id.clone()))?;

        if player.has_answered(&req.question_id) {
            tracing::warn!(
                "Duplicate answer from {} for question {}",
                req.player_id,
                req.question_id
            );
            return Err(StateError::AnswerAlreadySubmitted(req.question_id.clone()));
        }

        player.answered.push(req.question_id.clone());
        let correct = req.answer == correct_index;
        if correct {
            player.score += POINTS_PER_CORRECT;
        }
        let current_score = player.score;

        tracing::debug!(
            "{} answered {} ({}), score {}",
            req.player_id,
            req.question_id,
            if correct { "correct" } else { "wrong" },
            current_score
        );

        if correct {
            let score = session.high_score();
            session.broadcast(PushMessage::HighScore { score });
        }

        Ok(AnswerOutcome {
            correct,
            current_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn request(session_id: &str, player_id: &str, question_id: &str, answer: usize) -> AnswerRequest {
        AnswerRequest {
            session_id: session_id.to_string(),
            player_id: player_id.to_string(),
            question_id: question_id.to_string(),
            answer,
        }
    }

    #[tokio::test]
    async fn test_correct_answer_scores_once() {
        let state = state();
        let (sid, players) = active_session(&state, 3, 1).await;
        let qid = state.get_questions(&sid).await.unwrap()[0].id.clone();
        let key = answer_key(&state, &sid, &qid).await;

        let outcome = state
            .submit_answer(&request(&sid, &players[0].id, &qid, key))
            .await
            .unwrap();
        assert!(outcome.correct);
        assert_eq!(outcome.current_score, POINTS_PER_CORRECT);

        let again = state
            .submit_answer(&request(&sid, &players[0].id, &qid, key))
            .await;
        assert_eq!(again.unwrap_err(), StateError::AnswerAlreadySubmitted(qid));

        let sessions = state.sessions.read().await;
        assert_eq!(sessions[&sid].players[0].score, POINTS_PER_CORRECT);
    }

    #[tokio::test]
    async fn test_wrong_answer_keeps_score() {
        let state = state();
        let (sid, players) = active_session(&state, 3, 1).await;
        let qid = state.get_questions(&sid).await.unwrap()[0].id.clone();
        let key = answer_key(&state, &sid, &qid).await;

        let outcome = state
            .submit_answer(&request(&sid, &players[0].id, &qid, (key + 1) % 4))
            .await
            .unwrap();
        assert!(!outcome.correct);
        assert_eq!(outcome.current_score, 0);
    }

    #[tokio::test]
    async fn test_players_score_the_same_question_independently() {
        let state = state();
        let (sid, players) = active_session(&state, 2, 2).await;
        let qid = state.get_questions(&sid).await.unwrap()[0].id.clone();
        let key = answer_key(&state, &sid, &qid).await;

        for p in &players {
            let outcome = state
                .submit_answer(&request(&sid, &p.id, &qid, key))
                .await
                .unwrap();
            assert_eq!(outcome.current_score, POINTS_PER_CORRECT);
        }
    }

    #[tokio::test]
    async fn test_correct_answer_broadcasts_high_score() {
        let state = state();
        let (sid, players) = active_session(&state, 2, 1).await;
        let (mut rx, _) = state.bind_channel(&sid).await.unwrap();
        // drain the player count sent on bind
        rx.recv().await.unwrap();

        let qid = state.get_questions(&sid).await.unwrap()[0].id.clone();
        let key = answer_key(&state, &sid, &qid).await;
        state
            .submit_answer(&request(&sid, &players[0].id, &qid, key))
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            PushMessage::HighScore {
                score: POINTS_PER_CORRECT
            }
        );
    }

    #[tokio::test]
    async fn test_answers_rejected_outside_active() {
        let state = state();
        let sid = state.create_session(Some(2)).await;
        let player = state.join_session(&sid, None).await.unwrap().player;
        let qid = state.get_questions(&sid).await.unwrap()[0].id.clone();

        let result = state.submit_answer(&request(&sid, &player.id, &qid, 0)).await;
        assert_eq!(result.unwrap_err(), StateError::SessionNotActive);
    }

    #[tokio::test]
    async fn test_unknown_player_or_question() {
        let state = state();
        let (sid, players) = active_session(&state, 2, 1).await;
        let qid = state.get_questions(&sid).await.unwrap()[0].id.clone();

        let result = state.submit_answer(&request(&sid, "ghost", &qid, 0)).await;
        assert_eq!(
            result.unwrap_err(),
            StateError::PlayerNotFound("ghost".to_string())
        );

        let result = state
            .submit_answer(&request(&sid, &players[0].id, "q99", 0))
            .await;
        assert_eq!(
            result.unwrap_err(),
            StateError::QuestionNotFound("q99".to_string())
        );
    }
}
