use super::{AppState, StateError};
use crate::protocol::PushMessage;
use crate::types::*;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Capacity of each session's push group
const PUSH_CHANNEL_CAPACITY: usize = 64;

/// Bytes of randomness in a session id (hex-encoded)
const SESSION_ID_BYTES: usize = 16;

fn generate_session_id() -> SessionId {
    hex::encode(rand::random::<[u8; SESSION_ID_BYTES]>())
}

/// One trivia match: fixed questions, joined players and a push group
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub questions: Vec<QuestionRecord>,
    /// Players in join order
    pub players: Vec<Player>,
    pub lifecycle: SessionLifecycle,
    pub countdown_remaining: Option<u32>,
    pub created_at: Instant,
    pub completed_at: Option<Instant>,
    push: broadcast::Sender<PushMessage>,
}

impl Session {
    fn new(id: SessionId, questions: Vec<QuestionRecord>) -> Self {
        let (push, _rx) = broadcast::channel(PUSH_CHANNEL_CAPACITY);
        Self {
            id,
            questions,
            players: Vec::new(),
            lifecycle: SessionLifecycle::Lobby,
            countdown_remaining: None,
            created_at: Instant::now(),
            completed_at: None,
            push,
        }
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    pub fn question(&self, question_id: &str) -> Option<&QuestionRecord> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn high_score(&self) -> u32 {
        self.players.iter().map(|p| p.score).max().unwrap_or(0)
    }

    pub fn all_finished(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| p.finished)
    }

    /// Send a message to every bound socket
    pub fn broadcast(&self, msg: PushMessage) {
        // No bound sockets is fine
        let _ = self.push.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushMessage> {
        self.push.subscribe()
    }

    /// Move to COMPLETE and announce it. Returns false if already complete.
    pub(super) fn complete(&mut self) -> bool {
        if self.lifecycle == SessionLifecycle::Complete {
            return false;
        }
        self.lifecycle = SessionLifecycle::Complete;
        self.countdown_remaining = None;
        self.completed_at = Some(Instant::now());
        self.broadcast(PushMessage::SessionComplete);
        true
    }

    /// What a newly bound socket needs to catch up with the session
    fn catch_up(&self) -> Option<PushMessage> {
        match self.lifecycle {
            SessionLifecycle::Lobby => None,
            SessionLifecycle::Countdown => self
                .countdown_remaining
                .map(|time| PushMessage::Countdown { time }),
            SessionLifecycle::Active => Some(PushMessage::Countdown { time: 0 }),
            SessionLifecycle::Complete => Some(PushMessage::SessionComplete),
        }
    }
}

/// Result of a REST join
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub player: Player,
    /// True when this join started the lobby countdown
    pub countdown_started: bool,
}

impl AppState {
    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Create a session with a random draw of questions
    pub async fn create_session(&self, num_questions: Option<usize>) -> SessionId {
        let requested = num_questions.unwrap_or(self.config.default_questions);
        let count = requested.clamp(1, self.config.max_questions);
        let questions = self.bank.sample(count);

        let mut sessions = self.sessions.write().await;
        let id = loop {
            let candidate = generate_session_id();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        tracing::info!(
            "Created session {} with {} questions",
            id,
            questions.len()
        );
        sessions.insert(id.clone(), Session::new(id.clone(), questions));
        id
    }

    /// Admit a player to a session still in its lobby
    pub async fn join_session(
        &self,
        session_id: &str,
        player_id: Option<&str>,
    ) -> Result<JoinOutcome, StateError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StateError::SessionNotFound(session_id.to_string()))?;

        // Rejoining with a known id never creates a second player
        if let Some(existing) = player_id.and_then(|id| session.player(id)) {
            tracing::info!("Player {} rejoined session {}", existing.id, session_id);
            return Ok(JoinOutcome {
                player: existing.clone(),
                countdown_started: false,
            });
        }

        if matches!(
            session.lifecycle,
            SessionLifecycle::Active | SessionLifecycle::Complete
        ) {
            return Err(StateError::SessionStarted);
        }

        let player = Player::new(
            ulid::Ulid::new().to_string(),
            format!("Player {}", session.players.len() + 1),
        );
        session.players.push(player.clone());
        session.broadcast(PushMessage::PlayerCount {
            count: session.players.len(),
        });

        let countdown_started = session.lifecycle == SessionLifecycle::Lobby;
        if countdown_started {
            session.lifecycle = SessionLifecycle::Countdown;
            session.countdown_remaining = Some(self.config.countdown_seconds);
        }

        tracing::info!(
            "{} ({}) joined session {}, {} player(s)",
            player.name,
            player.id,
            session_id,
            session.players.len()
        );

        Ok(JoinOutcome {
            player,
            countdown_started,
        })
    }

    /// Broadcast the current countdown value and step it down.
    ///
    /// The zero tick and the switch to ACTIVE happen under one lock, so every
    /// bound socket sees zero before any answer can be accepted. Returns the
    /// value that was broadcast, or None when no countdown is running.
    pub async fn countdown_tick(&self, session_id: &str) -> Option<u32> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id)?;
        if session.lifecycle != SessionLifecycle::Countdown {
            return None;
        }

        let time = session.countdown_remaining.unwrap_or(0);
        session.broadcast(PushMessage::Countdown { time });

        if time == 0 {
            session.lifecycle = SessionLifecycle::Active;
            session.countdown_remaining = None;
            tracing::info!("Session {} is now active", session_id);
        } else {
            session.countdown_remaining = Some(time - 1);
        }
        Some(time)
    }

    /// Attach a push socket to a session
    ///
    /// Returns the receiver plus a catch-up message for the new socket.
    pub async fn bind_channel(
        &self,
        session_id: &str,
    ) -> Result<(broadcast::Receiver<PushMessage>, Option<PushMessage>), StateError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| StateError::SessionNotFound(session_id.to_string()))?;

        let rx = session.subscribe();
        session.broadcast(PushMessage::PlayerCount {
            count: session.players.len(),
        });
        Ok((rx, session.catch_up()))
    }

    /// Snapshot for a socket that fell behind its push group: the player
    /// count, the high score and the lifecycle catch-up message
    pub async fn resync(&self, session_id: &str) -> Vec<PushMessage> {
        let sessions = self.sessions.read().await;
        let Some(session) = sessions.get(session_id) else {
            return Vec::new();
        };
        let mut messages = vec![
            PushMessage::PlayerCount {
                count: session.players.len(),
            },
            PushMessage::HighScore {
                score: session.high_score(),
            },
        ];
        messages.extend(session.catch_up());
        messages
    }

    pub async fn get_questions(&self, session_id: &str) -> Result<Vec<Question>, StateError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| StateError::SessionNotFound(session_id.to_string()))?;
        Ok(session.questions.iter().map(QuestionRecord::public).collect())
    }

    /// Complete an ACTIVE session that ran out of time.
    /// Returns true if this call completed it.
    pub async fn expire_session(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(session) if session.lifecycle == SessionLifecycle::Active => {
                tracing::info!("Session {} timed out", session_id);
                session.complete()
            }
            _ => false,
        }
    }

    /// Drop sessions that completed longer than `retention` ago, and lobbies
    /// nobody joined within `lobby_ttl`
    pub async fn reap_sessions(&self, retention: Duration, lobby_ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let mut abandoned = 0;
        sessions.retain(|_, s| match (s.completed_at, s.lifecycle) {
            (Some(at), _) => at.elapsed() < retention,
            (None, SessionLifecycle::Lobby) if s.created_at.elapsed() >= lobby_ttl => {
                abandoned += 1;
                false
            }
            _ => true,
        });
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(
                "Archived {} session(s), {} of them abandoned lobbies",
                removed,
                abandoned
            );
        }
        removed
    }
}
