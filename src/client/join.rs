use super::api::{ApiError, TriviaApi};
use super::connection::ConnectionHandle;
use super::error::{ClientError, ClientResult};
use crate::protocol::{ClientAction, JoinGameResponse};
use crate::types::{PlayerId, SessionId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedPlayer {
    pub player_id: PlayerId,
    pub player_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinState {
    NotJoined,
    Joining,
    Joined(JoinedPlayer),
}

/// Turns a session id into a joined player.
///
/// The REST join and the channel binding are separate handshakes; a player
/// only sees meaningful pushes once both are done.
#[derive(Debug)]
pub struct JoinCoordinator {
    session_id: SessionId,
    state: JoinState,
}

impl JoinCoordinator {
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            state: JoinState::NotJoined,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> &JoinState {
        &self.state
    }

    pub fn player(&self) -> Option<&JoinedPlayer> {
        match &self.state {
            JoinState::Joined(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_joined(&self) -> bool {
        matches!(self.state, JoinState::Joined(_))
    }

    /// Claim the right to issue the REST join. False when a join is already
    /// in flight or done, in which case the caller must not issue another.
    pub fn begin(&mut self) -> bool {
        if self.state != JoinState::NotJoined {
            tracing::debug!("Join for {} already {:?}", self.session_id, self.state);
            return false;
        }
        self.state = JoinState::Joining;
        true
    }

    /// Apply the REST result. A failure leaves identity untouched and allows a retry.
    pub fn complete(
        &mut self,
        result: Result<JoinGameResponse, ApiError>,
    ) -> ClientResult<JoinedPlayer> {
        match result {
            Ok(resp) => {
                let player = JoinedPlayer {
                    player_id: resp.player_id,
                    player_name: resp.player_name,
                };
                tracing::info!(
                    "Joined session {} as {} ({})",
                    self.session_id,
                    player.player_name,
                    player.player_id
                );
                self.state = JoinState::Joined(player.clone());
                Ok(player)
            }
            Err(e) => {
                tracing::warn!("Join for session {} failed: {}", self.session_id, e);
                self.state = JoinState::NotJoined;
                Err(ClientError::JoinFailed {
                    session_id: self.session_id.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Attach the push channel to this session's broadcast group
    pub fn bind_channel(&self, handle: &ConnectionHandle) -> ClientResult<()> {
        handle.send(&ClientAction::JoinSession {
            session_id: self.session_id.clone(),
        })
    }

    /// Join and bind in one go. Calling it again once joined returns the
    /// same player without another request.
    pub async fn join_session(
        &mut self,
        api: &dyn TriviaApi,
        handle: &ConnectionHandle,
    ) -> ClientResult<JoinedPlayer> {
        if let Some(player) = self.player() {
            return Ok(player.clone());
        }
        if !self.begin() {
            return Err(ClientError::InvalidState("join already in flight"));
        }

        let result = api.join_game(&self.session_id, None).await;
        let player = self.complete(result)?;

        // The player is joined even if the channel is down; binding is redone on reconnect
        if let Err(e) = self.bind_channel(handle) {
            tracing::warn!("Could not bind push channel to {}: {}", self.session_id, e);
        }
        Ok(player)
    }
}

#[cfg(test)]
mod tests {
    use super::super::api::fake::FakeApi;
    use super::super::connection::{Backoff, ConnectionManager};
    use super::super::transport::memory::*;
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_join_twice_issues_one_request_and_binds() {
        let (transport, mut peer) = memory_pair();
        let manager = ConnectionManager::connect_with(
            "mem://trivia",
            Arc::new(MemoryConnector::with(vec![transport])),
            Backoff::default(),
        )
        .await;
        let api = FakeApi::new(1);
        let mut join = JoinCoordinator::new("s1");

        let first = join.join_session(&api, &manager.handle()).await.unwrap();
        let second = join.join_session(&api, &manager.handle()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(FakeApi::count(&api.join_calls), 1);
        assert_eq!(
            peer.recv_action().await,
            Some(ClientAction::JoinSession {
                session_id: "s1".into()
            })
        );
    }

    #[test]
    fn test_failed_join_leaves_identity_untouched() {
        let mut join = JoinCoordinator::new("s1");
        assert!(join.begin());
        assert!(!join.begin());

        let err = join
            .complete(Err(ApiError::Status {
                status: 404,
                message: "Session not found: s1".into(),
                code: None,
            }))
            .unwrap_err();
        assert!(matches!(err, ClientError::JoinFailed { .. }));
        assert_eq!(join.state(), &JoinState::NotJoined);
        assert!(join.player().is_none());
        assert!(join.begin());
    }
}
