//! REST adapter for the session registry

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

use crate::protocol::*;
use crate::types::*;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Server returned {status}: {message}")]
    Status {
        status: u16,
        message: String,
        /// Machine-readable failure name, when the server sent one
        code: Option<String>,
    },

    #[error("Response parsing failed: {0}")]
    Decode(String),
}

impl ApiError {
    /// The request conflicted with session state (HTTP 409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Status { status: 409, .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }

    /// The server already holds an answer from this player for the question
    pub fn is_duplicate_answer(&self) -> bool {
        matches!(
            self,
            ApiError::Status { code: Some(code), .. } if code == CODE_ANSWER_ALREADY_SUBMITTED
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// Request/response calls against the session registry
#[async_trait]
pub trait TriviaApi: Send + Sync {
    async fn start_game(&self, num_questions: Option<usize>) -> Result<StartGameResponse, ApiError>;

    /// Join a session; passing a known `player_id` rejoins as that player
    async fn join_game(
        &self,
        session_id: &str,
        player_id: Option<&str>,
    ) -> Result<JoinGameResponse, ApiError>;

    async fn fetch_questions(&self, session_id: &str) -> Result<Vec<Question>, ApiError>;

    async fn submit_answer(&self, req: &AnswerRequest) -> Result<AnswerResponse, ApiError>;

    async fn mark_finished(&self, session_id: &str, player_id: &str) -> Result<(), ApiError>;

    async fn final_scores(&self, session_id: &str) -> Result<FinalScores, ApiError>;

    async fn leaderboard(&self) -> Result<HashMap<PlayerId, u32>, ApiError>;
}

/// [`TriviaApi`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-2xx response into [`ApiError::Status`] using the `{error}` body
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let (message, code) = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(e) => (e.error, e.code),
            Err(_) => (body, None),
        };
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
            code,
        })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let response = Self::check(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl TriviaApi for HttpApi {
    async fn start_game(&self, num_questions: Option<usize>) -> Result<StartGameResponse, ApiError> {
        let response = self
            .client
            .post(self.url("/game/start"))
            .json(&StartGameRequest { num_questions })
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn join_game(
        &self,
        session_id: &str,
        player_id: Option<&str>,
    ) -> Result<JoinGameResponse, ApiError> {
        let body = JoinGameRequest {
            session_id: session_id.to_string(),
            player_id: player_id.map(str::to_string),
        };
        let response = self
            .client
            .post(self.url("/game/join"))
            .json(&body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn fetch_questions(&self, session_id: &str) -> Result<Vec<Question>, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/questions/{}", session_id)))
            .send()
            .await?;
        let body: QuestionsResponse = Self::decode(response).await?;
        Ok(body.questions)
    }

    async fn submit_answer(&self, req: &AnswerRequest) -> Result<AnswerResponse, ApiError> {
        let response = self
            .client
            .post(self.url("/answer"))
            .json(req)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn mark_finished(&self, session_id: &str, player_id: &str) -> Result<(), ApiError> {
        let body = PlayerFinishedRequest {
            session_id: session_id.to_string(),
            player_id: player_id.to_string(),
        };
        let response = self
            .client
            .post(self.url("/player/finished"))
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn final_scores(&self, session_id: &str) -> Result<FinalScores, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/final-scores/{}", session_id)))
            .send()
            .await?;
        let body: FinalScoresResponse = Self::decode(response).await?;
        Ok(body.into())
    }

    async fn leaderboard(&self) -> Result<HashMap<PlayerId, u32>, ApiError> {
        let response = self.client.get(self.url("/leaderboard")).send().await?;
        Self::decode(response).await
    }
}
