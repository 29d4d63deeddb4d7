//! HTTP API endpoints for the trivia session registry.
//!
//! JSON in, JSON out. Failures carry `{ "error": "..." }` with a 404 for
//! unknown entities and a 409 for requests that conflict with session state.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::broadcast;
use crate::protocol::*;
use crate::state::{AppState, StateError};
use crate::types::*;
use crate::ws;

impl IntoResponse for StateError {
    fn into_response(self) -> Response {
        let status = match self {
            StateError::SessionNotFound(_)
            | StateError::PlayerNotFound(_)
            | StateError::QuestionNotFound(_) => StatusCode::NOT_FOUND,
            StateError::SessionStarted
            | StateError::SessionNotActive
            | StateError::SessionNotComplete
            | StateError::AnswerAlreadySubmitted(_) => StatusCode::CONFLICT,
        };
        let body = ErrorResponse {
            error: self.to_string(),
            code: Some(self.code().to_string()),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/game/start", post(start_game))
        .route("/game/join", post(join_game))
        .route("/game/join/{session_id}", post(join_game_by_path))
        .route("/questions/{session_id}", get(get_questions))
        .route("/answer", post(submit_answer))
        .route("/player/finished", post(player_finished))
        .route("/final-scores/{session_id}", get(final_scores))
        .route("/leaderboard", get(leaderboard))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Base for shareable links: the configured public URL, else the Host header
fn link_base(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = &state.config.public_url {
        return url.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}", host)
}

/// Create a session.
///
/// POST /game/start
pub async fn start_game(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<StartGameRequest>>,
) -> Json<StartGameResponse> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let session_id = state.create_session(req.num_questions).await;
    let shareable_link = format!("{}/join/{}", link_base(&state, &headers), session_id);

    Json(StartGameResponse {
        session_id,
        shareable_link,
    })
}

async fn join(
    state: Arc<AppState>,
    session_id: &str,
    player_id: Option<&str>,
) -> Result<Json<JoinGameResponse>, StateError> {
    let outcome = state.join_session(session_id, player_id).await?;
    if outcome.countdown_started {
        broadcast::spawn_countdown(state.clone(), session_id.to_string());
    }
    Ok(Json(JoinGameResponse {
        player_id: outcome.player.id,
        player_name: outcome.player.name,
    }))
}

/// Join a session as a new player, or rejoin with a known player id.
///
/// POST /game/join
pub async fn join_game(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JoinGameRequest>,
) -> Result<Json<JoinGameResponse>, StateError> {
    join(state, &req.session_id, req.player_id.as_deref()).await
}

/// POST /game/join/{session_id}
pub async fn join_game_by_path(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<JoinGameResponse>, StateError> {
    join(state, &session_id, None).await
}

/// GET /questions/{session_id}
pub async fn get_questions(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<QuestionsResponse>, StateError> {
    let questions = state.get_questions(&session_id).await?;
    Ok(Json(QuestionsResponse { questions }))
}

/// POST /answer
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, StateError> {
    let outcome = state.submit_answer(&req).await?;
    Ok(Json(AnswerResponse {
        correct: outcome.correct,
        current_score: Some(outcome.current_score),
    }))
}

/// POST /player/finished
pub async fn player_finished(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PlayerFinishedRequest>,
) -> Result<StatusCode, StateError> {
    state.mark_finished(&req.session_id, &req.player_id).await?;
    Ok(StatusCode::OK)
}

/// GET /final-scores/{session_id}
pub async fn final_scores(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<FinalScores>, StateError> {
    Ok(Json(state.final_scores(&session_id).await?))
}

/// GET /leaderboard
pub async fn leaderboard(State(state): State<Arc<AppState>>) -> Json<HashMap<PlayerId, u32>> {
    Json(state.leaderboard().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::state::test_support::bank;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> (Arc<AppState>, Router) {
        let state = Arc::new(AppState::new(bank(), ServerConfig::default()));
        (state.clone(), router(state))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().method(method).uri(uri).header(header::HOST, "trivia.test");
        if body.is_some() {
            req = req.header(header::CONTENT_TYPE, "application/json");
        }
        let req = req
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_start_game_returns_shareable_link() {
        let (_, app) = app();
        let (status, json) = call(&app, "POST", "/game/start", Some(r#"{"numQuestions":3}"#)).await;
        assert_eq!(status, StatusCode::OK);
        let sid = json["sessionId"].as_str().unwrap();
        assert_eq!(
            json["shareableLink"],
            format!("http://trivia.test/join/{}", sid)
        );

        let (_, json) = call(&app, "GET", &format!("/questions/{}", sid), None).await;
        let questions = json["questions"].as_array().unwrap();
        assert_eq!(questions.len(), 3);
        assert!(questions[0].get("correctIndex").is_none());
    }

    #[tokio::test]
    async fn test_start_game_without_body_uses_default() {
        let (state, app) = app();
        let (status, json) = call(&app, "POST", "/game/start", None).await;
        assert_eq!(status, StatusCode::OK);
        let sid = json["sessionId"].as_str().unwrap();
        // default of ten, clamped to the six-question bank
        assert_eq!(state.get_questions(sid).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_join_unknown_session_is_404() {
        let (_, app) = app();
        let (status, json) = call(&app, "POST", "/game/join", Some(r#"{"sessionId":"missing"}"#)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn test_join_by_path_names_players_in_order() {
        let (state, app) = app();
        let sid = state.create_session(Some(2)).await;

        let (status, json) = call(&app, "POST", &format!("/game/join/{}", sid), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["playerName"], "Player 1");

        let body = format!(r#"{{"sessionId":"{}"}}"#, sid);
        let (_, json) = call(&app, "POST", "/game/join", Some(&body)).await;
        assert_eq!(json["playerName"], "Player 2");
    }

    #[tokio::test]
    async fn test_final_scores_conflict_until_complete() {
        let (state, app) = app();
        let sid = state.create_session(Some(2)).await;
        let (status, _) = call(&app, "GET", &format!("/final-scores/{}", sid), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&app, "GET", "/final-scores/unknown", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_answer_before_start_is_conflict() {
        let (state, app) = app();
        let sid = state.create_session(Some(2)).await;
        let player = state.join_session(&sid, None).await.unwrap().player;
        let qid = state.get_questions(&sid).await.unwrap()[0].id.clone();

        let body = serde_json::json!({
            "sessionId": sid,
            "playerId": player.id,
            "questionId": qid,
            "answer": 0,
        })
        .to_string();
        let (status, json) = call(&app, "POST", "/answer", Some(&body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["code"], CODE_SESSION_NOT_ACTIVE);
    }

    #[tokio::test]
    async fn test_repeated_answer_carries_its_own_code() {
        let (state, app) = app();
        let (sid, players) = crate::state::test_support::active_session(&state, 2, 1).await;
        let qid = state.get_questions(&sid).await.unwrap()[0].id.clone();
        let body = serde_json::json!({
            "sessionId": sid,
            "playerId": players[0].id,
            "questionId": qid,
            "answer": 0,
        })
        .to_string();

        let (status, _) = call(&app, "POST", "/answer", Some(&body)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, json) = call(&app, "POST", "/answer", Some(&body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["code"], CODE_ANSWER_ALREADY_SUBMITTED);
    }

    #[tokio::test]
    async fn test_leaderboard_starts_empty() {
        let (_, app) = app();
        let (status, json) = call(&app, "GET", "/leaderboard", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json.as_object().unwrap().is_empty());
    }
}
