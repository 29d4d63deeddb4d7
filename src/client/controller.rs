//! Client session controller.
//!
//! Merges push events, REST join completions and the redirect timer into one
//! ordered queue and applies them one at a time, so every transition sees a
//! consistent state. In particular a countdown zero that is dequeued before
//! the join result always yields FAILED_TO_JOIN.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::api::{ApiError, TriviaApi};
use super::completion::CompletionListener;
use super::connection::{ChannelEvent, ConnectionHandle, Subscription};
use super::countdown::{CountdownState, CountdownSync, GraceTimer, TickOutcome};
use super::error::{ClientError, ClientResult};
use super::flow::{AnswerResult, FlowState, GameFlow};
use super::join::{JoinCoordinator, JoinedPlayer};
use super::results::{FinalResults, ResultsState};
use crate::protocol::{JoinGameResponse, PushMessage};
use crate::types::*;

/// One explicit phase for the whole client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Lobby,
    FailedToJoin,
    AwaitingQuestions,
    InProgress,
    FinishedLocal,
    SessionComplete,
}

/// What processing one input changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    PlayerCount(usize),
    Countdown(u32),
    HighScore(u32),
    Phase(SessionPhase),
    Joined(JoinedPlayer),
    JoinFailed(ClientError),
    /// A fetch failed; `retry` tries again
    Error(ClientError),
    /// The grace period after FAILED_TO_JOIN ran out; leave the session
    Redirect,
    /// The push channel dropped; push-driven transitions stall until reconnect
    Offline,
    Ignored,
}

enum Input {
    Channel(ChannelEvent),
    Joined(Result<JoinGameResponse, ApiError>),
}

pub struct SessionController<A: TriviaApi + 'static> {
    api: Arc<A>,
    handle: ConnectionHandle,
    session_id: SessionId,
    join: JoinCoordinator,
    countdown: CountdownSync,
    flow: Option<GameFlow>,
    completion: CompletionListener,
    results: FinalResults,
    grace: GraceTimer,
    inputs_tx: mpsc::UnboundedSender<Input>,
    inputs: mpsc::UnboundedReceiver<Input>,
    _subscription: Subscription,
    player_count: usize,
    high_score: u32,
    offline: bool,
    redirected: bool,
}

impl<A: TriviaApi + 'static> SessionController<A> {
    pub fn new(
        api: Arc<A>,
        handle: ConnectionHandle,
        session_id: impl Into<SessionId>,
        redirect_grace: Duration,
    ) -> Self {
        let session_id = session_id.into();
        let (inputs_tx, inputs) = mpsc::unbounded_channel();

        let tx = inputs_tx.clone();
        let subscription = handle.subscribe(
            |_| true,
            move |event| {
                let _ = tx.send(Input::Channel(event));
            },
        );

        Self {
            api,
            join: JoinCoordinator::new(session_id.clone()),
            results: FinalResults::new(session_id.clone()),
            handle,
            session_id,
            countdown: CountdownSync::new(),
            flow: None,
            completion: CompletionListener::new(),
            grace: GraceTimer::new(redirect_grace),
            inputs_tx,
            inputs,
            _subscription: subscription,
            player_count: 0,
            high_score: 0,
            offline: false,
            redirected: false,
        }
    }

    // =========================================================================
    // View
    // =========================================================================

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> SessionPhase {
        match self.countdown.state() {
            CountdownState::Lobby { .. } => SessionPhase::Lobby,
            CountdownState::FailedToJoin => SessionPhase::FailedToJoin,
            CountdownState::ReadyToStart => match self.flow.as_ref().map(GameFlow::state) {
                Some(FlowState::InProgress) => SessionPhase::InProgress,
                Some(FlowState::FinishedLocal) => SessionPhase::FinishedLocal,
                Some(FlowState::SessionComplete) => SessionPhase::SessionComplete,
                Some(FlowState::AwaitingQuestions) | None => SessionPhase::AwaitingQuestions,
            },
        }
    }

    pub fn player(&self) -> Option<&JoinedPlayer> {
        self.join.player()
    }

    pub fn countdown_remaining(&self) -> Option<u32> {
        self.countdown.remaining()
    }

    pub fn player_count(&self) -> usize {
        self.player_count
    }

    pub fn high_score(&self) -> u32 {
        self.high_score
    }

    pub fn score(&self) -> u32 {
        self.flow.as_ref().map(GameFlow::score).unwrap_or(0)
    }

    pub fn question_index(&self) -> usize {
        self.flow.as_ref().map(GameFlow::index).unwrap_or(0)
    }

    pub fn questions(&self) -> &[Question] {
        self.flow.as_ref().map(GameFlow::questions).unwrap_or(&[])
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.flow.as_ref().and_then(GameFlow::current_question)
    }

    pub fn results(&self) -> &ResultsState {
        self.results.state()
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn redirect_pending(&self) -> bool {
        self.grace.is_armed()
    }

    pub fn redirected(&self) -> bool {
        self.redirected
    }

    // =========================================================================
    // Join
    // =========================================================================

    /// Bind the push channel to the session so lobby pushes arrive before
    /// (and independently of) the REST join
    pub fn watch_lobby(&self) -> ClientResult<()> {
        self.join.bind_channel(&self.handle)
    }

    /// Start the REST join in the background. Its result is queued behind
    /// any push already received. Repeat calls while joining or joined are
    /// no-ops.
    pub fn request_join(&mut self) {
        if !self.join.begin() {
            return;
        }
        let api = self.api.clone();
        let tx = self.inputs_tx.clone();
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            let result = api.join_game(&session_id, None).await;
            let _ = tx.send(Input::Joined(result));
        });
    }

    /// Join and process inputs until the join resolves
    pub async fn join(&mut self) -> ClientResult<JoinedPlayer> {
        if let Some(player) = self.join.player() {
            return Ok(player.clone());
        }
        self.request_join();
        loop {
            match self.next_update().await {
                Update::Joined(player) => return Ok(player),
                Update::JoinFailed(e) => return Err(e),
                _ => {}
            }
        }
    }

    // =========================================================================
    // Event processing
    // =========================================================================

    /// Wait for the next input or the redirect timer and apply it
    pub async fn next_update(&mut self) -> Update {
        tokio::select! {
            input = self.inputs.recv() => match input {
                Some(input) => self.apply(input).await,
                // we hold a sender, so the queue never closes
                None => Update::Ignored,
            },
            _ = self.grace.fired() => {
                tracing::info!("Redirecting away from session {}", self.session_id);
                self.redirected = true;
                Update::Redirect
            }
        }
    }

    async fn apply(&mut self, input: Input) -> Update {
        match input {
            Input::Channel(ChannelEvent::Message(msg)) => self.on_push(msg).await,
            Input::Channel(ChannelEvent::Closed) => {
                tracing::warn!("Session {} is offline", self.session_id);
                self.offline = true;
                Update::Offline
            }
            Input::Joined(result) => self.on_join_result(result),
        }
    }

    async fn on_push(&mut self, msg: PushMessage) -> Update {
        match msg {
            PushMessage::PlayerCount { count } => {
                self.player_count = count;
                Update::PlayerCount(count)
            }
            PushMessage::Countdown { time } => self.on_countdown(time).await,
            PushMessage::HighScore { score } => {
                self.high_score = score;
                Update::HighScore(score)
            }
            PushMessage::SessionComplete => self.on_session_complete().await,
            PushMessage::Unknown => Update::Ignored,
        }
    }

    async fn on_countdown(&mut self, time: u32) -> Update {
        match self.countdown.on_tick(time, self.join.is_joined()) {
            TickOutcome::Waiting(remaining) => Update::Countdown(remaining),
            TickOutcome::Started => {
                let player_id = self
                    .join
                    .player()
                    .map(|p| p.player_id.clone())
                    .unwrap_or_default();
                tracing::info!("Session {} started", self.session_id);
                self.flow = Some(GameFlow::new(self.session_id.clone(), player_id));
                match self.load_questions().await {
                    Ok(phase) => Update::Phase(phase),
                    Err(e) => Update::Error(e),
                }
            }
            TickOutcome::FailedToJoin => {
                tracing::warn!(
                    "Countdown for {} ended before the join completed",
                    self.session_id
                );
                self.grace.arm();
                Update::Phase(SessionPhase::FailedToJoin)
            }
            TickOutcome::Ignored => Update::Ignored,
        }
    }

    async fn on_session_complete(&mut self) -> Update {
        // Only participants complete; lobby and failed clients ignore it
        let Some(flow) = self.flow.as_mut() else {
            tracing::debug!("Ignoring sessionComplete outside the game");
            return Update::Ignored;
        };
        if !self.completion.observe(&PushMessage::SessionComplete) {
            return Update::Ignored;
        }
        flow.complete_session();
        tracing::info!("Session {} complete", self.session_id);

        match self.results.fetch(self.api.as_ref()).await {
            ResultsState::Failed(e) => Update::Error(e.clone()),
            _ => Update::Phase(SessionPhase::SessionComplete),
        }
    }

    fn on_join_result(&mut self, result: Result<JoinGameResponse, ApiError>) -> Update {
        let player = match self.join.complete(result) {
            Ok(player) => player,
            Err(e) => return Update::JoinFailed(e),
        };

        if self.countdown.state() == CountdownState::FailedToJoin {
            // Too late to play and nothing can start the game for this
            // client again. The redirect stays armed; the server is told the
            // player is done so the session is not held open for them.
            tracing::info!(
                "Late join for {} on {}; not playing, redirect still pending",
                player.player_name,
                self.session_id
            );
            let api = self.api.clone();
            let session_id = self.session_id.clone();
            let player_id = player.player_id.clone();
            tokio::spawn(async move {
                if let Err(e) = api.mark_finished(&session_id, &player_id).await {
                    tracing::warn!("Failed to release late player {}: {}", player_id, e);
                }
            });
        } else if let Err(e) = self.join.bind_channel(&self.handle) {
            tracing::warn!("Could not bind push channel after join: {}", e);
        }

        Update::Joined(player)
    }

    async fn load_questions(&mut self) -> ClientResult<SessionPhase> {
        let questions = self
            .api
            .fetch_questions(&self.session_id)
            .await
            .map_err(|e| {
                tracing::warn!("Failed to fetch questions for {}: {}", self.session_id, e);
                ClientError::FetchFailed(e.to_string())
            })?;

        let flow = self
            .flow
            .as_mut()
            .ok_or(ClientError::InvalidState("game has not started"))?;
        if flow.questions_loaded(questions)? == FlowState::FinishedLocal {
            self.report_finished().await?;
        }
        Ok(self.phase())
    }

    // =========================================================================
    // Play
    // =========================================================================

    /// Answer the current question with the option at `selected`
    pub async fn submit_answer(&mut self, selected: usize) -> ClientResult<AnswerResult> {
        let flow = self
            .flow
            .as_mut()
            .ok_or(ClientError::InvalidState("game has not started"))?;
        let pending = flow.begin_answer(selected)?;

        let outcome = match self.api.submit_answer(&pending.request).await {
            Ok(response) => Ok(flow.complete_answer(pending, &response)),
            Err(e) if e.is_duplicate_answer() => {
                tracing::warn!(
                    "Server already has an answer for {}: {}",
                    pending.request.question_id,
                    e
                );
                let question_id = pending.request.question_id.clone();
                let result = flow.resolve_duplicate(pending);
                Err((ClientError::AnswerAlreadySubmitted(question_id), result.finished))
            }
            Err(e) => {
                tracing::warn!("Answer submission failed: {}", e);
                flow.abort_answer(pending);
                return Err(ClientError::AnswerSubmitFailed(e.to_string()));
            }
        };

        let finished = match &outcome {
            Ok(result) => result.finished,
            Err((_, finished)) => *finished,
        };
        if finished {
            if let Err(e) = self.report_finished().await {
                tracing::warn!("{}", e);
            }
        }
        outcome.map_err(|(e, _)| e)
    }

    /// Tell the server this player is done. One-shot; repeat calls after a
    /// success do nothing.
    pub async fn report_finished(&mut self) -> ClientResult<()> {
        let Some(flow) = self.flow.as_mut() else {
            return Err(ClientError::InvalidState("game has not started"));
        };
        if !flow.take_finish_report() {
            return Ok(());
        }
        let player_id = flow.player_id().to_string();

        match self.api.mark_finished(&self.session_id, &player_id).await {
            Ok(()) => {
                tracing::info!("Reported {} finished on {}", player_id, self.session_id);
                Ok(())
            }
            Err(e) => {
                if let Some(flow) = self.flow.as_mut() {
                    flow.finish_report_failed();
                }
                Err(ClientError::ReportFailed(e.to_string()))
            }
        }
    }

    /// Retry whatever is stuck on a failed request: questions, the finish
    /// report or the final scores
    pub async fn retry(&mut self) -> ClientResult<SessionPhase> {
        match self.phase() {
            SessionPhase::AwaitingQuestions => self.load_questions().await,
            SessionPhase::FinishedLocal => {
                self.report_finished().await?;
                Ok(self.phase())
            }
            SessionPhase::SessionComplete => match self.results.retry(self.api.as_ref()).await {
                ResultsState::Failed(e) => Err(e.clone()),
                _ => Ok(SessionPhase::SessionComplete),
            },
            phase => Ok(phase),
        }
    }

    /// Call after the connection manager reopened the channel. Earlier
    /// actions are not replayed by the manager, so the binding is redone here.
    pub fn on_reconnected(&mut self) -> ClientResult<()> {
        self.join.bind_channel(&self.handle)?;
        self.offline = false;
        tracing::info!("Session {} back online", self.session_id);
        Ok(())
    }
}
