//! Client side of a trivia session: push channel, join, lobby countdown,
//! per-player game flow, completion and final results.
//!
//! [`SessionController`] wires the pieces together; each piece is usable on
//! its own.

mod api;
mod completion;
mod connection;
mod controller;
mod countdown;
mod error;
mod flow;
mod join;
mod results;
mod transport;

pub use api::{ApiError, HttpApi, TriviaApi};
pub use completion::CompletionListener;
pub use connection::{
    Backoff, ChannelEvent, ChannelStatus, ConnectionHandle, ConnectionManager, Subscription,
};
pub use controller::{SessionController, SessionPhase, Update};
pub use countdown::{CountdownState, CountdownSync, GraceTimer, TickOutcome};
pub use error::{ClientError, ClientResult};
pub use flow::{AnswerResult, FlowState, GameFlow, PendingAnswer};
pub use join::{JoinCoordinator, JoinState, JoinedPlayer};
pub use results::{FinalResults, ResultsState};
pub use transport::{Connector, Transport, TransportError, WsConnector, WsTransport};
