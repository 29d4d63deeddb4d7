// Public API for integration tests, the server binary and the player bot

pub mod api;
pub mod broadcast;
pub mod client;
pub mod config;
pub mod protocol;
pub mod questions;
pub mod state;
pub mod types;
pub mod ws;
