//! Environment-driven configuration for the server and the client.
//!
//! Every value has a default; invalid values are logged and ignored.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::client::Backoff;

/// Read and parse an environment variable, falling back to `default` when it
/// is unset, blank or unparsable.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Ignoring invalid {}={:?}: {}", key, raw, e);
                default
            }
        },
        _ => default,
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Base used for shareable links (falls back to the request Host header)
    pub public_url: Option<String>,
    /// Question bank file (falls back to the built-in bank)
    pub questions_file: Option<PathBuf>,
    pub countdown_seconds: u32,
    pub default_questions: usize,
    pub max_questions: usize,
    /// How long an ACTIVE session may run before it is completed regardless
    pub session_timeout: Duration,
    /// How long a COMPLETE session stays readable before it is dropped
    pub session_retention: Duration,
    /// How long a session may sit in its lobby with nobody joined
    pub lobby_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            public_url: None,
            questions_file: None,
            countdown_seconds: 5,
            default_questions: 10,
            max_questions: 50,
            session_timeout: Duration::from_secs(300),
            session_retention: Duration::from_secs(600),
            lobby_ttl: Duration::from_secs(1800),
        }
    }
}

impl ServerConfig {
    /// Load server config from `TRIVIA_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            bind_addr: env_or("TRIVIA_BIND_ADDR", defaults.bind_addr),
            public_url: env_string("TRIVIA_PUBLIC_URL"),
            questions_file: env_string("TRIVIA_QUESTIONS_FILE").map(PathBuf::from),
            countdown_seconds: env_or("TRIVIA_COUNTDOWN_SECONDS", defaults.countdown_seconds),
            default_questions: env_or("TRIVIA_DEFAULT_QUESTIONS", defaults.default_questions)
                .max(1),
            max_questions: env_or("TRIVIA_MAX_QUESTIONS", defaults.max_questions).max(1),
            session_timeout: Duration::from_secs(env_or(
                "TRIVIA_SESSION_TIMEOUT_SECONDS",
                defaults.session_timeout.as_secs(),
            )),
            session_retention: Duration::from_secs(env_or(
                "TRIVIA_SESSION_RETENTION_SECONDS",
                defaults.session_retention.as_secs(),
            )),
            lobby_ttl: Duration::from_secs(env_or(
                "TRIVIA_LOBBY_TTL_SECONDS",
                defaults.lobby_ttl.as_secs(),
            )),
        };
        tracing::debug!("Server config: {:?}", config);
        config
    }
}

/// Client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base: String,
    pub ws_url: String,
    pub request_timeout: Duration,
    /// Delay between FAILED_TO_JOIN and the redirect away from the session
    pub redirect_grace: Duration,
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub reconnect_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8080".to_string(),
            ws_url: "ws://localhost:8080/ws".to_string(),
            request_timeout: Duration::from_secs(10),
            redirect_grace: Duration::from_secs(3),
            reconnect_initial_delay: Duration::from_millis(500),
            reconnect_max_delay: Duration::from_secs(10),
            reconnect_attempts: 5,
        }
    }
}

impl ClientConfig {
    /// Load client config from `TRIVIA_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: env_string("TRIVIA_API_BASE").unwrap_or(defaults.api_base),
            ws_url: env_string("TRIVIA_WS_URL").unwrap_or(defaults.ws_url),
            request_timeout: Duration::from_secs(env_or(
                "TRIVIA_REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout.as_secs(),
            )),
            redirect_grace: Duration::from_millis(env_or(
                "TRIVIA_REDIRECT_GRACE_MS",
                defaults.redirect_grace.as_millis() as u64,
            )),
            reconnect_initial_delay: Duration::from_millis(env_or(
                "TRIVIA_RECONNECT_INITIAL_MS",
                defaults.reconnect_initial_delay.as_millis() as u64,
            )),
            reconnect_max_delay: Duration::from_millis(env_or(
                "TRIVIA_RECONNECT_MAX_MS",
                defaults.reconnect_max_delay.as_millis() as u64,
            )),
            reconnect_attempts: env_or("TRIVIA_RECONNECT_ATTEMPTS", defaults.reconnect_attempts),
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            self.reconnect_initial_delay,
            self.reconnect_max_delay,
            self.reconnect_attempts,
        )
    }
}
