//! Lobby countdown and the redirect grace timer

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    /// Waiting room; `remaining` is the last tick seen
    Lobby { remaining: Option<u32> },
    ReadyToStart,
    /// Countdown ended before the join completed. Terminal.
    FailedToJoin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Waiting(u32),
    Started,
    FailedToJoin,
    /// The countdown already ended
    Ignored,
}

#[derive(Debug)]
pub struct CountdownSync {
    state: CountdownState,
}

impl Default for CountdownSync {
    fn default() -> Self {
        Self::new()
    }
}

impl CountdownSync {
    pub fn new() -> Self {
        Self {
            state: CountdownState::Lobby { remaining: None },
        }
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    pub fn remaining(&self) -> Option<u32> {
        match self.state {
            CountdownState::Lobby { remaining } => remaining,
            _ => None,
        }
    }

    /// Apply a pushed tick. The latest value always wins; zero leaves the
    /// lobby exactly once.
    pub fn on_tick(&mut self, time: u32, joined: bool) -> TickOutcome {
        if !matches!(self.state, CountdownState::Lobby { .. }) {
            return TickOutcome::Ignored;
        }
        if time > 0 {
            self.state = CountdownState::Lobby {
                remaining: Some(time),
            };
            return TickOutcome::Waiting(time);
        }
        if joined {
            self.state = CountdownState::ReadyToStart;
            TickOutcome::Started
        } else {
            self.state = CountdownState::FailedToJoin;
            TickOutcome::FailedToJoin
        }
    }
}

/// Single deferred redirect, cancelable until it fires
#[derive(Debug)]
pub struct GraceTimer {
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl GraceTimer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, sleep: None }
    }

    /// Start the timer. Arming an armed timer keeps the original deadline.
    pub fn arm(&mut self) {
        if self.sleep.is_none() {
            self.sleep = Some(Box::pin(sleep(self.delay)));
        }
    }

    pub fn cancel(&mut self) {
        self.sleep = None;
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Resolves when an armed timer expires; pends forever otherwise.
    /// Cancel-safe.
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(s) => {
                s.as_mut().await;
                self.sleep = None;
            }
            None => pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_tick_wins_then_zero_starts_once() {
        let mut c = CountdownSync::new();
        assert_eq!(c.on_tick(3, false), TickOutcome::Waiting(3));
        assert_eq!(c.on_tick(4, false), TickOutcome::Waiting(4));
        assert_eq!(c.remaining(), Some(4));

        assert_eq!(c.on_tick(0, true), TickOutcome::Started);
        assert_eq!(c.state(), CountdownState::ReadyToStart);
        assert_eq!(c.on_tick(0, true), TickOutcome::Ignored);
    }

    #[test]
    fn test_zero_before_join_fails() {
        let mut c = CountdownSync::new();
        assert_eq!(c.on_tick(0, false), TickOutcome::FailedToJoin);
        // joining afterwards changes nothing
        assert_eq!(c.on_tick(0, true), TickOutcome::Ignored);
        assert_eq!(c.state(), CountdownState::FailedToJoin);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_timer_fires_once_armed() {
        let mut timer = GraceTimer::new(Duration::from_secs(3));
        let idle = tokio::time::timeout(Duration::from_secs(10), timer.fired()).await;
        assert!(idle.is_err());

        timer.arm();
        let start = tokio::time::Instant::now();
        timer.fired().await;
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_canceled_grace_timer_never_fires() {
        let mut timer = GraceTimer::new(Duration::from_secs(3));
        timer.arm();
        timer.cancel();
        let fired = tokio::time::timeout(Duration::from_secs(10), timer.fired()).await;
        assert!(fired.is_err());
    }
}
