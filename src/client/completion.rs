use crate::protocol::PushMessage;

/// Watches for the session-wide `sessionComplete` push.
///
/// The decision that a session is over is the server's; this only makes
/// sure the client reacts to it once.
#[derive(Debug, Default)]
pub struct CompletionListener {
    fired: bool,
}

impl CompletionListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time a `sessionComplete` message is observed
    pub fn observe(&mut self, msg: &PushMessage) -> bool {
        if self.fired || *msg != PushMessage::SessionComplete {
            return false;
        }
        self.fired = true;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.fired
    }
}
