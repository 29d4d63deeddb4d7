//! Connection manager for the push channel.
//!
//! The manager owns the one socket a client has. Components get a cloneable
//! [`ConnectionHandle`] to send actions and subscribe to events; only the
//! manager opens, closes and reopens the socket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::error::{ClientError, ClientResult};
use super::transport::{Connector, Transport, WsConnector};
use crate::protocol::{ClientAction, PushMessage};

/// How long `close` waits for the transport loop before aborting it
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Connecting,
    Open,
    Closed,
}

/// What subscribers receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Message(PushMessage),
    /// The channel dropped without the client asking for it
    Closed,
}

/// Reconnect policy: exponential delay from `initial`, capped at `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max,
            max_attempts,
        }
    }

    /// Delay before the given attempt (zero-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(10), 5)
    }
}

type Predicate = Box<dyn Fn(&PushMessage) -> bool + Send + Sync>;
type Handler = Arc<dyn Fn(ChannelEvent) + Send + Sync>;

struct Subscriber {
    id: u64,
    predicate: Predicate,
    handler: Handler,
}

struct Shared {
    status: watch::Sender<ChannelStatus>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

/// Poisoning only happens if a predicate panicked; the data is still usable.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl Shared {
    fn set_status(&self, status: ChannelStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            tracing::info!("Push channel {:?} -> {:?}", previous, status);
        }
    }

    /// Hand an event to every interested subscriber.
    /// Handlers run outside the lock so they may subscribe or unsubscribe.
    fn dispatch(&self, event: ChannelEvent) {
        let handlers: Vec<Handler> = {
            let subscribers = lock(&self.subscribers);
            subscribers
                .iter()
                .filter(|s| match &event {
                    ChannelEvent::Message(msg) => (s.predicate)(msg),
                    ChannelEvent::Closed => true,
                })
                .map(|s| s.handler.clone())
                .collect()
        };
        for handler in handlers {
            handler(event.clone());
        }
    }

    fn unsubscribe(&self, id: u64) {
        lock(&self.subscribers).retain(|s| s.id != id);
    }
}

/// Cloneable access to the push channel
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    /// Queue an action for the socket. Fails with `ChannelClosed` when the
    /// channel is not open; nothing is queued for a later reconnect.
    pub fn send(&self, action: &ClientAction) -> ClientResult<()> {
        let json = serde_json::to_string(action).map_err(|e| ClientError::Encode(e.to_string()))?;
        if self.status() != ChannelStatus::Open {
            return Err(ClientError::ChannelClosed);
        }
        match lock(&self.shared.outbound).as_ref() {
            Some(tx) => tx.send(json).map_err(|_| ClientError::ChannelClosed),
            None => Err(ClientError::ChannelClosed),
        }
    }

    /// Register a handler for pushed messages matching `predicate`.
    ///
    /// Every subscriber also receives [`ChannelEvent::Closed`] once per
    /// involuntary disconnect, whatever its predicate.
    pub fn subscribe<P, H>(&self, predicate: P, handler: H) -> Subscription
    where
        P: Fn(&PushMessage) -> bool + Send + Sync + 'static,
        H: Fn(ChannelEvent) + Send + Sync + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.shared.subscribers).push(Subscriber {
            id,
            predicate: Box::new(predicate),
            handler: Arc::new(handler),
        });
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn status(&self) -> ChannelStatus {
        *self.shared.status.borrow()
    }

    /// Observe status transitions
    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.shared.status.subscribe()
    }
}

/// Live subscription; dropping it unsubscribes
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    shared: Weak<Shared>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.unsubscribe(self.id);
        }
    }
}

/// Owns the socket and the background transport loop
pub struct ConnectionManager {
    url: String,
    connector: Arc<dyn Connector>,
    backoff: Backoff,
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ConnectionManager {
    /// Open a WebSocket push channel. A failed open leaves the manager
    /// CLOSED rather than returning an error.
    pub async fn connect(url: &str, backoff: Backoff) -> Self {
        Self::connect_with(url, Arc::new(WsConnector), backoff).await
    }

    pub async fn connect_with(url: &str, connector: Arc<dyn Connector>, backoff: Backoff) -> Self {
        let (status, _rx) = watch::channel(ChannelStatus::Connecting);
        let mut manager = Self {
            url: url.to_string(),
            connector,
            backoff,
            shared: Arc::new(Shared {
                status,
                outbound: Mutex::new(None),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
            task: None,
            shutdown_tx: None,
        };
        manager.open().await;
        manager
    }

    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn status(&self) -> ChannelStatus {
        *self.shared.status.borrow()
    }

    async fn open(&mut self) -> ChannelStatus {
        self.shared.set_status(ChannelStatus::Connecting);
        tracing::debug!("Opening push channel to {}", self.url);

        match self.connector.open(&self.url).await {
            Ok(transport) => {
                let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
                let (shutdown_tx, shutdown_rx) = oneshot::channel();
                *lock(&self.shared.outbound) = Some(cmd_tx);
                // Open before the loop starts so an immediate drop is seen as a transition
                self.shared.set_status(ChannelStatus::Open);
                self.task = Some(tokio::spawn(transport_loop(
                    transport,
                    cmd_rx,
                    shutdown_rx,
                    self.shared.clone(),
                )));
                self.shutdown_tx = Some(shutdown_tx);
                ChannelStatus::Open
            }
            Err(e) => {
                tracing::warn!("Failed to open push channel to {}: {}", self.url, e);
                self.shared.set_status(ChannelStatus::Closed);
                ChannelStatus::Closed
            }
        }
    }

    /// Reopen a closed channel, backing off between attempts.
    ///
    /// Subscriptions carry over. Actions sent before the drop are not
    /// replayed; callers re-issue them once this returns `Open`.
    pub async fn reconnect(&mut self) -> ChannelStatus {
        if self.status() == ChannelStatus::Open {
            return ChannelStatus::Open;
        }
        self.stop().await;

        for attempt in 0..self.backoff.max_attempts {
            let delay = self.backoff.delay(attempt);
            tracing::info!(
                "Reconnecting in {:?} (attempt {}/{})",
                delay,
                attempt + 1,
                self.backoff.max_attempts
            );
            tokio::time::sleep(delay).await;

            if self.open().await == ChannelStatus::Open {
                return ChannelStatus::Open;
            }
        }

        tracing::warn!("Giving up on push channel after {} attempts", self.backoff.max_attempts);
        ChannelStatus::Closed
    }

    /// Close the channel on purpose. Subscribers are not notified.
    pub async fn close(&mut self) {
        tracing::debug!("Push channel close requested");
        self.stop().await;
        self.shared.set_status(ChannelStatus::Closed);
    }

    async fn stop(&mut self) {
        lock(&self.shared.outbound).take();

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    tracing::warn!("Transport loop terminated with join error: {}", join_err);
                }
                Err(_) => {
                    tracing::warn!("Transport loop did not exit within timeout; aborting task");
                    task.abort();
                }
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Multiplexes outgoing actions, shutdown and incoming frames.
async fn transport_loop(
    mut transport: Box<dyn Transport>,
    mut cmd_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
    shared: Arc<Shared>,
) {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(json) => {
                        if let Err(e) = transport.send(json).await {
                            tracing::error!("Push channel send error: {}", e);
                            lost(&shared);
                            break;
                        }
                    }
                    // Manager dropped the sender: voluntary
                    None => {
                        let _ = transport.close().await;
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                let _ = transport.close().await;
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match serde_json::from_str::<PushMessage>(&text) {
                        Ok(PushMessage::Unknown) => {
                            tracing::debug!("Ignoring unknown push message: {}", text);
                        }
                        Ok(msg) => {
                            tracing::debug!("Push message: {}", msg.kind());
                            shared.dispatch(ChannelEvent::Message(msg));
                        }
                        Err(e) => {
                            tracing::warn!("Failed to parse push message: {} (raw: {})", e, text);
                        }
                    },
                    Some(Err(e)) => {
                        tracing::error!("Push channel receive error: {}", e);
                        lost(&shared);
                        break;
                    }
                    None => {
                        tracing::warn!("Push channel closed by server");
                        lost(&shared);
                        break;
                    }
                }
            }
        }
    }
}

/// Involuntary closure: mark CLOSED, then tell every subscriber once
fn lost(shared: &Shared) {
    lock(&shared.outbound).take();
    shared.set_status(ChannelStatus::Closed);
    shared.dispatch(ChannelEvent::Closed);
}

#[cfg(test)]
mod tests {
    use super::super::transport::memory::*;
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn fast_backoff() -> Backoff {
        Backoff::new(Duration::from_millis(10), Duration::from_millis(40), 3)
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let b = fast_backoff();
        assert_eq!(b.delay(0), Duration::from_millis(10));
        assert_eq!(b.delay(1), Duration::from_millis(20));
        assert_eq!(b.delay(2), Duration::from_millis(40));
        assert_eq!(b.delay(30), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_failed_connect_resolves_closed() {
        let manager =
            ConnectionManager::connect_with("mem://x", Arc::new(MemoryConnector::default()), fast_backoff())
                .await;
        assert_eq!(manager.status(), ChannelStatus::Closed);
        let err = manager
            .handle()
            .send(&ClientAction::JoinSession {
                session_id: "s".into(),
            })
            .unwrap_err();
        assert_eq!(err, ClientError::ChannelClosed);
    }

    #[tokio::test]
    async fn test_predicate_filters_messages() {
        let (transport, peer) = memory_pair();
        let manager = ConnectionManager::connect_with(
            "mem://x",
            Arc::new(MemoryConnector::with(vec![transport])),
            fast_backoff(),
        )
        .await;
        assert_eq!(manager.status(), ChannelStatus::Open);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = manager.handle().subscribe(
            |m| matches!(m, PushMessage::Countdown { .. }),
            move |e| {
                let _ = tx.send(e);
            },
        );

        peer.push(&PushMessage::PlayerCount { count: 1 });
        peer.push_raw(r#"{"type":"foo"}"#);
        peer.push_raw("not json");
        peer.push(&PushMessage::Countdown { time: 4 });

        assert_eq!(
            rx.recv().await.unwrap(),
            ChannelEvent::Message(PushMessage::Countdown { time: 4 })
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_involuntary_close_notifies_each_subscriber_once() {
        let (transport, peer) = memory_pair();
        let manager = ConnectionManager::connect_with(
            "mem://x",
            Arc::new(MemoryConnector::with(vec![transport])),
            fast_backoff(),
        )
        .await;
        let handle = manager.handle();

        let closed = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subs: Vec<_> = (0..2)
            .map(|_| {
                let closed = closed.clone();
                let tx = tx.clone();
                handle.subscribe(
                    |_| false,
                    move |e| {
                        if e == ChannelEvent::Closed {
                            closed.fetch_add(1, Ordering::SeqCst);
                        }
                        let _ = tx.send(());
                    },
                )
            })
            .collect();

        drop(peer);
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();

        assert_eq!(closed.load(Ordering::SeqCst), 2);
        assert_eq!(handle.status(), ChannelStatus::Closed);
        drop(subs);
    }

    #[tokio::test]
    async fn test_voluntary_close_is_silent() {
        let (transport, _peer) = memory_pair();
        let mut manager = ConnectionManager::connect_with(
            "mem://x",
            Arc::new(MemoryConnector::with(vec![transport])),
            fast_backoff(),
        )
        .await;

        let closed = Arc::new(AtomicUsize::new(0));
        let counter = closed.clone();
        let _sub = manager.handle().subscribe(
            |_| true,
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        manager.close().await;
        assert_eq!(manager.status(), ChannelStatus::Closed);
        tokio::task::yield_now().await;
        assert_eq!(closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let (transport, peer) = memory_pair();
        let manager = ConnectionManager::connect_with(
            "mem://x",
            Arc::new(MemoryConnector::with(vec![transport])),
            fast_backoff(),
        )
        .await;
        let handle = manager.handle();

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = handle.subscribe(|_| true, move |e| {
            let _ = tx_a.send(e);
        });
        let _b = handle.subscribe(|_| true, move |e| {
            let _ = tx_b.send(e);
        });

        a.unsubscribe();
        peer.push(&PushMessage::HighScore { score: 10 });

        assert_eq!(
            rx_b.recv().await.unwrap(),
            ChannelEvent::Message(PushMessage::HighScore { score: 10 })
        );
        assert!(rx_a.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_opens_a_fresh_socket() {
        let (first, first_peer) = memory_pair();
        let (second, mut second_peer) = memory_pair();
        let mut manager = ConnectionManager::connect_with(
            "mem://x",
            Arc::new(MemoryConnector::with(vec![first, second])),
            fast_backoff(),
        )
        .await;
        let handle = manager.handle();
        let mut status = handle.watch_status();

        drop(first_peer);
        status
            .wait_for(|s| *s == ChannelStatus::Closed)
            .await
            .unwrap();

        assert_eq!(manager.reconnect().await, ChannelStatus::Open);
        handle
            .send(&ClientAction::JoinSession {
                session_id: "s1".into(),
            })
            .unwrap();
        assert_eq!(
            second_peer.recv_action().await,
            Some(ClientAction::JoinSession {
                session_id: "s1".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_gives_up_after_attempts() {
        let mut manager = ConnectionManager::connect_with(
            "mem://x",
            Arc::new(MemoryConnector::default()),
            fast_backoff(),
        )
        .await;
        assert_eq!(manager.reconnect().await, ChannelStatus::Closed);
    }
}
