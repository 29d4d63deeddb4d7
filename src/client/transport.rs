//! Socket abstraction under the connection manager.
//!
//! [`Transport`] is one open text-frame socket; [`Connector`] opens them.
//! The WebSocket implementation is used in production, the in-memory one in
//! tests.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),
}

/// One open bidirectional text channel
#[async_trait]
pub trait Transport: Send + 'static {
    async fn send(&mut self, message: String) -> Result<(), TransportError>;

    /// Next text frame. `None` means the peer closed the channel.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens transports to a URL
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<Box<dyn Transport>, TransportError>;
}

/// [`Connector`] for `ws://` and `wss://` URLs
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Box::new(WsTransport { stream }))
    }
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, message: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(_)) => return None,
                // ping/pong are answered by tungstenite
                Ok(_) => continue,
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::close(&mut self.stream)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory transports for driving the client without a server

    use super::*;
    use crate::protocol::{ClientAction, PushMessage};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    pub struct MemoryTransport {
        inbound: mpsc::UnboundedReceiver<String>,
        outbound: mpsc::UnboundedSender<String>,
    }

    /// Server side of a [`MemoryTransport`]. Dropping it closes the channel.
    pub struct MemoryPeer {
        to_client: mpsc::UnboundedSender<String>,
        from_client: mpsc::UnboundedReceiver<String>,
    }

    pub fn memory_pair() -> (MemoryTransport, MemoryPeer) {
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        (
            MemoryTransport { inbound, outbound },
            MemoryPeer {
                to_client,
                from_client,
            },
        )
    }

    impl MemoryPeer {
        pub fn push(&self, msg: &PushMessage) {
            self.push_raw(&serde_json::to_string(msg).unwrap());
        }

        pub fn push_raw(&self, frame: &str) {
            self.to_client.send(frame.to_string()).unwrap();
        }

        pub async fn recv_action(&mut self) -> Option<ClientAction> {
            let frame = self.from_client.recv().await?;
            Some(serde_json::from_str(&frame).unwrap())
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&mut self, message: String) -> Result<(), TransportError> {
            self.outbound
                .send(message)
                .map_err(|e| TransportError::Send(e.to_string()))
        }

        async fn recv(&mut self) -> Option<Result<String, TransportError>> {
            self.inbound.recv().await.map(Ok)
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.inbound.close();
            Ok(())
        }
    }

    /// Hands out queued transports in order, then refuses
    #[derive(Default)]
    pub struct MemoryConnector {
        queue: Mutex<VecDeque<MemoryTransport>>,
    }

    impl MemoryConnector {
        pub fn with(transports: Vec<MemoryTransport>) -> Self {
            Self {
                queue: Mutex::new(transports.into()),
            }
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn open(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
            let next = self.queue.lock().unwrap().pop_front();
            match next {
                Some(t) => Ok(Box::new(t)),
                None => Err(TransportError::Connect(format!("{} refused", url))),
            }
        }
    }
}
