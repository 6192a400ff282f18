//! WebSocket transport to the coordinator

use crate::protocol::{decode, encode, ClientEvent};
use crate::transport::{RealtimeTransport, TransportEvent};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use pairchat_core::PairChatError;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`RealtimeTransport`] over a single WebSocket connection
pub struct WebSocketTransport {
    url: String,
    writer: Mutex<SplitSink<WsStream, Message>>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl WebSocketTransport {
    /// Connect to the coordinator
    ///
    /// Returns the transport together with the inbound event stream. The
    /// stream starts with [`TransportEvent::Connected`] and ends with exactly
    /// one [`TransportEvent::Disconnected`].
    pub async fn connect(
        url: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), PairChatError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| PairChatError::Transport {
                reason: format!("Failed to connect to {}: {}", url, e),
            })?;
        info!("🔌 Connected to coordinator at {}", url);

        let (write, read) = ws_stream.split();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let _ = event_tx.send(TransportEvent::Connected);

        let reader = tokio::spawn(read_loop(read, event_tx));

        Ok((
            Self {
                url: url.to_string(),
                writer: Mutex::new(write),
                reader: parking_lot::Mutex::new(Some(reader)),
                closed: AtomicBool::new(false),
            },
            event_rx,
        ))
    }

    /// Coordinator URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether [`close`](RealtimeTransport::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RealtimeTransport for WebSocketTransport {
    async fn send(&self, event: ClientEvent) -> Result<(), PairChatError> {
        if self.is_closed() {
            return Err(PairChatError::Transport {
                reason: "transport is closed".to_string(),
            });
        }

        let json = encode(&event)?;
        debug!("📤 {} -> {}", event.event_name(), self.url);
        self.writer
            .lock()
            .await
            .send(Message::Text(json))
            .await
            .map_err(|e| PairChatError::Transport {
                reason: format!("Failed to send {}: {}", event.event_name(), e),
            })
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.writer.lock().await.close().await {
            debug!("Close handshake with {} failed: {}", self.url, e);
        }
        info!("🔌 Closed coordinator connection to {}", self.url);
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.url)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }
}

async fn read_loop(mut read: SplitStream<WsStream>, events: mpsc::UnboundedSender<TransportEvent>) {
    let reason = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => match decode(&text) {
                Ok(event) => {
                    debug!("📥 {}", event.event_name());
                    if events.send(TransportEvent::Message(event)).is_err() {
                        // Nobody is listening any more
                        return;
                    }
                }
                Err(e) => {
                    warn!("Skipping undecodable coordinator frame: {}", e);
                }
            },
            Some(Ok(Message::Close(frame))) => {
                break frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "closed by coordinator".to_string());
            }
            Some(Ok(_)) => {
                // Binary, ping and pong frames carry no events
            }
            Some(Err(e)) => break e.to_string(),
            None => break "stream ended".to_string(),
        }
    };

    warn!("🔌 Coordinator connection lost: {}", reason);
    let _ = events.send(TransportEvent::Disconnected { reason });
}
