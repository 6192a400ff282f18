//! Session builder and handle

use crate::chat::ChatMessage;
use crate::config::SessionConfig;
use crate::controller::{Collaborators, Command, PeerSessionController};
use crate::event::EventStream;
use crate::machine::{SessionMachine, SessionSnapshot};
use pairchat_core::{
    EngineFactory, MatchFilters, MediaDevices, PairChatError, ParticipantIdentity, TrackKind,
};
use pairchat_signaling::{RealtimeTransport, TransportEvent, WebSocketTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

/// Fluent builder for a session controller
///
/// ```rust,no_run
/// # use pairchat::{MatchFilters, ParticipantIdentity, SessionBuilder};
/// # use std::sync::Arc;
/// # async fn demo(
/// #     engines: Arc<dyn pairchat::EngineFactory>,
/// #     devices: Arc<dyn pairchat::MediaDevices>,
/// # ) -> Result<(), pairchat::PairChatError> {
/// let session = SessionBuilder::new()
///     .identity(ParticipantIdentity::new("Ann"))
///     .engine_factory(engines)
///     .media_devices(devices)
///     .websocket("ws://localhost:3000/ws")
///     .await?
///     .spawn()?;
///
/// session.handle.request_match(MatchFilters::any()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct SessionBuilder {
    identity: Option<ParticipantIdentity>,
    transport: Option<(Arc<dyn RealtimeTransport>, mpsc::UnboundedReceiver<TransportEvent>)>,
    engine_factory: Option<Arc<dyn EngineFactory>>,
    media_devices: Option<Arc<dyn MediaDevices>>,
    config: SessionConfig,
}

impl SessionBuilder {
    /// Start with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the local participant (required)
    pub fn identity(mut self, identity: ParticipantIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Use an already connected transport (required unless
    /// [`websocket`](Self::websocket) is used)
    pub fn transport(
        mut self,
        transport: Arc<dyn RealtimeTransport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        self.transport = Some((transport, events));
        self
    }

    /// Connect a WebSocket transport to the coordinator
    pub async fn websocket(self, url: &str) -> Result<Self, PairChatError> {
        let (transport, events) = WebSocketTransport::connect(url).await?;
        Ok(self.transport(Arc::new(transport), events))
    }

    /// Set the engine factory (required)
    pub fn engine_factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.engine_factory = Some(factory);
        self
    }

    /// Set the capture devices (required)
    pub fn media_devices(mut self, devices: Arc<dyn MediaDevices>) -> Self {
        self.media_devices = Some(devices);
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set or disable the negotiation timeout
    pub fn negotiation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.negotiation_timeout = timeout;
        self
    }

    /// Set the delay before re-requesting after a skip
    pub fn rematch_delay(mut self, delay: Duration) -> Self {
        self.config.rematch_delay = delay;
        self
    }

    /// Validate and start the controller on the current tokio runtime
    pub fn spawn(self) -> Result<Session, PairChatError> {
        let identity = self.identity.ok_or_else(|| missing("identity"))?;
        let (transport, transport_events) = self.transport.ok_or_else(|| missing("transport"))?;
        let engine_factory = self
            .engine_factory
            .ok_or_else(|| missing("engine_factory"))?;
        let media_devices = self.media_devices.ok_or_else(|| missing("media_devices"))?;
        self.config.validate()?;

        info!("👤 Starting session for {}", identity.username);
        let machine = SessionMachine::new(identity, self.config);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let mut controller = PeerSessionController::new(
            machine,
            Collaborators {
                transport,
                transport_events,
                engine_factory,
                media_devices,
            },
            command_rx,
        );
        let events = controller.subscribe();
        let task = tokio::spawn(controller.run());

        Ok(Session {
            handle: SessionHandle {
                commands: command_tx,
            },
            events,
            task,
        })
    }
}

fn missing(field: &str) -> PairChatError {
    PairChatError::MissingConfiguration {
        field: field.to_string(),
    }
}

/// A running session
#[derive(Debug)]
pub struct Session {
    /// Command handle; clone freely
    pub handle: SessionHandle,
    /// First event subscription
    pub events: EventStream,
    /// Controller task; finishes after shutdown or when every handle is dropped
    pub task: JoinHandle<()>,
}

/// Cloneable command handle to a running controller
///
/// Every method waits until the controller has applied the command and sent
/// the resulting coordinator traffic. Once the controller stopped they
/// return [`PairChatError::ControllerClosed`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, PairChatError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| PairChatError::ControllerClosed)?;
        response.await.map_err(|_| PairChatError::ControllerClosed)
    }

    /// Ask the coordinator for a partner
    ///
    /// Fails with [`PairChatError::Transport`] when the request could not be
    /// sent; the session is then `Ended`.
    pub async fn request_match(&self, filters: MatchFilters) -> Result<(), PairChatError> {
        self.call(|reply| Command::RequestMatch { filters, reply })
            .await?
    }

    /// Abandon the current partner and queue again with the same filters
    pub async fn skip(&self) -> Result<(), PairChatError> {
        self.call(|reply| Command::Skip { reply }).await
    }

    /// Leave the current partner and queue again with the same filters
    pub async fn find_new_partner(&self) -> Result<(), PairChatError> {
        self.call(|reply| Command::FindNewPartner { reply }).await
    }

    /// Change filters; a live pairing is dropped and re-queued
    pub async fn update_filters(&self, filters: MatchFilters) -> Result<(), PairChatError> {
        self.call(|reply| Command::UpdateFilters { filters, reply })
            .await
    }

    /// End the current attempt without re-queueing and release local media
    pub async fn disconnect(&self) -> Result<(), PairChatError> {
        self.call(|reply| Command::Disconnect { reply }).await
    }

    /// End everything and release local media
    pub async fn leave(&self) -> Result<(), PairChatError> {
        self.call(|reply| Command::Leave { reply }).await
    }

    /// Send a chat message; only accepted while connected
    ///
    /// A message that was recorded but could not be sent fails with
    /// [`PairChatError::Transport`].
    pub async fn send_chat(&self, text: impl Into<String>) -> Result<ChatMessage, PairChatError> {
        let text = text.into();
        self.call(|reply| Command::SendChat { text, reply }).await?
    }

    /// Flip the microphone; `None` when no audio track is held
    pub async fn toggle_audio(&self) -> Result<Option<bool>, PairChatError> {
        self.call(|reply| Command::ToggleTrack {
            kind: TrackKind::Audio,
            reply,
        })
        .await
    }

    /// Flip the camera; `None` when no video track is held
    pub async fn toggle_video(&self) -> Result<Option<bool>, PairChatError> {
        self.call(|reply| Command::ToggleTrack {
            kind: TrackKind::Video,
            reply,
        })
        .await
    }

    /// Current state of the session
    pub async fn snapshot(&self) -> Result<SessionSnapshot, PairChatError> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    /// Open another event subscription
    pub async fn subscribe(&self) -> Result<EventStream, PairChatError> {
        self.call(|reply| Command::Subscribe { reply }).await
    }

    /// Tear down, release media, close the transport and stop the controller
    pub async fn shutdown(&self) -> Result<(), PairChatError> {
        self.call(|reply| Command::Shutdown { reply }).await
    }

    /// Whether the controller has stopped
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
