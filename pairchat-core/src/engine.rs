//! Negotiation engine seam
//!
//! The engine performs the offer/answer/candidate exchange and yields a
//! live media channel. This crate only defines the boundary: an engine is
//! constructed by an injectable [`EngineFactory`], receives partner payloads
//! through [`NegotiationEngine::signal`], and reports everything else through
//! an [`EngineEventSink`].

use crate::error::PairChatError;
use crate::media::{MediaSource, RemoteStream};
use crate::room::{Role, SignalPayload};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Monotonic counter identifying one pairing attempt
///
/// Completions and engine callbacks carry the generation they were issued
/// under; anything older than the controller's current generation is dropped.
pub type Generation = u64;

/// STUN/TURN server entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs
    pub urls: Vec<String>,
    /// TURN username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// TURN credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// A credential-less STUN server
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Public STUN servers used when nothing else is configured
pub fn default_ice_servers() -> Vec<IceServer> {
    [
        "stun:stun.l.google.com:19302",
        "stun:stun1.l.google.com:19302",
        "stun:stun2.l.google.com:19302",
        "stun:stun.stunprotocol.org:3478",
        "stun:global.stun.twilio.com:3478",
    ]
    .into_iter()
    .map(IceServer::stun)
    .collect()
}

/// Parameters for constructing one engine instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Role assigned by the coordinator
    pub role: Role,
    /// ICE servers
    pub ice_servers: Vec<IceServer>,
    /// Emit candidates incrementally instead of one bundled payload
    pub trickle: bool,
}

/// Something the engine wants the session layer to know
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Payload to relay to the partner
    Signal(SignalPayload),
    /// The partner's media stream became available
    RemoteStream(RemoteStream),
    /// Direct connection established
    Connected,
    /// Connection closed
    Closed,
    /// Connectivity or ICE failure
    Failed {
        /// Reason reported by the engine
        reason: String,
    },
}

impl EngineEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::Signal(_) => "signal",
            EngineEvent::RemoteStream(_) => "remote_stream",
            EngineEvent::Connected => "connected",
            EngineEvent::Closed => "closed",
            EngineEvent::Failed { .. } => "failed",
        }
    }
}

/// Engine event tagged with the generation of the instance that produced it
#[derive(Debug, Clone)]
pub struct EngineNotification {
    /// Generation of the emitting engine
    pub generation: Generation,
    /// The event
    pub event: EngineEvent,
}

/// Callback channel handed to one engine instance
///
/// Once [`invalidate`](Self::invalidate) is called every later emit is a
/// no-op, so a destroyed engine cannot re-enter the controller.
#[derive(Clone)]
pub struct EngineEventSink {
    generation: Generation,
    tx: mpsc::UnboundedSender<EngineNotification>,
    live: Arc<AtomicBool>,
}

impl EngineEventSink {
    /// Create a sink for the given generation
    pub fn new(generation: Generation, tx: mpsc::UnboundedSender<EngineNotification>) -> Self {
        Self {
            generation,
            tx,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Generation this sink reports under
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Deliver an event; returns `false` if the sink is invalidated or the
    /// controller is gone
    pub fn emit(&self, event: EngineEvent) -> bool {
        if !self.is_live() {
            trace!(
                "Dropping {} from invalidated engine generation {}",
                event.event_type(),
                self.generation
            );
            return false;
        }
        self.tx
            .send(EngineNotification {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// Stop forwarding events from this sink and all its clones
    pub fn invalidate(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    /// Whether events are still forwarded
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for EngineEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineEventSink")
            .field("generation", &self.generation)
            .field("live", &self.is_live())
            .finish()
    }
}

/// A constructed point-to-point negotiation engine
pub trait NegotiationEngine: Send {
    /// Apply a payload produced by the partner's engine
    fn signal(&mut self, payload: SignalPayload) -> Result<(), PairChatError>;

    /// Tear down the connection and release engine resources
    fn close(&mut self);
}

/// Injectable engine constructor
///
/// Returns a ready engine or [`PairChatError::EngineLoadFailure`]. Retries
/// are the caller's policy.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Construct an engine bound to the local media
    async fn create(
        &self,
        config: EngineConfig,
        media: Arc<dyn MediaSource>,
        events: EngineEventSink,
    ) -> Result<Box<dyn NegotiationEngine>, PairChatError>;
}
