//! # PairChat - Anonymous One-to-One Video Chat Sessions
//!
//! PairChat drives the client side of a random video chat: it asks a
//! matching coordinator for a partner, relays negotiation payloads between
//! the local negotiation engine and the partner, and exposes skip,
//! disconnect, track toggles and a text channel once the peers are
//! connected.
//!
//! ## Key Features
//!
//! - **One State Machine**: every transition goes through a single
//!   `Idle → Queued → Matched → Negotiating → Connected → Ended` table
//! - **Race Tolerant**: signals that arrive before the engine exists are
//!   buffered and flushed in order; signals for old rooms are dropped
//! - **Deterministic Teardown**: skip, disconnect and partner departure
//!   always close the engine and never let its late callbacks back in
//! - **Pluggable**: transport, negotiation engine and capture devices are
//!   injected behind traits
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pairchat::{GenderPreference, MatchFilters, ParticipantIdentity, SessionBuilder, SessionEvent};
//! use std::sync::Arc;
//!
//! # async fn demo(
//! #     engines: Arc<dyn pairchat::EngineFactory>,
//! #     devices: Arc<dyn pairchat::MediaDevices>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = SessionBuilder::new()
//!     .identity(ParticipantIdentity::new("Ann"))
//!     .engine_factory(engines)
//!     .media_devices(devices)
//!     .websocket("ws://localhost:3000/ws")
//!     .await?
//!     .spawn()?;
//!
//! session
//!     .handle
//!     .request_match(MatchFilters::any().gender(GenderPreference::Female))
//!     .await?;
//!
//! while let Some(event) = session.events.next().await {
//!     if let SessionEvent::Connected { room_id } = &event {
//!         println!("Connected in {}", room_id);
//!         session.handle.send_chat("hi").await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use pairchat_core::{
    default_ice_servers, DimensionRange, EngineConfig, EngineEvent, EngineEventSink,
    EngineFactory, EngineNotification, ErrorCategory, Gender, GenderPreference, Generation,
    IceServer, MatchFilters, MediaConstraints, MediaDevices, MediaSource, NegotiationEngine,
    PairChatError, ParticipantIdentity, RemoteStream, Role, RoomAssignment, RoomId,
    SignalEnvelope, SignalPayload, TrackKind,
};

pub use pairchat_signaling::{
    ClientEvent, RealtimeTransport, ServerEvent, TransportEvent, WebSocketTransport,
};

pub use pairchat_diagnostics::{init_logging, AttemptSummary, ConnectionStats};

// Public API modules
pub mod buffer;
pub mod chat;
pub mod config;
pub mod controller;
pub mod event;
pub mod machine;
pub mod participant;
pub mod session;
pub mod state;
pub mod track;

// Re-export main API types
pub use buffer::{FlushReport, SignalBuffer};
pub use chat::{ChatLog, ChatMessage, ChatOrigin};
pub use config::{MediaPolicy, SessionConfig};
pub use controller::PeerSessionController;
pub use event::{
    EndReason, EventFilter, EventStream, FilteredEventStream, SessionEvent, PARTNER_LEFT_NOTICE,
};
pub use machine::{Output, SessionMachine, SessionSnapshot};
pub use participant::{LocalParticipant, RemoteParticipant};
pub use session::{Session, SessionBuilder, SessionHandle};
pub use state::SessionState;
pub use track::LocalTracks;
