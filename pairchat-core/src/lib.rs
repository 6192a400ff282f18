//! # PairChat Core
//!
//! Domain model and collaborator seams for PairChat peer sessions.
//! This crate defines the data exchanged with the matching coordinator,
//! the error taxonomy, and the traits behind which the negotiation engine
//! and the local capture devices are plugged in.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod identity;
pub mod media;
pub mod room;

// Re-export main types
pub use engine::{
    default_ice_servers, EngineConfig, EngineEvent, EngineEventSink, EngineFactory,
    EngineNotification, Generation, IceServer, NegotiationEngine,
};
pub use error::{ErrorCategory, PairChatError};
pub use identity::{mutually_compatible, Gender, GenderPreference, MatchFilters, ParticipantIdentity};
pub use media::{DimensionRange, MediaConstraints, MediaDevices, MediaSource, RemoteStream, TrackKind};
pub use room::{RoomAssignment, RoomId, Role, SignalEnvelope, SignalPayload};
