//! Error types for PairChat

use std::time::Duration;
use thiserror::Error;

/// Main error type for PairChat session operations
#[derive(Error, Debug)]
pub enum PairChatError {
    /// Local capture was denied or is unsupported
    #[error("Media unavailable: {reason}")]
    MediaUnavailable {
        /// Reason reported by the media devices
        reason: String,
    },

    /// The negotiation engine could not be constructed
    #[error("Negotiation engine failed to load: {reason}")]
    EngineLoadFailure {
        /// Reason reported by the engine factory
        reason: String,
    },

    /// The engine reported a connectivity failure
    #[error("Negotiation failed in room {room_id}: {reason}")]
    NegotiationFailure {
        /// Room the attempt belonged to
        room_id: String,
        /// Reason reported by the engine
        reason: String,
    },

    /// No connection was established within the grace period
    #[error("Negotiation in room {room_id} timed out after {after:?}")]
    NegotiationTimeout {
        /// Room the attempt belonged to
        room_id: String,
        /// Grace period that elapsed
        after: Duration,
    },

    /// Realtime channel failed to connect or dropped
    #[error("Transport error: {reason}")]
    Transport {
        /// Reason for transport error
        reason: String,
    },

    /// Signal envelope addressed to a room that is no longer current
    #[error("Stale signal for room {room_id} (current: {current:?})")]
    StaleSignal {
        /// Room the envelope was tagged with
        room_id: String,
        /// Room the controller is currently in
        current: Option<String>,
    },

    /// Chat was refused (not connected, or nothing to send)
    #[error("Chat rejected: {reason}")]
    ChatRejected {
        /// Why the message was refused
        reason: String,
    },

    /// A state change that the session table does not allow
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// State before the attempted transition
        from: String,
        /// Requested target state
        to: String,
    },

    /// Invalid message format
    #[error("Invalid message format: {message}, error: {source}")]
    InvalidMessage {
        /// Invalid message content
        message: String,
        /// Parsing error
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Missing configuration error
    #[error("Missing required configuration: {field}")]
    MissingConfiguration {
        /// Missing configuration field
        field: String,
    },

    /// Configuration value out of range
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration {
        /// Offending field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// The controller loop is no longer running
    #[error("Session controller is closed")]
    ControllerClosed,
}

/// Broad error categories for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Local capture devices
    Media,
    /// Negotiation engine lifecycle
    Engine,
    /// Peer connectivity
    Negotiation,
    /// Realtime channel to the coordinator
    Network,
    /// Caller misuse or state conflicts
    State,
    /// Configuration and wire format problems
    Configuration,
}

impl PairChatError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            PairChatError::MediaUnavailable { .. } => "MEDIA_UNAVAILABLE".to_string(),
            PairChatError::EngineLoadFailure { .. } => "ENGINE_LOAD_FAILURE".to_string(),
            PairChatError::NegotiationFailure { .. } => "NEGOTIATION_FAILURE".to_string(),
            PairChatError::NegotiationTimeout { .. } => "NEGOTIATION_TIMEOUT".to_string(),
            PairChatError::Transport { .. } => "TRANSPORT_ERROR".to_string(),
            PairChatError::StaleSignal { .. } => "STALE_SIGNAL".to_string(),
            PairChatError::ChatRejected { .. } => "CHAT_REJECTED".to_string(),
            PairChatError::InvalidTransition { .. } => "INVALID_TRANSITION".to_string(),
            PairChatError::InvalidMessage { .. } => "INVALID_MESSAGE".to_string(),
            PairChatError::MissingConfiguration { .. } => "MISSING_CONFIGURATION".to_string(),
            PairChatError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION".to_string(),
            PairChatError::ControllerClosed => "CONTROLLER_CLOSED".to_string(),
        }
    }

    /// Get the category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            PairChatError::MediaUnavailable { .. } => ErrorCategory::Media,
            PairChatError::EngineLoadFailure { .. } => ErrorCategory::Engine,
            PairChatError::NegotiationFailure { .. } | PairChatError::NegotiationTimeout { .. } => {
                ErrorCategory::Negotiation
            }
            PairChatError::Transport { .. } | PairChatError::ControllerClosed => {
                ErrorCategory::Network
            }
            PairChatError::StaleSignal { .. }
            | PairChatError::ChatRejected { .. }
            | PairChatError::InvalidTransition { .. } => ErrorCategory::State,
            PairChatError::InvalidMessage { .. }
            | PairChatError::MissingConfiguration { .. }
            | PairChatError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
        }
    }

    /// Whether retrying the whole attempt can succeed without user action
    ///
    /// Media denial needs the user to change permissions first, so it is
    /// terminal for the attempt.
    pub fn is_recoverable(&self) -> bool {
        match self {
            PairChatError::EngineLoadFailure { .. }
            | PairChatError::NegotiationFailure { .. }
            | PairChatError::NegotiationTimeout { .. }
            | PairChatError::Transport { .. }
            | PairChatError::StaleSignal { .. }
            | PairChatError::ChatRejected { .. } => true,
            PairChatError::MediaUnavailable { .. }
            | PairChatError::InvalidTransition { .. }
            | PairChatError::InvalidMessage { .. }
            | PairChatError::MissingConfiguration { .. }
            | PairChatError::InvalidConfiguration { .. }
            | PairChatError::ControllerClosed => false,
        }
    }
}
