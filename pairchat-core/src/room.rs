//! Room assignments and signal envelopes

use crate::identity::ParticipantIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinator-issued identifier binding two participants for one attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Create a room ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the room ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Negotiation role within a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Produces the first offer
    Initiator,
    /// Waits for the partner's offer
    Responder,
}

impl Role {
    /// Derive a role from the coordinator's initiator flag
    pub fn from_initiator(is_initiator: bool) -> Self {
        if is_initiator {
            Role::Initiator
        } else {
            Role::Responder
        }
    }

    /// Whether this side initiates negotiation
    pub fn is_initiator(&self) -> bool {
        matches!(self, Role::Initiator)
    }
}

/// Opaque negotiation payload
///
/// Produced and consumed only by the negotiation engine; the session layer
/// relays it unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalPayload(serde_json::Value);

impl SignalPayload {
    /// Wrap a raw payload
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Borrow the raw payload
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Take the raw payload
    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for SignalPayload {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// One unit of negotiation data scoped to a room
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEnvelope {
    /// Room the payload belongs to
    pub room_id: RoomId,
    /// Opaque payload
    pub payload: SignalPayload,
    /// Sender participant ID, when the relay provides it
    pub sender_id: Option<String>,
}

impl SignalEnvelope {
    /// Create an envelope
    pub fn new(room_id: RoomId, payload: SignalPayload, sender_id: Option<String>) -> Self {
        Self {
            room_id,
            payload,
            sender_id,
        }
    }

    /// Check whether this envelope is addressed to the given room
    pub fn is_for(&self, room_id: &RoomId) -> bool {
        &self.room_id == room_id
    }
}

/// Pairing issued by the matching coordinator
///
/// Consumed exactly once per pairing and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomAssignment {
    room_id: RoomId,
    partner: ParticipantIdentity,
    is_initiator: bool,
}

impl RoomAssignment {
    /// Create an assignment
    pub fn new(room_id: RoomId, partner: ParticipantIdentity, is_initiator: bool) -> Self {
        Self {
            room_id,
            partner,
            is_initiator,
        }
    }

    /// Room identifier
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Opposing participant
    pub fn partner(&self) -> &ParticipantIdentity {
        &self.partner
    }

    /// Whether this side was designated initiator
    pub fn is_initiator(&self) -> bool {
        self.is_initiator
    }

    /// Negotiation role for this side
    pub fn role(&self) -> Role {
        Role::from_initiator(self.is_initiator)
    }
}
