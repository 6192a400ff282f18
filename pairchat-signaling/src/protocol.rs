//! Coordinator protocol messages
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Event names and payload field names follow the coordinator's wire
//! format, so field renames here are load-bearing.

use chrono::{DateTime, Utc};
use pairchat_core::{
    MatchFilters, PairChatError, ParticipantIdentity, RoomId, SignalEnvelope, SignalPayload,
};
use serde::{Deserialize, Serialize};

/// Match request payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Requesting participant
    pub user_info: ParticipantIdentity,
    /// Filter snapshot for this request
    pub filters: MatchFilters,
}

/// Outbound negotiation payload relayed to the partner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRelay {
    /// Room the payload belongs to
    pub room_id: RoomId,
    /// Opaque engine payload
    pub signal: SignalPayload,
    /// Sending participant ID
    #[serde(alias = "userId")]
    pub sender_id: String,
}

/// Chat message as carried on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    /// Message text
    pub text: String,
    /// Send time
    pub timestamp: DateTime<Utc>,
    /// Sender display name
    pub sender: String,
    /// Room the message belongs to; older relays omit it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
}

/// Skip notification payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextMatchRequest {
    /// Room being abandoned
    pub room_id: RoomId,
    /// Requesting participant
    pub user_info: ParticipantIdentity,
    /// Filters for the next request
    pub filters: MatchFilters,
}

/// Pairing notification payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedPayload {
    /// Opposing participant
    pub partner_info: ParticipantIdentity,
    /// Assigned room
    pub room_id: RoomId,
    /// Whether this side initiates negotiation
    pub initiator: bool,
}

/// Inbound negotiation payload
///
/// Relays either wrap the payload with routing data or forward the raw
/// engine payload as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundSignal {
    /// `{signal, roomId?, senderId?}`
    Wrapped {
        /// Opaque engine payload
        signal: SignalPayload,
        /// Room the payload belongs to
        #[serde(default, rename = "roomId", skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
        /// Sending participant ID
        #[serde(
            default,
            rename = "senderId",
            alias = "userId",
            skip_serializing_if = "Option::is_none"
        )]
        sender_id: Option<String>,
    },
    /// Bare engine payload
    Raw(SignalPayload),
}

impl InboundSignal {
    /// Room the relay tagged this payload with, if any
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            InboundSignal::Wrapped { room_id, .. } => room_id.as_ref(),
            InboundSignal::Raw(_) => None,
        }
    }

    /// Build an envelope, attributing untagged payloads to `current_room`
    ///
    /// Untagged payloads arrive on the room-scoped subscription, so the
    /// room the receiver is in at delivery time is their room.
    pub fn into_envelope(self, current_room: &RoomId) -> SignalEnvelope {
        match self {
            InboundSignal::Wrapped {
                signal,
                room_id,
                sender_id,
            } => SignalEnvelope::new(
                room_id.unwrap_or_else(|| current_room.clone()),
                signal,
                sender_id,
            ),
            InboundSignal::Raw(signal) => {
                SignalEnvelope::new(current_room.clone(), signal, None)
            }
        }
    }
}

/// Events sent from the client to the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Request pairing
    JoinVideoChat(JoinRequest),
    /// Subscribe to room-scoped events
    JoinRoom(RoomId),
    /// Forward a negotiation payload
    Signal(SignalRelay),
    /// Forward a chat message
    ChatMessage(ChatPayload),
    /// Announce a skip
    NextMatch(NextMatchRequest),
    /// Abandon the queue or session
    LeaveVideoChat,
}

impl ClientEvent {
    /// Get the wire event name
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientEvent::JoinVideoChat(_) => "join-video-chat",
            ClientEvent::JoinRoom(_) => "join-room",
            ClientEvent::Signal(_) => "signal",
            ClientEvent::ChatMessage(_) => "chat-message",
            ClientEvent::NextMatch(_) => "next-match",
            ClientEvent::LeaveVideoChat => "leave-video-chat",
        }
    }
}

/// Events sent from the coordinator to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Pairing established
    Matched(MatchedPayload),
    /// Negotiation data from the partner
    Signal(InboundSignal),
    /// Partner chat
    ChatMessage(ChatPayload),
    /// Partner's session ended abnormally
    PartnerDisconnected,
    /// Partner skipped to a new match
    UserLeft,
}

impl ServerEvent {
    /// Get the wire event name
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerEvent::Matched(_) => "matched",
            ServerEvent::Signal(_) => "signal",
            ServerEvent::ChatMessage(_) => "chat-message",
            ServerEvent::PartnerDisconnected => "partner-disconnected",
            ServerEvent::UserLeft => "user-left",
        }
    }
}

/// Serialize a client event into a text frame
pub fn encode(event: &ClientEvent) -> Result<String, PairChatError> {
    serde_json::to_string(event).map_err(|e| PairChatError::InvalidMessage {
        message: event.event_name().to_string(),
        source: e.into(),
    })
}

/// Parse a text frame into a server event
pub fn decode(text: &str) -> Result<ServerEvent, PairChatError> {
    serde_json::from_str(text).map_err(|e| PairChatError::InvalidMessage {
        message: text.to_string(),
        source: e.into(),
    })
}
