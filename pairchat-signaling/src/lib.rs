//! # PairChat Signaling
//!
//! Wire protocol and realtime transport between a PairChat client and the
//! matching coordinator. Handles match requests, room subscription, relay
//! of negotiation payloads and chat.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod protocol;
pub mod transport;
pub mod websocket;

// Re-export main types
pub use protocol::{
    decode, encode, ChatPayload, ClientEvent, InboundSignal, JoinRequest, MatchedPayload,
    NextMatchRequest, ServerEvent, SignalRelay,
};
pub use transport::{RealtimeTransport, TransportEvent};
pub use websocket::WebSocketTransport;
