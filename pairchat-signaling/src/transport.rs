//! Realtime transport abstraction

use crate::protocol::{ClientEvent, ServerEvent};
use async_trait::async_trait;
use pairchat_core::PairChatError;

/// Inbound transport notifications
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Channel to the coordinator is open
    Connected,
    /// A decoded coordinator event
    Message(ServerEvent),
    /// Channel dropped; any room in progress is gone with it
    Disconnected {
        /// Reason for disconnection
        reason: String,
    },
}

/// Bidirectional named-event channel to the coordinator
///
/// Inbound traffic is delivered separately as a stream of
/// [`TransportEvent`]s; this trait covers the outbound half.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Emit one event to the coordinator
    async fn send(&self, event: ClientEvent) -> Result<(), PairChatError>;

    /// Close the channel
    async fn close(&self);
}
