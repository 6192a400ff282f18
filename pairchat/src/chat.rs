//! Text chat carried alongside a connected session

use chrono::{DateTime, Utc};
use pairchat_core::{PairChatError, RoomId};
use pairchat_signaling::ChatPayload;
use serde::{Deserialize, Serialize};

/// Which side wrote a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatOrigin {
    /// Sent by this participant
    Local,
    /// Received from the partner
    Remote,
}

/// One chat line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message text
    pub text: String,
    /// Send time
    pub timestamp: DateTime<Utc>,
    /// Local or remote
    pub origin: ChatOrigin,
    /// Sender display name
    pub sender: String,
}

impl ChatMessage {
    /// Compose a local message stamped now
    ///
    /// Blank text is rejected.
    pub fn local(text: impl Into<String>, sender: impl Into<String>) -> Result<Self, PairChatError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(PairChatError::ChatRejected {
                reason: "message is empty".to_string(),
            });
        }
        Ok(Self {
            text,
            timestamp: Utc::now(),
            origin: ChatOrigin::Local,
            sender: sender.into(),
        })
    }

    /// Build a remote message from its wire form
    pub fn from_payload(payload: ChatPayload) -> Self {
        Self {
            text: payload.text,
            timestamp: payload.timestamp,
            origin: ChatOrigin::Remote,
            sender: payload.sender,
        }
    }

    /// Wire form, tagged with the room it belongs to
    pub fn to_payload(&self, room_id: &RoomId) -> ChatPayload {
        ChatPayload {
            text: self.text.clone(),
            timestamp: self.timestamp,
            sender: self.sender.clone(),
            room_id: Some(room_id.clone()),
        }
    }

    /// Whether this side wrote the message
    pub fn is_local(&self) -> bool {
        self.origin == ChatOrigin::Local
    }
}

/// Messages exchanged in the current session, oldest first
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
}

impl ChatLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// All messages
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
