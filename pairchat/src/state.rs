//! Session states and the transition table

use pairchat_core::PairChatError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the one session a controller owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Nothing requested
    Idle,
    /// Match request outstanding
    Queued,
    /// Pairing received, local media being prepared
    Matched,
    /// Engine constructed or being constructed, exchanging signals
    Negotiating,
    /// Direct channel up
    Connected,
    /// Attempt over; terminal until skip, find-new or a new request
    Ended,
}

impl SessionState {
    /// Get the state name
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Queued => "Queued",
            SessionState::Matched => "Matched",
            SessionState::Negotiating => "Negotiating",
            SessionState::Connected => "Connected",
            SessionState::Ended => "Ended",
        }
    }

    /// Whether a room assignment is held in this state
    pub fn is_paired(&self) -> bool {
        matches!(
            self,
            SessionState::Matched | SessionState::Negotiating | SessionState::Connected
        )
    }

    /// Check the transition table
    pub fn can_transition_to(&self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Idle, Queued)
                | (Queued, Matched)
                | (Queued, Ended)
                | (Matched, Negotiating)
                | (Matched, Ended)
                | (Negotiating, Connected)
                | (Negotiating, Ended)
                | (Connected, Ended)
                | (Ended, Queued)
                | (Ended, Idle)
        )
    }

    /// Validate and perform a transition
    pub fn transition(self, to: SessionState) -> Result<SessionState, PairChatError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(PairChatError::InvalidTransition {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
