//! Event system for session observers

use crate::chat::ChatMessage;
use crate::participant::RemoteParticipant;
use crate::state::SessionState;
use pairchat_core::{MatchFilters, PairChatError, RemoteStream, RoomId, TrackKind};
use pairchat_diagnostics::AttemptSummary;
use std::fmt;
use tokio::sync::mpsc;

/// Notice shown when the partner skips to someone else
pub const PARTNER_LEFT_NOTICE: &str = "Your partner moved on to someone else";

/// Why a pairing attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// Local disconnect request
    LocalDisconnect,
    /// Local skip or find-new request
    Skipped,
    /// Filters changed mid-session
    FiltersChanged,
    /// Partner skipped (`user-left`)
    PartnerLeft,
    /// Partner's session dropped (`partner-disconnected`)
    PartnerDisconnected,
    /// Engine reported closure
    EngineClosed,
    /// Media, engine, negotiation or transport failure
    Failed {
        /// Error code of the failure
        code: String,
    },
    /// Local leave or shutdown
    Left,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::LocalDisconnect => f.write_str("local disconnect"),
            EndReason::Skipped => f.write_str("skipped"),
            EndReason::FiltersChanged => f.write_str("filters changed"),
            EndReason::PartnerLeft => f.write_str("partner left"),
            EndReason::PartnerDisconnected => f.write_str("partner disconnected"),
            EndReason::EngineClosed => f.write_str("engine closed"),
            EndReason::Failed { code } => write!(f, "failed: {}", code),
            EndReason::Left => f.write_str("left"),
        }
    }
}

/// Session events delivered to observers
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The realtime transport reported it is connected
    TransportConnected,
    /// Session state changed
    StateChanged {
        /// Previous state
        from: SessionState,
        /// New state
        to: SessionState,
    },
    /// A match request was submitted
    Queued {
        /// Filter snapshot sent with the request
        filters: MatchFilters,
    },
    /// The coordinator paired this client
    PartnerMatched {
        /// The new partner
        partner: RemoteParticipant,
    },
    /// The partner's media became available
    RemoteStreamAvailable {
        /// Stream descriptor from the engine
        stream: RemoteStream,
    },
    /// Direct connection established
    Connected {
        /// Room of the live session
        room_id: RoomId,
    },
    /// A chat message was sent or received
    ChatMessage {
        /// The message
        message: ChatMessage,
    },
    /// A local track was enabled or disabled
    TrackToggled {
        /// Track kind
        kind: TrackKind,
        /// New enabled flag
        enabled: bool,
    },
    /// The partner skipped to a new match
    PartnerLeft {
        /// Text to show the user
        notice: String,
    },
    /// The partner's session dropped
    PartnerDisconnected,
    /// The current attempt is over
    SessionEnded {
        /// Why it ended
        reason: EndReason,
    },
    /// A failure that blocked progress
    Error {
        /// Error code for programmatic handling
        code: String,
        /// Human readable description
        error: String,
        /// Whether retrying can succeed without user action
        recoverable: bool,
    },
    /// Statistics of a finished attempt
    AttemptFinished {
        /// Timeline summary
        summary: AttemptSummary,
    },
}

impl SessionEvent {
    /// Build an error event from an error
    pub fn from_error(error: &PairChatError) -> Self {
        SessionEvent::Error {
            code: error.error_code(),
            error: error.to_string(),
            recoverable: error.is_recoverable(),
        }
    }

    /// Stable snake_case name of the variant
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::TransportConnected => "transport_connected",
            SessionEvent::StateChanged { .. } => "state_changed",
            SessionEvent::Queued { .. } => "queued",
            SessionEvent::PartnerMatched { .. } => "partner_matched",
            SessionEvent::RemoteStreamAvailable { .. } => "remote_stream_available",
            SessionEvent::Connected { .. } => "connected",
            SessionEvent::ChatMessage { .. } => "chat_message",
            SessionEvent::TrackToggled { .. } => "track_toggled",
            SessionEvent::PartnerLeft { .. } => "partner_left",
            SessionEvent::PartnerDisconnected => "partner_disconnected",
            SessionEvent::SessionEnded { .. } => "session_ended",
            SessionEvent::Error { .. } => "error",
            SessionEvent::AttemptFinished { .. } => "attempt_finished",
        }
    }

    /// Check if this is a lifecycle event
    pub fn is_lifecycle_event(&self) -> bool {
        matches!(
            self,
            SessionEvent::TransportConnected
                | SessionEvent::StateChanged { .. }
                | SessionEvent::Queued { .. }
                | SessionEvent::Connected { .. }
                | SessionEvent::SessionEnded { .. }
                | SessionEvent::AttemptFinished { .. }
        )
    }

    /// Check if this is a partner-related event
    pub fn is_partner_event(&self) -> bool {
        matches!(
            self,
            SessionEvent::PartnerMatched { .. }
                | SessionEvent::RemoteStreamAvailable { .. }
                | SessionEvent::PartnerLeft { .. }
                | SessionEvent::PartnerDisconnected
        )
    }

    /// Check if this is a chat event
    pub fn is_chat_event(&self) -> bool {
        matches!(self, SessionEvent::ChatMessage { .. })
    }

    /// Check if this is a track event
    pub fn is_track_event(&self) -> bool {
        matches!(
            self,
            SessionEvent::TrackToggled { .. } | SessionEvent::RemoteStreamAvailable { .. }
        )
    }

    /// Whether this reports a failure
    pub fn is_error_event(&self) -> bool {
        matches!(self, SessionEvent::Error { .. })
    }
}

/// Receiving end of one event subscription
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventStream {
    /// Wrap a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<SessionEvent>) -> Self {
        Self { receiver }
    }

    /// Wait for the next event; `None` once the controller stopped
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.receiver.recv().await
    }

    /// Next buffered event, if any
    pub fn try_next(&mut self) -> Result<Option<SessionEvent>, mpsc::error::TryRecvError> {
        use mpsc::error::TryRecvError;
        match self.receiver.try_recv() {
            Err(TryRecvError::Empty) => Ok(None),
            other => other.map(Some),
        }
    }

    /// Stop receiving; buffered events can still be read
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Only yield events matching `filter`
    pub fn filtered(self, filter: EventFilter) -> FilteredEventStream {
        FilteredEventStream::new(self, filter)
    }
}

/// Selects which event groups an observer sees
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// State changes, queueing, connection and teardown
    pub include_lifecycle_events: bool,
    /// Partner matched, left or disconnected, remote stream
    pub include_partner_events: bool,
    /// Chat sent and received
    pub include_chat_events: bool,
    /// Local track toggles
    pub include_track_events: bool,
    /// Failure reports
    pub include_error_events: bool,
    /// When set, only these event types pass and the flags are ignored
    pub specific_event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Pass everything
    pub fn all() -> Self {
        Self {
            include_lifecycle_events: true,
            include_partner_events: true,
            include_chat_events: true,
            include_track_events: true,
            include_error_events: true,
            specific_event_types: None,
        }
    }

    fn none() -> Self {
        Self {
            include_lifecycle_events: false,
            include_partner_events: false,
            include_chat_events: false,
            include_track_events: false,
            include_error_events: false,
            specific_event_types: None,
        }
    }

    /// Create a filter that includes only chat events
    pub fn chat_only() -> Self {
        Self {
            include_chat_events: true,
            ..Self::none()
        }
    }

    /// Create a filter that includes only lifecycle events
    pub fn lifecycle_only() -> Self {
        Self {
            include_lifecycle_events: true,
            ..Self::none()
        }
    }

    /// Create a filter that includes only partner events
    pub fn partner_only() -> Self {
        Self {
            include_partner_events: true,
            ..Self::none()
        }
    }

    /// Only the named event types (see [`SessionEvent::event_type`])
    pub fn specific(event_types: Vec<String>) -> Self {
        Self {
            specific_event_types: Some(event_types),
            ..Self::none()
        }
    }

    /// Whether `event` passes this filter
    pub fn should_include(&self, event: &SessionEvent) -> bool {
        if let Some(types) = &self.specific_event_types {
            return types.iter().any(|t| t == event.event_type());
        }

        (self.include_lifecycle_events && event.is_lifecycle_event())
            || (self.include_partner_events && event.is_partner_event())
            || (self.include_chat_events && event.is_chat_event())
            || (self.include_track_events && event.is_track_event())
            || (self.include_error_events && event.is_error_event())
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// [`EventStream`] that skips events rejected by its [`EventFilter`]
#[derive(Debug)]
pub struct FilteredEventStream {
    stream: EventStream,
    filter: EventFilter,
}

impl FilteredEventStream {
    /// Wrap `stream` with `filter`
    pub fn new(stream: EventStream, filter: EventFilter) -> Self {
        Self { stream, filter }
    }

    /// Wait for the next event that passes the filter
    pub async fn next(&mut self) -> Option<SessionEvent> {
        while let Some(event) = self.stream.next().await {
            if self.filter.should_include(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Next buffered event that passes the filter, if any
    pub fn try_next(&mut self) -> Result<Option<SessionEvent>, mpsc::error::TryRecvError> {
        while let Some(event) = self.stream.try_next()? {
            if self.filter.should_include(&event) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    /// Replace the filter
    pub fn set_filter(&mut self, filter: EventFilter) {
        self.filter = filter;
    }

    /// Active filter
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}
