//! Per-attempt connection timeline and statistics

use pairchat_core::RoomId;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Lifecycle phase of one pairing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionPhase {
    /// Waiting for the coordinator
    Queued,
    /// Pairing received
    Matched,
    /// Engine negotiating
    Negotiating,
    /// Direct connection up
    Connected,
    /// Attempt over
    Ended,
}

/// Signal and chat counters for one attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    /// Payloads relayed to the partner
    pub signals_sent: u64,
    /// Payloads received for the current room
    pub signals_received: u64,
    /// Payloads that had to wait for the engine
    pub signals_buffered: u64,
    /// Payloads dropped because they targeted another room
    pub signals_stale: u64,
    /// Chat messages sent
    pub chat_sent: u64,
    /// Chat messages received
    pub chat_received: u64,
}

/// Timestamps of one attempt, from match request to teardown
#[derive(Debug, Clone)]
pub struct AttemptTimeline {
    room_id: Option<RoomId>,
    queued_at: Instant,
    matched_at: Option<Instant>,
    negotiating_at: Option<Instant>,
    connected_at: Option<Instant>,
    ended_at: Option<Instant>,
    /// Counters for this attempt
    pub stats: ConnectionStats,
}

impl AttemptTimeline {
    /// Start a timeline at the moment a match request is submitted
    pub fn start() -> Self {
        Self::start_at(Instant::now())
    }

    /// Start a timeline at a given instant
    pub fn start_at(queued_at: Instant) -> Self {
        Self {
            room_id: None,
            queued_at,
            matched_at: None,
            negotiating_at: None,
            connected_at: None,
            ended_at: None,
            stats: ConnectionStats::default(),
        }
    }

    /// Record that a phase was reached now
    pub fn mark(&mut self, phase: ConnectionPhase) {
        self.mark_at(phase, Instant::now());
    }

    /// Record that a phase was reached at `at`; only the first mark counts
    pub fn mark_at(&mut self, phase: ConnectionPhase, at: Instant) {
        let slot = match phase {
            ConnectionPhase::Queued => return,
            ConnectionPhase::Matched => &mut self.matched_at,
            ConnectionPhase::Negotiating => &mut self.negotiating_at,
            ConnectionPhase::Connected => &mut self.connected_at,
            ConnectionPhase::Ended => &mut self.ended_at,
        };
        slot.get_or_insert(at);
    }

    /// Record the room this attempt was paired into
    pub fn set_room(&mut self, room_id: RoomId) {
        self.room_id = Some(room_id);
    }

    /// Latest phase reached
    pub fn phase(&self) -> ConnectionPhase {
        if self.ended_at.is_some() {
            ConnectionPhase::Ended
        } else if self.connected_at.is_some() {
            ConnectionPhase::Connected
        } else if self.negotiating_at.is_some() {
            ConnectionPhase::Negotiating
        } else if self.matched_at.is_some() {
            ConnectionPhase::Matched
        } else {
            ConnectionPhase::Queued
        }
    }

    /// Time from request to pairing
    pub fn time_to_match(&self) -> Option<Duration> {
        self.matched_at.map(|t| t.duration_since(self.queued_at))
    }

    /// Time from pairing to established connection
    pub fn time_to_connect(&self) -> Option<Duration> {
        match (self.matched_at, self.connected_at) {
            (Some(matched), Some(connected)) => Some(connected.duration_since(matched)),
            _ => None,
        }
    }

    /// How long the connection was up
    pub fn connected_for(&self) -> Option<Duration> {
        match (self.connected_at, self.ended_at) {
            (Some(connected), Some(ended)) => Some(ended.duration_since(connected)),
            (Some(connected), None) => Some(connected.elapsed()),
            _ => None,
        }
    }

    /// Summarize the attempt
    pub fn summary(&self, outcome: impl Into<String>) -> AttemptSummary {
        AttemptSummary {
            room_id: self.room_id.clone(),
            phase_reached: self.phase(),
            time_to_match: self.time_to_match(),
            time_to_connect: self.time_to_connect(),
            connected_for: self.connected_for(),
            stats: self.stats.clone(),
            outcome: outcome.into(),
        }
    }
}

/// Serializable record of a finished attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptSummary {
    /// Room, if the attempt got that far
    pub room_id: Option<RoomId>,
    /// Furthest phase reached
    pub phase_reached: ConnectionPhase,
    /// Request to pairing
    pub time_to_match: Option<Duration>,
    /// Pairing to connection
    pub time_to_connect: Option<Duration>,
    /// Connection lifetime
    pub connected_for: Option<Duration>,
    /// Counters
    pub stats: ConnectionStats,
    /// Why the attempt ended
    pub outcome: String,
}

impl AttemptSummary {
    /// Render as a single JSON line for logs
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}
