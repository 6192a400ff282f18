//! Local and remote participant state

use chrono::{DateTime, Utc};
use pairchat_core::{MatchFilters, ParticipantIdentity, RoomAssignment, RoomId, Role};

/// This client's participant
#[derive(Debug, Clone)]
pub struct LocalParticipant {
    identity: ParticipantIdentity,
    filters: Option<MatchFilters>,
}

impl LocalParticipant {
    /// Wrap an identity; no filters have been applied yet
    pub fn new(identity: ParticipantIdentity) -> Self {
        Self {
            identity,
            filters: None,
        }
    }

    /// Get participant ID
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    /// Identity sent with match requests
    pub fn identity(&self) -> &ParticipantIdentity {
        &self.identity
    }

    /// Filters of the last submitted request
    pub fn filters(&self) -> Option<&MatchFilters> {
        self.filters.as_ref()
    }

    /// Record the snapshot for a new request
    pub fn apply_filters(&mut self, filters: MatchFilters) {
        self.filters = Some(filters);
    }

    /// Last applied filters, or accept-anyone when none were applied
    pub fn filters_or_default(&self) -> MatchFilters {
        self.filters.clone().unwrap_or_default()
    }
}

/// The partner of the current pairing
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteParticipant {
    identity: ParticipantIdentity,
    room_id: RoomId,
    role: Role,
    matched_at: DateTime<Utc>,
}

impl RemoteParticipant {
    /// Partner described by a room assignment; `role` is this side's role
    pub fn from_assignment(assignment: &RoomAssignment) -> Self {
        Self {
            identity: assignment.partner().clone(),
            room_id: assignment.room_id().clone(),
            role: assignment.role(),
            matched_at: Utc::now(),
        }
    }

    /// Get participant ID
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    /// Partner display name
    pub fn username(&self) -> &str {
        &self.identity.username
    }

    /// Full identity
    pub fn identity(&self) -> &ParticipantIdentity {
        &self.identity
    }

    /// Room shared with the partner
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// This side's negotiation role in the room
    pub fn local_role(&self) -> Role {
        self.role
    }

    /// When the pairing arrived
    pub fn matched_at(&self) -> DateTime<Utc> {
        self.matched_at
    }
}
