//! Local media capture seam

use crate::error::PairChatError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    /// Microphone audio
    Audio,
    /// Camera video
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

/// A min/ideal/max range for one capture dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionRange {
    /// Minimum acceptable value
    pub min: u32,
    /// Preferred value
    pub ideal: u32,
    /// Maximum acceptable value
    pub max: u32,
}

/// What to request from the capture devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    /// Capture video
    pub video: bool,
    /// Capture audio
    pub audio: bool,
    /// Video width in pixels
    pub width: DimensionRange,
    /// Video height in pixels
    pub height: DimensionRange,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
            width: DimensionRange {
                min: 640,
                ideal: 1280,
                max: 1920,
            },
            height: DimensionRange {
                min: 480,
                ideal: 720,
                max: 1080,
            },
        }
    }
}

/// A live local capture (camera and microphone tracks)
///
/// Shared between the controller and the negotiation engine, so the enabled
/// flags use interior mutability.
pub trait MediaSource: Send + Sync + fmt::Debug {
    /// Stable identifier of this capture
    fn id(&self) -> &str;

    /// Enabled flag of the track of the given kind, or `None` when absent
    fn track_enabled(&self, kind: TrackKind) -> Option<bool>;

    /// Set the enabled flag; returns `false` when no such track exists
    fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> bool;

    /// Stop all tracks and release the devices
    fn stop(&self);
}

/// Capture device access
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire local camera/microphone tracks
    ///
    /// Denied or unsupported capture is reported as
    /// [`PairChatError::MediaUnavailable`].
    async fn acquire(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Arc<dyn MediaSource>, PairChatError>;
}

/// Descriptor of the partner's media stream as surfaced by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    /// Stream identifier assigned by the engine
    pub id: String,
    /// Track kinds carried by the stream
    pub tracks: Vec<TrackKind>,
}

impl RemoteStream {
    /// Create a stream descriptor
    pub fn new(id: impl Into<String>, tracks: Vec<TrackKind>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    /// Whether the stream carries a track of the given kind
    pub fn has_track(&self, kind: TrackKind) -> bool {
        self.tracks.contains(&kind)
    }
}
