//! Local camera and microphone tracks

use pairchat_core::{MediaSource, TrackKind};
use std::sync::Arc;
use tracing::{debug, info};

/// Handle to the acquired local capture
///
/// The same [`MediaSource`] is shared with the negotiation engine, so
/// enabling or disabling a track here affects what the partner receives
/// without any renegotiation.
#[derive(Debug, Clone)]
pub struct LocalTracks {
    source: Arc<dyn MediaSource>,
}

impl LocalTracks {
    /// Wrap an acquired capture
    pub fn new(source: Arc<dyn MediaSource>) -> Self {
        info!("🎥 Local media acquired: {}", source.id());
        Self { source }
    }

    /// Shared capture handed to the engine
    pub fn media(&self) -> Arc<dyn MediaSource> {
        Arc::clone(&self.source)
    }

    /// Capture identifier
    pub fn id(&self) -> &str {
        self.source.id()
    }

    /// Enabled flag of a track, `None` when the capture has no such track
    pub fn is_enabled(&self, kind: TrackKind) -> Option<bool> {
        self.source.track_enabled(kind)
    }

    /// Set a track's enabled flag; returns the resulting value
    pub fn set_enabled(&self, kind: TrackKind, enabled: bool) -> Option<bool> {
        let current = self.source.track_enabled(kind)?;
        if current == enabled {
            return Some(current);
        }
        match (kind, enabled) {
            (TrackKind::Audio, false) => info!("🔇 Muting local {} track", kind),
            (TrackKind::Audio, true) => info!("🔊 Unmuting local {} track", kind),
            (TrackKind::Video, false) => info!("📷 Disabling local {} track", kind),
            (TrackKind::Video, true) => info!("📹 Enabling local {} track", kind),
        }
        if self.source.set_track_enabled(kind, enabled) {
            Some(enabled)
        } else {
            Some(current)
        }
    }

    /// Flip a track's enabled flag; returns the new value
    pub fn toggle(&self, kind: TrackKind) -> Option<bool> {
        let current = self.source.track_enabled(kind)?;
        self.set_enabled(kind, !current)
    }

    /// Stop every track and release the devices
    pub fn release(self) {
        debug!("🛑 Releasing local media {}", self.source.id());
        self.source.stop();
    }
}
