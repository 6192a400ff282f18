//! Configuration types and defaults

use pairchat_core::{default_ice_servers, IceServer, MediaConstraints, PairChatError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happens to local media when a pairing is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaPolicy {
    /// Keep the capture running and hand it to the next engine
    #[default]
    Reuse,
    /// Stop the capture on every teardown and acquire it again on the next pairing
    Reacquire,
}

/// Session controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Give up on a pairing that is not connected within this period;
    /// `None` waits forever
    #[serde(with = "opt_millis", rename = "negotiation_timeout_ms")]
    pub negotiation_timeout: Option<Duration>,
    /// Pause between tearing down a pairing and re-requesting a match
    #[serde(with = "millis", rename = "rematch_delay_ms")]
    pub rematch_delay: Duration,
    /// Keep or drop local media across pairings
    pub media_policy: MediaPolicy,
    /// ICE servers handed to every engine
    pub ice_servers: Vec<IceServer>,
    /// Trickle ICE candidates
    pub trickle: bool,
    /// Capture request
    pub media_constraints: MediaConstraints,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout: Some(Duration::from_secs(30)),
            rematch_delay: Duration::from_millis(500),
            media_policy: MediaPolicy::Reuse,
            ice_servers: default_ice_servers(),
            trickle: true,
            media_constraints: MediaConstraints::default(),
        }
    }
}

impl SessionConfig {
    /// Set or disable the negotiation timeout
    pub fn negotiation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.negotiation_timeout = timeout;
        self
    }

    /// Set the delay before re-requesting a match
    pub fn rematch_delay(mut self, delay: Duration) -> Self {
        self.rematch_delay = delay;
        self
    }

    /// Set the media policy
    pub fn media_policy(mut self, policy: MediaPolicy) -> Self {
        self.media_policy = policy;
        self
    }

    /// Replace the ICE server list
    pub fn ice_servers(mut self, servers: Vec<IceServer>) -> Self {
        self.ice_servers = servers;
        self
    }

    /// Enable or disable trickle ICE
    pub fn trickle(mut self, trickle: bool) -> Self {
        self.trickle = trickle;
        self
    }

    /// Set the capture request
    pub fn media_constraints(mut self, constraints: MediaConstraints) -> Self {
        self.media_constraints = constraints;
        self
    }

    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, PairChatError> {
        let config: Self = serde_json::from_str(json).map_err(|e| PairChatError::InvalidMessage {
            message: "session config".to_string(),
            source: e.into(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), PairChatError> {
        if self.negotiation_timeout == Some(Duration::ZERO) {
            return Err(PairChatError::InvalidConfiguration {
                field: "negotiation_timeout".to_string(),
                reason: "must be positive; use None to disable".to_string(),
            });
        }
        if self.ice_servers.iter().any(|s| s.urls.is_empty()) {
            return Err(PairChatError::InvalidConfiguration {
                field: "ice_servers".to_string(),
                reason: "every server needs at least one URL".to_string(),
            });
        }
        let constraints = &self.media_constraints;
        if !constraints.audio && !constraints.video {
            return Err(PairChatError::InvalidConfiguration {
                field: "media_constraints".to_string(),
                reason: "neither audio nor video requested".to_string(),
            });
        }
        for (name, range) in [("width", constraints.width), ("height", constraints.height)] {
            if range.min > range.ideal || range.ideal > range.max {
                return Err(PairChatError::InvalidConfiguration {
                    field: format!("media_constraints.{}", name),
                    reason: format!(
                        "expected min <= ideal <= max, got {}/{}/{}",
                        range.min, range.ideal, range.max
                    ),
                });
            }
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
