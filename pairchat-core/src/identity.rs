//! Participant identity and match filters

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Self-declared gender of a participant
///
/// Used only for filter matching and display, never for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    /// Male
    Male,
    /// Female
    Female,
    /// Anything else, including values this client does not know
    #[serde(other)]
    Other,
}

/// Opaque participant descriptor as exchanged with the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantIdentity {
    /// Opaque participant ID
    #[serde(rename = "_id", default)]
    pub id: String,
    /// Display name
    pub username: String,
    /// Optional gender attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    /// Optional location (country) attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ParticipantIdentity {
    /// Create an identity with a fresh random ID
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.into(),
            gender: None,
            location: None,
        }
    }

    /// Set the participant ID
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the gender attribute
    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = Some(gender);
        self
    }

    /// Set the location attribute
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Which partner genders a participant is willing to be paired with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GenderPreference {
    /// No preference
    #[default]
    #[serde(rename = "Anyone", alias = "Any")]
    Any,
    /// Only male partners
    Male,
    /// Only female partners
    Female,
}

impl GenderPreference {
    /// Check whether a partner with the given gender satisfies this preference
    pub fn admits(&self, gender: Option<Gender>) -> bool {
        match self {
            GenderPreference::Any => true,
            GenderPreference::Male => gender == Some(Gender::Male),
            GenderPreference::Female => gender == Some(Gender::Female),
        }
    }
}

/// Capability filters submitted with a match request
///
/// A snapshot is taken when the request is submitted; changing filters
/// needs a new request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchFilters {
    /// Gender preference
    #[serde(default)]
    pub gender: GenderPreference,
    /// Only pair with participants from the same location
    #[serde(
        default,
        rename = "sameCountryOnly",
        alias = "sameLocaleOnly"
    )]
    pub same_locale_only: bool,
}

impl MatchFilters {
    /// Filters that accept any partner
    pub fn any() -> Self {
        Self::default()
    }

    /// Set the gender preference
    pub fn gender(mut self, gender: GenderPreference) -> Self {
        self.gender = gender;
        self
    }

    /// Restrict pairing to the same location
    pub fn same_locale_only(mut self, same_locale_only: bool) -> Self {
        self.same_locale_only = same_locale_only;
        self
    }

    /// Evaluate these filters (held by `own`) against a candidate partner
    pub fn accepts(&self, own: &ParticipantIdentity, candidate: &ParticipantIdentity) -> bool {
        if !self.gender.admits(candidate.gender) {
            debug!(
                "Filter rejects {}: gender {:?} not admitted by {:?}",
                candidate.username, candidate.gender, self.gender
            );
            return false;
        }

        if self.same_locale_only {
            match (&own.location, &candidate.location) {
                (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => {}
                _ => {
                    debug!("Filter rejects {}: location mismatch", candidate.username);
                    return false;
                }
            }
        }

        true
    }
}

/// Evaluate two participants' filters in both directions
pub fn mutually_compatible(
    a: &ParticipantIdentity,
    a_filters: &MatchFilters,
    b: &ParticipantIdentity,
    b_filters: &MatchFilters,
) -> bool {
    a_filters.accepts(a, b) && b_filters.accepts(b, a)
}
