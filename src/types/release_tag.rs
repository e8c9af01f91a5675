// ABOUTME: Release identifiers used as directory names under releases/.
// ABOUTME: Defaults to a UTC timestamp so releases sort chronologically.

use crate::security::{ValidationError, validate_release_tag};
use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReleaseTag(String);

impl ReleaseTag {
    pub fn new(value: &str) -> Result<Self, ValidationError> {
        validate_release_tag(value)?;
        Ok(Self(value.to_string()))
    }

    /// Tag derived from a point in time, e.g. `20260101120000`.
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self(at.format("%Y%m%d%H%M%S").to_string())
    }

    pub fn now() -> Self {
        Self::from_timestamp(Utc::now())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
