// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use registrar_store::REGISTRATIONS_SET_PREFIX;
use serde::{Deserialize, Serialize};

use crate::{
    Result,
    aggregates::{DEFAULT_COURSE_SCORES_TTL, DEFAULT_GPA_TTL},
};

/// Tunables of a [`Registrar`](crate::Registrar).
///
/// Missing fields take their defaults, so `{}` is a valid configuration.
///
/// # Examples
///
/// ```
/// use registrar::RegistrarConfig;
/// use std::time::Duration;
///
/// let config = RegistrarConfig::from_json(r#"{ "gpa_ttl_ms": 2000 }"#).unwrap();
/// assert_eq!(config.gpa_ttl(), Duration::from_secs(2));
/// assert_eq!(config.course_scores_ttl(), Duration::from_millis(100));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrarConfig {
    /// Freshness window of the GPA distribution, in milliseconds.
    pub gpa_ttl_ms: u64,
    /// Freshness window of each course's total score distribution, in milliseconds.
    pub course_scores_ttl_ms: u64,
    /// Prefix of the membership sets tracking each course's registrants.
    pub registrations_set_prefix: String,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            gpa_ttl_ms: duration_to_millis(DEFAULT_GPA_TTL),
            course_scores_ttl_ms: duration_to_millis(DEFAULT_COURSE_SCORES_TTL),
            registrations_set_prefix: REGISTRATIONS_SET_PREFIX.to_owned(),
        }
    }
}

impl RegistrarConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`](crate::Error::MalformedInput) if `json` is not a valid
    /// configuration object.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the GPA distribution freshness window.
    #[must_use]
    pub fn with_gpa_ttl(mut self, ttl: Duration) -> Self {
        self.gpa_ttl_ms = duration_to_millis(ttl);
        self
    }

    /// Sets the per-course distribution freshness window.
    #[must_use]
    pub fn with_course_scores_ttl(mut self, ttl: Duration) -> Self {
        self.course_scores_ttl_ms = duration_to_millis(ttl);
        self
    }

    /// Sets the membership set prefix.
    #[must_use]
    pub fn with_registrations_set_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.registrations_set_prefix = prefix.into();
        self
    }

    /// Freshness window of the GPA distribution.
    #[must_use]
    pub fn gpa_ttl(&self) -> Duration {
        Duration::from_millis(self.gpa_ttl_ms)
    }

    /// Freshness window of each course's total score distribution.
    #[must_use]
    pub fn course_scores_ttl(&self) -> Duration {
        Duration::from_millis(self.course_scores_ttl_ms)
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
