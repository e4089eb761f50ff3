// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Row types shared by the store contracts and the registrar core.

use std::{borrow::Borrow, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parses an identifier, rejecting empty or blank input.
            ///
            /// # Errors
            ///
            /// Returns [`ParseError`] if `id` is empty or only whitespace.
            pub fn parse(id: impl Into<String>) -> Result<Self, ParseError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ParseError::new($kind, id));
                }
                Ok(Self(id))
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a course row.
    CourseId,
    "course id"
);

string_id!(
    /// Identifier of an authenticated user.
    UserId,
    "user id"
);

/// Lifecycle state of a course.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CourseStatus {
    /// Open for registration.
    Registration,
    /// Running; no longer accepts registrations.
    InProgress,
    /// Finished; scores count towards GPA.
    Closed,
}

impl CourseStatus {
    /// Returns the wire name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::InProgress => "in-progress",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(Self::Registration),
            "in-progress" => Ok(Self::InProgress),
            "closed" => Ok(Self::Closed),
            other => Err(ParseError::new("course status", other)),
        }
    }
}

/// Day on which a course meets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    /// Monday.
    Monday,
    /// Tuesday.
    Tuesday,
    /// Wednesday.
    Wednesday,
    /// Thursday.
    Thursday,
    /// Friday.
    Friday,
}

impl DayOfWeek {
    /// All teaching days, Monday first.
    pub const ALL: [Self; 5] = [Self::Monday, Self::Tuesday, Self::Wednesday, Self::Thursday, Self::Friday];

    /// Returns the wire name of the day.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayOfWeek {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|day| day.as_str() == s)
            .ok_or_else(|| ParseError::new("day of week", s))
    }
}

/// Immutable projection of a course row used for eligibility, conflict checks and reports.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CourseSnapshot {
    /// Row id.
    pub id: CourseId,
    /// Human-facing course code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Lifecycle state.
    pub status: CourseStatus,
    /// Period (time slot) within the day.
    pub period: u8,
    /// Day the course meets.
    pub day_of_week: DayOfWeek,
    /// Credits awarded on completion.
    pub credit: u8,
}

impl CourseSnapshot {
    /// The `(period, day)` pair two courses must share to conflict.
    #[must_use]
    pub fn schedule_slot(&self) -> (u8, DayOfWeek) {
        (self.period, self.day_of_week)
    }

    /// Returns `true` if both courses are distinct rows meeting in the same slot.
    #[must_use]
    pub fn conflicts_with(&self, other: &Self) -> bool {
        self.id != other.id && self.schedule_slot() == other.schedule_slot()
    }

    /// Returns a copy of this snapshot with `status` replaced.
    #[must_use]
    pub fn with_status(&self, status: CourseStatus) -> Self {
        Self { status, ..self.clone() }
    }
}
