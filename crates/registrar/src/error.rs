// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for registrar operations.

use std::sync::Arc;

use thiserror::Error;

/// A specialized `Result` type for registrar operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced entity does not exist.
    NotFound,
    /// An entity exists but is not in the lifecycle state the operation requires.
    InvalidState,
    /// A business rule was violated.
    Conflict,
    /// The store failed; the operation was aborted and may be retried by the caller.
    Transient,
    /// The request could not be parsed.
    MalformedInput,
}

/// An error originating in the registrar core.
///
/// Violations found while resolving a registration batch are not reported through this type;
/// they are collected into an
/// [`EnrollmentBatchResult`](crate::EnrollmentBatchResult) so callers can report all
/// of them at once. `Error` is for operations that stop: a missing entity on a single-entity
/// operation, a store failure, or unparseable input.
///
/// The type is cheap to clone so one failed recomputation can be handed to every caller waiting
/// on it.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// A referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity type, e.g. `"course"`.
        entity: &'static str,
        /// The missing id.
        id: String,
    },

    /// An entity is not in the required lifecycle state.
    #[error("{entity} {id} is {state}")]
    InvalidState {
        /// Entity type, e.g. `"course"`.
        entity: &'static str,
        /// The entity id.
        id: String,
        /// The state it is actually in.
        state: String,
    },

    /// A business rule was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The relational or membership store failed.
    #[error("transient store failure")]
    Transient(#[source] Arc<registrar_store::Error>),

    /// The request could not be parsed.
    #[error("malformed input: {0}")]
    MalformedInput(String),
}

impl Error {
    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Transient(_) => ErrorKind::Transient,
            Self::MalformedInput(_) => ErrorKind::MalformedInput,
        }
    }

    /// Returns `true` for store failures the caller may retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub(crate) fn course_not_found(id: &registrar_store::CourseId) -> Self {
        Self::NotFound {
            entity: "course",
            id: id.to_string(),
        }
    }
}

impl From<registrar_store::Error> for Error {
    fn from(error: registrar_store::Error) -> Self {
        Self::Transient(Arc::new(error))
    }
}

impl From<registrar_store::ParseError> for Error {
    fn from(error: registrar_store::ParseError) -> Self {
        Self::MalformedInput(error.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::MalformedInput(error.to_string())
    }
}
