// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for store operations.

use thiserror::Error;

/// A specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A failure reported by a relational or set-membership store.
///
/// Every variant describes an environmental problem rather than a business-rule violation, so
/// callers treat all of them as transient: the current operation is aborted and rolled back, and
/// any retry is up to whoever issued the request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The store could not be reached or rejected the operation.
    #[error("store unavailable during {operation}: {reason}")]
    Unavailable {
        /// The store operation that failed.
        operation: &'static str,
        /// Backend-specific description.
        reason: String,
    },

    /// A row lock could not be acquired before the lock wait timeout expired.
    #[error("lock wait timed out on {resource}")]
    LockTimeout {
        /// The locked resource, e.g. `courses/01FH`.
        resource: String,
    },
}

impl Error {
    /// Creates an [`Error::Unavailable`] for `operation`.
    pub fn unavailable(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            operation,
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::LockTimeout`] for `resource`.
    pub fn lock_timeout(resource: impl Into<String>) -> Self {
        Self::LockTimeout { resource: resource.into() }
    }
}

/// An input string that does not name a valid identifier or enum value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {kind}: {input:?}")]
pub struct ParseError {
    kind: &'static str,
    input: String,
}

impl ParseError {
    pub(crate) fn new(kind: &'static str, input: impl Into<String>) -> Self {
        Self { kind, input: input.into() }
    }

    /// What was being parsed, e.g. `"course id"`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// The rejected input.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }
}
