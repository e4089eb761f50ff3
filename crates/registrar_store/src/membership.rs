// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The key-value set-membership store contract.

use crate::Result;

/// Default prefix of the per-course registrant sets; a set is named by the prefix followed by
/// the course id.
pub const REGISTRATIONS_SET_PREFIX: &str = "registrations:";

/// A store of named string sets.
pub trait MembershipStore: Send + Sync {
    /// Adds `member` to `set`. Returns `true` if it was not present.
    fn add(&self, set: &str, member: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Removes `member` from `set`. Returns `true` if it was present.
    fn remove(&self, set: &str, member: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Number of members of `set`; `0` for an unknown set.
    fn count(&self, set: &str) -> impl Future<Output = Result<u64>> + Send;

    /// Returns `true` if `member` belongs to `set`.
    fn is_member(&self, set: &str, member: &str) -> impl Future<Output = Result<bool>> + Send;
}
