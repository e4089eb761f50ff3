// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{collections::HashSet, fmt::Debug, sync::Arc};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::FailPredicate;
use crate::{Error, MembershipStore, Result};

/// Recorded membership operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipOp {
    /// `add(set, member)`.
    Add {
        /// The set name.
        set: String,
        /// The member added.
        member: String,
    },
    /// `remove(set, member)`.
    Remove {
        /// The set name.
        set: String,
        /// The member removed.
        member: String,
    },
    /// `count(set)`.
    Count(String),
    /// `is_member(set, member)`.
    IsMember {
        /// The set name.
        set: String,
        /// The member checked.
        member: String,
    },
}

struct Inner {
    sets: DashMap<String, HashSet<String>>,
    operations: Mutex<Vec<MembershipOp>>,
    fail_when: Mutex<Option<FailPredicate<MembershipOp>>>,
}

/// An in-memory [`MembershipStore`] backed by a `DashMap` of sets.
///
/// Clones share the same sets.
#[derive(Clone)]
pub struct InMemoryMembership {
    inner: Arc<Inner>,
}

impl Debug for InMemoryMembership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMembership")
            .field("sets", &self.inner.sets.len())
            .field("fail_when", &self.inner.fail_when.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryMembership {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMembership {
    /// Creates a store with no sets.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                sets: DashMap::new(),
                operations: Mutex::new(Vec::new()),
                fail_when: Mutex::new(None),
            }),
        }
    }

    /// Returns the members of `set`, sorted.
    #[must_use]
    pub fn members(&self, set: &str) -> Vec<String> {
        let mut members: Vec<String> = self
            .inner
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Sets a predicate selecting operations that fail with [`Error::Unavailable`].
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&MembershipOp) -> bool + Send + Sync + 'static,
    {
        *self.inner.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate.
    pub fn clear_failures(&self) {
        *self.inner.fail_when.lock() = None;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<MembershipOp> {
        self.inner.operations.lock().clone()
    }

    fn check(&self, op: MembershipOp, name: &'static str) -> Result<()> {
        let fail = self.inner.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        self.inner.operations.lock().push(op);
        if fail {
            return Err(Error::unavailable(name, "injected failure"));
        }
        Ok(())
    }
}

impl MembershipStore for InMemoryMembership {
    async fn add(&self, set: &str, member: &str) -> Result<bool> {
        self.check(
            MembershipOp::Add {
                set: set.to_owned(),
                member: member.to_owned(),
            },
            "add",
        )?;
        Ok(self.inner.sets.entry(set.to_owned()).or_default().insert(member.to_owned()))
    }

    async fn remove(&self, set: &str, member: &str) -> Result<bool> {
        self.check(
            MembershipOp::Remove {
                set: set.to_owned(),
                member: member.to_owned(),
            },
            "remove",
        )?;
        Ok(self.inner.sets.get_mut(set).is_some_and(|mut members| members.remove(member)))
    }

    async fn count(&self, set: &str) -> Result<u64> {
        self.check(MembershipOp::Count(set.to_owned()), "count")?;
        Ok(self.inner.sets.get(set).map_or(0, |members| members.len() as u64))
    }

    async fn is_member(&self, set: &str, member: &str) -> Result<bool> {
        self.check(
            MembershipOp::IsMember {
                set: set.to_owned(),
                member: member.to_owned(),
            },
            "is_member",
        )?;
        Ok(self.inner.sets.get(set).is_some_and(|members| members.contains(member)))
    }
}
