// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! All-or-nothing resolution of course registration batches.

use std::{collections::BTreeSet, fmt::Debug, sync::Arc};

use registrar_store::{CourseId, CourseSnapshot, CourseStatus, MembershipStore, RelationalStore, Transaction, UserId};
use serde::{Deserialize, Serialize};

use crate::{CourseLookupCache, Result};

/// Every reason a registration batch was rejected, grouped by category.
///
/// Each list is in ascending id order and names an id at most once. The serialized form uses the
/// wire names `course_not_found`, `not_registrable_status` and `schedule_conflict`, omitting empty
/// lists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentBatchResult {
    /// Requested ids with no course row.
    #[serde(rename = "course_not_found", default, skip_serializing_if = "Vec::is_empty")]
    pub not_found: Vec<CourseId>,
    /// Requested courses that are not open for registration.
    #[serde(rename = "not_registrable_status", default, skip_serializing_if = "Vec::is_empty")]
    pub not_registrable: Vec<CourseId>,
    /// Requested courses sharing a period and day with another active or requested course.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schedule_conflict: Vec<CourseId>,
}

impl EnrollmentBatchResult {
    /// Returns `true` if no violation was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.not_found.is_empty() && self.not_registrable.is_empty() && self.schedule_conflict.is_empty()
    }

    /// Total number of violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.not_found.len() + self.not_registrable.len() + self.schedule_conflict.len()
    }

    /// Renders the rejection body.
    #[must_use]
    pub fn to_json(&self) -> String {
        // Lists of plain strings always serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// What a successful resolution committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPlan {
    /// The registering user.
    pub user: UserId,
    /// Courses newly registered by this batch, ascending.
    pub added: Vec<CourseId>,
    /// Requested courses the user was already registered in, ascending.
    pub already_enrolled: Vec<CourseId>,
}

impl CommitPlan {
    fn empty(user: &UserId) -> Self {
        Self {
            user: user.clone(),
            added: Vec::new(),
            already_enrolled: Vec::new(),
        }
    }
}

/// Outcome of [`RegistrationResolver::resolve`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The batch was valid and is committed.
    Committed(CommitPlan),
    /// The batch violated at least one rule; nothing was written.
    Rejected(EnrollmentBatchResult),
}

impl Resolution {
    /// Returns `true` for [`Resolution::Committed`].
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    /// The commit plan, if the batch was committed.
    #[must_use]
    pub fn committed(&self) -> Option<&CommitPlan> {
        match self {
            Self::Committed(plan) => Some(plan),
            Self::Rejected(_) => None,
        }
    }

    /// The violations, if the batch was rejected.
    #[must_use]
    pub fn rejected(&self) -> Option<&EnrollmentBatchResult> {
        match self {
            Self::Committed(_) => None,
            Self::Rejected(result) => Some(result),
        }
    }
}

/// Validates a user's batch of requested courses and commits it all-or-nothing.
///
/// Resolution runs inside one relational transaction:
///
/// 1. Shared row locks are taken on every requested id, in ascending order. A concurrent status
///    change holds the exclusive lock on its row until it has committed and refreshed the course
///    cache, so the course rows read afterwards are current.
/// 2. Each id is resolved through the [`CourseLookupCache`], falling back to the transaction.
///    Missing ids, courses not open for registration, and schedule conflicts are collected;
///    courses the user is already registered in are skipped.
/// 3. With any violation the transaction is rolled back and the violations are returned.
///    Otherwise the new registrations are inserted and committed, then every requested course
///    the user now holds is added to its membership set.
///
/// Store failures abort with [`Error::Transient`](crate::Error::Transient) and are never retried
/// here.
pub struct RegistrationResolver<S, M> {
    store: Arc<S>,
    membership: Arc<M>,
    courses: Arc<CourseLookupCache>,
    set_prefix: String,
}

impl<S, M> Debug for RegistrationResolver<S, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationResolver")
            .field("courses", &self.courses)
            .field("set_prefix", &self.set_prefix)
            .finish_non_exhaustive()
    }
}

impl<S, M> RegistrationResolver<S, M>
where
    S: RelationalStore,
    M: MembershipStore,
{
    /// Creates a resolver sharing `courses` with the rest of the registrar.
    ///
    /// Membership set names are `set_prefix` followed by the course id.
    #[must_use]
    pub fn new(store: Arc<S>, membership: Arc<M>, courses: Arc<CourseLookupCache>, set_prefix: impl Into<String>) -> Self {
        Self {
            store,
            membership,
            courses,
            set_prefix: set_prefix.into(),
        }
    }

    /// Name of the membership set tracking the registrants of `course`.
    #[must_use]
    pub fn registrations_set(&self, course: &CourseId) -> String {
        format!("{}{course}", self.set_prefix)
    }

    /// Resolves `user`'s request for `requested` courses.
    ///
    /// Duplicate ids are ignored. An empty request commits an empty plan without touching
    /// either store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transient`](crate::Error::Transient) if either store fails. A relational
    /// failure commits nothing and leaves membership untouched. A membership failure happens after
    /// the commit; the rows stay and resolving the same batch again fills in the missing members.
    pub async fn resolve(&self, user: &UserId, requested: &[CourseId]) -> Result<Resolution> {
        let ids: Vec<CourseId> = requested.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        if ids.is_empty() {
            tracing::debug!(user_id = %user, "registration.empty");
            return Ok(Resolution::Committed(CommitPlan::empty(user)));
        }

        let mut tx = self.store.begin().await?;
        tx.lock_courses_shared(&ids).await?;

        let mut rejection = EnrollmentBatchResult::default();
        let mut already_enrolled = Vec::new();
        let mut candidates = Vec::new();

        for id in &ids {
            let Some(course) = self.courses.get_or_try_load(id, || tx.course(id)).await? else {
                tracing::debug!(user_id = %user, course_id = %id, "registration.not_found");
                rejection.not_found.push(id.clone());
                continue;
            };

            if course.status != CourseStatus::Registration {
                tracing::debug!(user_id = %user, course_id = %id, status = %course.status, "registration.not_registrable");
                rejection.not_registrable.push(id.clone());
                continue;
            }

            if tx.is_enrolled(user, id).await? {
                tracing::debug!(user_id = %user, course_id = %id, "registration.already_enrolled");
                already_enrolled.push(id.clone());
                continue;
            }

            candidates.push(course);
        }

        if !candidates.is_empty() {
            let existing = tx.active_enrollments(user).await?;
            rejection.schedule_conflict = schedule_conflicts(&existing, &candidates);
        }

        if !rejection.is_empty() {
            tracing::warn!(
                user_id = %user,
                not_found = rejection.not_found.len(),
                not_registrable = rejection.not_registrable.len(),
                schedule_conflict = rejection.schedule_conflict.len(),
                "registration.rejected"
            );
            // Dropping the transaction rolls it back.
            return Ok(Resolution::Rejected(rejection));
        }

        let added: Vec<CourseId> = candidates.into_iter().map(|course| course.id).collect();
        if !added.is_empty() {
            tx.insert_enrollments(user, &added).await?;
        }
        tx.commit().await?;

        tracing::info!(
            user_id = %user,
            added = added.len(),
            already_enrolled = already_enrolled.len(),
            "registration.committed"
        );

        // Membership only mirrors committed rows. Already held courses are re-added so that a retry
        // after a membership failure converges.
        for id in added.iter().chain(&already_enrolled) {
            let set = self.registrations_set(id);
            match self.membership.add(&set, user.as_str()).await {
                Ok(true) if already_enrolled.contains(id) => {
                    tracing::warn!(user_id = %user, course_id = %id, "registration.membership_repaired");
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(user_id = %user, course_id = %id, %error, "registration.membership_failed");
                    return Err(error.into());
                }
            }
        }

        Ok(Resolution::Committed(CommitPlan {
            user: user.clone(),
            added,
            already_enrolled,
        }))
    }
}

/// Ids of requested courses that share a slot with another active or requested course.
///
/// A candidate clashing with an existing registration is flagged; two clashing candidates are
/// both flagged. Existing registrations are never flagged against each other.
fn schedule_conflicts(existing: &[CourseSnapshot], candidates: &[CourseSnapshot]) -> Vec<CourseId> {
    let mut conflicting = BTreeSet::new();
    for (index, candidate) in candidates.iter().enumerate() {
        if existing.iter().any(|course| candidate.conflicts_with(course)) {
            conflicting.insert(candidate.id.clone());
        }
        for other in &candidates[index + 1..] {
            if candidate.conflicts_with(other) {
                conflicting.insert(candidate.id.clone());
                conflicting.insert(other.id.clone());
            }
        }
    }
    conflicting.into_iter().collect()
}
