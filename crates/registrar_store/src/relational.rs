// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The relational store contract.
//!
//! The registrar core never composes SQL. It needs point reads, row-level locks scoped to a
//! transaction, one batched insert, and two aggregate queries; [`RelationalStore`] and
//! [`Transaction`] name exactly those.

use crate::{CourseId, CourseSnapshot, CourseStatus, Result, UserId};

/// A relational store owning course, registration and score rows.
pub trait RelationalStore: Send + Sync {
    /// The transaction handle produced by [`begin`](Self::begin).
    type Transaction: Transaction;

    /// Opens a transaction. Dropping the handle without calling
    /// [`commit`](Transaction::commit) rolls it back and releases its locks.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction>> + Send;

    /// Grade point average of every student with at least one closed course, one value per
    /// student ordered by user id.
    ///
    /// Each value is `Σ(total_score × credit) / 100 / Σcredit` over the student's closed
    /// courses.
    fn gpa_distribution(&self) -> impl Future<Output = Result<Vec<f64>>> + Send;

    /// Total score of every registrant of `course`, one value per registrant ordered by user
    /// id. Registrants without scores contribute `0`.
    fn course_total_scores(&self, course: &CourseId) -> impl Future<Output = Result<Vec<i64>>> + Send;
}

/// A unit of work against a [`RelationalStore`].
///
/// Reads observe committed rows plus this transaction's own pending writes. Locks are held until
/// the transaction is committed or dropped.
pub trait Transaction: Send {
    /// Takes shared (`FOR SHARE`) row locks on `courses`, in the order given.
    ///
    /// Ids without a row are locked as well, so a concurrent insert of that id cannot race the
    /// caller's "not found" decision. Callers pass ids in ascending order to keep lock order
    /// consistent across transactions.
    fn lock_courses_shared(&mut self, courses: &[CourseId]) -> impl Future<Output = Result<()>> + Send;

    /// Reads a course row.
    fn course(&mut self, course: &CourseId) -> impl Future<Output = Result<Option<CourseSnapshot>>> + Send;

    /// Takes an exclusive (`FOR UPDATE`) row lock on `course` and reads it.
    fn course_for_update(&mut self, course: &CourseId) -> impl Future<Output = Result<Option<CourseSnapshot>>> + Send;

    /// Returns `true` if `user` is registered in `course`.
    fn is_enrolled(&mut self, user: &UserId, course: &CourseId) -> impl Future<Output = Result<bool>> + Send;

    /// Courses `user` is registered in whose status is not [`CourseStatus::Closed`].
    fn active_enrollments(&mut self, user: &UserId) -> impl Future<Output = Result<Vec<CourseSnapshot>>> + Send;

    /// Registers `user` in every course of `courses` with one batched statement, ignoring pairs
    /// that already exist. Returns the number of rows this statement added.
    fn insert_enrollments(&mut self, user: &UserId, courses: &[CourseId]) -> impl Future<Output = Result<u64>> + Send;

    /// Sets the status of `course`. Callers hold the row's exclusive lock.
    fn update_course_status(&mut self, course: &CourseId, status: CourseStatus) -> impl Future<Output = Result<()>> + Send;

    /// Makes every pending write visible at once and releases the locks.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;
}
