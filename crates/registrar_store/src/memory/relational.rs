// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt::Debug,
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use super::FailPredicate;
use crate::{CourseId, CourseSnapshot, CourseStatus, Error, RelationalStore, Result, Transaction, UserId};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Recorded store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// A transaction was opened.
    Begin,
    /// A shared row lock was requested.
    LockShared(CourseId),
    /// A course row was read inside a transaction.
    ReadCourse(CourseId),
    /// An exclusive row lock was requested and the row read.
    ReadCourseForUpdate(CourseId),
    /// An enrollment existence check.
    IsEnrolled {
        /// The user checked.
        user: UserId,
        /// The course checked.
        course: CourseId,
    },
    /// The non-closed enrollments of a user were listed.
    ActiveEnrollments(UserId),
    /// A batched enrollment insert.
    InsertEnrollments {
        /// The registering user.
        user: UserId,
        /// The courses in the batch.
        courses: Vec<CourseId>,
    },
    /// A course status update.
    UpdateStatus {
        /// The updated course.
        course: CourseId,
        /// The new status.
        status: CourseStatus,
    },
    /// A transaction commit.
    Commit,
    /// The global GPA aggregate.
    GpaDistribution,
    /// The per-course total score aggregate.
    CourseTotalScores(CourseId),
}

#[derive(Debug, Default)]
struct State {
    courses: BTreeMap<CourseId, CourseSnapshot>,
    students: BTreeSet<UserId>,
    registrations: BTreeSet<(UserId, CourseId)>,
    scores: HashMap<(UserId, CourseId), i64>,
}

struct Inner {
    state: Mutex<State>,
    row_locks: Mutex<HashMap<CourseId, Arc<RwLock<()>>>>,
    operations: Mutex<Vec<StoreOp>>,
    fail_when: Mutex<Option<FailPredicate<StoreOp>>>,
    aggregate_latency: Mutex<Duration>,
    lock_timeout: Mutex<Duration>,
}

impl Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("state", &*self.state.lock())
            .field("operations", &self.operations.lock().len())
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish_non_exhaustive()
    }
}

/// An in-memory [`RelationalStore`].
///
/// Committed rows live behind one mutex; each course row has its own async read/write lock that
/// transactions hold until they commit or are dropped. Writes are staged in the transaction and
/// applied together on commit, so other readers see all of them or none.
///
/// Clones share the same data.
///
/// # Examples
///
/// ```
/// use registrar_store::{CourseId, CourseSnapshot, CourseStatus, DayOfWeek, UserId};
/// use registrar_store::{InMemoryStore, RelationalStore, Transaction};
/// # futures::executor::block_on(async {
///
/// let store = InMemoryStore::new();
/// let course = CourseId::parse("01FH")?;
/// store.insert_course(CourseSnapshot {
///     id: course.clone(),
///     code: "CS101".into(),
///     name: "Algorithms".into(),
///     status: CourseStatus::Registration,
///     period: 2,
///     day_of_week: DayOfWeek::Monday,
///     credit: 2,
/// });
///
/// let user = UserId::parse("alice")?;
/// let mut tx = store.begin().await?;
/// tx.insert_enrollments(&user, &[course.clone()]).await?;
/// tx.commit().await?;
///
/// assert_eq!(store.enrollments_of(&user), vec![course]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                row_locks: Mutex::new(HashMap::new()),
                operations: Mutex::new(Vec::new()),
                fail_when: Mutex::new(None),
                aggregate_latency: Mutex::new(Duration::ZERO),
                lock_timeout: Mutex::new(DEFAULT_LOCK_TIMEOUT),
            }),
        }
    }

    /// Inserts or replaces a committed course row.
    pub fn insert_course(&self, course: CourseSnapshot) {
        self.inner.state.lock().courses.insert(course.id.clone(), course);
    }

    /// Registers `user` as a student, making them part of the GPA cohort.
    pub fn insert_student(&self, user: UserId) {
        self.inner.state.lock().students.insert(user);
    }

    /// Sets the total score of `user` in `course`.
    pub fn set_total_score(&self, user: &UserId, course: &CourseId, total: i64) {
        self.inner.state.lock().scores.insert((user.clone(), course.clone()), total);
    }

    /// Commits a registration directly, bypassing transactions and locks.
    pub fn enroll(&self, user: &UserId, course: &CourseId) {
        self.inner.state.lock().registrations.insert((user.clone(), course.clone()));
    }

    /// Returns the committed course row, if any.
    #[must_use]
    pub fn course_row(&self, course: &CourseId) -> Option<CourseSnapshot> {
        self.inner.state.lock().courses.get(course).cloned()
    }

    /// Courses `user` is registered in, in ascending id order.
    #[must_use]
    pub fn enrollments_of(&self, user: &UserId) -> Vec<CourseId> {
        self.inner
            .state
            .lock()
            .registrations
            .iter()
            .filter(|(registered, _)| registered == user)
            .map(|(_, course)| course.clone())
            .collect()
    }

    /// Total number of committed registrations.
    #[must_use]
    pub fn enrollment_count(&self) -> usize {
        self.inner.state.lock().registrations.len()
    }

    /// Delays every aggregate query by `latency`, including ones that then fail.
    pub fn set_aggregate_latency(&self, latency: Duration) {
        *self.inner.aggregate_latency.lock() = latency;
    }

    /// Sets how long a transaction waits for a row lock before failing with
    /// [`Error::LockTimeout`].
    pub fn set_lock_timeout(&self, timeout: Duration) {
        *self.inner.lock_timeout.lock() = timeout;
    }

    /// Sets a predicate selecting operations that fail with [`Error::Unavailable`].
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp) -> bool + Send + Sync + 'static,
    {
        *self.inner.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate.
    pub fn clear_failures(&self) {
        *self.inner.fail_when.lock() = None;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.inner.operations.lock().clone()
    }

    /// Counts recorded operations matching `predicate`.
    #[must_use]
    pub fn count_operations(&self, predicate: impl Fn(&StoreOp) -> bool) -> usize {
        self.inner.operations.lock().iter().filter(|op| predicate(op)).count()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.inner.operations.lock().clear();
    }

    fn check(&self, op: StoreOp, name: &'static str) -> Result<()> {
        let fail = self.inner.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        self.inner.operations.lock().push(op);
        if fail {
            return Err(Error::unavailable(name, "injected failure"));
        }
        Ok(())
    }

    fn row_lock(&self, course: &CourseId) -> Arc<RwLock<()>> {
        Arc::clone(self.inner.row_locks.lock().entry(course.clone()).or_default())
    }

    fn lock_timeout(&self) -> Duration {
        *self.inner.lock_timeout.lock()
    }

    async fn simulate_latency(&self) {
        let latency = *self.inner.aggregate_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl RelationalStore for InMemoryStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        self.check(StoreOp::Begin, "begin")?;
        Ok(InMemoryTransaction {
            store: self.clone(),
            shared_locks: HashMap::new(),
            exclusive_locks: HashMap::new(),
            pending_enrollments: BTreeSet::new(),
            pending_status: HashMap::new(),
        })
    }

    #[expect(clippy::cast_precision_loss, reason = "scores and credits are far below 2^52")]
    async fn gpa_distribution(&self) -> Result<Vec<f64>> {
        self.simulate_latency().await;
        self.check(StoreOp::GpaDistribution, "gpa_distribution")?;

        let state = self.inner.state.lock();
        let mut gpas = Vec::with_capacity(state.students.len());
        for student in &state.students {
            let mut credits = 0_i64;
            let mut weighted = 0_i64;
            for (_, course_id) in state.registrations.iter().filter(|(user, _)| user == student) {
                let Some(course) = state.courses.get(course_id) else {
                    continue;
                };
                if course.status != CourseStatus::Closed {
                    continue;
                }
                let score = state.scores.get(&(student.clone(), course_id.clone())).copied().unwrap_or(0);
                credits += i64::from(course.credit);
                weighted += score * i64::from(course.credit);
            }
            if credits > 0 {
                gpas.push(weighted as f64 / 100.0 / credits as f64);
            }
        }
        Ok(gpas)
    }

    async fn course_total_scores(&self, course: &CourseId) -> Result<Vec<i64>> {
        self.simulate_latency().await;
        self.check(StoreOp::CourseTotalScores(course.clone()), "course_total_scores")?;

        let state = self.inner.state.lock();
        Ok(state
            .registrations
            .iter()
            .filter(|(_, registered)| registered == course)
            .map(|(user, _)| state.scores.get(&(user.clone(), course.clone())).copied().unwrap_or(0))
            .collect())
    }
}

/// Transaction handle of an [`InMemoryStore`].
///
/// A shared lock on a row is dropped before an exclusive lock on the same row is requested, so
/// a transaction never deadlocks against itself.
#[derive(Debug)]
pub struct InMemoryTransaction {
    store: InMemoryStore,
    shared_locks: HashMap<CourseId, OwnedRwLockReadGuard<()>>,
    exclusive_locks: HashMap<CourseId, OwnedRwLockWriteGuard<()>>,
    pending_enrollments: BTreeSet<(UserId, CourseId)>,
    pending_status: HashMap<CourseId, CourseStatus>,
}

impl InMemoryTransaction {
    fn holds_lock(&self, course: &CourseId) -> bool {
        self.shared_locks.contains_key(course) || self.exclusive_locks.contains_key(course)
    }

    fn visible_course(&self, state: &State, course: &CourseId) -> Option<CourseSnapshot> {
        let row = state.courses.get(course)?;
        Some(match self.pending_status.get(course) {
            Some(status) => row.with_status(*status),
            None => row.clone(),
        })
    }

    fn is_visible_enrollment(&self, state: &State, pair: &(UserId, CourseId)) -> bool {
        state.registrations.contains(pair) || self.pending_enrollments.contains(pair)
    }
}

impl Transaction for InMemoryTransaction {
    async fn lock_courses_shared(&mut self, courses: &[CourseId]) -> Result<()> {
        for course in courses {
            self.store.check(StoreOp::LockShared(course.clone()), "lock_courses_shared")?;
            if self.holds_lock(course) {
                continue;
            }
            let lock = self.store.row_lock(course);
            let guard = tokio::time::timeout(self.store.lock_timeout(), lock.read_owned())
                .await
                .map_err(|_elapsed| Error::lock_timeout(format!("courses/{course}")))?;
            self.shared_locks.insert(course.clone(), guard);
        }
        Ok(())
    }

    async fn course(&mut self, course: &CourseId) -> Result<Option<CourseSnapshot>> {
        self.store.check(StoreOp::ReadCourse(course.clone()), "course")?;
        let state = self.store.inner.state.lock();
        Ok(self.visible_course(&state, course))
    }

    async fn course_for_update(&mut self, course: &CourseId) -> Result<Option<CourseSnapshot>> {
        self.store.check(StoreOp::ReadCourseForUpdate(course.clone()), "course_for_update")?;
        if !self.exclusive_locks.contains_key(course) {
            self.shared_locks.remove(course);
            let lock = self.store.row_lock(course);
            let guard = tokio::time::timeout(self.store.lock_timeout(), lock.write_owned())
                .await
                .map_err(|_elapsed| Error::lock_timeout(format!("courses/{course}")))?;
            self.exclusive_locks.insert(course.clone(), guard);
        }
        let state = self.store.inner.state.lock();
        Ok(self.visible_course(&state, course))
    }

    async fn is_enrolled(&mut self, user: &UserId, course: &CourseId) -> Result<bool> {
        self.store.check(
            StoreOp::IsEnrolled {
                user: user.clone(),
                course: course.clone(),
            },
            "is_enrolled",
        )?;
        let state = self.store.inner.state.lock();
        Ok(self.is_visible_enrollment(&state, &(user.clone(), course.clone())))
    }

    async fn active_enrollments(&mut self, user: &UserId) -> Result<Vec<CourseSnapshot>> {
        self.store.check(StoreOp::ActiveEnrollments(user.clone()), "active_enrollments")?;
        let state = self.store.inner.state.lock();
        let registered: BTreeSet<&CourseId> = state
            .registrations
            .iter()
            .chain(self.pending_enrollments.iter())
            .filter(|(registered, _)| registered == user)
            .map(|(_, course)| course)
            .collect();
        Ok(registered
            .into_iter()
            .filter_map(|course| self.visible_course(&state, course))
            .filter(|course| course.status != CourseStatus::Closed)
            .collect())
    }

    async fn insert_enrollments(&mut self, user: &UserId, courses: &[CourseId]) -> Result<u64> {
        self.store.check(
            StoreOp::InsertEnrollments {
                user: user.clone(),
                courses: courses.to_vec(),
            },
            "insert_enrollments",
        )?;
        let state = self.store.inner.state.lock();
        let mut inserted = 0;
        for course in courses {
            let pair = (user.clone(), course.clone());
            if !self.is_visible_enrollment(&state, &pair) {
                self.pending_enrollments.insert(pair);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn update_course_status(&mut self, course: &CourseId, status: CourseStatus) -> Result<()> {
        self.store.check(
            StoreOp::UpdateStatus {
                course: course.clone(),
                status,
            },
            "update_course_status",
        )?;
        self.pending_status.insert(course.clone(), status);
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.store.check(StoreOp::Commit, "commit")?;
        let mut state = self.store.inner.state.lock();
        let applied = self.pending_enrollments.len();
        // Pairs committed by a concurrent transaction since staging are ignored, not errors.
        state.registrations.extend(self.pending_enrollments);
        for (course, status) in self.pending_status {
            if let Some(row) = state.courses.get_mut(&course) {
                row.status = status;
            }
        }
        tracing::trace!(enrollments = applied, "in-memory transaction committed");
        Ok(())
    }
}
