// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Batch registration: validation, all-or-nothing commits and store failure handling.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use pretty_assertions::assert_eq;
use registrar::{
    CourseLookupCache, CourseStatusChanger, EnrollmentBatchResult, ErrorKind, RegistrationResolver, Resolution,
};
use registrar_store::{
    CourseId, CourseSnapshot, CourseStatus, DayOfWeek, InMemoryMembership, InMemoryStore, InMemoryTransaction,
    MembershipOp, MembershipStore, RelationalStore, StoreOp, Transaction, UserId,
};
use rstest::rstest;

struct Fixture {
    store: InMemoryStore,
    membership: InMemoryMembership,
    courses: Arc<CourseLookupCache>,
    resolver: RegistrationResolver<InMemoryStore, InMemoryMembership>,
}

impl Fixture {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let membership = InMemoryMembership::new();
        let courses = Arc::new(CourseLookupCache::new());
        let resolver = RegistrationResolver::new(
            Arc::new(store.clone()),
            Arc::new(membership.clone()),
            Arc::clone(&courses),
            "registrations:",
        );
        Self {
            store,
            membership,
            courses,
            resolver,
        }
    }

    fn with_courses(courses: &[CourseSnapshot]) -> Self {
        let fixture = Self::new();
        for course in courses {
            fixture.store.insert_course(course.clone());
        }
        fixture
    }

    fn status_changer(&self) -> CourseStatusChanger<InMemoryStore> {
        CourseStatusChanger::new(Arc::new(self.store.clone()), Arc::clone(&self.courses))
    }

    fn registrants(&self, course: &str) -> Vec<String> {
        self.membership.members(&format!("registrations:{course}"))
    }
}

fn course(id: &str, period: u8, day: DayOfWeek, status: CourseStatus) -> CourseSnapshot {
    CourseSnapshot {
        id: CourseId::parse(id).expect("valid id"),
        code: id.to_uppercase(),
        name: format!("Course {id}"),
        status,
        period,
        day_of_week: day,
        credit: 2,
    }
}

fn open(id: &str, period: u8, day: DayOfWeek) -> CourseSnapshot {
    course(id, period, day, CourseStatus::Registration)
}

fn ids(ids: &[&str]) -> Vec<CourseId> {
    ids.iter().map(|id| CourseId::parse(*id).expect("valid id")).collect()
}

fn user(name: &str) -> UserId {
    UserId::parse(name).expect("valid id")
}

fn rejected(resolution: Resolution) -> EnrollmentBatchResult {
    match resolution {
        Resolution::Rejected(result) => result,
        Resolution::Committed(plan) => panic!("expected a rejection, committed {plan:?}"),
    }
}

#[tokio::test]
async fn empty_request_touches_nothing() {
    let fixture = Fixture::new();

    let resolution = fixture.resolver.resolve(&user("u"), &[]).await.expect("resolved");

    let plan = resolution.committed().expect("committed");
    assert!(plan.added.is_empty());
    assert!(plan.already_enrolled.is_empty());
    assert!(fixture.store.operations().is_empty());
    assert!(fixture.membership.operations().is_empty());
}

#[tokio::test]
async fn valid_batch_commits_and_mirrors_membership() {
    let fixture = Fixture::with_courses(&[open("a", 1, DayOfWeek::Monday), open("b", 2, DayOfWeek::Monday)]);
    let u = user("u");

    let resolution = fixture.resolver.resolve(&u, &ids(&["b", "a", "b"])).await.expect("resolved");

    let plan = resolution.committed().expect("committed");
    assert_eq!(plan.user, u);
    assert_eq!(plan.added, ids(&["a", "b"]));
    assert_eq!(fixture.store.enrollments_of(&u), ids(&["a", "b"]));
    assert_eq!(fixture.registrants("a"), ["u"]);
    assert_eq!(fixture.registrants("b"), ["u"]);

    let inserts: Vec<_> = fixture
        .store
        .operations()
        .into_iter()
        .filter(|op| matches!(op, StoreOp::InsertEnrollments { .. }))
        .collect();
    assert_eq!(
        inserts,
        [StoreOp::InsertEnrollments {
            user: u.clone(),
            courses: ids(&["a", "b"]),
        }]
    );
}

#[tokio::test]
async fn shared_locks_are_taken_in_ascending_order() {
    let fixture = Fixture::with_courses(&[open("c", 1, DayOfWeek::Friday), open("a", 2, DayOfWeek::Friday)]);

    fixture.resolver.resolve(&user("u"), &ids(&["c", "missing", "a"])).await.expect("resolved");

    let locked: Vec<CourseId> = fixture
        .store
        .operations()
        .into_iter()
        .filter_map(|op| match op {
            StoreOp::LockShared(id) => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(locked, ids(&["a", "c", "missing"]));
}

#[tokio::test]
async fn repeating_a_committed_batch_is_a_no_op() {
    let fixture = Fixture::with_courses(&[open("a", 1, DayOfWeek::Monday), open("b", 2, DayOfWeek::Monday)]);
    let u = user("u");
    let batch = ids(&["a", "b"]);

    fixture.resolver.resolve(&u, &batch).await.expect("first");
    fixture.store.clear_operations();

    let plan = fixture
        .resolver
        .resolve(&u, &batch)
        .await
        .expect("second")
        .committed()
        .cloned()
        .expect("committed");

    assert!(plan.added.is_empty());
    assert_eq!(plan.already_enrolled, batch);
    assert_eq!(fixture.store.enrollment_count(), 2);
    assert_eq!(
        fixture
            .store
            .count_operations(|op| matches!(op, StoreOp::InsertEnrollments { .. })),
        0
    );
}

#[tokio::test]
async fn conflict_with_existing_registration_rejects_batch() {
    let fixture = Fixture::with_courses(&[open("a", 2, DayOfWeek::Monday), open("b", 2, DayOfWeek::Monday)]);
    let u = user("u");
    fixture.store.enroll(&u, &ids(&["a"])[0]);

    let result = rejected(fixture.resolver.resolve(&u, &ids(&["b"])).await.expect("resolved"));

    assert_eq!(
        result,
        EnrollmentBatchResult {
            schedule_conflict: ids(&["b"]),
            ..EnrollmentBatchResult::default()
        }
    );
    assert_eq!(fixture.store.enrollments_of(&u), ids(&["a"]));
    assert!(fixture.membership.operations().is_empty());
}

#[tokio::test]
async fn closed_registrations_do_not_conflict() {
    let fixture = Fixture::with_courses(&[
        course("old", 2, DayOfWeek::Monday, CourseStatus::Closed),
        open("new", 2, DayOfWeek::Monday),
    ]);
    let u = user("u");
    fixture.store.enroll(&u, &ids(&["old"])[0]);

    let resolution = fixture.resolver.resolve(&u, &ids(&["new"])).await.expect("resolved");

    assert_eq!(resolution.committed().map(|plan| plan.added.clone()), Some(ids(&["new"])));
}

#[tokio::test]
async fn conflicting_requested_courses_are_both_reported() {
    let fixture = Fixture::with_courses(&[
        open("a", 4, DayOfWeek::Thursday),
        open("b", 4, DayOfWeek::Thursday),
        open("c", 5, DayOfWeek::Thursday),
    ]);

    let result = rejected(fixture.resolver.resolve(&user("u"), &ids(&["c", "b", "a"])).await.expect("resolved"));

    assert_eq!(result.schedule_conflict, ids(&["a", "b"]));
    assert_eq!(fixture.store.enrollment_count(), 0);
}

#[rstest]
#[case::missing(None, "course_not_found")]
#[case::in_progress(Some(CourseStatus::InProgress), "not_registrable_status")]
#[case::closed(Some(CourseStatus::Closed), "not_registrable_status")]
#[tokio::test]
async fn one_invalid_course_rejects_the_whole_batch(#[case] status: Option<CourseStatus>, #[case] category: &str) {
    let fixture = Fixture::with_courses(&[open("good", 1, DayOfWeek::Tuesday)]);
    if let Some(status) = status {
        fixture.store.insert_course(course("bad", 2, DayOfWeek::Tuesday, status));
    }
    let u = user("u");

    let result = rejected(fixture.resolver.resolve(&u, &ids(&["good", "bad"])).await.expect("resolved"));

    assert_eq!(result.len(), 1);
    assert_eq!(result.to_json(), format!(r#"{{"{category}":["bad"]}}"#));
    assert!(fixture.store.enrollments_of(&u).is_empty());
    assert!(fixture.registrants("good").is_empty());
}

#[tokio::test]
async fn every_violation_is_reported_at_once() {
    let fixture = Fixture::with_courses(&[
        course("closed", 1, DayOfWeek::Monday, CourseStatus::Closed),
        open("x", 3, DayOfWeek::Friday),
        open("y", 3, DayOfWeek::Friday),
        open("z", 4, DayOfWeek::Friday),
    ]);

    let result = rejected(
        fixture
            .resolver
            .resolve(&user("u"), &ids(&["z", "y", "x", "closed", "ghost"]))
            .await
            .expect("resolved"),
    );

    assert_eq!(
        result,
        EnrollmentBatchResult {
            not_found: ids(&["ghost"]),
            not_registrable: ids(&["closed"]),
            schedule_conflict: ids(&["x", "y"]),
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn identical_concurrent_requests_leave_one_row() {
    let fixture = Arc::new(Fixture::with_courses(&[open("a", 1, DayOfWeek::Monday)]));
    let batch = ids(&["a"]);

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let fixture = Arc::clone(&fixture);
            let batch = batch.clone();
            tokio::spawn(async move { fixture.resolver.resolve(&user("u"), &batch).await })
        })
        .collect();

    for task in futures::future::join_all(tasks).await {
        let resolution = task.expect("task completed").expect("resolved");
        assert!(resolution.is_committed());
    }
    assert_eq!(fixture.store.enrollment_count(), 1);
    assert_eq!(fixture.registrants("a"), ["u"]);
}

#[tokio::test]
async fn course_rows_are_read_through_the_cache() {
    let fixture = Fixture::with_courses(&[open("a", 1, DayOfWeek::Monday), open("b", 2, DayOfWeek::Monday)]);

    fixture.resolver.resolve(&user("u1"), &ids(&["a", "b"])).await.expect("resolved");
    assert_eq!(fixture.courses.len(), 2);

    fixture.store.clear_operations();
    fixture.resolver.resolve(&user("u2"), &ids(&["a", "b"])).await.expect("resolved");
    assert_eq!(
        fixture.store.count_operations(|op| matches!(op, StoreOp::ReadCourse(_))),
        0
    );
}

#[tokio::test]
async fn missing_courses_are_not_cached() {
    let fixture = Fixture::new();
    let u = user("u");

    let result = rejected(fixture.resolver.resolve(&u, &ids(&["late"])).await.expect("resolved"));
    assert_eq!(result.not_found, ids(&["late"]));

    fixture.store.insert_course(open("late", 1, DayOfWeek::Monday));
    let resolution = fixture.resolver.resolve(&u, &ids(&["late"])).await.expect("resolved");
    assert!(resolution.is_committed());
}

#[tokio::test]
async fn status_change_is_seen_by_the_next_registration() {
    let fixture = Fixture::with_courses(&[open("a", 1, DayOfWeek::Monday)]);
    let a = ids(&["a"]);

    fixture.resolver.resolve(&user("early"), &a).await.expect("resolved");
    fixture
        .status_changer()
        .set_status(&a[0], CourseStatus::InProgress)
        .await
        .expect("status changed");

    let result = rejected(fixture.resolver.resolve(&user("late"), &a).await.expect("resolved"));
    assert_eq!(result.not_registrable, a);
}

#[tokio::test]
async fn unknown_course_status_change_is_not_found() {
    let fixture = Fixture::new();
    let error = fixture
        .status_changer()
        .set_status(&ids(&["ghost"])[0], CourseStatus::Closed)
        .await
        .expect_err("unknown course");
    assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[rstest]
#[case::begin(|op: &StoreOp| matches!(op, StoreOp::Begin))]
#[case::lock(|op: &StoreOp| matches!(op, StoreOp::LockShared(_)))]
#[case::insert(|op: &StoreOp| matches!(op, StoreOp::InsertEnrollments { .. }))]
#[case::commit(|op: &StoreOp| matches!(op, StoreOp::Commit))]
#[tokio::test]
async fn store_failures_abort_without_partial_effects(#[case] fail: fn(&StoreOp) -> bool) {
    let fixture = Fixture::with_courses(&[open("a", 1, DayOfWeek::Monday), open("b", 2, DayOfWeek::Monday)]);
    fixture.store.fail_when(fail);
    let u = user("u");

    let error = fixture.resolver.resolve(&u, &ids(&["a", "b"])).await.expect_err("store failed");

    assert!(error.is_transient());
    assert!(fixture.store.enrollments_of(&u).is_empty());
    assert!(fixture.registrants("a").is_empty());
    assert!(fixture.registrants("b").is_empty());
}

#[tokio::test]
async fn membership_failure_keeps_rows_and_retry_fills_in_members() {
    let fixture = Fixture::with_courses(&[open("a", 1, DayOfWeek::Monday), open("b", 2, DayOfWeek::Monday)]);
    fixture
        .membership
        .fail_when(|op| matches!(op, MembershipOp::Add { set, .. } if set == "registrations:b"));
    let u = user("u");
    let batch = ids(&["a", "b"]);

    let error = fixture.resolver.resolve(&u, &batch).await.expect_err("membership failed");

    assert_eq!(error.kind(), ErrorKind::Transient);
    assert_eq!(fixture.store.enrollments_of(&u), batch);
    assert_eq!(fixture.registrants("a"), ["u"]);
    assert!(fixture.registrants("b").is_empty());

    fixture.membership.clear_failures();
    let plan = fixture
        .resolver
        .resolve(&u, &batch)
        .await
        .expect("retried")
        .committed()
        .cloned()
        .expect("committed");

    assert!(plan.added.is_empty());
    assert_eq!(plan.already_enrolled, batch);
    assert_eq!(fixture.registrants("b"), ["u"]);
    assert!(
        !fixture
            .membership
            .operations()
            .iter()
            .any(|op| matches!(op, MembershipOp::Remove { .. }))
    );
}

/// Membership store that stalls right after its first successful `add`.
struct StallingMembership {
    inner: InMemoryMembership,
    stall: Duration,
    stalled: AtomicBool,
}

impl MembershipStore for StallingMembership {
    async fn add(&self, set: &str, member: &str) -> registrar_store::Result<bool> {
        let added = self.inner.add(set, member).await?;
        if !self.stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(self.stall).await;
        }
        Ok(added)
    }

    async fn remove(&self, set: &str, member: &str) -> registrar_store::Result<bool> {
        self.inner.remove(set, member).await
    }

    async fn count(&self, set: &str) -> registrar_store::Result<u64> {
        self.inner.count(set).await
    }

    async fn is_member(&self, set: &str, member: &str) -> registrar_store::Result<bool> {
        self.inner.is_member(set, member).await
    }
}

#[tokio::test(start_paused = true)]
async fn failed_commit_never_strips_a_concurrent_registration() {
    let store = InMemoryStore::new();
    store.insert_course(open("a", 1, DayOfWeek::Monday));
    let commits = AtomicUsize::new(0);
    store.fail_when(move |op| matches!(op, StoreOp::Commit) && commits.fetch_add(1, Ordering::SeqCst) == 0);

    let membership = InMemoryMembership::new();
    let resolver = RegistrationResolver::new(
        Arc::new(store.clone()),
        Arc::new(StallingMembership {
            inner: membership.clone(),
            stall: Duration::from_millis(200),
            stalled: AtomicBool::new(false),
        }),
        Arc::new(CourseLookupCache::new()),
        "registrations:",
    );
    let u = user("u");
    let batch = ids(&["a"]);

    let (first, second) = tokio::join!(resolver.resolve(&u, &batch), resolver.resolve(&u, &batch));

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_err()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|outcome| outcome.as_ref().is_ok_and(Resolution::is_committed))
    );
    assert_eq!(store.enrollments_of(&u), batch);
    assert_eq!(membership.members("registrations:a"), ["u"]);
}

/// Relational store whose transactions pause in `active_enrollments` while holding their
/// shared row locks.
struct HoldingStore {
    inner: InMemoryStore,
    hold: Duration,
}

struct HoldingTransaction {
    inner: InMemoryTransaction,
    hold: Duration,
}

impl RelationalStore for HoldingStore {
    type Transaction = HoldingTransaction;

    async fn begin(&self) -> registrar_store::Result<HoldingTransaction> {
        Ok(HoldingTransaction {
            inner: self.inner.begin().await?,
            hold: self.hold,
        })
    }

    async fn gpa_distribution(&self) -> registrar_store::Result<Vec<f64>> {
        self.inner.gpa_distribution().await
    }

    async fn course_total_scores(&self, course: &CourseId) -> registrar_store::Result<Vec<i64>> {
        self.inner.course_total_scores(course).await
    }
}

impl Transaction for HoldingTransaction {
    async fn lock_courses_shared(&mut self, courses: &[CourseId]) -> registrar_store::Result<()> {
        self.inner.lock_courses_shared(courses).await
    }

    async fn course(&mut self, course: &CourseId) -> registrar_store::Result<Option<CourseSnapshot>> {
        self.inner.course(course).await
    }

    async fn course_for_update(&mut self, course: &CourseId) -> registrar_store::Result<Option<CourseSnapshot>> {
        self.inner.course_for_update(course).await
    }

    async fn is_enrolled(&mut self, user: &UserId, course: &CourseId) -> registrar_store::Result<bool> {
        self.inner.is_enrolled(user, course).await
    }

    async fn active_enrollments(&mut self, user: &UserId) -> registrar_store::Result<Vec<CourseSnapshot>> {
        tokio::time::sleep(self.hold).await;
        self.inner.active_enrollments(user).await
    }

    async fn insert_enrollments(&mut self, user: &UserId, courses: &[CourseId]) -> registrar_store::Result<u64> {
        self.inner.insert_enrollments(user, courses).await
    }

    async fn update_course_status(&mut self, course: &CourseId, status: CourseStatus) -> registrar_store::Result<()> {
        self.inner.update_course_status(course, status).await
    }

    async fn commit(self) -> registrar_store::Result<()> {
        self.inner.commit().await
    }
}

#[tokio::test(start_paused = true)]
async fn status_change_waits_for_an_in_flight_registration() {
    let store = InMemoryStore::new();
    store.insert_course(open("a", 1, DayOfWeek::Monday));
    let courses = Arc::new(CourseLookupCache::new());
    let resolver = Arc::new(RegistrationResolver::new(
        Arc::new(HoldingStore {
            inner: store.clone(),
            hold: Duration::from_millis(200),
        }),
        Arc::new(InMemoryMembership::new()),
        Arc::clone(&courses),
        "registrations:",
    ));
    let changer = Arc::new(CourseStatusChanger::new(Arc::new(store.clone()), Arc::clone(&courses)));
    let a = ids(&["a"]);

    let registration = tokio::spawn({
        let resolver = Arc::clone(&resolver);
        let a = a.clone();
        async move { resolver.resolve(&user("early"), &a).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let status_change = tokio::spawn({
        let changer = Arc::clone(&changer);
        let a = a.clone();
        async move { changer.set_status(&a[0], CourseStatus::InProgress).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!status_change.is_finished());
    assert_eq!(courses.get(&a[0]).map(|course| course.status), Some(CourseStatus::Registration));

    let resolution = registration.await.expect("task completed").expect("resolved");
    assert_eq!(resolution.committed().map(|plan| plan.added.clone()), Some(a.clone()));

    let updated = status_change.await.expect("task completed").expect("status changed");
    assert_eq!(updated.status, CourseStatus::InProgress);
    assert_eq!(courses.get(&a[0]), Some(updated));
    assert_eq!(store.enrollments_of(&user("early")), a);

    let late = rejected(resolver.resolve(&user("late"), &a).await.expect("resolved"));
    assert_eq!(late.not_registrable, a);
}
