// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{fmt::Debug, sync::Arc};

use registrar_store::{CourseId, CourseSnapshot, CourseStatus, MembershipStore, RelationalStore, UserId};

use crate::{
    AggregateStatsCache, Clock, CourseLookupCache, CourseRecord, CourseStatusChanger, GradeReport, GradeReporter,
    RegistrarConfig, RegistrationResolver, Resolution, Result, TokioClock,
};

/// The registrar core: registration batches, course status changes and grade reports over a
/// relational store `S` and a membership store `M`.
///
/// All components share one [`CourseLookupCache`] and one [`AggregateStatsCache`]. A
/// `Registrar` is meant to be constructed once and shared (for example behind an `Arc`) by every
/// request worker.
///
/// # Examples
///
/// ```
/// use registrar::Registrar;
/// use registrar_store::{InMemoryMembership, InMemoryStore, UserId};
///
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
/// let registrar = Registrar::builder(InMemoryStore::new(), InMemoryMembership::new()).build();
///
/// let user = UserId::parse("01FF4RXEKS0DG2EG20CYAYJCRH").unwrap();
/// let resolution = registrar.register_courses(&user, &[]).await.unwrap();
/// assert!(resolution.is_committed());
/// # });
/// ```
pub struct Registrar<S, M> {
    store: Arc<S>,
    membership: Arc<M>,
    config: RegistrarConfig,
    courses: Arc<CourseLookupCache>,
    stats: Arc<AggregateStatsCache<S>>,
    resolver: RegistrationResolver<S, M>,
    status: CourseStatusChanger<S>,
    reporter: GradeReporter<S>,
}

impl<S, M> Debug for Registrar<S, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("config", &self.config)
            .field("courses", &self.courses)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<S, M> Registrar<S, M>
where
    S: RelationalStore,
    M: MembershipStore,
{
    /// Starts building a registrar over `store` and `membership`.
    #[must_use]
    pub fn builder(store: S, membership: M) -> RegistrarBuilder<S, M> {
        RegistrarBuilder {
            store,
            membership,
            config: RegistrarConfig::default(),
            clock: Arc::new(TokioClock),
        }
    }

    /// Resolves `user`'s request for `courses`; see [`RegistrationResolver::resolve`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transient`](crate::Error::Transient) if a store fails.
    pub async fn register_courses(&self, user: &UserId, courses: &[CourseId]) -> Result<Resolution> {
        self.resolver.resolve(user, courses).await
    }

    /// Changes the status of `course`; see [`CourseStatusChanger::set_status`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`](crate::Error::NotFound) for an unknown course and
    /// [`Error::Transient`](crate::Error::Transient) if the store fails.
    pub async fn set_course_status(&self, course: &CourseId, status: CourseStatus) -> Result<CourseSnapshot> {
        self.status.set_status(course, status).await
    }

    /// Builds a grade report for `records`; see [`GradeReporter::report`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transient`](crate::Error::Transient) if an aggregate query fails.
    pub async fn grade_report(&self, records: &[CourseRecord]) -> Result<GradeReport> {
        self.reporter.report(records).await
    }

    /// Number of users registered in `course`, as mirrored in the membership store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transient`](crate::Error::Transient) if the membership store fails.
    pub async fn registrant_count(&self, course: &CourseId) -> Result<u64> {
        Ok(self.membership.count(&self.resolver.registrations_set(course)).await?)
    }

    /// Returns `true` if the membership store lists `user` as registered in `course`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transient`](crate::Error::Transient) if the membership store fails.
    pub async fn is_registered(&self, user: &UserId, course: &CourseId) -> Result<bool> {
        Ok(self
            .membership
            .is_member(&self.resolver.registrations_set(course), user.as_str())
            .await?)
    }

    /// The relational store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The membership store.
    #[must_use]
    pub fn membership(&self) -> &M {
        &self.membership
    }

    /// The configuration this registrar was built with.
    #[must_use]
    pub fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    /// The shared course cache.
    #[must_use]
    pub fn courses(&self) -> &CourseLookupCache {
        &self.courses
    }

    /// The shared aggregate statistics cache.
    #[must_use]
    pub fn stats(&self) -> &AggregateStatsCache<S> {
        &self.stats
    }

    /// The registration resolver.
    #[must_use]
    pub fn resolver(&self) -> &RegistrationResolver<S, M> {
        &self.resolver
    }

    /// The course status changer.
    #[must_use]
    pub fn status_changer(&self) -> &CourseStatusChanger<S> {
        &self.status
    }

    /// The grade reporter.
    #[must_use]
    pub fn reporter(&self) -> &GradeReporter<S> {
        &self.reporter
    }
}

/// Builder for [`Registrar`], created by [`Registrar::builder`].
pub struct RegistrarBuilder<S, M> {
    store: S,
    membership: M,
    config: RegistrarConfig,
    clock: Arc<dyn Clock>,
}

impl<S, M> Debug for RegistrarBuilder<S, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrarBuilder")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<S, M> RegistrarBuilder<S, M>
where
    S: RelationalStore,
    M: MembershipStore,
{
    /// Replaces the default configuration.
    #[must_use]
    pub fn config(mut self, config: RegistrarConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the default [`TokioClock`].
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Wires the components together.
    #[must_use]
    pub fn build(self) -> Registrar<S, M> {
        let store = Arc::new(self.store);
        let membership = Arc::new(self.membership);
        let courses = Arc::new(CourseLookupCache::new());
        let stats = Arc::new(AggregateStatsCache::new(
            Arc::clone(&store),
            self.config.gpa_ttl(),
            self.config.course_scores_ttl(),
            self.clock,
        ));

        Registrar {
            resolver: RegistrationResolver::new(
                Arc::clone(&store),
                Arc::clone(&membership),
                Arc::clone(&courses),
                self.config.registrations_set_prefix.clone(),
            ),
            status: CourseStatusChanger::new(Arc::clone(&store), Arc::clone(&courses)),
            reporter: GradeReporter::new(Arc::clone(&stats)),
            store,
            membership,
            config: self.config,
            courses,
            stats,
        }
    }
}
