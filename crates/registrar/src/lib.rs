// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(docsrs, feature(doc_cfg))]

//! Course registration core: stampede-protected grade statistics and all-or-nothing
//! registration batches.
//!
//! # Aggregate Statistics
//!
//! Grade reports compare a student against two cohort distributions: the GPA of every student
//! and the total score of every registrant of a course. Both are full-table aggregates.
//! [`AggregateStatsCache`] keeps each one for a short freshness window and makes sure concurrent
//! readers of an expired key share a single recomputation:
//!
//! - [`TtlCache`] maps keys to `Arc<`[`CacheEntry`]`>`, a value stamped with the instant its
//!   computation started. Entries are replaced as a whole, never mutated.
//! - Expired keys are refreshed through a [`singleflight::SingleFlight`] group, so one caller
//!   runs the query and the rest await its result. Failures are shared with that round only and
//!   leave the previous entry in place.
//!
//! # Registration
//!
//! [`RegistrationResolver`] validates a batch of requested courses in one transaction and
//! either commits all of it or reports every violation at once in an
//! [`EnrollmentBatchResult`]. Course rows are read through a [`CourseLookupCache`], which
//! [`CourseStatusChanger`] overwrites while still holding the row's exclusive lock.
//!
//! # Wiring
//!
//! [`Registrar`] builds and shares all of the above:
//!
//! ```
//! use registrar::{Registrar, RegistrarConfig, Resolution};
//! use registrar_store::{CourseId, CourseSnapshot, CourseStatus, DayOfWeek, InMemoryMembership, InMemoryStore, UserId};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let store = InMemoryStore::new();
//! store.insert_course(CourseSnapshot {
//!     id: CourseId::parse("cs101").unwrap(),
//!     code: "CS101".into(),
//!     name: "Programming".into(),
//!     status: CourseStatus::Registration,
//!     period: 1,
//!     day_of_week: DayOfWeek::Monday,
//!     credit: 2,
//! });
//!
//! let registrar = Registrar::builder(store, InMemoryMembership::new())
//!     .config(RegistrarConfig::default())
//!     .build();
//!
//! let user = UserId::parse("alice").unwrap();
//! let cs101 = CourseId::parse("cs101").unwrap();
//! let Resolution::Committed(plan) = registrar.register_courses(&user, &[cs101.clone()]).await.unwrap() else {
//!     panic!("batch rejected");
//! };
//! assert_eq!(plan.added, [cs101.clone()]);
//! assert_eq!(registrar.registrant_count(&cs101).await.unwrap(), 1);
//! # });
//! ```

mod aggregates;
mod clock;
mod config;
mod entry;
pub mod error;
mod lookup;
mod registrar;
mod report;
mod request;
mod resolver;
mod stats;
mod status;
#[cfg(test)]
mod testing;
mod ttl;

#[doc(inline)]
pub use aggregates::{AggregateStatsCache, DEFAULT_COURSE_SCORES_TTL, DEFAULT_GPA_TTL};
#[doc(inline)]
pub use clock::{Clock, TokioClock};
#[doc(inline)]
pub use config::RegistrarConfig;
#[doc(inline)]
pub use entry::CacheEntry;
#[doc(inline)]
pub use error::{Error, ErrorKind, Result};
#[doc(inline)]
pub use lookup::{CourseLookupCache, LookupCache};
#[doc(inline)]
pub use registrar::{Registrar, RegistrarBuilder};
#[doc(inline)]
pub use report::{CourseGrade, CourseRecord, GradeReport, GradeReporter, GradeSummary};
#[doc(inline)]
pub use request::parse_registration_request;
#[doc(inline)]
pub use resolver::{CommitPlan, EnrollmentBatchResult, RegistrationResolver, Resolution};
#[doc(inline)]
pub use stats::{NEUTRAL_T_SCORE, ScoreDistribution};
#[doc(inline)]
pub use status::CourseStatusChanger;
#[doc(inline)]
pub use ttl::TtlCache;
