// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(docsrs, feature(doc_cfg))]

//! Store contracts consumed by the registrar core.
//!
//! The registrar owns no data. Course, registration and score rows live in a relational store;
//! "who is registered in course X" is mirrored in a key-value set-membership store. This crate
//! defines what the core needs from each of them:
//!
//! - [`RelationalStore`] and [`Transaction`]: point reads, transaction-scoped row locks, a
//!   duplicate-ignoring batched insert, and the two aggregate queries behind grade statistics.
//! - [`MembershipStore`]: add/remove/count/is-member over named sets.
//!
//! It also defines the row types both sides agree on ([`CourseSnapshot`], [`CourseId`],
//! [`UserId`], [`CourseStatus`], [`DayOfWeek`]) and the store [`Error`].
//!
//! # In-Memory Backends
//!
//! With the `memory` feature (enabled by default), [`InMemoryStore`] and [`InMemoryMembership`]
//! implement both contracts with real locking and commit semantics, plus fixtures, operation
//! recording and failure injection for tests.

pub mod error;
mod membership;
#[cfg(feature = "memory")]
pub mod memory;
mod model;
mod relational;

#[doc(inline)]
pub use error::{Error, ParseError, Result};
#[doc(inline)]
pub use membership::{MembershipStore, REGISTRATIONS_SET_PREFIX};
#[cfg(feature = "memory")]
#[doc(inline)]
pub use memory::{InMemoryMembership, InMemoryStore, InMemoryTransaction, MembershipOp, StoreOp};
#[doc(inline)]
pub use model::{CourseId, CourseSnapshot, CourseStatus, DayOfWeek, UserId};
#[doc(inline)]
pub use relational::{RelationalStore, Transaction};
