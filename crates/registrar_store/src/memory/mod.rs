// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory reference backends.
//!
//! [`InMemoryStore`] and [`InMemoryMembership`] implement the store contracts with the same
//! observable semantics the registrar relies on from a real database and key-value server:
//! transactional visibility, row-level shared/exclusive locks with a lock wait timeout, and
//! duplicate-ignoring inserts. Both record every operation and accept a failure predicate so
//! tests can exercise transient-error paths.

mod membership;
mod relational;

pub use membership::{InMemoryMembership, MembershipOp};
pub use relational::{InMemoryStore, InMemoryTransaction, StoreOp};

type FailPredicate<Op> = Box<dyn Fn(&Op) -> bool + Send + Sync>;
