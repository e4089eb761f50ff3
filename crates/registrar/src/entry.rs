// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    ops::Deref,
    time::{Duration, Instant},
};

/// A computed value together with the instant its computation started.
///
/// Entries are published behind an `Arc` and replaced wholesale on refresh, so the value and its
/// timestamp are always read as one unit.
///
/// # Examples
///
/// ```
/// use registrar::CacheEntry;
/// use std::time::{Duration, Instant};
///
/// let computed_at = Instant::now();
/// let entry = CacheEntry::new(vec![3.2, 2.9], computed_at);
/// assert_eq!(entry.value(), &vec![3.2, 2.9]);
/// assert!(entry.is_fresh(computed_at + Duration::from_millis(900), Duration::from_millis(900)));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry<V> {
    value: V,
    computed_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Creates an entry for `value` computed at `computed_at`.
    pub fn new(value: V, computed_at: Instant) -> Self {
        Self { value, computed_at }
    }

    /// Returns a reference to the cached value.
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the entry and returns the inner value.
    #[must_use]
    pub fn into_value(self) -> V {
        self.value
    }

    /// When the computation that produced this value started.
    #[must_use]
    pub fn computed_at(&self) -> Instant {
        self.computed_at
    }

    /// Age of the entry at `now`; zero if `now` precedes the computation.
    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.computed_at)
    }

    /// Returns `true` while the age at `now` does not exceed `ttl`.
    #[must_use]
    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        self.age(now) <= ttl
    }
}

impl<V> Deref for CacheEntry<V> {
    type Target = V;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}
