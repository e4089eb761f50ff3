// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{fmt::Debug, hash::Hash};

use dashmap::DashMap;
use registrar_store::{CourseId, CourseSnapshot};

/// Read-through memo of course rows, keyed by course id.
pub type CourseLookupCache = LookupCache<CourseId, CourseSnapshot>;

/// An unbounded read-through memo without expiry.
///
/// Values are loaded on first use and kept until explicitly overwritten with
/// [`invalidate`](Self::invalidate) or dropped with [`remove`](Self::remove). Concurrent misses
/// for the same key may each run their loader; the last one to finish wins.
pub struct LookupCache<K, V> {
    entries: DashMap<K, V>,
}

impl<K: Hash + Eq, V> Debug for LookupCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupCache").field("len", &self.entries.len()).finish()
    }
}

impl<K, V> Default for LookupCache<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self { entries: DashMap::new() }
    }
}

impl<K, V> LookupCache<K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Clone,
{
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the memoized value for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Returns the memoized value for `key`, running `loader` on a miss.
    ///
    /// A loaded `Some` is memoized. `None` means the row does not exist and is not memoized, so
    /// a row created later is found on the next lookup.
    ///
    /// # Errors
    ///
    /// Returns the loader's error; nothing is memoized in that case.
    pub async fn get_or_try_load<F, Fut, E>(&self, key: &K, loader: F) -> Result<Option<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        if let Some(value) = self.get(key) {
            tracing::debug!(key = ?key, "lookup.hit");
            return Ok(Some(value));
        }

        tracing::debug!(key = ?key, "lookup.miss");
        let loaded = loader().await?;
        if let Some(value) = &loaded {
            self.entries.insert(key.clone(), value.clone());
        }
        Ok(loaded)
    }

    /// Overwrites the value for `key`.
    pub fn invalidate(&self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    /// Drops the value for `key`, returning it.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    /// Number of memoized values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is memoized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
