// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{fmt::Debug, hash::Hash, sync::Arc, time::Duration};

use dashmap::DashMap;
use singleflight::SingleFlight;

use crate::{CacheEntry, Clock, Result};

/// A keyed cache of expensive values that are recomputed at most once per key per expiry.
///
/// Each key maps to an `Arc<CacheEntry<V>>`. A read within `ttl` of the entry's
/// [`computed_at`](CacheEntry::computed_at) is a hit. A read past it joins the key's
/// [`SingleFlight`] round: one caller recomputes, everybody else waiting on that key receives the
/// same entry or the same error.
///
/// Entries are only ever replaced by a single map insert of a new `Arc`; a failed recomputation
/// leaves the previous entry in place and is not remembered, so the next read retries.
pub struct TtlCache<K, V> {
    name: &'static str,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: DashMap<K, Arc<CacheEntry<V>>>,
    flights: SingleFlight<K, Result<Arc<CacheEntry<V>>>>,
}

impl<K: Hash + Eq, V> Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .field("len", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone + Debug,
{
    /// Creates an empty cache whose entries stay fresh for `ttl` as measured by `clock`.
    #[must_use]
    pub fn new(name: &'static str, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            ttl,
            clock,
            entries: DashMap::new(),
            flights: SingleFlight::new(),
        }
    }

    /// Returns a fresh entry for `key`, running `recompute` if there is none.
    ///
    /// `recompute` runs only when the caller wins leadership of the key's round and, after
    /// winning, still finds no fresh entry. The entry it produces is stamped with the instant
    /// the recomputation started.
    ///
    /// # Errors
    ///
    /// Returns the error produced by the round's recomputation. Every caller waiting on that
    /// round receives a clone of it.
    pub async fn get_or_refresh<F, Fut>(&self, key: K, recompute: F) -> Result<Arc<CacheEntry<V>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(entry) = self.fresh(&key) {
            tracing::debug!(cache.name = self.name, key = ?key, "cache.hit");
            return Ok(entry);
        }

        tracing::debug!(cache.name = self.name, key = ?key, "cache.miss");
        self.flights
            .work(key.clone(), || async move {
                // A round that finished while we were queued may have published already.
                if let Some(entry) = self.fresh(&key) {
                    return Ok(entry);
                }

                let started = self.clock.now();
                match recompute().await {
                    Ok(value) => {
                        let entry = Arc::new(CacheEntry::new(value, started));
                        self.entries.insert(key.clone(), Arc::clone(&entry));
                        tracing::debug!(
                            cache.name = self.name,
                            key = ?key,
                            elapsed = ?self.clock.now().saturating_duration_since(started),
                            "cache.refreshed"
                        );
                        Ok(entry)
                    }
                    Err(error) => {
                        tracing::warn!(cache.name = self.name, key = ?key, %error, "cache.refresh_failed");
                        Err(error)
                    }
                }
            })
            .await
    }

    /// Returns the current entry for `key` regardless of its age.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<Arc<CacheEntry<V>>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of keys with a published entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been published yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How long an entry stays fresh.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The name used in log events.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn fresh(&self, key: &K) -> Option<Arc<CacheEntry<V>>> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| Arc::clone(entry.value()))
    }
}
