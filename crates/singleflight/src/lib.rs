// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Keyed deduplication of concurrent async computations.
//!
//! [`SingleFlight`] guarantees that, for a given key, at most one computation is running at any
//! instant. The first caller to find the key idle becomes the *leader* and runs its closure;
//! callers arriving while the leader is busy become *followers* and suspend until the leader
//! publishes, then receive a clone of the same output.
//!
//! A round ends the moment its output is published: the key is released and the next call elects
//! a fresh leader. Outputs are never remembered across rounds, so a failed computation (an `Err`
//! inside `T`) is delivered to the waiters of that round only.
//!
//! # Example
//!
//! ```
//! use singleflight::SingleFlight;
//!
//! # async fn example() {
//! let group: SingleFlight<&str, Result<Vec<i64>, String>> = SingleFlight::new();
//!
//! let totals = group
//!     .work("course:42", || async {
//!         // Expensive aggregate, executed once per round no matter how many callers join.
//!         Ok(vec![70, 85, 91])
//!     })
//!     .await;
//! assert_eq!(totals, Ok(vec![70, 85, 91]));
//! # }
//! ```
//!
//! # Cancellation and Panics
//!
//! - A follower that stops waiting never affects the leader or the other followers.
//! - If the leader's own future is dropped or panics before publishing, the slot lock is released
//!   with no output in it and one waiting follower is promoted to leader, running its own closure.
//! - Once the last participant of an abandoned round is gone, the next call starts a new round.

use std::{
    collections::HashMap,
    fmt::Debug,
    hash::Hash,
    sync::{Arc, Weak},
};

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot<T> = Arc<AsyncMutex<Option<T>>>;
type SharedMapping<K, T> = Arc<SyncMutex<HashMap<K, Weak<AsyncMutex<Option<T>>>>>>;

/// A group of keyed computations executed with duplicate suppression.
///
/// The group is cheap to share behind an `Arc` or a reference; it is `Send` and `Sync` whenever
/// `K` and `T` are `Send`.
pub struct SingleFlight<K, T> {
    mapping: SharedMapping<K, T>,
}

impl<K, T> Default for SingleFlight<K, T> {
    fn default() -> Self {
        Self {
            mapping: Arc::default(),
        }
    }
}

impl<K, T> Debug for SingleFlight<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.mapping.lock().values().filter(|slot| slot.strong_count() > 0).count())
            .finish()
    }
}

/// How a caller participates in the current round for its key.
enum Role<T> {
    /// Owns the slot lock from the moment the round was claimed.
    Leader(OwnedMutexGuard<Option<T>>),
    /// Waits on the slot lock; promoted if the lock is released empty.
    Follower(Slot<T>),
}

impl<K, T> SingleFlight<K, T>
where
    K: Hash + Eq + Clone,
{
    /// Creates an empty group.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `func` for `key` unless a round for `key` is already in flight, in which case the
    /// returned future resolves to a clone of that round's output.
    ///
    /// The leader is chosen when `work` is called, not when the future is first polled: the
    /// check for an existing round and the claim of a new one happen under a single lock.
    pub fn work<F, Fut>(&self, key: K, func: F) -> impl Future<Output = T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
        T: Clone,
    {
        let role = self.join(&key);
        let mapping = Arc::clone(&self.mapping);
        async move {
            match role {
                Role::Leader(guard) => lead(guard, &key, &mapping, func).await,
                Role::Follower(slot) => follow(slot, &key, &mapping, func).await,
            }
        }
    }

    /// Returns the number of keys that currently have a round in progress.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.mapping.lock().values().filter(|slot| slot.strong_count() > 0).count()
    }

    fn join(&self, key: &K) -> Role<T> {
        let mut mapping = self.mapping.lock();

        if let Some(slot) = mapping.get(key).and_then(Weak::upgrade) {
            return Role::Follower(slot);
        }

        // Either a brand new key or every participant of the previous round is gone.
        let slot: Slot<T> = Arc::new(AsyncMutex::new(None));
        mapping.insert(key.clone(), Arc::downgrade(&slot));

        // A freshly created mutex is always free; the follower branch is only a fallback.
        match Arc::clone(&slot).try_lock_owned() {
            Ok(guard) => Role::Leader(guard),
            Err(_) => Role::Follower(slot),
        }
    }
}

async fn lead<K, T, F, Fut>(mut guard: OwnedMutexGuard<Option<T>>, key: &K, mapping: &SharedMapping<K, T>, func: F) -> T
where
    K: Hash + Eq,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
    T: Clone,
{
    let value = func().await;
    *guard = Some(value.clone());

    // Release the key before the slot so late joiners of this round still see the output while
    // new callers start a fresh round.
    release(mapping, key, OwnedMutexGuard::mutex(&guard));
    drop(guard);
    value
}

async fn follow<K, T, F, Fut>(slot: Slot<T>, key: &K, mapping: &SharedMapping<K, T>, func: F) -> T
where
    K: Hash + Eq,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
    T: Clone,
{
    let guard = slot.lock_owned().await;
    if let Some(value) = guard.as_ref() {
        return value.clone();
    }

    // The leader went away without publishing. Holding the lock makes us the only leader.
    lead(guard, key, mapping, func).await
}

fn release<K, T>(mapping: &SharedMapping<K, T>, key: &K, slot: &Slot<T>)
where
    K: Hash + Eq,
{
    let mut mapping = mapping.lock();
    let is_current = mapping
        .get(key)
        .is_some_and(|current| std::ptr::eq(current.as_ptr(), Arc::as_ptr(slot)));
    if is_current {
        mapping.remove(key);
    }
}
