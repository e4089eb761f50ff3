// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{fmt::Debug, sync::Arc, time::Duration};

use registrar_store::{CourseId, RelationalStore};

use crate::{CacheEntry, Clock, Result, ScoreDistribution, TtlCache};

/// Default freshness window of the global GPA distribution.
pub const DEFAULT_GPA_TTL: Duration = Duration::from_millis(900);

/// Default freshness window of a per-course total score distribution.
pub const DEFAULT_COURSE_SCORES_TTL: Duration = Duration::from_millis(100);

/// Short-lived caches in front of the two aggregate queries behind grade statistics.
///
/// Both queries scan every student or every registrant, so concurrent grade reports share one
/// query per key per freshness window:
///
/// - the GPA distribution of all students, under a single key;
/// - the total score distribution of each course, keyed by course id.
///
/// Store failures are returned to the callers of the failed round only.
pub struct AggregateStatsCache<S> {
    store: Arc<S>,
    gpa: TtlCache<(), ScoreDistribution<f64>>,
    course_scores: TtlCache<CourseId, ScoreDistribution<i64>>,
}

impl<S> Debug for AggregateStatsCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateStatsCache")
            .field("gpa", &self.gpa)
            .field("course_scores", &self.course_scores)
            .finish_non_exhaustive()
    }
}

impl<S: RelationalStore> AggregateStatsCache<S> {
    /// Creates empty caches over `store`.
    #[must_use]
    pub fn new(store: Arc<S>, gpa_ttl: Duration, course_scores_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            gpa: TtlCache::new("gpa_distribution", gpa_ttl, Arc::clone(&clock)),
            course_scores: TtlCache::new("course_score_distribution", course_scores_ttl, clock),
        }
    }

    /// GPA of every student with at least one closed course.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transient`](crate::Error::Transient) if the round's aggregate query
    /// failed.
    pub async fn gpa_distribution(&self) -> Result<Arc<CacheEntry<ScoreDistribution<f64>>>> {
        self.gpa
            .get_or_refresh((), || async { Ok(ScoreDistribution::new(self.store.gpa_distribution().await?)) })
            .await
    }

    /// Total score of every registrant of `course`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transient`](crate::Error::Transient) if the round's aggregate query
    /// failed.
    pub async fn course_score_distribution(&self, course: &CourseId) -> Result<Arc<CacheEntry<ScoreDistribution<i64>>>> {
        self.course_scores
            .get_or_refresh(course.clone(), || async {
                Ok(ScoreDistribution::new(self.store.course_total_scores(course).await?))
            })
            .await
    }

    /// The cache holding the GPA distribution.
    #[must_use]
    pub fn gpa_cache(&self) -> &TtlCache<(), ScoreDistribution<f64>> {
        &self.gpa
    }

    /// The cache holding per-course total score distributions.
    #[must_use]
    pub fn course_scores_cache(&self) -> &TtlCache<CourseId, ScoreDistribution<i64>> {
        &self.course_scores
    }
}

#[cfg(test)]
mod tests {
    use registrar_store::{InMemoryStore, StoreOp};

    use super::*;
    use crate::TokioClock;

    fn stats(store: &InMemoryStore) -> AggregateStatsCache<InMemoryStore> {
        AggregateStatsCache::new(
            Arc::new(store.clone()),
            DEFAULT_GPA_TTL,
            DEFAULT_COURSE_SCORES_TTL,
            Arc::new(TokioClock),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_cached_independently() {
        let store = InMemoryStore::new();
        let stats = stats(&store);
        let a = CourseId::parse("a").expect("valid id");
        let b = CourseId::parse("b").expect("valid id");

        stats.course_score_distribution(&a).await.expect("computed");
        stats.course_score_distribution(&b).await.expect("computed");
        stats.course_score_distribution(&a).await.expect("cached");
        stats.gpa_distribution().await.expect("computed");

        assert_eq!(store.count_operations(|op| matches!(op, StoreOp::CourseTotalScores(_))), 2);
        assert_eq!(store.count_operations(|op| matches!(op, StoreOp::GpaDistribution)), 1);
        assert_eq!(stats.course_scores_cache().len(), 2);
        assert_eq!(stats.gpa_cache().len(), 1);
    }

    #[test]
    fn default_ttls() {
        let stats = stats(&InMemoryStore::new());
        assert_eq!(stats.gpa_cache().ttl(), Duration::from_millis(900));
        assert_eq!(stats.course_scores_cache().ttl(), Duration::from_millis(100));
    }
}
