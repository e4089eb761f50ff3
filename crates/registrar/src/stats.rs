// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cohort score distributions and the statistics derived from them.

use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// T-score reported when the cohort has no spread.
pub const NEUTRAL_T_SCORE: f64 = 50.0;

/// The raw scores of one cohort, in the order the store returned them.
///
/// `T` is `f64` for grade point averages and `i64` for course total scores.
///
/// # Examples
///
/// ```
/// use registrar::ScoreDistribution;
///
/// let totals = ScoreDistribution::new(vec![60_i64, 80, 100]);
/// assert_eq!(totals.average(0.0), 80.0);
/// assert_eq!(totals.max(0), 100);
/// assert!((totals.t_score(100) - 62.247).abs() < 1e-3);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreDistribution<T> {
    scores: Vec<T>,
}

impl<T> ScoreDistribution<T>
where
    T: Copy + PartialOrd + ToPrimitive,
{
    /// Wraps a cohort's scores.
    #[must_use]
    pub fn new(scores: Vec<T>) -> Self {
        Self { scores }
    }

    /// The raw scores.
    #[must_use]
    pub fn scores(&self) -> &[T] {
        &self.scores
    }

    /// Number of scores in the cohort.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Returns `true` for an empty cohort.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Arithmetic mean, or `default` for an empty cohort.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "cohorts are far smaller than 2^52")]
    pub fn average(&self, default: f64) -> f64 {
        if self.scores.is_empty() {
            return default;
        }
        self.sum() / self.scores.len() as f64
    }

    /// Largest score, or `default` for an empty cohort.
    #[must_use]
    pub fn max(&self, default: T) -> T {
        self.scores
            .iter()
            .copied()
            .reduce(|best, score| if score > best { score } else { best })
            .unwrap_or(default)
    }

    /// Smallest score, or `default` for an empty cohort.
    #[must_use]
    pub fn min(&self, default: T) -> T {
        self.scores
            .iter()
            .copied()
            .reduce(|best, score| if score < best { score } else { best })
            .unwrap_or(default)
    }

    /// Population standard deviation; `0` for an empty cohort.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "cohorts are far smaller than 2^52")]
    pub fn std_dev(&self) -> f64 {
        if self.scores.is_empty() {
            return 0.0;
        }
        let mean = self.average(0.0);
        let variance = self
            .scores
            .iter()
            .map(|score| {
                let delta = as_f64(*score) - mean;
                delta * delta
            })
            .sum::<f64>()
            / self.scores.len() as f64;
        variance.sqrt()
    }

    /// Standardized score of `value` against this cohort: `50 + 10 * (value - mean) / stddev`.
    ///
    /// Returns [`NEUTRAL_T_SCORE`] when the cohort has no spread, which includes the empty
    /// cohort and a cohort of one.
    #[must_use]
    pub fn t_score(&self, value: T) -> f64 {
        let std_dev = self.std_dev();
        if std_dev <= 0.0 {
            return NEUTRAL_T_SCORE;
        }
        (as_f64(value) - self.average(0.0)) / std_dev * 10.0 + NEUTRAL_T_SCORE
    }

    fn sum(&self) -> f64 {
        self.scores.iter().map(|score| as_f64(*score)).sum()
    }
}

impl<T> From<Vec<T>> for ScoreDistribution<T>
where
    T: Copy + PartialOrd + ToPrimitive,
{
    fn from(scores: Vec<T>) -> Self {
        Self::new(scores)
    }
}

fn as_f64<T: ToPrimitive>(value: T) -> f64 {
    // Every primitive numeric type converts to f64; NaN marks a type that does not.
    value.to_f64().unwrap_or(f64::NAN)
}
