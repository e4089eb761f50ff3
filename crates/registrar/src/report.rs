// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Grade reports combining a student's own scores with cohort statistics.

use std::{fmt::Debug, sync::Arc};

use registrar_store::{CourseId, CourseSnapshot, CourseStatus, RelationalStore};
use serde::{Deserialize, Serialize};

use crate::{AggregateStatsCache, Result};

/// One course on a student's record, as gathered by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    /// The course.
    pub course: CourseSnapshot,
    /// The student's total score in it.
    pub total_score: i64,
}

/// Whole-record figures of a grade report.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeSummary {
    /// Credits earned in closed courses.
    pub credits: u32,
    /// Grade point average over closed courses; `0` without any.
    pub gpa: f64,
    /// T-score of `gpa` among all students.
    pub gpa_t_score: f64,
    /// Mean GPA of all students.
    pub gpa_avg: f64,
    /// Highest GPA of all students.
    pub gpa_max: f64,
    /// Lowest GPA of all students.
    pub gpa_min: f64,
}

/// Per-course figures of a grade report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CourseGrade {
    /// Course id.
    pub course_id: CourseId,
    /// Course code.
    pub code: String,
    /// Course name.
    pub name: String,
    /// The student's total score.
    pub total_score: i64,
    /// T-score of `total_score` among the course's registrants.
    pub total_score_t_score: f64,
    /// Mean total score of the course's registrants.
    pub total_score_avg: f64,
    /// Highest total score of the course's registrants.
    pub total_score_max: i64,
    /// Lowest total score of the course's registrants.
    pub total_score_min: i64,
}

/// A student's grade report.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeReport {
    /// Whole-record figures.
    pub summary: GradeSummary,
    /// One entry per record, in input order.
    pub courses: Vec<CourseGrade>,
}

/// Builds [`GradeReport`]s from cached cohort distributions.
pub struct GradeReporter<S> {
    stats: Arc<AggregateStatsCache<S>>,
}

impl<S> Debug for GradeReporter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradeReporter").field("stats", &self.stats).finish()
    }
}

impl<S: RelationalStore> GradeReporter<S> {
    /// Creates a reporter reading cohort figures from `stats`.
    #[must_use]
    pub fn new(stats: Arc<AggregateStatsCache<S>>) -> Self {
        Self { stats }
    }

    /// Builds the report for one student's `records`.
    ///
    /// Cohort figures of an empty cohort default to `0`, and t-scores against it to `50`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transient`](crate::Error::Transient) if an aggregate query needed to
    /// refresh a distribution fails.
    pub async fn report(&self, records: &[CourseRecord]) -> Result<GradeReport> {
        let mut courses = Vec::with_capacity(records.len());
        let mut credits = 0_u32;
        let mut weighted = 0_i64;

        for record in records {
            let entry = self.stats.course_score_distribution(&record.course.id).await?;
            let totals = entry.value();
            courses.push(CourseGrade {
                course_id: record.course.id.clone(),
                code: record.course.code.clone(),
                name: record.course.name.clone(),
                total_score: record.total_score,
                total_score_t_score: totals.t_score(record.total_score),
                total_score_avg: totals.average(0.0),
                total_score_max: totals.max(0),
                total_score_min: totals.min(0),
            });

            if record.course.status == CourseStatus::Closed {
                credits += u32::from(record.course.credit);
                weighted += record.total_score * i64::from(record.course.credit);
            }
        }

        let gpa = grade_point_average(weighted, credits);
        let entry = self.stats.gpa_distribution().await?;
        let gpas = entry.value();

        Ok(GradeReport {
            summary: GradeSummary {
                credits,
                gpa,
                gpa_t_score: gpas.t_score(gpa),
                gpa_avg: gpas.average(0.0),
                gpa_max: gpas.max(0.0),
                gpa_min: gpas.min(0.0),
            },
            courses,
        })
    }
}

#[expect(clippy::cast_precision_loss, reason = "weighted scores are far below 2^52")]
fn grade_point_average(weighted: i64, credits: u32) -> f64 {
    if credits == 0 {
        return 0.0;
    }
    weighted as f64 / 100.0 / f64::from(credits)
}
