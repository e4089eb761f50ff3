// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{fmt::Debug, sync::Arc};

use registrar_store::{CourseId, CourseSnapshot, CourseStatus, RelationalStore, Transaction};

use crate::{CourseLookupCache, Error, Result};

/// Moves courses through their lifecycle and keeps the course cache in step.
///
/// The row is locked exclusively for the whole change and the cached snapshot is overwritten
/// before the lock is released. Registrations lock rows in shared mode before consulting the
/// cache, so none of them can act on a status older than the last committed change.
pub struct CourseStatusChanger<S> {
    store: Arc<S>,
    courses: Arc<CourseLookupCache>,
}

impl<S> Debug for CourseStatusChanger<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourseStatusChanger")
            .field("courses", &self.courses)
            .finish_non_exhaustive()
    }
}

impl<S: RelationalStore> CourseStatusChanger<S> {
    /// Creates a status changer sharing `courses` with the rest of the registrar.
    #[must_use]
    pub fn new(store: Arc<S>, courses: Arc<CourseLookupCache>) -> Self {
        Self { store, courses }
    }

    /// Sets the status of `course` and returns the updated snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the course does not exist and [`Error::Transient`] if the
    /// store fails. A failed commit drops the cached snapshot so the next lookup reloads the
    /// committed row.
    pub async fn set_status(&self, course: &CourseId, status: CourseStatus) -> Result<CourseSnapshot> {
        let mut tx = self.store.begin().await?;
        let Some(current) = tx.course_for_update(course).await? else {
            return Err(Error::course_not_found(course));
        };

        tx.update_course_status(course, status).await?;
        let updated = current.with_status(status);
        self.courses.invalidate(course.clone(), updated.clone());

        if let Err(error) = tx.commit().await {
            self.courses.remove(course);
            return Err(error.into());
        }

        tracing::info!(course_id = %course, from = %current.status, to = %status, "course.status_changed");
        Ok(updated)
    }
}
