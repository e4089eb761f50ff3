// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use registrar_store::CourseId;
use serde::Deserialize;

use crate::Result;

#[derive(Deserialize)]
struct RequestedCourse {
    id: CourseId,
}

/// Parses a registration request body of the form `[{"id": "..."}, ...]`.
///
/// Ids are returned in request order, duplicates included; the resolver normalizes them.
///
/// # Errors
///
/// Returns [`Error::MalformedInput`](crate::Error::MalformedInput) if the body is not such a list
/// or an id is blank.
pub fn parse_registration_request(json: &str) -> Result<Vec<CourseId>> {
    let requested: Vec<RequestedCourse> = serde_json::from_str(json)?;
    Ok(requested.into_iter().map(|course| course.id).collect())
}
