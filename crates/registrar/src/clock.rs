// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The monotonic time source used for TTL decisions.

use std::{fmt::Debug, time::Instant};

/// A monotonic clock supplied by the embedding service.
pub trait Clock: Debug + Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// A [`Clock`] reading the Tokio timer's notion of now.
///
/// Under a runtime started with paused time (`#[tokio::test(start_paused = true)]`), this clock
/// only moves when the runtime auto-advances or `tokio::time::advance` is called, which makes
/// TTL expiry deterministic in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}
