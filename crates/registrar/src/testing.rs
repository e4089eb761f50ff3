// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Captured `tracing` output for asserting on registrar events.

use std::{io::Write, sync::Arc};

use parking_lot::Mutex;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt};

/// Formatted events of every level, one per line, recorded while the guard returned by
/// [`install`](Self::install) is alive.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Captures events emitted on the current thread until the guard drops.
    #[must_use]
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .with_writer(capture.clone())
                .with_ansi(false)
                .without_time(),
        );
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    /// Lines whose message is `event`.
    #[must_use]
    pub fn events(&self, event: &str) -> Vec<String> {
        let buffer = self.buffer.lock();
        String::from_utf8_lossy(&buffer)
            .lines()
            .filter(|line| line.split_whitespace().any(|word| word == event))
            .map(str::to_owned)
            .collect()
    }

    /// Asserts that some `event` line carries every one of `fields`, e.g. `"course_id=01FH"`.
    pub fn assert_event(&self, event: &str, fields: &[&str]) {
        let lines = self.events(event);
        assert!(
            lines.iter().any(|line| fields.iter().all(|field| line.contains(field))),
            "no {event} event with {fields:?}, got: {lines:#?}"
        );
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
