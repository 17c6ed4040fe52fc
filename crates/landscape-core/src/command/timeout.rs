// ── TimeoutContext ──
//
// Completion deadline for retrying action patterns. Once the deadline has
// been observed the next attempt is marked final; a failing final attempt
// produces the timeout error.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::{CommandTimeout, CoreError};

#[derive(Debug, Clone)]
pub struct TimeoutContext {
    timeout: Duration,
    interval: Duration,
    begin: Option<Instant>,
    final_attempt: bool,
}

impl TimeoutContext {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            begin: None,
            final_attempt: false,
        }
    }

    pub fn mark_begin(&mut self) {
        self.begin = Some(Instant::now());
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn elapsed(&self) -> Duration {
        self.begin.map_or(Duration::ZERO, |b| b.elapsed())
    }

    /// True while the deadline has not been reached.
    pub fn should_continue(&self) -> bool {
        self.elapsed() < self.timeout
    }

    pub fn mark_final_attempt(&mut self) {
        self.final_attempt = true;
    }

    pub fn is_final_attempt(&self) -> bool {
        self.final_attempt
    }

    pub fn create_timeout(
        &self,
        what_for: &str,
        command: &str,
        stdout: &str,
        stderr: &str,
    ) -> CoreError {
        CommandTimeout {
            what_for: what_for.to_owned(),
            command: command.to_owned(),
            stdout: stdout.to_owned(),
            stderr: stderr.to_owned(),
            elapsed: self.elapsed(),
        }
        .into()
    }
}
