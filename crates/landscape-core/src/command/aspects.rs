// ── Command aspects ──
//
// How a command invocation behaves: retry strategy, result logging, and
// the timeouts that bound each attempt and the whole run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_COMPLETION_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MONITOR_DELAY: Duration = Duration::from_secs(30);

/// Retry/polling strategy for one invocation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ActionPattern {
    #[default]
    SingleCall,
    DoUntilSuccess,
    DoWhileSuccess,
    /// Needs a persistent connection; no built-in agent has one.
    SingleConnectedCall,
    /// Needs a persistent connection; no built-in agent has one.
    DoUntilConnectionFailure,
}

/// Which attempt results get logged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum LoggingPattern {
    #[default]
    AllResults,
    SuccessOnly,
    FailureOnly,
    Silent,
}

impl LoggingPattern {
    /// Whether an attempt whose status did (or did not) match should be logged.
    pub fn should_log(self, matched: bool) -> bool {
        match self {
            Self::AllResults => true,
            Self::SuccessOnly => matched,
            Self::FailureOnly => !matched,
            Self::Silent => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAspects {
    pub action_pattern: ActionPattern,
    pub logging_pattern: LoggingPattern,
    /// Upper bound for a single attempt.
    pub inactivity_timeout: Duration,
    /// Deadline across all attempts of a retrying pattern.
    pub completion_timeout: Duration,
    /// Sleep between attempts.
    pub completion_interval: Duration,
    /// Watchdog delay before a stuck attempt is reported.
    pub monitor_delay: Duration,
}

impl Default for CommandAspects {
    fn default() -> Self {
        Self {
            action_pattern: ActionPattern::SingleCall,
            logging_pattern: LoggingPattern::AllResults,
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
            completion_interval: DEFAULT_COMPLETION_INTERVAL,
            monitor_delay: DEFAULT_MONITOR_DELAY,
        }
    }
}

impl CommandAspects {
    pub fn with_pattern(mut self, pattern: ActionPattern) -> Self {
        self.action_pattern = pattern;
        self
    }

    pub fn with_logging(mut self, pattern: LoggingPattern) -> Self {
        self.logging_pattern = pattern;
        self
    }

    pub fn with_completion(mut self, timeout: Duration, interval: Duration) -> Self {
        self.completion_timeout = timeout;
        self.completion_interval = interval;
        self
    }

    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    pub fn with_monitor_delay(mut self, delay: Duration) -> Self {
        self.monitor_delay = delay;
        self
    }
}

// ── ExpectedStatus ───────────────────────────────────────────────────

/// The exit status (or set of statuses) an attempt must produce to count as a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedStatus {
    Exact(i32),
    AnyOf(Vec<i32>),
}

impl ExpectedStatus {
    pub fn matches(&self, status: i32) -> bool {
        match self {
            Self::Exact(expected) => *expected == status,
            Self::AnyOf(accepted) => accepted.contains(&status),
        }
    }
}

impl Default for ExpectedStatus {
    fn default() -> Self {
        Self::Exact(0)
    }
}

impl From<i32> for ExpectedStatus {
    fn from(status: i32) -> Self {
        Self::Exact(status)
    }
}

impl From<Vec<i32>> for ExpectedStatus {
    fn from(statuses: Vec<i32>) -> Self {
        Self::AnyOf(statuses)
    }
}

impl From<&[i32]> for ExpectedStatus {
    fn from(statuses: &[i32]) -> Self {
        Self::AnyOf(statuses.to_vec())
    }
}
