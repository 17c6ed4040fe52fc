// ── Core error types ──
//
// Every failure the landscape can report. Configuration problems abort a
// single resource, semantic errors flag misuse, pool errors leave the pool
// untouched, and command timeouts carry enough output to diagnose a run
// without repeating it.

use std::time::Duration;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Declaration errors ───────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // ── Usage errors ─────────────────────────────────────────────────
    #[error("Semantic error: {message}")]
    Semantic { message: String },

    #[error("'{operation}' must be overloaded by coordinator type '{type_name}'")]
    NotOverloaded {
        operation: String,
        type_name: String,
    },

    // ── Pool errors ──────────────────────────────────────────────────
    #[error("Checkout failed: {message}")]
    Checkout { message: String },

    #[error("Checkin failed: {message}")]
    Checkin { message: String },

    // ── Command errors ───────────────────────────────────────────────
    #[error(transparent)]
    CommandTimeout(Box<CommandTimeout>),

    #[error("Command produced no result within {timeout:?}: {command}")]
    InactivityTimeout { command: String, timeout: Duration },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Activation of the {stage} stage failed: {message}")]
    ActivationFailed { stage: String, message: String },

    #[error("The {handle} behind this handle no longer exists")]
    Detached { handle: &'static str },

    // ── IO / serialization ───────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl CoreError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Self::Semantic {
            message: message.into(),
        }
    }

    pub fn not_overloaded(operation: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::NotOverloaded {
            operation: operation.into(),
            type_name: type_name.into(),
        }
    }

    /// Whether this error only affects the resource being materialized.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<CommandTimeout> for CoreError {
    fn from(err: CommandTimeout) -> Self {
        Self::CommandTimeout(Box::new(err))
    }
}

// ── CommandTimeout ───────────────────────────────────────────────────

/// Raised when a retrying action pattern exhausts its completion window.
#[derive(Debug, Clone, Error)]
#[error(
    "Timed out after {elapsed:?} waiting for {what_for}\nCMD: {command}\nSTDOUT:\n{}\nSTDERR:\n{}",
    indent_lines(.stdout),
    indent_lines(.stderr)
)]
pub struct CommandTimeout {
    pub what_for: String,
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

pub(crate) fn indent_lines(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_carries_command_output() {
        let err = CoreError::from(CommandTimeout {
            what_for: "command success".into(),
            command: "false".into(),
            stdout: "line one\nline two".into(),
            stderr: "oops".into(),
            elapsed: Duration::from_secs(3),
        });

        let text = err.to_string();
        assert!(text.contains("waiting for command success"));
        assert!(text.contains("CMD: false"));
        assert!(text.contains("    line one\n    line two"));
        assert!(text.contains("STDERR:\n    oops"));
    }

    #[test]
    fn not_overloaded_names_the_type() {
        let err = CoreError::not_overloaded("create_ssh_agent", "RackCoordinator");
        assert_eq!(
            err.to_string(),
            "'create_ssh_agent' must be overloaded by coordinator type 'RackCoordinator'"
        );
    }
}
