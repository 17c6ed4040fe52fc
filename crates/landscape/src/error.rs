//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use landscape_config::ConfigError;
use landscape_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIGURATION: i32 = 3;
    pub const POOL: i32 = 4;
    pub const CONNECTIVITY: i32 = 5;
    pub const TIMEOUT: i32 = 6;
    pub const ACTIVATION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("No landscape document configured")]
    #[diagnostic(
        code(landscape::no_landscape),
        help(
            "Pass --landscape <FILE>, or set landscape_file in {path}\n\
             Create one with: landscape config init --landscape <FILE>"
        )
    )]
    NoLandscape { path: String },

    #[error("{message}")]
    #[diagnostic(
        code(landscape::configuration),
        help("Check the landscape, topology and credential documents, then run: landscape validate")
    )]
    Configuration { message: String },

    #[error("{message}")]
    #[diagnostic(code(landscape::settings))]
    Settings { message: String },

    // ── Usage ────────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(landscape::semantic))]
    Semantic { message: String },

    #[error("Coordinator '{type_name}' does not implement '{operation}'")]
    #[diagnostic(
        code(landscape::not_overloaded),
        help("Install a coupling whose coordinator provides '{operation}'.")
    )]
    NotOverloaded {
        operation: String,
        type_name: String,
    },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(landscape::validation))]
    Validation { field: String, reason: String },

    // ── Pool ─────────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(landscape::pool),
        help("Run: landscape pool to see what is available")
    )]
    Pool { message: String },

    // ── Activation ───────────────────────────────────────────────────
    #[error("The {stage} stage already failed: {message}")]
    #[diagnostic(code(landscape::activation_failed))]
    ActivationFailed { stage: String, message: String },

    #[error("The {handle} is gone")]
    #[diagnostic(code(landscape::detached))]
    Detached { handle: String },

    // ── Commands ─────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(landscape::timeout),
        help("Raise --timeout or --inactivity, or check the target host.")
    )]
    Timeout { message: String },

    #[error("Command exited with status {status}, expected {expected}")]
    #[diagnostic(code(landscape::command_failed))]
    CommandFailed { status: i32, expected: String },

    #[error("{failed} of {total} devices failed the connectivity probe")]
    #[diagnostic(
        code(landscape::connectivity),
        help("Re-run with -v to see each failure, or --strict to stop at the first one.")
    )]
    Connectivity { failed: usize, total: usize },

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoLandscape { .. } | Self::Configuration { .. } | Self::Settings { .. } => {
                exit_code::CONFIGURATION
            }
            Self::Validation { .. } | Self::Semantic { .. } | Self::NotOverloaded { .. } => {
                exit_code::USAGE
            }
            Self::Pool { .. } => exit_code::POOL,
            Self::Connectivity { .. } => exit_code::CONNECTIVITY,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::ActivationFailed { .. } => exit_code::ACTIVATION,
            Self::Detached { .. } | Self::CommandFailed { .. } | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Configuration { message } => CliError::Configuration { message },

            CoreError::Semantic { message } => CliError::Semantic { message },

            CoreError::NotOverloaded {
                operation,
                type_name,
            } => CliError::NotOverloaded {
                operation,
                type_name,
            },

            CoreError::Checkout { message } | CoreError::Checkin { message } => {
                CliError::Pool { message }
            }

            timeout @ (CoreError::CommandTimeout(_) | CoreError::InactivityTimeout { .. }) => {
                CliError::Timeout {
                    message: timeout.to_string(),
                }
            }

            CoreError::ActivationFailed { stage, message } => {
                CliError::ActivationFailed { stage, message }
            }

            CoreError::Detached { handle } => CliError::Detached {
                handle: handle.into(),
            },

            CoreError::Io(err) => CliError::Io(err),

            CoreError::Serialization { message } => CliError::Settings { message },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Core(inner) => inner.into(),
            ConfigError::Io(err) => CliError::Io(err),
            other => CliError::Settings {
                message: other.to_string(),
            },
        }
    }
}
