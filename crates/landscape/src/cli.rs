//! Clap derive structures for the `landscape` CLI.
//!
//! Defines the command tree, global flags and shared argument groups.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// landscape -- inspect and exercise a lab test landscape
#[derive(Debug, Parser)]
#[command(
    name = "landscape",
    version,
    about = "Inspect and exercise a lab test landscape",
    long_about = "Loads landscape, topology and credential documents, activates the\n\
        landscape through its configuration, integration and operational stages,\n\
        and runs commands through the retrying command engine.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, env = "LANDSCAPE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Landscape document (YAML, JSON or TOML)
    #[arg(long, short = 'l', global = true)]
    pub landscape: Option<PathBuf>,

    /// Topology document
    #[arg(long, short = 't', global = true)]
    pub topology: Option<PathBuf>,

    /// Credentials document
    #[arg(long, global = true)]
    pub credentials: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load and validate the declared landscape
    Validate,

    /// List integrated devices and services
    #[command(alias = "inv", alias = "ls")]
    Inventory(InventoryArgs),

    /// Probe every device that carries an SSH agent
    Verify(VerifyArgs),

    /// Show the checkout pool, optionally holding devices or clusters
    Pool(PoolArgs),

    /// Run a local command through the command engine
    Run(RunArgs),

    /// Manage the settings file and stored passwords
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared Activation Arguments ──────────────────────────────────────

#[derive(Debug, Clone, Args)]
pub struct ActivationArgs {
    /// Integrate no devices
    #[arg(long)]
    pub disable_devices: bool,

    /// Integrate no services
    #[arg(long)]
    pub disable_services: bool,

    /// Skip the power/serial feature check
    #[arg(long)]
    pub no_feature_check: bool,

    /// Skip the cluster overlap check
    #[arg(long)]
    pub no_topology_check: bool,
}

// ── Inventory ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct InventoryArgs {
    /// Which resources to list
    #[arg(long, short = 'k', default_value = "all")]
    pub kind: InventoryKind,

    /// Keep resources matching any filter (type=, group=, name=, role=,
    /// or type=..,role=..)
    #[arg(long, short = 'i')]
    pub include: Vec<String>,

    /// Drop resources matching any filter
    #[arg(long, short = 'x')]
    pub exclude: Vec<String>,

    #[command(flatten)]
    pub activation: ActivationArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum InventoryKind {
    All,
    Devices,
    Services,
}

// ── Verify ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Fail on the first unreachable device
    #[arg(long)]
    pub strict: bool,

    /// Command used as the connectivity probe
    #[arg(long)]
    pub probe: Option<String>,

    #[command(flatten)]
    pub activation: ActivationArgs,
}

// ── Pool ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PoolArgs {
    /// Check out a device for the duration of the command
    #[arg(long, short = 'd')]
    pub device: Vec<String>,

    /// Check out a cluster for the duration of the command
    #[arg(long, short = 'c')]
    pub cluster: Vec<String>,

    #[command(flatten)]
    pub activation: ActivationArgs,
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Retry/polling strategy
    #[arg(long, short = 'p')]
    pub pattern: Option<PatternArg>,

    /// Accepted exit statuses
    #[arg(long, short = 'e', default_value = "0", value_delimiter = ',')]
    pub expect: Vec<i32>,

    /// Completion timeout in seconds for retrying patterns
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Seconds between attempts
    #[arg(long)]
    pub interval: Option<f64>,

    /// Upper bound in seconds for a single attempt
    #[arg(long)]
    pub inactivity: Option<f64>,

    /// Command to run, passed to `sh -c`
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PatternArg {
    SingleCall,
    DoUntilSuccess,
    DoWhileSuccess,
    SingleConnectedCall,
    DoUntilConnectionFailure,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a settings file from defaults and the given document paths
    Init {
        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },

    /// Display the resolved settings
    Show,

    /// Print the settings file path
    Path,

    /// Store a credential password in the system keyring
    SetPassword {
        /// Credential identifier
        identifier: String,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
