// ── Command execution ──
//
// Action patterns, the retrying execution engine, its watchdog, and the
// agents that run commands locally or over SSH.

pub mod agent;
pub mod aspects;
pub mod engine;
pub mod monitor;
pub mod timeout;

pub use agent::{
    CONNECTIVITY_PROBE, CommandAgent, LocalCommandAgent, SshCommandAgent, SshTarget,
};
pub use aspects::{ActionPattern, CommandAspects, ExpectedStatus, LoggingPattern};
pub use engine::{AttemptRunner, CommandOutput, ShellRunner, run_with_aspects};
pub use monitor::MonitoredScope;
pub use timeout::TimeoutContext;
