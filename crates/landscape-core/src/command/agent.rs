// ── Command agents ──
//
// Agents bind the execution engine to a place where commands run: this
// host, or a remote host reached through the system `ssh` client.

use std::path::PathBuf;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::debug;

use super::aspects::{ActionPattern, CommandAspects, ExpectedStatus};
use super::engine::{AttemptRunner, CommandOutput, ShellRunner, run_process, run_with_aspects};
use crate::error::CoreError;

/// Probe used to check that a host accepts commands.
pub const CONNECTIVITY_PROBE: &str = "echo 'It Works'";

/// Something that can run commands against a resource.
pub trait CommandAgent: Send + Sync {
    /// Default aspects used when a call does not pass its own.
    fn aspects(&self) -> &CommandAspects;

    /// Where commands run, for diagnostics (`"localhost"`, `"user@host:22"`).
    fn location(&self) -> String;

    fn run_cmd<'a>(
        &'a self,
        command: &'a str,
        expected: &'a ExpectedStatus,
        aspects: Option<&'a CommandAspects>,
    ) -> BoxFuture<'a, Result<CommandOutput, CoreError>>;

    fn verify_connectivity(&self) -> BoxFuture<'_, Result<bool, CoreError>>;
}

// ── LocalCommandAgent ────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct LocalCommandAgent {
    aspects: CommandAspects,
}

impl LocalCommandAgent {
    pub fn new(aspects: CommandAspects) -> Self {
        Self { aspects }
    }
}

impl CommandAgent for LocalCommandAgent {
    fn aspects(&self) -> &CommandAspects {
        &self.aspects
    }

    fn location(&self) -> String {
        "localhost".into()
    }

    fn run_cmd<'a>(
        &'a self,
        command: &'a str,
        expected: &'a ExpectedStatus,
        aspects: Option<&'a CommandAspects>,
    ) -> BoxFuture<'a, Result<CommandOutput, CoreError>> {
        let aspects = aspects.unwrap_or(&self.aspects);
        Box::pin(run_with_aspects(&ShellRunner, command, expected, aspects))
    }

    fn verify_connectivity(&self) -> BoxFuture<'_, Result<bool, CoreError>> {
        Box::pin(async { Ok(true) })
    }
}

// ── SshCommandAgent ──────────────────────────────────────────────────

/// Connection details for the system `ssh` client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub keyfile: Option<PathBuf>,
}

impl SshTarget {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: None,
            keyfile: None,
        }
    }

    fn destination(&self) -> String {
        match &self.username {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }

    /// Arguments passed to `ssh` ahead of the remote command.
    pub fn ssh_args(&self, connect_timeout: Duration) -> Vec<String> {
        let mut args = vec![
            "-o".to_owned(),
            "BatchMode=yes".to_owned(),
            "-o".to_owned(),
            format!("ConnectTimeout={}", connect_timeout.as_secs().max(1)),
            "-p".to_owned(),
            self.port.to_string(),
        ];
        if let Some(keyfile) = &self.keyfile {
            args.push("-i".to_owned());
            args.push(keyfile.display().to_string());
        }
        args.push(self.destination());
        args.push("--".to_owned());
        args
    }
}

struct SshRunner {
    target: SshTarget,
}

impl AttemptRunner for SshRunner {
    fn run_attempt<'a>(
        &'a self,
        command: &'a str,
        inactivity_timeout: Duration,
    ) -> BoxFuture<'a, Result<CommandOutput, CoreError>> {
        Box::pin(async move {
            let mut process = tokio::process::Command::new("ssh");
            process
                .args(self.target.ssh_args(inactivity_timeout))
                .arg(command);
            run_process(process, command, inactivity_timeout).await
        })
    }
}

/// Runs commands on a remote host through the engine.
pub struct SshCommandAgent {
    runner: SshRunner,
    aspects: CommandAspects,
}

impl SshCommandAgent {
    pub fn new(target: SshTarget, aspects: CommandAspects) -> Self {
        Self {
            runner: SshRunner { target },
            aspects,
        }
    }

    pub fn target(&self) -> &SshTarget {
        &self.runner.target
    }
}

impl CommandAgent for SshCommandAgent {
    fn aspects(&self) -> &CommandAspects {
        &self.aspects
    }

    fn location(&self) -> String {
        let target = &self.runner.target;
        format!("{}:{}", target.destination(), target.port)
    }

    fn run_cmd<'a>(
        &'a self,
        command: &'a str,
        expected: &'a ExpectedStatus,
        aspects: Option<&'a CommandAspects>,
    ) -> BoxFuture<'a, Result<CommandOutput, CoreError>> {
        let aspects = aspects.unwrap_or(&self.aspects);
        Box::pin(run_with_aspects(&self.runner, command, expected, aspects))
    }

    fn verify_connectivity(&self) -> BoxFuture<'_, Result<bool, CoreError>> {
        Box::pin(async move {
            let aspects = self.aspects.clone().with_pattern(ActionPattern::SingleCall);
            let out = run_with_aspects(
                &self.runner,
                CONNECTIVITY_PROBE,
                &ExpectedStatus::Exact(0),
                &aspects,
            )
            .await?;
            debug!(location = %self.location(), status = out.status, "connectivity probe");
            Ok(out.status == 0)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_agent_runs_commands_and_is_always_reachable() {
        let agent = LocalCommandAgent::default();
        assert!(agent.verify_connectivity().await.unwrap());

        let out = agent
            .run_cmd(CONNECTIVITY_PROBE, &ExpectedStatus::Exact(0), None)
            .await
            .unwrap();
        assert_eq!(out.status, 0);
        assert_eq!(out.stdout.trim(), "It Works");
    }

    #[test]
    fn ssh_args_include_port_user_and_key() {
        let target = SshTarget {
            host: "node1.lab".into(),
            port: 2222,
            username: Some("tester".into()),
            keyfile: Some(PathBuf::from("/keys/id_ed25519")),
        };
        let args = target.ssh_args(Duration::from_millis(10));

        assert!(args.contains(&"ConnectTimeout=1".to_owned()));
        assert!(args.windows(2).any(|w| w[0] == "-p" && w[1] == "2222"));
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == "/keys/id_ed25519"));
        assert_eq!(args.last().unwrap(), "--");
        assert_eq!(args[args.len() - 2], "tester@node1.lab");
    }

    #[test]
    fn ssh_agent_reports_its_location() {
        let agent = SshCommandAgent::new(SshTarget::new("node2"), CommandAspects::default());
        assert_eq!(agent.location(), "node2:22");
        assert_eq!(agent.target().host, "node2");
    }
}
