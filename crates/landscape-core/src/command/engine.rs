// ── Command execution engine ──
//
// Runs one command under an action pattern. Every attempt is bounded by the
// inactivity timeout and wrapped in a monitored scope; retrying patterns are
// bounded by a completion TimeoutContext that grants one final attempt after
// the deadline is first observed.

use std::process::Stdio;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use tracing::{info, warn};

use super::aspects::{ActionPattern, CommandAspects, ExpectedStatus, LoggingPattern};
use super::monitor::{MonitoredScope, stuck_message};
use super::timeout::TimeoutContext;
use crate::error::CoreError;

/// Exit status and captured output of one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Executes a single attempt of a command. Implementations decide where it runs.
pub trait AttemptRunner: Send + Sync {
    fn run_attempt<'a>(
        &'a self,
        command: &'a str,
        inactivity_timeout: Duration,
    ) -> BoxFuture<'a, Result<CommandOutput, CoreError>>;
}

// ── Local shell runner ───────────────────────────────────────────────

/// Runs commands through `sh -c` on this host.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl AttemptRunner for ShellRunner {
    fn run_attempt<'a>(
        &'a self,
        command: &'a str,
        inactivity_timeout: Duration,
    ) -> BoxFuture<'a, Result<CommandOutput, CoreError>> {
        Box::pin(async move {
            let mut process = tokio::process::Command::new("sh");
            process.arg("-c").arg(command);
            run_process(process, command, inactivity_timeout).await
        })
    }
}

/// Spawn a prepared process, capture its output, and kill it if it outlives the timeout.
pub(crate) async fn run_process(
    mut process: tokio::process::Command,
    command: &str,
    inactivity_timeout: Duration,
) -> Result<CommandOutput, CoreError> {
    process
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = process.spawn()?;

    match tokio::time::timeout(inactivity_timeout, child.wait_with_output()).await {
        Ok(output) => {
            let output = output?;
            Ok(CommandOutput {
                // Signal termination has no exit code.
                status: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
        Err(_) => Err(CoreError::InactivityTimeout {
            command: command.to_owned(),
            timeout: inactivity_timeout,
        }),
    }
}

// ── Engine ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum StopOn {
    Match,
    Mismatch,
}

impl StopOn {
    fn what_for(self) -> &'static str {
        match self {
            Self::Match => "command success",
            Self::Mismatch => "command failure",
        }
    }

    fn scope_label(self) -> &'static str {
        match self {
            Self::Match => "RUNCMD-DO_UNTIL_SUCCESS",
            Self::Mismatch => "RUNCMD-DO_WHILE_SUCCESS",
        }
    }
}

/// Run `command` through `runner` following `aspects.action_pattern`.
pub async fn run_with_aspects(
    runner: &dyn AttemptRunner,
    command: &str,
    expected: &ExpectedStatus,
    aspects: &CommandAspects,
) -> Result<CommandOutput, CoreError> {
    match aspects.action_pattern {
        ActionPattern::SingleCall => {
            let output = monitored_attempt(runner, "RUNCMD-SINGULAR", command, aspects).await?;
            log_result(command, &output, expected, aspects.logging_pattern);
            Ok(output)
        }
        ActionPattern::DoUntilSuccess => poll(runner, command, expected, aspects, StopOn::Match).await,
        ActionPattern::DoWhileSuccess => {
            poll(runner, command, expected, aspects, StopOn::Mismatch).await
        }
        pattern @ (ActionPattern::SingleConnectedCall | ActionPattern::DoUntilConnectionFailure) => {
            Err(CoreError::semantic(format!(
                "The {pattern} action pattern needs a persistent connection, which this agent does not hold."
            )))
        }
    }
}

async fn poll(
    runner: &dyn AttemptRunner,
    command: &str,
    expected: &ExpectedStatus,
    aspects: &CommandAspects,
    stop: StopOn,
) -> Result<CommandOutput, CoreError> {
    let mut completion = TimeoutContext::new(aspects.completion_timeout, aspects.completion_interval);
    completion.mark_begin();

    loop {
        let output = monitored_attempt(runner, stop.scope_label(), command, aspects).await?;
        let matched = expected.matches(output.status);
        log_result(command, &output, expected, aspects.logging_pattern);

        let done = match stop {
            StopOn::Match => matched,
            StopOn::Mismatch => !matched,
        };
        if done {
            return Ok(output);
        }

        if completion.is_final_attempt() {
            return Err(completion.create_timeout(
                stop.what_for(),
                command,
                &output.stdout,
                &output.stderr,
            ));
        }
        if !completion.should_continue() {
            completion.mark_final_attempt();
        }

        tokio::time::sleep(completion.interval()).await;
    }
}

async fn monitored_attempt(
    runner: &dyn AttemptRunner,
    label: &'static str,
    command: &str,
    aspects: &CommandAspects,
) -> Result<CommandOutput, CoreError> {
    let _scope = MonitoredScope::enter(label, stuck_message(command), aspects.monitor_delay);
    runner.run_attempt(command, aspects.inactivity_timeout).await
}

fn log_result(
    command: &str,
    output: &CommandOutput,
    expected: &ExpectedStatus,
    pattern: LoggingPattern,
) {
    let matched = expected.matches(output.status);
    if !pattern.should_log(matched) {
        return;
    }

    if matched {
        info!(
            command,
            status = output.status,
            stdout = %output.stdout,
            stderr = %output.stderr,
            "command result"
        );
    } else {
        warn!(
            command,
            status = output.status,
            expected = ?expected,
            stdout = %output.stdout,
            stderr = %output.stderr,
            "command result did not match expected status"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;

    /// Replays a fixed list of statuses, repeating the last one forever.
    struct ScriptedRunner {
        statuses: Vec<i32>,
        attempts: AtomicUsize,
        latency: Duration,
        seen_timeouts: Mutex<Vec<Duration>>,
    }

    impl ScriptedRunner {
        fn new(statuses: Vec<i32>) -> Self {
            Self {
                statuses,
                attempts: AtomicUsize::new(0),
                latency: Duration::ZERO,
                seen_timeouts: Mutex::new(Vec::new()),
            }
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl AttemptRunner for ScriptedRunner {
        fn run_attempt<'a>(
            &'a self,
            _command: &'a str,
            inactivity_timeout: Duration,
        ) -> BoxFuture<'a, Result<CommandOutput, CoreError>> {
            Box::pin(async move {
                let n = self.attempts.fetch_add(1, Ordering::SeqCst);
                self.seen_timeouts.lock().unwrap().push(inactivity_timeout);
                tokio::time::sleep(self.latency).await;
                let status = *self.statuses.get(n).or(self.statuses.last()).unwrap();
                Ok(CommandOutput {
                    status,
                    stdout: format!("attempt {}", n + 1),
                    stderr: format!("status {status}"),
                })
            })
        }
    }

    fn polling(pattern: ActionPattern, timeout_ms: u64, interval_ms: u64) -> CommandAspects {
        CommandAspects::default()
            .with_pattern(pattern)
            .with_completion(
                Duration::from_millis(timeout_ms),
                Duration::from_millis(interval_ms),
            )
    }

    #[tokio::test(start_paused = true)]
    async fn single_call_runs_once() {
        let runner = ScriptedRunner::new(vec![7]);
        let aspects = CommandAspects::default().with_inactivity_timeout(Duration::from_secs(9));
        let out = run_with_aspects(&runner, "probe", &ExpectedStatus::Exact(0), &aspects)
            .await
            .unwrap();

        assert_eq!(out.status, 7);
        assert_eq!(runner.attempts(), 1);
        assert_eq!(*runner.seen_timeouts.lock().unwrap(), vec![Duration::from_secs(9)]);
    }

    #[tokio::test(start_paused = true)]
    async fn do_until_success_stops_on_third_attempt() {
        let runner = ScriptedRunner::new(vec![1, 1, 0]);
        let aspects = polling(ActionPattern::DoUntilSuccess, 10_000, 100);
        let out = run_with_aspects(&runner, "flaky", &ExpectedStatus::Exact(0), &aspects)
            .await
            .unwrap();

        assert_eq!(
            out,
            CommandOutput {
                status: 0,
                stdout: "attempt 3".into(),
                stderr: "status 0".into(),
            }
        );
        assert_eq!(runner.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn do_until_success_grants_one_final_attempt() {
        let runner = ScriptedRunner::new(vec![1]);
        let aspects = polling(ActionPattern::DoUntilSuccess, 100, 30);
        let err = run_with_aspects(&runner, "never", &ExpectedStatus::Exact(0), &aspects)
            .await
            .unwrap_err();

        // Attempts at 0, 30, 60, 90 are inside the window; the one at 120
        // observes the deadline and the one at 150 is the final attempt.
        assert_eq!(runner.attempts(), 6);
        let CoreError::CommandTimeout(timeout) = err else {
            panic!("expected a command timeout, got {err:?}");
        };
        assert_eq!(timeout.what_for, "command success");
        assert_eq!(timeout.command, "never");
        assert_eq!(timeout.stdout, "attempt 6");
        assert_eq!(timeout.stderr, "status 1");
    }

    #[tokio::test(start_paused = true)]
    async fn do_until_success_accepts_any_of_statuses() {
        let runner = ScriptedRunner::new(vec![2, 5, 3]);
        let aspects = polling(ActionPattern::DoUntilSuccess, 10_000, 10);
        let out = run_with_aspects(&runner, "cmd", &vec![3, 4].into(), &aspects)
            .await
            .unwrap();
        assert_eq!(out.status, 3);
        assert_eq!(runner.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn do_while_success_stops_when_status_changes() {
        let runner = ScriptedRunner::new(vec![0, 0, 0, 1]);
        let aspects = polling(ActionPattern::DoWhileSuccess, 10_000, 50);
        let out = run_with_aspects(&runner, "ping", &ExpectedStatus::Exact(0), &aspects)
            .await
            .unwrap();
        assert_eq!(out.status, 1);
        assert_eq!(runner.attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn do_while_success_times_out_if_status_never_changes() {
        let runner = ScriptedRunner::new(vec![0]);
        let aspects = polling(ActionPattern::DoWhileSuccess, 100, 30);
        let err = run_with_aspects(&runner, "ping", &ExpectedStatus::Exact(0), &aspects)
            .await
            .unwrap_err();

        assert_eq!(runner.attempts(), 6);
        let CoreError::CommandTimeout(timeout) = err else {
            panic!("expected a command timeout, got {err:?}");
        };
        assert_eq!(timeout.what_for, "command failure");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_count_against_the_deadline() {
        let mut runner = ScriptedRunner::new(vec![1]);
        runner.latency = Duration::from_millis(60);
        let aspects = polling(ActionPattern::DoUntilSuccess, 100, 10);
        let err = run_with_aspects(&runner, "slow", &ExpectedStatus::Exact(0), &aspects)
            .await
            .unwrap_err();

        // Ends at 60 (continue), 130 (deadline seen), 200 (final).
        assert_eq!(runner.attempts(), 3);
        assert!(matches!(err, CoreError::CommandTimeout(_)));
    }

    #[tokio::test]
    async fn connected_patterns_are_unsupported() {
        let runner = ScriptedRunner::new(vec![0]);
        for pattern in [
            ActionPattern::SingleConnectedCall,
            ActionPattern::DoUntilConnectionFailure,
        ] {
            let aspects = CommandAspects::default().with_pattern(pattern);
            let err = run_with_aspects(&runner, "x", &ExpectedStatus::Exact(0), &aspects)
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::Semantic { .. }));
        }
        assert_eq!(runner.attempts(), 0);
    }

    #[tokio::test]
    async fn shell_runner_captures_status_and_output() {
        let out = ShellRunner
            .run_attempt("echo hello; echo oops >&2; exit 3", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(out.status, 3);
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.stderr, "oops\n");
    }

    #[tokio::test]
    async fn shell_runner_enforces_inactivity_timeout() {
        let err = ShellRunner
            .run_attempt("sleep 5", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InactivityTimeout { .. }));
    }

    #[tokio::test]
    async fn shell_runner_polls_a_file_until_it_appears() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ready");
        let counter = dir.path().join("count");
        let command = format!(
            "echo x >> {c}; if [ $(wc -l < {c}) -ge 3 ]; then touch {m}; fi; test -f {m}",
            c = counter.display(),
            m = marker.display()
        );

        let aspects = polling(ActionPattern::DoUntilSuccess, 10_000, 10);
        let out = run_with_aspects(&ShellRunner, &command, &ExpectedStatus::Exact(0), &aspects)
            .await
            .unwrap();

        assert_eq!(out.status, 0);
        assert!(marker.exists());
    }
}
