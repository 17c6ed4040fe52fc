//! `landscape run`: one command through the local agent.

use std::time::Duration;

use landscape_core::{
    ActionPattern, CommandAgent, CommandAspects, CommandOutput, ExpectedStatus, LocalCommandAgent,
};

use crate::cli::{GlobalOpts, PatternArg, RunArgs};
use crate::error::CliError;
use crate::output;

use super::resolve_settings;

impl From<PatternArg> for ActionPattern {
    fn from(arg: PatternArg) -> Self {
        match arg {
            PatternArg::SingleCall => Self::SingleCall,
            PatternArg::DoUntilSuccess => Self::DoUntilSuccess,
            PatternArg::DoWhileSuccess => Self::DoWhileSuccess,
            PatternArg::SingleConnectedCall => Self::SingleConnectedCall,
            PatternArg::DoUntilConnectionFailure => Self::DoUntilConnectionFailure,
        }
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration, CliError> {
    Duration::try_from_secs_f64(value).map_err(|e| CliError::Validation {
        field: field.into(),
        reason: e.to_string(),
    })
}

/// Settings defaults with the flags applied on top.
fn aspects(base: CommandAspects, args: &RunArgs) -> Result<CommandAspects, CliError> {
    let mut aspects = base;
    if let Some(pattern) = args.pattern {
        aspects.action_pattern = pattern.into();
    }
    if let Some(timeout) = args.timeout {
        aspects.completion_timeout = seconds("timeout", timeout)?;
    }
    if let Some(interval) = args.interval {
        aspects.completion_interval = seconds("interval", interval)?;
    }
    if let Some(inactivity) = args.inactivity {
        aspects.inactivity_timeout = seconds("inactivity", inactivity)?;
    }
    Ok(aspects)
}

fn expected_status(codes: &[i32]) -> ExpectedStatus {
    match codes {
        [single] => ExpectedStatus::Exact(*single),
        many => ExpectedStatus::AnyOf(many.to_vec()),
    }
}

fn detail(out: &CommandOutput) -> String {
    let mut text = out.stdout.trim_end().to_owned();
    if !out.stderr.is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(out.stderr.trim_end());
    }
    text
}

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let settings = resolve_settings(global)?;
    let aspects = aspects(CommandAspects::from(&settings.command), &args)?;
    let expected = expected_status(&args.expect);
    let command = args.command.join(" ");

    let agent = LocalCommandAgent::new(aspects.clone());
    let result = agent.run_cmd(&command, &expected, None).await?;

    let out = output::render_single(&global.output, &result, detail, |r| r.status.to_string());
    output::print_output(&out, global.quiet);

    if aspects.action_pattern == ActionPattern::SingleCall && !expected.matches(result.status) {
        return Err(CliError::CommandFailed {
            status: result.status,
            expected: args
                .expect
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn one_code_is_exact_several_are_any_of() {
        assert_eq!(expected_status(&[0]), ExpectedStatus::Exact(0));
        assert_eq!(expected_status(&[0, 3]), ExpectedStatus::AnyOf(vec![0, 3]));
    }

    #[test]
    fn negative_seconds_are_rejected() {
        assert!(seconds("timeout", -1.0).is_err());
        assert_eq!(seconds("timeout", 1.5).unwrap(), Duration::from_millis(1500));
    }
}
