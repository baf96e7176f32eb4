//! Implementation of the `opgate run` command.
//!
//! Acquires the gate, runs the protected command once as a child process and
//! releases the gate when the child exits. The child's exit status becomes
//! ours. The child is supervised through [`child::ACTIVE`], so a deadline or
//! an interrupt stops its whole process group before the gate is freed.

use crate::child::{self, ChildSlot, STOP_GRACE};
use crate::cli::RunArgs;
use crate::config::Config;
use crate::error::{OpgateError, Result};
use crate::exit_codes;
use crate::identity;
use crate::locks::{HolderRegistry, ProcessLock};
use crate::policy::{
    AcquisitionPolicy, ExpiryAction, PolicySettings, stdin_operator, terminate_process,
};
use nix::sys::signal::Signal;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus};
use std::time::Duration;

/// Execute the `opgate run` command.
pub fn cmd_run(mut config: Config, args: RunArgs) -> Result<()> {
    apply_overrides(&mut config, &args);
    config.validate()?;

    let command = resolve_command(&args.command, config.command.as_deref())?;

    if let Some(group) = &config.required_group {
        identity::require_group(group)?;
    }

    let settings = PolicySettings::from(&config);
    let mut policy = AcquisitionPolicy::new(
        settings,
        ProcessLock::new(config.lock_path()),
        HolderRegistry::new(config.holder_path()),
        stdin_operator(),
    )
    .with_expiry_action(stop_child_then_exit(settings.time_limit, &child::ACTIVE));

    let dry_run = config.dry_run;
    let result = policy.run(|| {
        if dry_run {
            println!("Dry run: would run `{}`", display_command(&command));
            Ok(())
        } else {
            run_child(&command, &child::ACTIVE)
        }
    });
    tracing::debug!(state = ?policy.state(), "acquisition finished");
    result
}

/// Command-line flags take precedence over the config file.
fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(n) = args.max_attempts {
        config.max_attempts = n;
    }
    if let Some(secs) = args.retry_wait {
        config.retry_wait_secs = secs;
    }
    if let Some(secs) = args.time_limit {
        config.time_limit_secs = secs;
    }
    if args.non_interactive {
        config.interactive = false;
    }
    if args.dry_run {
        config.dry_run = true;
    }
}

/// The command from the command line, or the configured default split with
/// shell quoting rules.
fn resolve_command(from_args: &[String], from_config: Option<&str>) -> Result<Vec<String>> {
    if !from_args.is_empty() {
        return Ok(from_args.to_vec());
    }

    let Some(configured) = from_config else {
        return Err(OpgateError::UserError(
            "no command given: pass one after `--` or set `command` in the config".to_string(),
        ));
    };

    let argv = shell_words::split(configured).map_err(|e| {
        OpgateError::ConfigError(format!("failed to parse command '{}': {}", configured, e))
    })?;
    if argv.is_empty() {
        return Err(OpgateError::ConfigError("command must not be empty".to_string()));
    }
    Ok(argv)
}

fn display_command(argv: &[String]) -> String {
    shell_words::join(argv)
}

fn run_child(argv: &[String], slot: &ChildSlot) -> Result<()> {
    let (program, rest) = argv
        .split_first()
        .ok_or_else(|| OpgateError::UserError("command must not be empty".to_string()))?;

    tracing::debug!(command = %display_command(argv), "starting protected command");
    let mut command = Command::new(program);
    command.args(rest);
    let mut child = slot.spawn(command, program)?;

    let status = slot.wait(&mut child).map_err(|e| {
        OpgateError::UserError(format!("failed to wait for '{}': {}", program, e))
    })?;
    match status {
        Some(status) => check_status(argv, status),
        // Another thread is stopping the group and will exit the process.
        None => child::park_until_exit(),
    }
}

fn check_status(argv: &[String], status: ExitStatus) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    let code = match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => exit_codes::SIGNAL_BASE + signal,
        (None, None) => exit_codes::FAILURE,
    };
    Err(OpgateError::WorkFailed {
        command: display_command(argv),
        code,
    })
}

/// On deadline: stop a running command's group and wait for it, then end
/// this process.
fn stop_child_then_exit(limit: Duration, slot: &'static ChildSlot) -> ExpiryAction {
    let terminate = terminate_process(limit);
    Box::new(move || {
        slot.stop(Signal::SIGTERM, STOP_GRACE);
        terminate();
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_args_command_wins_over_config() {
        let cmd = resolve_command(&argv(&["echo", "hi"]), Some("false")).unwrap();
        assert_eq!(cmd, argv(&["echo", "hi"]));
    }

    #[test]
    fn test_config_command_is_shell_split() {
        let cmd = resolve_command(&[], Some("push-config --note 'change window 4'")).unwrap();
        assert_eq!(cmd, argv(&["push-config", "--note", "change window 4"]));
    }

    #[test]
    fn test_missing_command_is_user_error() {
        let err = resolve_command(&[], None).unwrap_err();
        assert!(matches!(err, OpgateError::UserError(_)));
    }

    #[test]
    fn test_unbalanced_quotes_are_config_error() {
        let err = resolve_command(&[], Some("echo 'oops")).unwrap_err();
        assert!(matches!(err, OpgateError::ConfigError(_)));
        assert!(matches!(
            resolve_command(&[], Some("   ")).unwrap_err(),
            OpgateError::ConfigError(_)
        ));
    }

    #[test]
    fn test_overrides_apply_on_top_of_config() {
        let mut config = Config::default();
        let args = RunArgs {
            max_attempts: Some(1),
            retry_wait: Some(0),
            time_limit: Some(30),
            non_interactive: true,
            dry_run: true,
            command: Vec::new(),
        };

        apply_overrides(&mut config, &args);

        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.retry_wait_secs, 0);
        assert_eq!(config.time_limit_secs, 30);
        assert!(!config.interactive);
        assert!(config.dry_run);
    }

    #[test]
    fn test_child_exit_code_becomes_work_failure() {
        let slot = ChildSlot::new(false);
        let err = run_child(&argv(&["sh", "-c", "exit 3"]), &slot).unwrap_err();

        assert!(matches!(err, OpgateError::WorkFailed { code: 3, .. }));
        assert_eq!(err.exit_code(), 3);
        // The slot is free again, so there is nothing left to stop.
        assert!(!slot.stop(Signal::SIGTERM, Duration::from_secs(1)));
    }

    #[test]
    fn test_child_killed_by_signal_maps_to_128_plus_signal() {
        let slot = ChildSlot::new(false);
        let err = run_child(&argv(&["sh", "-c", "kill -TERM $$"]), &slot).unwrap_err();

        assert_eq!(err.exit_code(), 143);
    }

    #[test]
    fn test_successful_child() {
        let slot = ChildSlot::new(false);
        run_child(&argv(&["true"]), &slot).unwrap();
    }

    #[test]
    fn test_missing_program_is_user_error() {
        let slot = ChildSlot::new(false);
        let err = run_child(&argv(&["opgate-no-such-program"]), &slot).unwrap_err();

        assert!(matches!(err, OpgateError::UserError(_)));
    }
}
