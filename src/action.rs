//! Turning recognitions into actions.
//!
//! Every model item carries a command. The built-in stop command ends the
//! listening session; anything else is handed to a shell through a
//! [`CommandExecutor`], which tests replace with a recording mock.

use crate::defaults;
use crate::error::{Result, VoicectlError};
use crate::pipeline::Recognition;
use std::process::Command;
use tracing::{debug, info};

/// Trait for running item commands.
///
/// Object-safe, Send + Sync so it can be shared with other threads.
pub trait CommandExecutor: Send + Sync {
    /// Run `command` to completion.
    fn execute(&self, command: &str) -> Result<()>;
}

/// Runs commands through `sh -c`, the way they were written in the model.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for ShellExecutor {
    fn execute(&self, command: &str) -> Result<()> {
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()
            .map_err(|e| VoicectlError::CommandFailed {
                command: command.to_string(),
                message: format!("failed to spawn shell: {e}"),
            })?;

        if !status.success() {
            return Err(VoicectlError::CommandFailed {
                command: command.to_string(),
                message: status.to_string(),
            });
        }
        Ok(())
    }
}

/// What a recognized item asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run a shell command.
    Run(String),
    /// Stop listening and exit.
    Stop,
    /// The item has no command.
    Nothing,
}

impl Action {
    pub fn for_command(command: &str) -> Self {
        match command.trim() {
            "" => Action::Nothing,
            defaults::STOP_COMMAND | defaults::LEGACY_STOP_COMMAND => Action::Stop,
            other => Action::Run(other.to_string()),
        }
    }
}

/// Maps recognitions to actions and carries them out.
pub struct ActionRunner<E: CommandExecutor> {
    executor: E,
    dry_run: bool,
}

impl<E: CommandExecutor> ActionRunner<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            dry_run: false,
        }
    }

    /// Log commands instead of running them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Carry out the action for `recognition` and return it.
    ///
    /// [`Action::Stop`] is only returned; ending the session is up to the
    /// caller.
    pub fn handle(&self, recognition: &Recognition) -> Result<Action> {
        let action = Action::for_command(&recognition.command);
        match &action {
            Action::Run(command) if self.dry_run => {
                info!(label = %recognition.label, %command, "dry run, not executing");
            }
            Action::Run(command) => {
                debug!(label = %recognition.label, %command, "executing");
                self.executor.execute(command)?;
            }
            Action::Stop => info!(label = %recognition.label, "stop command recognized"),
            Action::Nothing => debug!(label = %recognition.label, "item has no command"),
        }
        Ok(action)
    }
}

impl ActionRunner<ShellExecutor> {
    /// Runner executing through `sh -c`.
    pub fn shell() -> Self {
        Self::new(ShellExecutor::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Executor that records commands and optionally fails.
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl CommandExecutor for RecordingExecutor {
        fn execute(&self, command: &str) -> Result<()> {
            self.calls.lock().push(command.to_string());
            if self.fail {
                return Err(VoicectlError::CommandFailed {
                    command: command.to_string(),
                    message: "exit status: 1".to_string(),
                });
            }
            Ok(())
        }
    }

    fn recognition(command: &str) -> Recognition {
        Recognition {
            item: 0,
            label: "word".to_string(),
            command: command.to_string(),
            score: 1.0,
        }
    }

    #[test]
    fn test_action_for_command() {
        assert_eq!(Action::for_command("xterm &"), Action::Run("xterm &".to_string()));
        assert_eq!(Action::for_command(" voicectl_off "), Action::Stop);
        assert_eq!(Action::for_command("cvoicecontrol_off"), Action::Stop);
        assert_eq!(Action::for_command("   "), Action::Nothing);
    }

    #[test]
    fn test_runner_executes_command() {
        let runner = ActionRunner::new(RecordingExecutor::default());
        let action = runner.handle(&recognition("echo hi")).unwrap();
        assert_eq!(action, Action::Run("echo hi".to_string()));
        assert_eq!(*runner.executor.calls.lock(), vec!["echo hi".to_string()]);
    }

    #[test]
    fn test_dry_run_and_stop_do_not_execute() {
        let runner = ActionRunner::new(RecordingExecutor::default()).with_dry_run(true);
        runner.handle(&recognition("rm -rf /tmp/x")).unwrap();
        assert_eq!(runner.handle(&recognition("voicectl_off")).unwrap(), Action::Stop);
        assert!(runner.executor.calls.lock().is_empty());
    }

    #[test]
    fn test_command_failure_is_returned() {
        let runner = ActionRunner::new(RecordingExecutor {
            fail: true,
            ..Default::default()
        });
        let err = runner.handle(&recognition("false")).unwrap_err();
        assert!(matches!(err, VoicectlError::CommandFailed { .. }));
    }

    #[test]
    fn test_shell_executor_reports_exit_status() {
        let shell = ShellExecutor::new();
        assert!(shell.execute("true").is_ok());
        let err = shell.execute("exit 3").unwrap_err();
        assert!(err.to_string().contains("exit 3"), "{err}");
    }
}
