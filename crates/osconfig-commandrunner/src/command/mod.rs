//! Execution engine for a single command.
//!
//! A [`Command`] walks `Unknown -> Running -> terminal`. Its status, cancel
//! flag and in-flight process group share one mutex, so a cancel from the
//! server thread and completion on the executing thread converge on a single
//! terminal state. A terminal state is never overwritten by the engine.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::error::CommandError;
use crate::process::{self, ShellProcess};
use crate::protocol::{CommandArguments, CommandState, CommandStatus};

pub(crate) const COMMAND_TARGET: &str = concat!(env!("CARGO_CRATE_NAME"), "::command");

/// Delay between SIGTERM and SIGKILL when a running command is canceled.
pub const CANCEL_GRACE: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

// Bounds the wait for output held open by processes outside the group.
const OUTPUT_DRAIN_LIMIT: Duration = Duration::from_secs(1);

/// Maps an exit code to the state it denotes.
///
/// `ECANCELED` and `ETIME` are the sentinels recorded for cancellation and
/// timeouts.
#[must_use]
pub const fn state_for_exit_code(exit_code: i32) -> CommandState {
    match exit_code {
        0 => CommandState::Succeeded,
        libc::ECANCELED => CommandState::Canceled,
        libc::ETIME => CommandState::TimedOut,
        _ => CommandState::Failed,
    }
}

/// One shell command tracked from creation to its terminal state.
///
/// # Example
///
/// ```no_run
/// use osconfig_commandrunner::{Command, CommandState};
///
/// let command = Command::new("id", "echo 'test'", 0, false);
/// let status = command.execute(None).expect("not canceled");
/// assert_eq!(status.state(), CommandState::Succeeded);
/// assert_eq!(status.text_result(), "test\n");
/// ```
#[derive(Debug)]
pub struct Command {
    id: String,
    arguments: String,
    timeout_seconds: u32,
    single_line_text_result: bool,
    shared: Mutex<Shared>,
}

#[derive(Debug)]
struct Shared {
    status: CommandStatus,
    canceled: bool,
    cancel_requested: Option<Instant>,
    group: Option<Pid>,
}

enum Completion {
    Exited(i32),
    TimedOut,
    Canceled,
    Failed(i32),
}

impl Command {
    /// Creates a command in the `Unknown` state.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        arguments: impl Into<String>,
        timeout_seconds: u32,
        single_line_text_result: bool,
    ) -> Self {
        let identifier: String = id.into();
        Self {
            shared: Mutex::new(Shared {
                status: CommandStatus::new(identifier.clone(), 0, "", CommandState::Unknown),
                canceled: false,
                cancel_requested: None,
                group: None,
            }),
            id: identifier,
            arguments: arguments.into(),
            timeout_seconds,
            single_line_text_result,
        }
    }

    /// Creates a command from a desired-state document.
    #[must_use]
    pub fn from_arguments(arguments: &CommandArguments) -> Self {
        Self::new(
            arguments.id(),
            arguments.arguments(),
            arguments.timeout_seconds(),
            arguments.single_line_text_result(),
        )
    }

    /// Command identifier.
    #[must_use]
    pub const fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Shell text executed by [`Command::execute`].
    #[must_use]
    pub const fn arguments(&self) -> &str {
        self.arguments.as_str()
    }

    /// Snapshot of the current status.
    #[must_use]
    pub fn status(&self) -> CommandStatus {
        self.lock().status.clone()
    }

    /// Whether [`Command::cancel`] has succeeded for this command.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.lock().canceled
    }

    /// Runs the command to completion and returns its final status.
    ///
    /// A non-zero `timeout_override` replaces the command's own timeout; a
    /// resulting timeout of zero means no limit. Process failures are
    /// reported through the returned status, never as errors.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Canceled`] when the command was canceled
    /// before it started, or [`CommandError::AlreadyRunning`] when another
    /// thread is executing it.
    pub fn execute(&self, timeout_override: Option<u32>) -> Result<CommandStatus, CommandError> {
        self.begin()?;

        let timeout = self.effective_timeout(timeout_override);
        debug!(
            target: COMMAND_TARGET,
            command = %self.id,
            timeout_secs = timeout.map_or(0, |limit| limit.as_secs()),
            "starting command"
        );

        let mut shell = match ShellProcess::spawn(&self.arguments) {
            Ok(shell) => shell,
            Err(error) => {
                warn!(
                    target: COMMAND_TARGET,
                    command = %self.id,
                    %error,
                    "failed to start command"
                );
                let code = error.raw_os_error().unwrap_or(libc::EXIT_FAILURE);
                return Ok(self.complete(Completion::Failed(code), String::new()));
            }
        };
        self.register(shell.group());

        let completion = self.wait(&mut shell, timeout);
        if let Err(errno) = shell.reap_group() {
            warn!(
                target: COMMAND_TARGET,
                command = %self.id,
                %errno,
                "failed to kill leftover command processes"
            );
        }
        let drained = shell.finish(Instant::now() + OUTPUT_DRAIN_LIMIT);
        if let Some(error) = &drained.error {
            warn!(
                target: COMMAND_TARGET,
                command = %self.id,
                %error,
                "command output may be incomplete"
            );
        }
        let text = String::from_utf8_lossy(&drained.bytes).into_owned();
        Ok(self.complete(completion, text))
    }

    /// Cancels the command, terminating its process group if it is running.
    ///
    /// The status becomes `Canceled` with exit code `ECANCELED` immediately.
    /// The executing thread escalates to SIGKILL after [`CANCEL_GRACE`].
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Canceled`] on a second cancel, and
    /// [`CommandError::Finished`] once the command reached another terminal
    /// state.
    pub fn cancel(&self) -> Result<(), CommandError> {
        let mut shared = self.lock();
        if shared.canceled {
            return Err(CommandError::Canceled {
                id: self.id.clone(),
            });
        }
        if shared.status.state().is_terminal() {
            return Err(CommandError::Finished {
                id: self.id.clone(),
            });
        }

        shared.canceled = true;
        shared.cancel_requested = Some(Instant::now());
        shared
            .status
            .set_outcome(libc::ECANCELED, CommandState::Canceled);
        if let Some(group) = shared.group {
            self.terminate(group);
        }
        info!(target: COMMAND_TARGET, command = %self.id, "command canceled");
        Ok(())
    }

    /// Records an externally observed completion.
    ///
    /// The state follows [`state_for_exit_code`].
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Canceled`] for a canceled command and
    /// [`CommandError::Finished`] once another terminal state is recorded;
    /// the existing status is kept in both cases.
    pub fn set_status(
        &self,
        exit_code: i32,
        text_result: impl Into<String>,
    ) -> Result<(), CommandError> {
        let mut shared = self.lock();
        if shared.canceled {
            return Err(CommandError::Canceled {
                id: self.id.clone(),
            });
        }
        if shared.status.state().is_terminal() {
            return Err(CommandError::Finished {
                id: self.id.clone(),
            });
        }
        shared
            .status
            .set_outcome(exit_code, state_for_exit_code(exit_code));
        shared.status.set_text_result(text_result.into());
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> Result<(), CommandError> {
        let mut shared = self.lock();
        if shared.canceled {
            return Err(CommandError::Canceled {
                id: self.id.clone(),
            });
        }
        if shared.status.state() == CommandState::Running {
            return Err(CommandError::AlreadyRunning {
                id: self.id.clone(),
            });
        }
        shared.status.set_outcome(0, CommandState::Running);
        shared.status.set_text_result(String::new());
        Ok(())
    }

    fn effective_timeout(&self, timeout_override: Option<u32>) -> Option<Duration> {
        let seconds = timeout_override
            .filter(|seconds| *seconds > 0)
            .unwrap_or(self.timeout_seconds);
        (seconds > 0).then(|| Duration::from_secs(u64::from(seconds)))
    }

    // A cancel that raced the spawn still has to reach the new group.
    fn register(&self, group: Pid) {
        let mut shared = self.lock();
        shared.group = Some(group);
        if shared.canceled {
            self.terminate(group);
        }
    }

    fn terminate(&self, group: Pid) {
        if let Err(errno) = process::signal_group(group, Signal::SIGTERM) {
            warn!(
                target: COMMAND_TARGET,
                command = %self.id,
                %errno,
                "failed to signal command process group"
            );
        }
    }

    fn cancel_grace_elapsed(&self) -> bool {
        self.lock()
            .cancel_requested
            .is_some_and(|requested| requested.elapsed() >= CANCEL_GRACE)
    }

    fn wait(&self, shell: &mut ShellProcess, timeout: Option<Duration>) -> Completion {
        let start = Instant::now();
        loop {
            match shell.try_wait() {
                Ok(Some(status)) => return Completion::Exited(process::exit_code(status)),
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        target: COMMAND_TARGET,
                        command = %self.id,
                        %error,
                        "failed to poll command process"
                    );
                    self.kill(shell);
                    return Completion::Failed(error.raw_os_error().unwrap_or(libc::EXIT_FAILURE));
                }
            }

            if timeout.is_some_and(|limit| start.elapsed() >= limit) {
                warn!(
                    target: COMMAND_TARGET,
                    command = %self.id,
                    "command timed out, killing process group"
                );
                self.kill(shell);
                return Completion::TimedOut;
            }

            if self.cancel_grace_elapsed() {
                warn!(
                    target: COMMAND_TARGET,
                    command = %self.id,
                    "canceled command ignored SIGTERM, killing process group"
                );
                self.kill(shell);
                return Completion::Canceled;
            }

            thread::sleep(POLL_INTERVAL);
        }
    }

    fn kill(&self, shell: &mut ShellProcess) {
        if let Err(error) = shell.kill() {
            warn!(
                target: COMMAND_TARGET,
                command = %self.id,
                %error,
                "failed to kill command process group"
            );
        }
    }

    fn complete(&self, completion: Completion, output: String) -> CommandStatus {
        let text = if self.single_line_text_result {
            output.lines().next().unwrap_or_default().to_owned()
        } else {
            output
        };

        let mut shared = self.lock();
        shared.group = None;
        if !shared.status.state().is_terminal() {
            let (exit_code, state) = match completion {
                Completion::Exited(code) => (code, state_for_exit_code(code)),
                Completion::TimedOut => (libc::ETIME, CommandState::TimedOut),
                Completion::Canceled => (libc::ECANCELED, CommandState::Canceled),
                Completion::Failed(code) => (code, CommandState::Failed),
            };
            shared.status.set_outcome(exit_code, state);
        }
        shared.status.set_text_result(text);

        let status = shared.status.clone();
        drop(shared);
        debug!(
            target: COMMAND_TARGET,
            command = %self.id,
            exit_code = status.exit_code(),
            state = ?status.state(),
            "command finished"
        );
        status
    }
}
