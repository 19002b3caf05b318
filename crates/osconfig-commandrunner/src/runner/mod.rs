//! The `CommandRunner` configuration module.
//!
//! Clients write [`CommandArguments`] to the `commandArguments` object and
//! read the selected command's [`CommandStatus`] from `commandStatus`. Each
//! started command runs on its own worker thread; the runner keeps a bounded
//! history of finished commands so status survives until it is read.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::command::Command;
use crate::error::CommandError;
use crate::protocol::{CommandAction, CommandArguments, CommandStatus};

const RUNNER_TARGET: &str = concat!(env!("CARGO_CRATE_NAME"), "::runner");

/// Component name the runner is addressed by.
pub const COMPONENT_NAME: &str = "CommandRunner";

/// Desired-state object accepting [`CommandArguments`].
pub const DESIRED_OBJECT: &str = "commandArguments";

/// Reported-state object producing [`CommandStatus`].
pub const REPORTED_OBJECT: &str = "commandStatus";

/// Commands retained before finished entries are evicted, oldest first.
pub const MAX_COMMANDS: usize = 64;

/// Executes and tracks commands on behalf of management clients.
///
/// # Example
///
/// ```
/// use osconfig_commandrunner::{CommandRunner, DESIRED_OBJECT, REPORTED_OBJECT};
///
/// let runner = CommandRunner::new();
/// runner
///     .set(DESIRED_OBJECT, r#"{"CommandId":"boot","Action":1}"#)
///     .expect("reboot requests are recorded");
/// let reported = runner.get(REPORTED_OBJECT, 0).expect("status");
/// assert!(reported.contains(r#""CommandId":"boot""#));
/// ```
#[derive(Debug, Default)]
pub struct CommandRunner {
    table: Mutex<CommandTable>,
}

#[derive(Debug, Default)]
struct CommandTable {
    commands: VecDeque<Arc<Command>>,
    reported: Option<String>,
    workers: Vec<JoinHandle<()>>,
}

impl CommandTable {
    fn find(&self, id: &str) -> Option<&Arc<Command>> {
        self.commands.iter().find(|command| command.id() == id)
    }

    fn insert(&mut self, command: Arc<Command>) {
        self.commands.push_back(command);
        while self.commands.len() > MAX_COMMANDS {
            let reported = self.reported.as_deref();
            let Some(position) = self.commands.iter().position(|candidate| {
                candidate.status().state().is_terminal() && Some(candidate.id()) != reported
            }) else {
                break;
            };
            if let Some(evicted) = self.commands.remove(position) {
                debug!(
                    target: RUNNER_TARGET,
                    command = evicted.id(),
                    "evicted finished command"
                );
            }
        }
    }
}

impl CommandRunner {
    /// Creates a runner with no commands.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a desired-state payload to `object_name`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::UnknownObject`] for objects other than
    /// [`DESIRED_OBJECT`], [`CommandError::InvalidArguments`] for payloads
    /// that do not describe a command, and the errors of
    /// [`CommandRunner::apply`].
    pub fn set(&self, object_name: &str, payload: &str) -> Result<(), CommandError> {
        if object_name != DESIRED_OBJECT {
            return Err(CommandError::UnknownObject {
                object: object_name.to_owned(),
            });
        }
        let arguments: CommandArguments =
            serde_json::from_str(payload).map_err(CommandError::invalid_json)?;
        self.apply(arguments)
    }

    /// Reads the reported status object.
    ///
    /// A non-zero `max_payload_size_bytes` truncates `TextResult` until the
    /// serialised status fits.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::UnknownObject`] for objects other than
    /// [`REPORTED_OBJECT`] and [`CommandError::SerializeStatus`] if the
    /// status cannot be encoded.
    pub fn get(&self, object_name: &str, max_payload_size_bytes: usize) -> Result<String, CommandError> {
        if object_name != REPORTED_OBJECT {
            return Err(CommandError::UnknownObject {
                object: object_name.to_owned(),
            });
        }
        fit_to_payload(self.reported_status(), max_payload_size_bytes)
    }

    /// Carries out the action named by `arguments`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::InvalidArguments`] for an empty identifier,
    /// [`CommandError::Canceled`] when re-running a canceled command,
    /// [`CommandError::NotFound`] when canceling or refreshing an unknown
    /// command, and [`CommandError::Worker`] when no thread can be started.
    pub fn apply(&self, arguments: CommandArguments) -> Result<(), CommandError> {
        if arguments.id().is_empty() {
            return Err(CommandError::invalid("CommandId must not be empty"));
        }

        match arguments.action() {
            CommandAction::RunCommand => self.run(&arguments),
            CommandAction::CancelCommand => self.cancel(arguments.id()),
            CommandAction::RefreshCommandStatus => self.refresh(arguments.id()),
            CommandAction::None | CommandAction::Reboot | CommandAction::Shutdown => {
                self.record(&arguments)
            }
        }
    }

    /// Status of the command with `id`, if it is still tracked.
    #[must_use]
    pub fn status(&self, id: &str) -> Option<CommandStatus> {
        self.lock().find(id).map(|command| command.status())
    }

    /// Status of the command currently selected for reporting.
    ///
    /// Falls back to an empty `Unknown` status when nothing has run yet.
    #[must_use]
    pub fn reported_status(&self) -> CommandStatus {
        let table = self.lock();
        table
            .reported
            .as_deref()
            .and_then(|id| table.find(id))
            .map(|command| command.status())
            .unwrap_or_default()
    }

    /// Number of commands currently tracked.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.lock().commands.len()
    }

    /// Cancels every unfinished command and joins the worker threads.
    pub fn shutdown(&self) {
        let (commands, workers) = {
            let mut table = self.lock();
            (
                table.commands.iter().cloned().collect::<Vec<_>>(),
                std::mem::take(&mut table.workers),
            )
        };

        for command in commands {
            if !command.status().state().is_terminal() && command.cancel().is_ok() {
                info!(
                    target: RUNNER_TARGET,
                    command = command.id(),
                    "canceled command at shutdown"
                );
            }
        }
        for worker in workers {
            if worker.join().is_err() {
                warn!(target: RUNNER_TARGET, "command worker panicked");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, CommandTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, arguments: &CommandArguments) -> Result<(), CommandError> {
        let mut table = self.lock();
        if let Some(existing) = table.find(arguments.id()) {
            if existing.is_canceled() {
                return Err(CommandError::Canceled {
                    id: arguments.id().to_owned(),
                });
            }
            debug!(
                target: RUNNER_TARGET,
                command = arguments.id(),
                "command already known, ignoring duplicate request"
            );
            table.reported = Some(arguments.id().to_owned());
            return Ok(());
        }

        let command = Arc::new(Command::from_arguments(arguments));
        let worker = Arc::clone(&command);
        let handle = thread::Builder::new()
            .name(String::from("command-worker"))
            .spawn(move || execute_on_worker(&worker))
            .map_err(|error| CommandError::Worker {
                id: arguments.id().to_owned(),
                source: Arc::new(error),
            })?;

        info!(
            target: RUNNER_TARGET,
            command = arguments.id(),
            "command started"
        );
        table.workers.retain(|existing| !existing.is_finished());
        table.workers.push(handle);
        table.insert(command);
        table.reported = Some(arguments.id().to_owned());
        Ok(())
    }

    fn cancel(&self, id: &str) -> Result<(), CommandError> {
        let mut table = self.lock();
        let command = table
            .find(id)
            .cloned()
            .ok_or_else(|| CommandError::NotFound { id: id.to_owned() })?;
        table.reported = Some(id.to_owned());
        drop(table);

        match command.cancel() {
            Ok(()) => Ok(()),
            Err(CommandError::Canceled { .. } | CommandError::Finished { .. }) => {
                debug!(
                    target: RUNNER_TARGET,
                    command = id,
                    "command already finished, nothing to cancel"
                );
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    fn refresh(&self, id: &str) -> Result<(), CommandError> {
        let mut table = self.lock();
        if table.find(id).is_none() {
            return Err(CommandError::NotFound { id: id.to_owned() });
        }
        table.reported = Some(id.to_owned());
        Ok(())
    }

    // Power control belongs to the platform; the request is acknowledged only.
    fn record(&self, arguments: &CommandArguments) -> Result<(), CommandError> {
        let mut table = self.lock();
        if let Some(existing) = table.find(arguments.id()) {
            if existing.is_canceled() {
                return Err(CommandError::Canceled {
                    id: arguments.id().to_owned(),
                });
            }
        } else {
            let command = Command::from_arguments(arguments);
            command.set_status(libc::EXIT_SUCCESS, String::new())?;
            info!(
                target: RUNNER_TARGET,
                command = arguments.id(),
                action = ?arguments.action(),
                "recorded command without execution"
            );
            table.insert(Arc::new(command));
        }
        table.reported = Some(arguments.id().to_owned());
        Ok(())
    }
}

fn execute_on_worker(command: &Command) {
    match command.execute(None) {
        Ok(status) => info!(
            target: RUNNER_TARGET,
            command = command.id(),
            exit_code = status.exit_code(),
            state = ?status.state(),
            "command completed"
        ),
        Err(error) => debug!(
            target: RUNNER_TARGET,
            command = command.id(),
            %error,
            "command did not run"
        ),
    }
}

/// Serialises `status`, shortening `TextResult` to fit `max_bytes`.
///
/// Zero means unlimited. When even an empty `TextResult` does not fit, the
/// field is omitted.
fn fit_to_payload(mut status: CommandStatus, max_bytes: usize) -> Result<String, CommandError> {
    let mut json = status.to_json(true).map_err(CommandError::SerializeStatus)?;
    if max_bytes == 0 {
        return Ok(json);
    }

    let mut text = status.text_result().to_owned();
    while json.len() > max_bytes {
        if text.is_empty() {
            return status.to_json(false).map_err(CommandError::SerializeStatus);
        }
        let excess = json.len().saturating_sub(max_bytes);
        let mut cut = text.len().saturating_sub(excess);
        while !text.is_char_boundary(cut) {
            cut = cut.saturating_sub(1);
        }
        text.truncate(cut);
        status.set_text_result(text.clone());
        json = status.to_json(true).map_err(CommandError::SerializeStatus)?;
    }
    Ok(json)
}
