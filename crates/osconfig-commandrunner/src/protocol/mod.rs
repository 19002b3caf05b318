//! Wire types exchanged with management clients.
//!
//! Desired state arrives as [`CommandArguments`] and reported state leaves as
//! [`CommandStatus`]. Both use `PascalCase` keys, and the enumerations travel
//! as integer ordinals.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Action requested by a [`CommandArguments`] document.
///
/// # Example
///
/// ```
/// use osconfig_commandrunner::protocol::CommandAction;
///
/// assert_eq!(CommandAction::try_from(3), Ok(CommandAction::RunCommand));
/// assert_eq!(u8::from(CommandAction::CancelCommand), 5);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CommandAction {
    /// Nothing to execute.
    #[default]
    None,
    /// Device reboot request.
    Reboot,
    /// Device shutdown request.
    Shutdown,
    /// Run the shell text in `Arguments`.
    RunCommand,
    /// Select the command whose status is reported.
    RefreshCommandStatus,
    /// Cancel a previously started command.
    CancelCommand,
}

impl CommandAction {
    /// Whether the action spawns a process.
    #[must_use]
    pub const fn executes(self) -> bool {
        matches!(self, Self::RunCommand)
    }
}

impl From<CommandAction> for u8 {
    fn from(action: CommandAction) -> Self {
        match action {
            CommandAction::None => 0,
            CommandAction::Reboot => 1,
            CommandAction::Shutdown => 2,
            CommandAction::RunCommand => 3,
            CommandAction::RefreshCommandStatus => 4,
            CommandAction::CancelCommand => 5,
        }
    }
}

impl TryFrom<u8> for CommandAction {
    type Error = OrdinalError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Reboot),
            2 => Ok(Self::Shutdown),
            3 => Ok(Self::RunCommand),
            4 => Ok(Self::RefreshCommandStatus),
            5 => Ok(Self::CancelCommand),
            other => Err(OrdinalError {
                kind: "Action",
                value: other,
            }),
        }
    }
}

/// Lifecycle state of a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CommandState {
    /// Created but not started.
    #[default]
    Unknown,
    /// Process in flight.
    Running,
    /// Exited with status zero.
    Succeeded,
    /// Exited with a non-zero status or could not be started.
    Failed,
    /// Killed after exceeding its timeout.
    TimedOut,
    /// Canceled by a client.
    Canceled,
}

impl CommandState {
    /// Whether the state ends the command's lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Unknown | Self::Running)
    }
}

impl From<CommandState> for u8 {
    fn from(state: CommandState) -> Self {
        match state {
            CommandState::Unknown => 0,
            CommandState::Running => 1,
            CommandState::Succeeded => 2,
            CommandState::Failed => 3,
            CommandState::TimedOut => 4,
            CommandState::Canceled => 5,
        }
    }
}

impl TryFrom<u8> for CommandState {
    type Error = OrdinalError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Running),
            2 => Ok(Self::Succeeded),
            3 => Ok(Self::Failed),
            4 => Ok(Self::TimedOut),
            5 => Ok(Self::Canceled),
            other => Err(OrdinalError {
                kind: "CurrentState",
                value: other,
            }),
        }
    }
}

/// An integer did not name a known enumeration member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{value} is not a valid {kind} value")]
pub struct OrdinalError {
    kind: &'static str,
    value: u8,
}

/// Desired-state document describing one command request.
///
/// Only `CommandId` is required; the remaining fields default.
///
/// # Example
///
/// ```
/// use osconfig_commandrunner::protocol::{CommandAction, CommandArguments};
///
/// let arguments: CommandArguments =
///     serde_json::from_str(r#"{"CommandId":"id","Action":3,"Arguments":"uptime"}"#)
///         .expect("valid arguments");
/// assert_eq!(arguments.action(), CommandAction::RunCommand);
/// assert_eq!(arguments.timeout_seconds(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommandArguments {
    #[serde(rename = "CommandId")]
    id: String,
    #[serde(default)]
    arguments: String,
    #[serde(default)]
    action: CommandAction,
    #[serde(rename = "Timeout", default)]
    timeout_seconds: u32,
    #[serde(default)]
    single_line_text_result: bool,
}

impl CommandArguments {
    /// Builds arguments for the given action.
    #[must_use]
    pub fn new(id: impl Into<String>, arguments: impl Into<String>, action: CommandAction) -> Self {
        Self {
            id: id.into(),
            arguments: arguments.into(),
            action,
            timeout_seconds: 0,
            single_line_text_result: false,
        }
    }

    /// Sets the execution timeout in seconds; zero disables it.
    #[must_use]
    pub const fn with_timeout(mut self, timeout_seconds: u32) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Requests that only the first output line is kept.
    #[must_use]
    pub const fn with_single_line_text_result(mut self, single_line: bool) -> Self {
        self.single_line_text_result = single_line;
        self
    }

    /// Client-chosen command identifier.
    #[must_use]
    pub const fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Shell text to execute.
    #[must_use]
    pub const fn arguments(&self) -> &str {
        self.arguments.as_str()
    }

    /// Requested action.
    #[must_use]
    pub const fn action(&self) -> CommandAction {
        self.action
    }

    /// Execution timeout in seconds.
    #[must_use]
    pub const fn timeout_seconds(&self) -> u32 {
        self.timeout_seconds
    }

    /// Whether only the first line of output is retained.
    #[must_use]
    pub const fn single_line_text_result(&self) -> bool {
        self.single_line_text_result
    }
}

/// Reported-state snapshot of a command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommandStatus {
    #[serde(rename = "CommandId")]
    id: String,
    #[serde(rename = "ResultCode")]
    exit_code: i32,
    #[serde(default)]
    text_result: String,
    #[serde(rename = "CurrentState")]
    state: CommandState,
}

/// Borrowed view used to omit `TextResult` on request.
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StatusView<'a> {
    command_id: &'a str,
    result_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_result: Option<&'a str>,
    current_state: CommandState,
}

impl CommandStatus {
    /// Builds a status snapshot.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        exit_code: i32,
        text_result: impl Into<String>,
        state: CommandState,
    ) -> Self {
        Self {
            id: id.into(),
            exit_code,
            text_result: text_result.into(),
            state,
        }
    }

    /// Identifier of the command.
    #[must_use]
    pub const fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Process exit code, or the errno sentinel for timeouts and cancellation.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Captured output.
    #[must_use]
    pub const fn text_result(&self) -> &str {
        self.text_result.as_str()
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> CommandState {
        self.state
    }

    pub(crate) fn set_text_result(&mut self, text_result: String) {
        self.text_result = text_result;
    }

    pub(crate) const fn set_outcome(&mut self, exit_code: i32, state: CommandState) {
        self.exit_code = exit_code;
        self.state = state;
    }

    /// Serialises the status, optionally omitting `TextResult`.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] if serialisation fails.
    ///
    /// # Example
    ///
    /// ```
    /// use osconfig_commandrunner::protocol::{CommandState, CommandStatus};
    ///
    /// let status = CommandStatus::new("id", 0, "ok", CommandState::Succeeded);
    /// assert_eq!(
    ///     status.to_json(false).expect("serialise"),
    ///     r#"{"CommandId":"id","ResultCode":0,"CurrentState":2}"#
    /// );
    /// ```
    pub fn to_json(&self, include_text_result: bool) -> Result<String, serde_json::Error> {
        serde_json::to_string(&StatusView {
            command_id: &self.id,
            result_code: self.exit_code,
            text_result: include_text_result.then_some(self.text_result.as_str()),
            current_state: self.state,
        })
    }
}
