//! Remote command execution for the OSConfig management platform.
//!
//! A management client submits a [`CommandArguments`] document naming a
//! command identifier, an action and, for `RunCommand`, shell text. The
//! [`CommandRunner`] turns it into a [`Command`], runs it on a worker thread
//! and exposes the latest [`CommandStatus`] for the client to read back.
//!
//! # Architecture
//!
//! - [`protocol`] holds the wire documents and their integer enumerations.
//! - [`command`] is the per-command state machine: spawn, wait, time out,
//!   cancel.
//! - [`runner`] implements the `CommandRunner` component on top of it.
//!
//! Each command runs under `/bin/sh -c` as the leader of a fresh process
//! group with standard output and standard error joined. Timeouts kill the
//! group and record `ETIME`; cancellation records `ECANCELED` and sends
//! SIGTERM, then SIGKILL after [`CANCEL_GRACE`].

pub mod command;
pub mod error;
mod process;
pub mod protocol;
pub mod runner;

pub use self::command::{CANCEL_GRACE, Command, state_for_exit_code};
pub use self::error::CommandError;
pub use self::protocol::{CommandAction, CommandArguments, CommandState, CommandStatus};
pub use self::runner::{
    COMPONENT_NAME, CommandRunner, DESIRED_OBJECT, MAX_COMMANDS, REPORTED_OBJECT,
};
