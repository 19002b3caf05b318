//! Domain errors raised by command operations.
//!
//! Failures of the shell process itself are never errors: they are recorded
//! as a terminal [`CommandState`](crate::protocol::CommandState). The variants
//! here describe requests the engine or runner refuses to carry out. I/O
//! errors are wrapped in `Arc` to satisfy the `result_large_err` Clippy lint.

use std::sync::Arc;

use thiserror::Error;

/// Errors arising from command operations.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command was canceled and cannot run or be canceled again.
    #[error("command '{id}' is canceled")]
    Canceled {
        /// Command identifier.
        id: String,
    },

    /// The command already ran to completion.
    #[error("command '{id}' has already finished")]
    Finished {
        /// Command identifier.
        id: String,
    },

    /// The command is currently executing.
    #[error("command '{id}' is already running")]
    AlreadyRunning {
        /// Command identifier.
        id: String,
    },

    /// No command with this identifier is known.
    #[error("command '{id}' not found")]
    NotFound {
        /// Identifier that was looked up.
        id: String,
    },

    /// The desired-state document could not be interpreted.
    #[error("invalid command arguments: {message}")]
    InvalidArguments {
        /// Human-readable description of the problem.
        message: String,
        /// Optional underlying JSON error.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// The object name is not served by the command runner.
    #[error("unknown object '{object}'")]
    UnknownObject {
        /// Object name that was requested.
        object: String,
    },

    /// The reported status could not be serialised.
    #[error("failed to serialise command status: {0}")]
    SerializeStatus(#[source] serde_json::Error),

    /// A worker thread could not be started.
    #[error("failed to start worker for command '{id}': {source}")]
    Worker {
        /// Command identifier.
        id: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl CommandError {
    /// Builds an [`CommandError::InvalidArguments`] from a JSON failure.
    #[must_use]
    pub fn invalid_json(source: serde_json::Error) -> Self {
        Self::InvalidArguments {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Builds an [`CommandError::InvalidArguments`] with a message only.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
            source: None,
        }
    }

    /// Errno value describing the failure.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self {
            Self::Canceled { .. } => libc::ECANCELED,
            Self::Finished { .. } => libc::EALREADY,
            Self::AlreadyRunning { .. } => libc::EBUSY,
            Self::NotFound { .. } => libc::ENOENT,
            Self::InvalidArguments { .. } | Self::UnknownObject { .. } => libc::EINVAL,
            Self::SerializeStatus(_) | Self::Worker { .. } => libc::EIO,
        }
    }
}

#[cfg(test)]
mod tests;
