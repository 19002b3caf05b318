//! Error types for socket listener operations.

use std::io;

use osconfig_config::SocketPreparationError;
use thiserror::Error;

/// Errors surfaced while binding or running the socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error(transparent)]
    Prepare(#[from] SocketPreparationError),
    #[error("failed to bind unix listener at {path}: {source}")]
    BindUnix {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("existing unix socket {path} is already in use")]
    UnixInUse { path: String },
    #[error("failed to read metadata for unix socket {path}: {source}")]
    UnixMetadata {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to connect to existing unix socket {path}: {source}")]
    UnixConnect {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove stale unix socket {path}: {source}")]
    UnixCleanup {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to restrict permissions of unix socket {path}: {source}")]
    UnixPermissions {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to move unix socket into place at {path}: {source}")]
    UnixPublish {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to start listener thread: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },
    #[error("listener thread panicked")]
    ThreadPanic,
}
