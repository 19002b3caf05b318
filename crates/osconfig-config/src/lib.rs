//! Shared configuration for the OSConfig management platform daemon.
//!
//! [`Config`] is layered by `ortho_config`: built-in defaults, then an
//! optional configuration file (`--config-path` or `OSCONFIG_CONFIG_PATH`),
//! then `OSCONFIG_*` environment variables, then command-line flags.

mod defaults;
mod socket;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use defaults::{
    DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_LOG_FILTER, DEFAULT_MAX_REQUEST_BYTES,
    DEFAULT_SOCKET_PATH, default_log_filter, default_log_format, default_socket_endpoint,
};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "OSCONFIG")]
pub struct Config {
    /// Unix socket the MPI server listens on.
    #[ortho_config(default = defaults::default_socket_endpoint())]
    pub daemon_socket: SocketEndpoint,
    /// `tracing` filter directive applied to daemon logs.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format for daemon logs.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Emits an info record for every request, session and response.
    #[ortho_config(default = false)]
    pub full_logging: bool,
    /// Read and write timeout applied to each accepted connection.
    #[ortho_config(default = DEFAULT_CONNECTION_TIMEOUT_SECS)]
    pub connection_timeout_secs: u64,
    /// Largest request body the server accepts.
    #[ortho_config(default = DEFAULT_MAX_REQUEST_BYTES)]
    pub max_request_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: default_socket_endpoint(),
            log_filter: defaults::default_log_filter_string(),
            log_format: default_log_format(),
            full_logging: false,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

impl Config {
    /// Socket endpoint served by the daemon.
    #[must_use]
    pub fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Whether verbose per-request logging is enabled.
    #[must_use]
    pub fn full_logging(&self) -> bool {
        self.full_logging
    }

    /// Per-connection IO timeout as a [`std::time::Duration`].
    ///
    /// A zero value disables the timeout.
    #[must_use]
    pub fn connection_timeout(&self) -> Option<std::time::Duration> {
        (self.connection_timeout_secs > 0)
            .then(|| std::time::Duration::from_secs(self.connection_timeout_secs))
    }

    /// Maximum accepted request body size in bytes.
    #[must_use]
    pub fn max_request_bytes(&self) -> usize {
        self.max_request_bytes
    }
}
