//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use osconfig_config::Config;
use thiserror::Error;

use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{ListenerError, SocketListener};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The MPI socket could not be bound.
    #[error("failed to bind MPI socket: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
}

/// Result of a successful bootstrap: configuration, telemetry and a bound
/// socket that is not yet accepting.
#[derive(Debug)]
pub struct Daemon {
    config: Config,
    telemetry: TelemetryHandle,
    listener: SocketListener,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Bound listener, ready to start.
    #[must_use]
    pub const fn listener(&self) -> &SocketListener {
        &self.listener
    }

    /// Splits the daemon into its configuration and listener.
    #[must_use]
    pub fn into_parts(self) -> (Config, SocketListener) {
        (self.config, self.listener)
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration, telemetry or the socket
/// bind fails. Each failure is also passed to the reporter.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: &dyn HealthReporter,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();
    let result = load_and_bind(loader);
    match &result {
        Ok(daemon) => reporter.bootstrap_succeeded(&daemon.config),
        Err(error) => reporter.bootstrap_failed(error),
    }
    result
}

fn load_and_bind(loader: &dyn ConfigLoader) -> Result<Daemon, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    let listener = SocketListener::bind(config.daemon_socket())
        .map_err(|source| BootstrapError::Listener { source })?
        .with_connection_timeout(config.connection_timeout());
    Ok(Daemon {
        config,
        telemetry,
        listener,
    })
}
