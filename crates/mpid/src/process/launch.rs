//! Supervises daemon launch sequencing and runtime orchestration.

use std::sync::Arc;

use tracing::{info, warn};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::dispatch::DispatchConnectionHandler;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::modules::ModulesManager;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) shutdown: S,
}

/// Runs the daemon using the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, the listener or signal handling
/// fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        shutdown: SystemShutdownSignal::new(),
    })
}

/// Runs the daemon with injected collaborators.
///
/// Blocks until the shutdown signal fires, then stops the listener and
/// every module before returning.
pub(crate) fn run_daemon_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        reporter,
        shutdown,
    } = plan;

    let daemon = bootstrap_with(&loader, reporter.as_ref())?;
    let (config, listener) = daemon.into_parts();
    let endpoint = listener.endpoint().clone();

    let manager = Arc::new(ModulesManager::with_default_modules());
    info!(
        target: PROCESS_TARGET,
        modules = ?manager.component_names().collect::<Vec<_>>(),
        "configuration modules loaded"
    );
    let handler = DispatchConnectionHandler::new(manager.clone(), config.max_request_bytes())
        .with_full_logging(config.full_logging());

    let listener_handle = match listener.start(Arc::new(handler)) {
        Ok(handle) => handle,
        Err(error) => {
            manager.shutdown();
            return Err(error.into());
        }
    };
    reporter.listener_ready(&endpoint);

    let waited = shutdown.wait();
    if let Err(error) = &waited {
        warn!(target: PROCESS_TARGET, %error, "shutdown wait failed; stopping");
    }
    reporter.shutdown_requested();

    listener_handle.shutdown();
    let joined = listener_handle.join();
    manager.shutdown();
    reporter.shutdown_completed();
    info!(target: PROCESS_TARGET, "shutdown sequence completed");

    waited?;
    joined?;
    Ok(())
}
