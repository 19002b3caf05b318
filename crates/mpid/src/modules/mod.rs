//! Configuration modules served over MPI.
//!
//! The [`ModulesManager`] owns the open sessions and the registered
//! [`ConfigModule`]s. It validates the session named by each request, then
//! forwards to the module addressed by component name. Desired and reported
//! documents share one shape:
//!
//! ```json
//! {"CommandRunner": {"commandArguments": {"CommandId": "1", "Action": 3}}}
//! ```

mod command_runner;
mod errors;

use std::sync::{Mutex, MutexGuard, PoisonError};

use osconfig_commandrunner::CommandRunner;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

pub use self::errors::ModuleError;
use crate::dispatch::MpiHandler;
use crate::session::{SessionId, SessionRegistry};

const MODULES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::modules");

/// A configuration unit addressed by component and object names.
pub trait ConfigModule: Send + Sync {
    /// Component name clients address the module by.
    fn name(&self) -> &str;

    /// Applies a desired-state payload to `object_name`.
    fn set(&self, object_name: &str, payload: &str) -> Result<(), ModuleError>;

    /// Reads `object_name`, keeping the result within
    /// `max_payload_size_bytes` when that is non-zero.
    fn get(&self, object_name: &str, max_payload_size_bytes: usize) -> Result<String, ModuleError>;

    /// Objects included in the reported document.
    fn reported_objects(&self) -> &[&'static str];

    /// Releases module resources before the daemon exits.
    fn shutdown(&self) {}
}

/// Production [`MpiHandler`] over a fixed set of modules.
pub struct ModulesManager {
    sessions: Mutex<SessionRegistry>,
    modules: Vec<Box<dyn ConfigModule>>,
}

impl ModulesManager {
    /// Creates a manager serving `modules`.
    #[must_use]
    pub fn new(modules: Vec<Box<dyn ConfigModule>>) -> Self {
        Self {
            sessions: Mutex::new(SessionRegistry::new()),
            modules,
        }
    }

    /// Creates a manager serving the built-in modules.
    #[must_use]
    pub fn with_default_modules() -> Self {
        Self::new(vec![Box::new(CommandRunner::new())])
    }

    /// Names of the registered components.
    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|module| module.name())
    }

    /// Shuts every module down.
    pub fn shutdown(&self) {
        for module in &self.modules {
            debug!(target: MODULES_TARGET, component = module.name(), "shutting down module");
            module.shutdown();
        }
    }

    fn lock_sessions(&self) -> MutexGuard<'_, SessionRegistry> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn payload_limit(&self, session: &str) -> Result<usize, ModuleError> {
        Ok(self.lock_sessions().get(session)?.max_payload_size_bytes())
    }

    fn module(&self, component: &str) -> Result<&dyn ConfigModule, ModuleError> {
        self.modules
            .iter()
            .find(|module| module.name() == component)
            .map(|module| &**module)
            .ok_or_else(|| ModuleError::unknown_component(component))
    }

    fn apply_component(&self, component: &str, objects: &Value) -> Result<(), ModuleError> {
        let module = self.module(component)?;
        let Value::Object(objects) = objects else {
            return Err(ModuleError::invalid_payload(format!(
                "desired state for '{component}' must be an object"
            )));
        };

        let mut first_error = None;
        for (object, value) in objects {
            if let Err(error) = module.set(object, &value.to_string()) {
                warn!(
                    target: MODULES_TARGET,
                    component,
                    object = object.as_str(),
                    %error,
                    "failed to apply desired object"
                );
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn report_component(
        &self,
        module: &dyn ConfigModule,
        max_payload_size_bytes: usize,
    ) -> Map<String, Value> {
        let mut reported = Map::new();
        for object in module.reported_objects() {
            let value = module
                .get(object, max_payload_size_bytes)
                .and_then(|json| serde_json::from_str(&json).map_err(ModuleError::from_json_error));
            match value {
                Ok(value) => {
                    reported.insert((*object).to_owned(), value);
                }
                Err(error) => warn!(
                    target: MODULES_TARGET,
                    component = module.name(),
                    object,
                    %error,
                    "skipping unreportable object"
                ),
            }
        }
        reported
    }
}

impl std::fmt::Debug for ModulesManager {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ModulesManager")
            .field("sessions", &self.lock_sessions().len())
            .field("modules", &self.component_names().collect::<Vec<_>>())
            .finish()
    }
}

impl MpiHandler for ModulesManager {
    fn open(
        &self,
        client_name: &str,
        max_payload_size_bytes: usize,
    ) -> Result<SessionId, ModuleError> {
        let id = self.lock_sessions().open(client_name, max_payload_size_bytes)?;
        info!(
            target: MODULES_TARGET,
            session = %id,
            client = client_name,
            max_payload_size_bytes,
            "session opened"
        );
        Ok(id)
    }

    fn close(&self, session: &str) -> Result<(), ModuleError> {
        let closed = self.lock_sessions().close(session)?;
        info!(
            target: MODULES_TARGET,
            session,
            client = closed.client_name(),
            "session closed"
        );
        Ok(())
    }

    fn set(
        &self,
        session: &str,
        component: &str,
        object: &str,
        payload: &str,
    ) -> Result<(), ModuleError> {
        self.lock_sessions().get(session)?;
        self.module(component)?.set(object, payload)
    }

    fn get(&self, session: &str, component: &str, object: &str) -> Result<String, ModuleError> {
        let limit = self.payload_limit(session)?;
        self.module(component)?.get(object, limit)
    }

    fn set_desired(&self, session: &str, payload: &str) -> Result<(), ModuleError> {
        self.lock_sessions().get(session)?;
        let document: Value = serde_json::from_str(payload).map_err(ModuleError::from_json_error)?;
        let Value::Object(components) = document else {
            return Err(ModuleError::invalid_payload(
                "desired document must be an object",
            ));
        };

        let mut first_error = None;
        for (component, objects) in &components {
            if let Err(error) = self.apply_component(component, objects) {
                debug!(
                    target: MODULES_TARGET,
                    component = component.as_str(),
                    %error,
                    "component rejected desired state"
                );
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn get_reported(&self, session: &str) -> Result<String, ModuleError> {
        let limit = self.payload_limit(session)?;
        let mut document = Map::new();
        for module in &self.modules {
            let reported = self.report_component(module.as_ref(), limit);
            if !reported.is_empty() {
                document.insert(module.name().to_owned(), Value::Object(reported));
            }
        }
        serde_json::to_string(&Value::Object(document)).map_err(ModuleError::Serialize)
    }
}
