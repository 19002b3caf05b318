//! Registers the command runner as a configuration module.

use osconfig_commandrunner::{COMPONENT_NAME, CommandError, CommandRunner, REPORTED_OBJECT};

use super::{ConfigModule, ModuleError};

impl ConfigModule for CommandRunner {
    fn name(&self) -> &str {
        COMPONENT_NAME
    }

    fn set(&self, object_name: &str, payload: &str) -> Result<(), ModuleError> {
        Self::set(self, object_name, payload).map_err(|error| into_module_error(object_name, error))
    }

    fn get(&self, object_name: &str, max_payload_size_bytes: usize) -> Result<String, ModuleError> {
        Self::get(self, object_name, max_payload_size_bytes)
            .map_err(|error| into_module_error(object_name, error))
    }

    fn reported_objects(&self) -> &[&'static str] {
        &[REPORTED_OBJECT]
    }

    fn shutdown(&self) {
        Self::shutdown(self);
    }
}

fn into_module_error(object_name: &str, error: CommandError) -> ModuleError {
    match error {
        CommandError::UnknownObject { .. } => ModuleError::UnknownObject {
            component: COMPONENT_NAME.to_owned(),
            object: object_name.to_owned(),
        },
        other => ModuleError::Command(other),
    }
}

#[cfg(test)]
mod tests {
    use osconfig_commandrunner::DESIRED_OBJECT;

    use super::*;

    #[test]
    fn runner_is_addressed_by_component_name() {
        let runner = CommandRunner::new();
        assert_eq!(ConfigModule::name(&runner), "CommandRunner");
        assert_eq!(runner.reported_objects(), &["commandStatus"]);
    }

    #[test]
    fn unknown_objects_name_the_component() {
        let runner = CommandRunner::new();
        let error = ConfigModule::set(&runner, "bogus", "{}").expect_err("unknown object");
        assert!(matches!(
            error,
            ModuleError::UnknownObject { ref component, ref object }
                if component == "CommandRunner" && object == "bogus"
        ));
    }

    #[test]
    fn command_errors_are_preserved() {
        let runner = CommandRunner::new();
        let error = ConfigModule::set(&runner, DESIRED_OBJECT, r#"{"CommandId":"x","Action":5}"#)
            .expect_err("cancel unknown command");
        assert!(matches!(
            error,
            ModuleError::Command(CommandError::NotFound { .. })
        ));
    }
}
