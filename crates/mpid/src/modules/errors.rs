//! Error types for module operations.

use osconfig_commandrunner::CommandError;
use thiserror::Error;

use crate::session::SessionError;

/// Errors surfaced by the module layer.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The session is unusable.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// No module is registered under the component name.
    #[error("unknown component '{component}'")]
    UnknownComponent { component: String },

    /// The component does not serve the object.
    #[error("component '{component}' has no object '{object}'")]
    UnknownObject { component: String, object: String },

    /// A desired or reported document has the wrong shape.
    #[error("invalid payload: {message}")]
    InvalidPayload {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// The command runner refused the request.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The reported document could not be serialized.
    #[error("failed to serialize reported document: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl ModuleError {
    /// Creates an invalid payload error with a custom message.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an invalid payload error from a serde error.
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::InvalidPayload {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates an unknown component error.
    pub fn unknown_component(component: impl Into<String>) -> Self {
        Self::UnknownComponent {
            component: component.into(),
        }
    }
}
