//! Error types for MPI request dispatch.
//!
//! Every variant maps onto one HTTP status through [`DispatchError::status`].
//! The detail carried here is logged; the wire response only carries the
//! status.

use thiserror::Error;

use crate::modules::ModuleError;
use crate::protocol::{ProtocolError, StatusCode};

/// Errors surfaced while decoding, routing or answering a request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request could not be framed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The body is not a JSON object.
    #[error("malformed request body: {message}")]
    MalformedBody {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// A required field is absent.
    #[error("{operation}: missing field '{field}'")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    /// A required field has the wrong type or value.
    #[error("{operation}: invalid field '{field}': {message}")]
    InvalidField {
        operation: &'static str,
        field: &'static str,
        message: String,
    },

    /// The URI token names no known operation.
    #[error("unknown operation '{uri}'")]
    UnknownOperation { uri: String },

    /// The addressed operation failed in the module layer.
    #[error("{operation} failed: {source}")]
    Module {
        operation: &'static str,
        #[source]
        source: ModuleError,
    },

    /// The response body could not be produced.
    #[error("failed to serialize response: {0}")]
    SerializeResponse(#[source] serde_json::Error),
}

impl DispatchError {
    /// Status code reported to the client for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Protocol(_)
            | Self::MalformedBody { .. }
            | Self::MissingField { .. }
            | Self::InvalidField { .. }
            | Self::Module { .. } => StatusCode::BAD_REQUEST,
            Self::UnknownOperation { .. } => StatusCode::NOT_FOUND,
            Self::SerializeResponse(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Creates a malformed body error from a serde error.
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedBody {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed body error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedBody {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a missing field error.
    pub const fn missing_field(operation: &'static str, field: &'static str) -> Self {
        Self::MissingField { operation, field }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(
        operation: &'static str,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            operation,
            field,
            message: message.into(),
        }
    }

    /// Creates an unknown operation error.
    pub fn unknown_operation(uri: impl Into<String>) -> Self {
        Self::UnknownOperation { uri: uri.into() }
    }

    /// Wraps a module failure.
    pub const fn module(operation: &'static str, source: ModuleError) -> Self {
        Self::Module { operation, source }
    }
}
