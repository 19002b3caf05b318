//! Operation routing for MPI requests.
//!
//! The router parses the JSON body into an object, picks the operation named
//! by the URI token, extracts that operation's fields in a fixed order and
//! invokes the matching [`MpiHandler`] method. The first missing or mistyped
//! field rejects the request.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::errors::DispatchError;
use crate::modules::ModuleError;
use crate::protocol::Request;
use crate::session::SessionId;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

const CLIENT_NAME: &str = "ClientName";
const MAX_PAYLOAD_SIZE_BYTES: &str = "MaxPayloadSizeBytes";
const CLIENT_SESSION: &str = "ClientSession";
const COMPONENT_NAME: &str = "ComponentName";
const OBJECT_NAME: &str = "ObjectName";
const PAYLOAD: &str = "Payload";

/// Session operations the router delegates to.
///
/// One method per MPI operation. Errors of any kind are reported to the
/// client as `400 Bad Request`.
pub trait MpiHandler: Send + Sync {
    /// Opens a session for `client_name`.
    fn open(
        &self,
        client_name: &str,
        max_payload_size_bytes: usize,
    ) -> Result<SessionId, ModuleError>;

    /// Closes `session`.
    fn close(&self, session: &str) -> Result<(), ModuleError>;

    /// Applies `payload` to one component object.
    fn set(
        &self,
        session: &str,
        component: &str,
        object: &str,
        payload: &str,
    ) -> Result<(), ModuleError>;

    /// Reads one component object.
    fn get(&self, session: &str, component: &str, object: &str) -> Result<String, ModuleError>;

    /// Applies a desired-state document across components.
    fn set_desired(&self, session: &str, payload: &str) -> Result<(), ModuleError>;

    /// Produces the reported-state document across components.
    fn get_reported(&self, session: &str) -> Result<String, ModuleError>;
}

/// Known MPI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `MpiOpen`.
    Open,
    /// `MpiClose`.
    Close,
    /// `MpiSet`.
    Set,
    /// `MpiGet`.
    Get,
    /// `MpiSetDesired`.
    SetDesired,
    /// `MpiGetReported`.
    GetReported,
}

impl Operation {
    /// Parses a URI token. Matching is exact.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::UnknownOperation` for any other token.
    pub fn parse(uri: &str) -> Result<Self, DispatchError> {
        match uri {
            "MpiOpen" => Ok(Self::Open),
            "MpiClose" => Ok(Self::Close),
            "MpiSet" => Ok(Self::Set),
            "MpiGet" => Ok(Self::Get),
            "MpiSetDesired" => Ok(Self::SetDesired),
            "MpiGetReported" => Ok(Self::GetReported),
            _ => Err(DispatchError::unknown_operation(uri)),
        }
    }

    /// URI token for the operation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "MpiOpen",
            Self::Close => "MpiClose",
            Self::Set => "MpiSet",
            Self::Get => "MpiGet",
            Self::SetDesired => "MpiSetDesired",
            Self::GetReported => "MpiGetReported",
        }
    }
}

/// Routes decoded requests to an [`MpiHandler`].
#[derive(Clone)]
pub struct MpiRouter {
    handler: Arc<dyn MpiHandler>,
}

impl MpiRouter {
    /// Creates a router over `handler`.
    pub fn new(handler: Arc<dyn MpiHandler>) -> Self {
        Self { handler }
    }

    /// Routes `request` and returns the response body.
    ///
    /// # Errors
    ///
    /// Returns a `DispatchError` describing the first problem found; its
    /// status is what the client sees.
    pub fn route(&self, request: &Request) -> Result<String, DispatchError> {
        let body = parse_body(request.body())?;
        let operation = Operation::parse(request.uri())?;
        debug!(
            target: DISPATCH_TARGET,
            operation = operation.as_str(),
            "routing request"
        );

        let fields = Fields {
            operation: operation.as_str(),
            body: &body,
        };
        match operation {
            Operation::Open => self.open(&fields),
            Operation::Close => self.close(&fields),
            Operation::Set => self.set(&fields),
            Operation::Get => self.get(&fields),
            Operation::SetDesired => self.set_desired(&fields),
            Operation::GetReported => self.get_reported(&fields),
        }
    }

    fn open(&self, fields: &Fields<'_>) -> Result<String, DispatchError> {
        let client_name = fields.string(CLIENT_NAME)?;
        let max_payload_size_bytes = fields.size(MAX_PAYLOAD_SIZE_BYTES)?;
        let session = self
            .handler
            .open(client_name, max_payload_size_bytes)
            .map_err(|error| fields.failed(error))?;
        serde_json::to_string(session.as_str()).map_err(DispatchError::SerializeResponse)
    }

    fn close(&self, fields: &Fields<'_>) -> Result<String, DispatchError> {
        let session = fields.string(CLIENT_SESSION)?;
        self.handler
            .close(session)
            .map_err(|error| fields.failed(error))?;
        Ok(String::new())
    }

    fn set(&self, fields: &Fields<'_>) -> Result<String, DispatchError> {
        let session = fields.string(CLIENT_SESSION)?;
        let component = fields.string(COMPONENT_NAME)?;
        let object = fields.string(OBJECT_NAME)?;
        let payload = fields.json(PAYLOAD)?;
        self.handler
            .set(session, component, object, &payload)
            .map_err(|error| fields.failed(error))?;
        Ok(String::new())
    }

    fn get(&self, fields: &Fields<'_>) -> Result<String, DispatchError> {
        let session = fields.string(CLIENT_SESSION)?;
        let component = fields.string(COMPONENT_NAME)?;
        let object = fields.string(OBJECT_NAME)?;
        self.handler
            .get(session, component, object)
            .map_err(|error| fields.failed(error))
    }

    fn set_desired(&self, fields: &Fields<'_>) -> Result<String, DispatchError> {
        let session = fields.string(CLIENT_SESSION)?;
        let payload = fields.json(PAYLOAD)?;
        self.handler
            .set_desired(session, &payload)
            .map_err(|error| fields.failed(error))?;
        Ok(String::new())
    }

    fn get_reported(&self, fields: &Fields<'_>) -> Result<String, DispatchError> {
        let session = fields.string(CLIENT_SESSION)?;
        self.handler
            .get_reported(session)
            .map_err(|error| fields.failed(error))
    }
}

impl std::fmt::Debug for MpiRouter {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("MpiRouter").finish_non_exhaustive()
    }
}

fn parse_body(body: &[u8]) -> Result<Map<String, Value>, DispatchError> {
    if body.is_empty() {
        return Err(DispatchError::malformed("request body is empty"));
    }
    match serde_json::from_slice(body).map_err(DispatchError::from_json_error)? {
        Value::Object(object) => Ok(object),
        _ => Err(DispatchError::malformed("request body is not a JSON object")),
    }
}

/// Field accessors for one request body.
struct Fields<'a> {
    operation: &'static str,
    body: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn value(&self, field: &'static str) -> Result<&'a Value, DispatchError> {
        self.body
            .get(field)
            .ok_or_else(|| DispatchError::missing_field(self.operation, field))
    }

    fn string(&self, field: &'static str) -> Result<&'a str, DispatchError> {
        self.value(field)?
            .as_str()
            .ok_or_else(|| DispatchError::invalid_field(self.operation, field, "expected a string"))
    }

    fn size(&self, field: &'static str) -> Result<usize, DispatchError> {
        let value = self.value(field)?;
        let number = value.as_i64().ok_or_else(|| {
            DispatchError::invalid_field(self.operation, field, "expected an integer")
        })?;
        usize::try_from(number).map_err(|_| {
            DispatchError::invalid_field(self.operation, field, format!("{number} is negative"))
        })
    }

    fn json(&self, field: &'static str) -> Result<String, DispatchError> {
        serde_json::to_string(self.value(field)?).map_err(DispatchError::SerializeResponse)
    }

    const fn failed(&self, source: ModuleError) -> DispatchError {
        DispatchError::module(self.operation, source)
    }
}

#[cfg(test)]
mod tests;
