//! MPI request dispatch.
//!
//! This module turns one decoded request into one response. The router maps
//! the URI token to one of six session operations and invokes the matching
//! [`MpiHandler`] method; the connection handler plugs the router into the
//! transport layer.
//!
//! ## Protocol
//!
//! Each operation takes a JSON object body:
//!
//! ```text
//! MpiOpen         {"ClientName": "...", "MaxPayloadSizeBytes": 0}
//! MpiClose        {"ClientSession": "..."}
//! MpiSet          {"ClientSession": "...", "ComponentName": "...", "ObjectName": "...", "Payload": {}}
//! MpiGet          {"ClientSession": "...", "ComponentName": "...", "ObjectName": "..."}
//! MpiSetDesired   {"ClientSession": "...", "Payload": {}}
//! MpiGetReported  {"ClientSession": "..."}
//! ```
//!
//! Successful operations answer `200 OK` with the handler's body (a JSON
//! string holding the session id for `MpiOpen`). Unknown operations answer
//! `404 Not Found`; every other failure answers `400 Bad Request` with an
//! empty body.

mod errors;
mod handler;
mod router;

pub use self::errors::DispatchError;
pub use self::handler::DispatchConnectionHandler;
pub use self::router::{MpiHandler, MpiRouter, Operation};
