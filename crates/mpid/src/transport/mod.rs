//! Unix socket listener for the MPI endpoint.
//!
//! The transport binds the configured socket, then serves connections one at
//! a time on a single background thread. Each accepted stream is handed to a
//! [`ConnectionHandler`] and closed once the handler returns.

mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
pub use self::handler::{ConnectionHandler, ConnectionStream};
pub use self::listener::{ListenerHandle, SocketListener};
#[cfg(test)]
pub(crate) use self::test_utils::CountingHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
