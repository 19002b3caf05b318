//! OSConfig management platform daemon.
//!
//! `mpid` serves the management platform interface (MPI) over a Unix domain
//! socket. Clients open a session, then read and write configuration objects
//! owned by pluggable modules, either one object at a time or as a single
//! desired/reported document. Each connection carries exactly one
//! HTTP/1.1-shaped request whose final path segment names the operation.
//!
//! The layers are:
//!
//! - [`transport`]: socket binding and the serial accept loop.
//! - [`protocol`]: request decoding and response framing.
//! - [`dispatch`]: operation routing and field validation.
//! - [`session`]: the registry of open client sessions.
//! - [`modules`]: configuration modules behind the [`dispatch::MpiHandler`]
//!   trait, including the command runner.
//!
//! [`run_daemon`] wires them together with configuration from
//! [`osconfig_config`], structured telemetry and signal-driven shutdown.

mod bootstrap;
pub mod dispatch;
mod health;
pub mod modules;
mod process;
pub mod protocol;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use bootstrap::{BootstrapError, ConfigLoader, Daemon, SystemConfigLoader, bootstrap_with};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
