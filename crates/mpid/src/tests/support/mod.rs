//! Test harness utilities for the daemon behavioural suites.

mod client;
mod config_loader;
mod daemon;
mod reporter;

pub use client::MpiClient;
pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use daemon::RunningDaemon;
pub use reporter::{HealthEvent, RecordingHealthReporter};
